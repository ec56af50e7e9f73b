//! HTTP admin server.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use encounter_behavior::{BehaviorCategory, SharedStats};
use encounter_world::{ElementService, EntityInfoService, WorldClient};
use tiny_http::{Header, Request, Response, Server};
use tokio::runtime::Handle;

use crate::routes::{Route, dispatch};

#[derive(Debug, thiserror::Error)]
pub enum AdminServerError {
    #[error("Failed to bind to port {port}: {error}")]
    BindError { port: u16, error: String },
    #[error("Failed to spawn server thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Server thread panicked")]
    ThreadPanic,
}

/// Collaborators and statistics the admin API reads from.
pub struct AdminState {
    pub entities: Arc<dyn EntityInfoService>,
    pub elements: Arc<dyn ElementService>,
    pub world: Arc<dyn WorldClient>,
    /// Cycle statistics of each running behavior loop.
    pub loops: Vec<(BehaviorCategory, SharedStats)>,
    pub started_at: Instant,
}

impl AdminState {
    pub fn new(
        entities: Arc<dyn EntityInfoService>,
        elements: Arc<dyn ElementService>,
        world: Arc<dyn WorldClient>,
    ) -> Self {
        Self {
            entities,
            elements,
            world,
            loops: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn with_loop(mut self, category: BehaviorCategory, stats: SharedStats) -> Self {
        self.loops.push((category, stats));
        self
    }
}

/// HTTP server for the admin API.
/// Runs on a background thread and enters the tokio runtime through a
/// [`Handle`] for every request.
pub struct AdminServer {
    port: u16,
    actual_port: Option<u16>,
    server: Option<Arc<Server>>,
    handle: Option<JoinHandle<()>>,
}

impl AdminServer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            actual_port: None,
            server: None,
            handle: None,
        }
    }

    pub fn start(&mut self, state: Arc<AdminState>, runtime: Handle) -> Result<(), AdminServerError> {
        let server = Server::http(format!("127.0.0.1:{}", self.port)).map_err(|e| {
            AdminServerError::BindError {
                port: self.port,
                error: e.to_string(),
            }
        })?;

        let actual_port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .unwrap_or(self.port);
        self.actual_port = Some(actual_port);

        let server = Arc::new(server);
        let worker = Arc::clone(&server);
        let handle = thread::Builder::new()
            .name("admin-http".into())
            .spawn(move || Self::run_server(&worker, &state, &runtime))?;

        tracing::info!(port = actual_port, "admin server listening");
        self.server = Some(server);
        self.handle = Some(handle);
        Ok(())
    }

    /// Unblock the accept loop and join the server thread.
    pub fn stop(&mut self) -> Result<(), AdminServerError> {
        if let Some(server) = self.server.take() {
            server.unblock();
        }
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| AdminServerError::ThreadPanic)?;
        }
        Ok(())
    }

    pub fn actual_port(&self) -> u16 {
        self.actual_port.unwrap_or(self.port)
    }

    fn run_server(server: &Server, state: &AdminState, runtime: &Handle) {
        for request in server.incoming_requests() {
            if let Err(e) = Self::handle_request(request, state, runtime) {
                tracing::warn!(error = %e, "admin request failed");
            }
        }
        tracing::debug!("admin server thread exiting");
    }

    fn handle_request(request: Request, state: &AdminState, runtime: &Handle) -> std::io::Result<()> {
        let route = Route::parse(request.method(), request.url());
        tracing::debug!(method = %request.method(), url = request.url(), ?route, "admin request");

        let reply = runtime.block_on(dispatch(state, route));
        let mut response = Response::from_string(reply.body.to_string()).with_status_code(reply.status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
            response = response.with_header(header);
        }
        request.respond(response)
    }
}

impl Drop for AdminServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "admin server did not stop cleanly");
        }
    }
}
