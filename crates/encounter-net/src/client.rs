//! TCP client pushing transform updates to the world service.
//!
//! The write half lives behind a mutex shared by every behavior task. A
//! background reader drains inbound frames and marks the connection lost when
//! the peer goes away. State changes are broadcast through a [`watch`]
//! channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use encounter_world::{
    BoxFuture, ConnectionError, TransformUpdate, TransportError, WorldClient, now_millis,
};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;

use crate::backoff::{Backoff, ReconnectConfig, ReconnectError};
use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};
use crate::messages::{Ping, TransformFrame, WorldMessage, decode_message, encode_message};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Starts as [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    pub fn set(&self, state: ConnectionState) {
        self.tx.send_replace(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct WorldClientConfig {
    /// `host:port` of the world service.
    pub address: String,
    pub connect_timeout: Duration,
    pub frame: FrameConfig,
    pub reconnect: ReconnectConfig,
}

impl Default for WorldClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7777".to_string(),
            connect_timeout: Duration::from_secs(5),
            frame: FrameConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

struct CoolDown {
    backoff: Backoff,
    retry_after: Option<Instant>,
}

/// [`WorldClient`] over a framed TCP stream.
///
/// `update` never connects on its own; callers recover with `reconnect`,
/// which makes at most one attempt and refuses while the cool-down from the
/// previous failure is running.
pub struct TcpWorldClient {
    config: WorldClientConfig,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    state: Arc<ConnectionStateWatch>,
    /// Bumped on every successful connect so a stale reader cannot tear down
    /// a newer connection.
    generation: Arc<AtomicU64>,
    cool_down: std::sync::Mutex<CoolDown>,
    ping_sequence: AtomicU32,
}

impl TcpWorldClient {
    /// Create a disconnected client.
    pub fn new(config: WorldClientConfig) -> Self {
        let backoff = Backoff::new(config.reconnect.clone());
        Self {
            config,
            writer: Arc::new(Mutex::new(None)),
            state: Arc::new(ConnectionStateWatch::new()),
            generation: Arc::new(AtomicU64::new(0)),
            cool_down: std::sync::Mutex::new(CoolDown {
                backoff,
                retry_after: None,
            }),
            ping_sequence: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.current() == ConnectionState::Connected
    }

    /// Connect, waiting out the backoff between failures, up to
    /// `max_attempts` tries.
    pub async fn connect_with_retry(&self) -> Result<(), ReconnectError> {
        let max_attempts = self.config.reconnect.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.try_connect().await {
                Ok(()) => return Ok(()),
                Err(ConnectionError::Backoff(delay)) => {
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "world connect attempt failed");
                    if attempt < max_attempts {
                        let delay = self.remaining_cool_down().unwrap_or_default();
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(ReconnectError::MaxAttemptsExhausted(max_attempts))
    }

    /// Send a keepalive ping.
    pub async fn ping(&self) -> Result<(), TransportError> {
        let msg = WorldMessage::Ping(Ping {
            timestamp_ms: now_millis(),
            sequence: self.ping_sequence.fetch_add(1, Ordering::Relaxed),
        });
        self.send(&msg).await
    }

    /// Ping on `period` and reconnect when the connection is down, until
    /// `shutdown` flips to `true`.
    pub async fn run_keepalive(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.is_connected() {
                        if let Err(e) = self.ping().await {
                            tracing::debug!(error = %e, "keepalive ping failed");
                        }
                    } else if let Err(e) = self.try_connect().await {
                        tracing::debug!(error = %e, "keepalive reconnect failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.disconnect().await;
    }

    /// Drop the connection.
    pub async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.writer.lock().await.take();
        self.state.set(ConnectionState::Disconnected);
    }

    fn remaining_cool_down(&self) -> Option<Duration> {
        let guard = self.cool_down.lock().ok()?;
        let retry_after = guard.retry_after?;
        let now = Instant::now();
        (retry_after > now).then(|| retry_after - now)
    }

    fn record_failure(&self) {
        if let Ok(mut guard) = self.cool_down.lock() {
            let delay = guard.backoff.next_delay();
            guard.retry_after = Some(Instant::now() + delay);
        }
    }

    fn record_success(&self) {
        if let Ok(mut guard) = self.cool_down.lock() {
            guard.backoff.reset();
            guard.retry_after = None;
        }
    }

    async fn try_connect(&self) -> Result<(), ConnectionError> {
        if let Some(remaining) = self.remaining_cool_down() {
            return Err(ConnectionError::Backoff(remaining));
        }

        self.state.set(ConnectionState::Connecting);
        let timeout = self.config.connect_timeout;
        let stream =
            match tokio::time::timeout(timeout, TcpStream::connect(&self.config.address)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    self.record_failure();
                    self.state.set(ConnectionState::Disconnected);
                    return Err(ConnectionError::Io(e));
                }
                Err(_) => {
                    self.record_failure();
                    self.state.set(ConnectionState::Disconnected);
                    return Err(ConnectionError::Timeout(timeout));
                }
            };
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.writer.lock().await = Some(writer);
        self.record_success();
        self.state.set(ConnectionState::Connected);

        tokio::spawn(read_loop(
            reader,
            self.config.frame.clone(),
            generation,
            Arc::clone(&self.generation),
            Arc::clone(&self.writer),
            Arc::clone(&self.state),
        ));

        tracing::info!(address = %self.config.address, "connected to world service");
        Ok(())
    }

    async fn send(&self, msg: &WorldMessage) -> Result<(), TransportError> {
        let payload = encode_message(msg).map_err(|e| TransportError::Encode(e.to_string()))?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        match write_frame(writer, &payload, &self.config.frame).await {
            Ok(()) => Ok(()),
            Err(FrameError::PayloadTooLarge { size, max }) => Err(TransportError::Encode(
                format!("frame of {size} bytes exceeds {max}"),
            )),
            Err(FrameError::ConnectionClosed) => {
                guard.take();
                self.state.set(ConnectionState::Disconnected);
                Err(TransportError::NotConnected)
            }
            Err(FrameError::Io(e)) => {
                guard.take();
                self.state.set(ConnectionState::Disconnected);
                Err(TransportError::Io(e))
            }
        }
    }
}

/// Drain inbound frames until the peer closes, then mark the connection lost
/// if it is still the current one.
async fn read_loop(
    mut reader: OwnedReadHalf,
    frame: FrameConfig,
    generation: u64,
    current: Arc<AtomicU64>,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    state: Arc<ConnectionStateWatch>,
) {
    loop {
        if current.load(Ordering::SeqCst) != generation {
            return;
        }
        match read_frame(&mut reader, &frame).await {
            Ok(payload) => match decode_message(&payload) {
                Ok(msg) => tracing::trace!(?msg, "world message received"),
                Err(e) => tracing::debug!(error = %e, "undecodable world message"),
            },
            Err(e) => {
                tracing::debug!(error = %e, "world connection reader stopped");
                break;
            }
        }
    }

    let mut guard = writer.lock().await;
    if current.load(Ordering::SeqCst) == generation {
        guard.take();
        state.set(ConnectionState::Disconnected);
        tracing::warn!("world service connection lost");
    }
}

impl WorldClient for TcpWorldClient {
    fn update(&self, update: TransformUpdate) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let msg = WorldMessage::TransformUpdate(TransformFrame::from(&update));
            self.send(&msg).await
        })
    }

    fn reconnect(&self) -> BoxFuture<'_, Result<(), ConnectionError>> {
        Box::pin(async move {
            self.disconnect().await;
            self.try_connect().await
        })
    }
}
