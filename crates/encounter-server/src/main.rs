//! Dynamic encounter backend entry point.
//!
//! Wires the in-memory stores, the TCP world client, one behavior loop per
//! category, the region pool loop and the admin API, then runs until Ctrl-C.
//!
//! Run with: `cargo run -p encounter-server -- --world-address 127.0.0.1`

mod scripts;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use encounter_admin::{AdminServer, AdminState};
use encounter_behavior::{BehaviorCategory, BehaviorLoop, BehaviorServices, ContextCache, LoopConfig};
use encounter_config::{CliArgs, Config, NetworkConfig, default_config_dir};
use encounter_net::{ReconnectConfig, TcpWorldClient, WorldClientConfig};
use encounter_region::{RegionPoolLoop, RegionPoolManager, RegionServices};
use encounter_world::ScriptRegistry;
use encounter_world::memory::{
    MemoryEventBus, MemoryFeatureFlags, MemoryHandleStore, MemoryRegionStore, MemoryWorld,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::scripts::EncounterScripts;

const KEEPALIVE_PERIOD: Duration = Duration::from_secs(15);

fn client_config(network: &NetworkConfig) -> WorldClientConfig {
    WorldClientConfig {
        address: format!("{}:{}", network.world_address, network.world_port),
        connect_timeout: Duration::from_secs(network.connect_timeout_secs),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(network.initial_delay_ms),
            max_delay: Duration::from_millis(network.max_delay_ms),
            ..ReconnectConfig::default()
        },
        ..WorldClientConfig::default()
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}; using defaults", config_dir.display());
            Config::default()
        }
    };
    config.apply_cli_overrides(&args);

    encounter_log::init_logging(
        config.debug.log_dir.as_deref(),
        cfg!(debug_assertions),
        Some(&config),
    );

    info!("Encounter server starting");
    info!(
        "World: {}:{} | Pools: {} | Admin: {}",
        config.network.world_address,
        config.network.world_port,
        config.region.pools.len(),
        if config.admin.enabled {
            config.admin.port.to_string()
        } else {
            "disabled".to_string()
        },
    );

    let world = Arc::new(MemoryWorld::new());
    let handles = Arc::new(MemoryHandleStore::new());
    let regions = Arc::new(MemoryRegionStore::new());
    let events = Arc::new(MemoryEventBus::new());
    let flags = Arc::new(MemoryFeatureFlags::new());
    flags.set(config.scheduler.feature_key.clone(), true).await;

    let client = Arc::new(TcpWorldClient::new(client_config(&config.network)));

    let mut registry = ScriptRegistry::new();
    EncounterScripts::new(world.clone(), handles.clone()).register(&mut registry);
    info!(scripts = ?registry.names().collect::<Vec<_>>(), "scripts registered");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    {
        let client = Arc::clone(&client);
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = client.connect_with_retry().await {
                warn!(error = %e, "world service unreachable, behaviors will retry");
            }
            client.run_keepalive(KEEPALIVE_PERIOD, shutdown).await;
        }));
    }

    let services = BehaviorServices {
        entities: world.clone(),
        elements: world.clone(),
        world: client.clone(),
        handles: handles.clone(),
        events: events.clone(),
        flags: flags.clone(),
    };
    let contexts = Arc::new(ContextCache::new(Duration::from_secs(
        config.cache.context_ttl_secs,
    )));

    let mut admin_state = AdminState::new(world.clone(), world.clone(), client.clone());
    for category in BehaviorCategory::ALL {
        let behavior_loop = Arc::new(BehaviorLoop::new(
            category,
            LoopConfig::from_config(category, &config.scheduler, &config.cache),
            services.clone(),
            Arc::clone(&contexts),
        ));
        admin_state = admin_state.with_loop(category, behavior_loop.stats());

        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { behavior_loop.run(shutdown).await }));
    }

    let region_services = RegionServices {
        regions,
        scripts: Arc::new(registry),
        spatial: world.clone(),
        entities: world.clone(),
        handles: handles.clone(),
        events,
    };
    let region_loop = RegionPoolLoop::new(
        Arc::new(RegionPoolManager::new(region_services)),
        &config.region,
    );
    {
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { region_loop.run(shutdown).await }));
    }

    let mut admin = None;
    if config.admin.enabled {
        let mut server = AdminServer::new(config.admin.port);
        match server.start(Arc::new(admin_state), tokio::runtime::Handle::current()) {
            Ok(()) => admin = Some(server),
            Err(e) => error!(error = %e, "admin server failed to start"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
    }
    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "task ended abnormally");
        }
    }
    if let Some(mut server) = admin
        && let Err(e) = server.stop()
    {
        warn!(error = %e, "admin server did not stop cleanly");
    }
    client.disconnect().await;
    info!("Encounter server stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_from_network_settings() {
        let network = NetworkConfig {
            world_address: "10.0.0.2".into(),
            world_port: 9000,
            connect_timeout_secs: 3,
            initial_delay_ms: 250,
            max_delay_ms: 8_000,
        };
        let config = client_config(&network);
        assert_eq!(config.address, "10.0.0.2:9000");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(8_000));
    }
}
