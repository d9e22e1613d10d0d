//! # fabgated — equipment gateway daemon
//!
//! Composition root that wires the adapters together and runs the
//! gateway.
//!
//! ## Responsibilities
//! - Parse configuration (`fabgate.toml`, env vars)
//! - Initialize the `SQLite` pool and run migrations
//! - Construct adapters and inject them through port traits
//! - Connect the configured equipment endpoints with bounded concurrency
//! - Run the health monitor and propagation pipeline as background tasks
//! - Handle graceful shutdown (ctrl-c): cancel, disconnect all, persist
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fabgate_adapter_broker_mqtt::MqttBroker;
use fabgate_adapter_session_virtual::{VirtualEquipment, VirtualFleet};
use fabgate_adapter_storage_sqlite_sqlx::{Config as DbConfig, SqliteEquipmentRepository};
use fabgate_app::cache::InMemoryStatusCache;
use fabgate_app::event_bus::InProcessEventBus;
use fabgate_app::manager::ConnectionManager;
use fabgate_app::monitor::HealthMonitor;
use fabgate_app::ports::EquipmentRepository;
use fabgate_app::propagation::PropagationPipeline;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = DbConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let repository = SqliteEquipmentRepository::new(db.pool().clone());

    let persisted = repository.get_all().await?;
    tracing::info!(count = persisted.len(), "loaded persisted equipment");

    let shutdown = CancellationToken::new();

    // Event bus and propagation sinks
    let bus = Arc::new(InProcessEventBus::new(256));
    let cache = InMemoryStatusCache::new();
    let broker = MqttBroker::start(config.mqtt.clone(), shutdown.clone())?;
    let pipeline = PropagationPipeline::new(cache, broker);

    let pipeline_receiver = bus.subscribe();
    let pipeline_shutdown = shutdown.clone();
    let pipeline_task =
        tokio::spawn(async move { pipeline.run(pipeline_receiver, pipeline_shutdown).await });

    // Sessions — the virtual fleet stands in for the fab floor until a
    // protocol adapter lands.
    let mut fleet = VirtualFleet::new();
    for endpoint in &config.equipment {
        let equipment_id = endpoint
            .expected_id
            .as_ref()
            .map_or_else(|| endpoint.host.replace('.', "-"), ToString::to_string);
        fleet = fleet.with_equipment(&endpoint.host, VirtualEquipment::answering(equipment_id));
    }

    let manager = Arc::new(ConnectionManager::new(
        fleet,
        Arc::clone(&bus),
        config.gateway_config(),
        shutdown.clone(),
    ));

    let report = manager
        .connect_multiple(config.equipment.clone(), None)
        .await;
    tracing::info!(
        successful = report.successful_count,
        failed = report.failed_count,
        elapsed_ms = report.total_duration.as_millis(),
        "initial connect finished"
    );
    for failure in report.results.iter().filter_map(|r| r.as_ref().err()) {
        tracing::warn!(host = %failure.host, port = failure.port, error = %failure.error, "endpoint not connected");
    }

    // Rehydrate durable aggregate state from the previous run into the
    // devices that came back.
    let mut restored = 0_usize;
    for equipment in persisted {
        if manager.restore_persisted(equipment).await {
            restored += 1;
        }
    }
    tracing::info!(restored, "persisted equipment state restored");

    let monitor = HealthMonitor::new(
        Arc::clone(&manager),
        config.gateway_config().check_interval,
        shutdown.clone(),
    );
    let monitor_task = tokio::spawn(monitor.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    shutdown.cancel();
    manager.disconnect_all().await;

    // Persist final aggregate state for the next start.
    for equipment in manager.export_equipment().await {
        let stored = repository.get_by_id(&equipment.id).await?;
        let result = if stored.is_some() {
            repository.update(equipment).await
        } else {
            repository.add(equipment).await
        };
        if let Err(err) = result {
            tracing::error!(error = %err, "failed to persist equipment");
        }
    }

    let _ = monitor_task.await;
    let _ = pipeline_task.await;

    tracing::info!("fabgated stopped");
    Ok(())
}
