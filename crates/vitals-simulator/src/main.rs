use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal::unix::SignalKind;
use vitals_core::telemetry::init_tracing;
use vitals_core::Settings;
use vitals_simulator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env().context("Invalid configuration")?;
    init_tracing(settings.tracing_directive());

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting {}", settings.project_name);
    tracing::info!("  State: {:?}", settings.simulation_state);
    tracing::info!("  Dispersion: {}", settings.dispersion_default);
    tracing::info!("  Interval: {}s", settings.data_generation_interval_secs);
    tracing::info!(
        "  Detection: {} (distance threshold {}, model threshold {})",
        settings.anomaly_method,
        settings.distance_threshold,
        settings.model_threshold
    );
    tracing::info!("  Shared state: {}", settings.shared_state_path.display());
    if !settings.vitals_overrides.is_empty() {
        tracing::info!("  Overrides: {:?}", settings.vitals_overrides);
    }

    let orchestrator = Orchestrator::from_settings(&settings);

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };

    let period = Duration::from_secs(settings.data_generation_interval_secs.max(1));
    let metrics = orchestrator.run(period, shutdown).await;

    tracing::info!(
        summary = %metrics.to_json(),
        "Simulator shut down after {} ticks.",
        metrics.ticks
    );
    Ok(())
}
