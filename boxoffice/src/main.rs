//! Box office HTTP server.

use boxoffice::{Application, Config, metrics};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine outside local development
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,boxoffice=debug,sqlx=warn,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting box office server");

    metrics::register_business_metrics();

    let config = Config::from_env();
    info!(
        address = %config.bind_address(),
        hold_minutes = config.reservations.hold_minutes,
        sweep_interval_secs = config.reservations.sweep_interval_secs,
        "Configuration loaded"
    );

    let app = Application::build(config).await?;
    app.run().await?;

    info!("Server stopped");
    Ok(())
}
