use clap::Parser;
use task_broker::broker::Broker;
use task_broker::config::{BrokerConfig, LogFormat};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = BrokerConfig::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    tracing::info!("Starting task broker");

    // 1. Listeners, dispatch engine and progress loop:
    let broker = Broker::start(&config).await?;

    // 2. HTTP status/completion API:
    let app = broker.router();
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;

    tracing::info!("HTTP server listening on {}", listener.local_addr()?);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    broker.shutdown();

    Ok(())
}
