use anyhow::Context;
use clap::Parser;
use connectors::{
    db::{self, url::mask_password, MysqlStore},
    settings::MysqlSettings,
    shutdown_signal,
};

const DEFAULT_USERS: &[&str] = &["Alice", "Bob"];

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    connectors::init_tracing();
    tracing::info!("Starting MySQL app...");

    let settings = MysqlSettings::parse();
    tracing::info!(
        "Connecting to database: {}",
        mask_password(&settings.connection_url)
    );

    let store = MysqlStore::connect_lazy(&settings.connection_url)
        .context("failed to open database connection")?;

    db::run(&store, DEFAULT_USERS).await?;

    tracing::info!("App is running (press Ctrl+C to stop)...");
    shutdown_signal().await;
    tracing::info!("Shutting down...");

    Ok(())
}
