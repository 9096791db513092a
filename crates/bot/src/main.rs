//! Admin relay bot binary entrypoint.
//!
//! Relays registration and loan application events from Redis pub/sub to
//! the administrators' Telegram chats, and answers `/start`.

mod commands;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use relay_common::config::AppConfig;
use relay_notifier::bridge;
use relay_notifier::fanout::FanoutSender;
use relay_notifier::sender::TelegramClient;
use relay_notifier::subscriber::{self, ChannelRegistry};

const DEFAULT_LOG_FILTER: &str = "relay_bot=info,relay_notifier=info,relay_common=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!("Admin relay bot starting...");

    // Load configuration
    let config = AppConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "Invalid configuration, refusing to start");
    })?;

    let telegram = Arc::new(TelegramClient::new(&config.telegram)?);
    let bot = commands::bot(&config.telegram)?;

    // Delivery side first: the subscriber needs a live loop to hand off to
    let fanout = Arc::new(FanoutSender::new(telegram, config.recipients.clone()));
    let (bridge, delivery) = bridge::channel(fanout);
    let delivery_task = tokio::spawn(delivery.run());

    // Blocking bus subscription on its own thread
    let registry = ChannelRegistry::from_config(&config.bus);
    let _subscriber =
        subscriber::spawn_subscriber(config.bus.clone(), registry, Arc::new(bridge))?;

    tracing::info!(
        recipients = config.recipients.len(),
        registration_channel = %config.bus.registration_channel,
        application_channel = %config.bus.application_channel,
        "Bot started and ready"
    );

    tokio::select! {
        _ = commands::run(bot) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping...");
        }
    }

    // The subscriber thread blocks on the socket and exits with the process.
    delivery_task.abort();

    tracing::info!("Admin relay bot stopped.");
    Ok(())
}

/// Plain text logs by default, JSON lines with `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
