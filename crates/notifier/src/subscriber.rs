//! Event subscriber: the blocking bus loop.
//!
//! Runs on its own OS thread and is the only user of its bus connection.
//! Every inbound message is decoded, classified by channel and formatted,
//! then handed to the async side through a [`Handoff`]. Problems with a
//! single message are logged and skipped; only a dead connection ends the
//! loop. There is no reconnection: messages published while the subscriber
//! is down are lost.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use relay_common::config::BusConfig;
use relay_common::error::RelayError;
use relay_common::redis_client;
use relay_common::types::{ChannelKind, Notification};
use tracing::{error, info, warn};

use crate::bridge::Handoff;
use crate::formatter;

/// Pause after a recoverable read error so a misbehaving stream cannot spin.
const READ_ERROR_PAUSE: Duration = Duration::from_millis(200);

/// A payload published on a bus channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Blocking source of bus messages.
pub trait EventBus {
    /// Block until the next message arrives.
    fn next_message(&mut self) -> Result<BusMessage, RelayError>;
}

/// Redis pub/sub implementation of [`EventBus`].
///
/// Borrows the connection for its whole life: dropping the underlying
/// `PubSub` unsubscribes.
pub struct RedisBus<'a> {
    pubsub: redis::PubSub<'a>,
}

impl<'a> RedisBus<'a> {
    /// Subscribe `connection` to `channels`.
    pub fn subscribe(
        connection: &'a mut redis::Connection,
        channels: &[&str],
    ) -> Result<Self, RelayError> {
        let mut pubsub = connection.as_pubsub();
        for channel in channels {
            pubsub.subscribe(*channel)?;
        }
        info!(channels = ?channels, "Subscribed to Redis channels");
        Ok(Self { pubsub })
    }
}

impl EventBus for RedisBus<'_> {
    fn next_message(&mut self) -> Result<BusMessage, RelayError> {
        // Subscription confirmations are consumed by redis-rs itself.
        let msg = self.pubsub.get_message()?;
        Ok(BusMessage {
            channel: msg.get_channel_name().to_string(),
            payload: msg.get_payload_bytes().to_vec(),
        })
    }
}

/// Maps bus channel names to event kinds.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, ChannelKind>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The two channels named in the bus configuration.
    pub fn from_config(config: &BusConfig) -> Self {
        Self::new()
            .with(&config.registration_channel, ChannelKind::Registration)
            .with(&config.application_channel, ChannelKind::Application)
    }

    pub fn with(mut self, channel: &str, kind: ChannelKind) -> Self {
        self.channels.insert(channel.to_string(), kind);
        self
    }

    pub fn kind_of(&self, channel: &str) -> Option<ChannelKind> {
        self.channels.get(channel).copied()
    }

    /// Registered channel names, sorted for stable subscription order.
    pub fn channel_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The subscription loop.
pub struct Subscriber<B: EventBus> {
    bus: B,
    registry: ChannelRegistry,
    handoff: Arc<dyn Handoff>,
}

impl<B: EventBus> Subscriber<B> {
    pub fn new(bus: B, registry: ChannelRegistry, handoff: Arc<dyn Handoff>) -> Self {
        Self {
            bus,
            registry,
            handoff,
        }
    }

    /// Turn one bus message into a notification.
    ///
    /// The channel is resolved before the payload is decoded, so messages on
    /// unregistered channels are rejected without being parsed.
    pub fn process(&self, message: &BusMessage) -> Result<Notification, RelayError> {
        let kind = self
            .registry
            .kind_of(&message.channel)
            .ok_or_else(|| RelayError::UnknownChannel(message.channel.clone()))?;

        let data: serde_json::Value = serde_json::from_slice(&message.payload)?;
        info!(channel = %message.channel, kind = %kind, "Received event from bus");

        let text = formatter::format_notification(kind, &data);
        Ok(Notification::new(kind, text))
    }

    /// Receive until the bus connection dies.
    pub fn run(mut self) {
        info!("Subscriber loop started");

        loop {
            let message = match self.bus.next_message() {
                Ok(message) => message,
                Err(e) if e.is_fatal_for_subscriber() => {
                    error!(error = %e, "Bus connection lost, subscriber stopping");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read message from bus");
                    std::thread::sleep(READ_ERROR_PAUSE);
                    continue;
                }
            };

            match self.process(&message) {
                Ok(notification) => self.handoff.handoff(notification),
                Err(RelayError::UnknownChannel(channel)) => {
                    warn!(channel = %channel, "Message on unregistered channel dropped");
                }
                Err(RelayError::Decode(e)) => {
                    error!(error = %e, "Failed to decode JSON payload from bus");
                }
                Err(e) => {
                    error!(error = %e, "Failed to process bus message");
                }
            }
        }

        info!("Subscriber loop stopped");
    }
}

/// Start the subscriber on a dedicated thread, connecting to Redis first.
///
/// A failed connection is logged and ends the thread; the rest of the
/// process keeps running without events.
pub fn spawn_subscriber(
    config: BusConfig,
    registry: ChannelRegistry,
    handoff: Arc<dyn Handoff>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("bus-subscriber".to_string())
        .spawn(move || {
            let mut connection = match redis_client::open_connection(&config.redis_url()) {
                Ok(connection) => connection,
                Err(e) => {
                    log_connect_failure(&config, &RelayError::from(e));
                    return;
                }
            };
            let bus = match RedisBus::subscribe(&mut connection, &registry.channel_names()) {
                Ok(bus) => bus,
                Err(e) => {
                    log_connect_failure(&config, &e);
                    return;
                }
            };
            info!(host = %config.host, port = config.port, "Listening for bus events");
            Subscriber::new(bus, registry, handoff).run();
        })
}

fn log_connect_failure(config: &BusConfig, e: &RelayError) {
    error!(
        host = %config.host,
        port = config.port,
        error = %e,
        "Failed to connect to Redis, no events will be relayed"
    );
}

/// Start the subscriber on a dedicated thread with an already-connected bus.
pub fn spawn_with_bus<B>(
    bus: B,
    registry: ChannelRegistry,
    handoff: Arc<dyn Handoff>,
) -> std::io::Result<JoinHandle<()>>
where
    B: EventBus + Send + 'static,
{
    std::thread::Builder::new()
        .name("bus-subscriber".to_string())
        .spawn(move || Subscriber::new(bus, registry, handoff).run())
}
