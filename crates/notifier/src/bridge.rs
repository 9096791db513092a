//! Dispatch bridge, the one crossing point from the blocking subscriber
//! thread into the async runtime.
//!
//! [`DispatchBridge::handoff`] pushes onto an unbounded tokio channel, which
//! never blocks and wakes the [`DeliveryLoop`] on the runtime. The loop spawns
//! an independent task per notification, so a slow fan-out never holds up the
//! next one.

use std::sync::Arc;

use relay_common::error::RelayError;
use relay_common::types::Notification;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::fanout::FanoutSender;

/// Accepts finished notifications from a non-async context.
pub trait Handoff: Send + Sync {
    /// Schedule delivery and return immediately. Never blocks, never panics.
    fn handoff(&self, notification: Notification);
}

/// Create a connected bridge / delivery loop pair.
pub fn channel(fanout: Arc<FanoutSender>) -> (DispatchBridge, DeliveryLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DispatchBridge { tx }, DeliveryLoop { rx, fanout })
}

/// Sending half, safe to use from any thread.
#[derive(Debug, Clone)]
pub struct DispatchBridge {
    tx: mpsc::UnboundedSender<Notification>,
}

impl DispatchBridge {
    /// Schedule delivery, reporting whether the delivery loop is still running.
    pub fn try_handoff(&self, notification: Notification) -> Result<(), RelayError> {
        let id = notification.id;
        self.tx.send(notification).map_err(|_| {
            RelayError::Dispatch(format!(
                "delivery loop is not running, notification {} dropped",
                id
            ))
        })?;
        debug!(notification_id = %id, "Notification handed off for delivery");
        Ok(())
    }
}

impl Handoff for DispatchBridge {
    fn handoff(&self, notification: Notification) {
        if let Err(e) = self.try_handoff(notification) {
            error!(error = %e, "Failed to schedule notification delivery");
        }
    }
}

/// Receiving half, runs on the async runtime.
pub struct DeliveryLoop {
    rx: mpsc::UnboundedReceiver<Notification>,
    fanout: Arc<FanoutSender>,
}

impl DeliveryLoop {
    /// Spawn a fan-out task for every notification until all bridges are dropped.
    ///
    /// Returns the number of notifications scheduled. In-flight fan-outs are
    /// awaited before returning.
    pub async fn run(mut self) -> usize {
        info!(
            recipients = self.fanout.recipients().len(),
            "Delivery loop started"
        );

        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        let mut scheduled = 0usize;

        while let Some(notification) = self.rx.recv().await {
            let fanout = self.fanout.clone();
            in_flight.retain(|handle| !handle.is_finished());
            in_flight.push(tokio::spawn(async move {
                fanout.deliver(&notification).await;
            }));
            scheduled += 1;
        }

        for handle in in_flight {
            if let Err(e) = handle.await {
                error!(error = %e, "Delivery task panicked");
            }
        }

        info!(scheduled, "Delivery loop stopped");
        scheduled
    }
}
