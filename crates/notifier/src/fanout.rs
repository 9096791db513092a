//! Fan-out sender: one notification, every administrator, concurrently.
//!
//! Each recipient gets exactly one attempt. A failure for one recipient is
//! recorded in the report and never affects the others.

use std::sync::Arc;

use relay_common::types::{DeliveryOutcome, DeliveryReport, Notification, Recipients};
use tracing::{error, info, warn};

use crate::sender::{ChatSender, OutgoingMessage};

/// Delivers notifications to a fixed recipient set.
pub struct FanoutSender {
    sender: Arc<dyn ChatSender>,
    recipients: Recipients,
}

impl FanoutSender {
    pub fn new(sender: Arc<dyn ChatSender>, recipients: Recipients) -> Self {
        Self { sender, recipients }
    }

    pub fn recipients(&self) -> &Recipients {
        &self.recipients
    }

    /// Send `notification` to every recipient and wait for all attempts to settle.
    ///
    /// All sends are started together via `join_all`; the returned report has
    /// one outcome per recipient, in recipient order.
    pub async fn deliver(&self, notification: &Notification) -> DeliveryReport {
        if self.recipients.is_empty() {
            warn!(
                notification_id = %notification.id,
                "Recipient list is empty, notification not sent"
            );
            return DeliveryReport {
                notification_id: notification.id,
                outcomes: Vec::new(),
            };
        }

        let message = OutgoingMessage::html(notification.text.clone());

        let sends = self.recipients.iter().map(|chat_id| {
            let message = &message;
            async move {
                let outcome = match self.sender.send_message(chat_id, message).await {
                    Ok(()) => DeliveryOutcome::Delivered,
                    Err(e) => DeliveryOutcome::Failed(e.to_string()),
                };
                (chat_id, outcome)
            }
        });

        let outcomes = futures::future::join_all(sends).await;

        for (chat_id, outcome) in &outcomes {
            match outcome {
                DeliveryOutcome::Delivered => info!(
                    notification_id = %notification.id,
                    kind = %notification.kind,
                    chat_id,
                    "Notification delivered"
                ),
                DeliveryOutcome::Failed(reason) => error!(
                    notification_id = %notification.id,
                    kind = %notification.kind,
                    chat_id,
                    error = %reason,
                    "Failed to deliver notification"
                ),
            }
        }

        let report = DeliveryReport {
            notification_id: notification.id,
            outcomes,
        };

        info!(
            notification_id = %notification.id,
            total = report.outcomes.len(),
            delivered = report.delivered(),
            failed = report.failed(),
            latency_ms = (chrono::Utc::now() - notification.created_at).num_milliseconds(),
            "Fan-out complete"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_common::error::RelayError;
    use relay_common::types::{ChannelKind, ChatId};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// Records every call and fails for the configured chat ids.
    #[derive(Default)]
    struct FakeSender {
        failing: Vec<ChatId>,
        calls: Mutex<Vec<(ChatId, OutgoingMessage)>>,
    }

    impl FakeSender {
        fn failing(failing: Vec<ChatId>) -> Self {
            Self {
                failing,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(ChatId, OutgoingMessage)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatSender for FakeSender {
        async fn send_message(
            &self,
            chat_id: ChatId,
            message: &OutgoingMessage,
        ) -> Result<(), RelayError> {
            self.calls.lock().unwrap().push((chat_id, message.clone()));
            if self.failing.contains(&chat_id) {
                return Err(RelayError::ChatApi {
                    code: Some(400),
                    description: "Bad Request: chat not found".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Only completes once every recipient's send has started.
    struct BarrierSender {
        barrier: Barrier,
    }

    #[async_trait]
    impl ChatSender for BarrierSender {
        async fn send_message(&self, _: ChatId, _: &OutgoingMessage) -> Result<(), RelayError> {
            self.barrier.wait().await;
            Ok(())
        }
    }

    fn notification() -> Notification {
        Notification::new(ChannelKind::Registration, "<b>hello</b>".to_string())
    }

    #[tokio::test]
    async fn test_delivers_to_every_recipient() {
        let sender = Arc::new(FakeSender::default());
        let fanout = FanoutSender::new(sender.clone(), Recipients::new(vec![1, 2, 3]));

        let report = fanout.deliver(&notification()).await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.delivered(), 3);
        let mut chats: Vec<_> = sender.calls().into_iter().map(|(c, _)| c).collect();
        chats.sort();
        assert_eq!(chats, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_one_failure_is_isolated() {
        let sender = Arc::new(FakeSender::failing(vec![20]));
        let fanout = FanoutSender::new(sender.clone(), Recipients::new(vec![10, 20, 30, 40]));

        let report = fanout.deliver(&notification()).await;

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.delivered(), 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(sender.calls().len(), 4);

        let (chat_id, outcome) = &report.outcomes[1];
        assert_eq!(*chat_id, 20);
        assert!(
            matches!(outcome, DeliveryOutcome::Failed(reason) if reason.contains("chat not found"))
        );
    }

    #[tokio::test]
    async fn test_all_failures_still_report_every_recipient() {
        let sender = Arc::new(FakeSender::failing(vec![1, 2]));
        let fanout = FanoutSender::new(sender, Recipients::new(vec![1, 2]));

        let report = fanout.deliver(&notification()).await;
        assert_eq!(report.failed(), 2);
        assert_eq!(report.delivered(), 0);
    }

    #[tokio::test]
    async fn test_empty_recipients_is_noop() {
        let sender = Arc::new(FakeSender::default());
        let fanout = FanoutSender::new(sender.clone(), Recipients::new(Vec::new()));

        let report = fanout.deliver(&notification()).await;

        assert!(report.outcomes.is_empty());
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sends_disable_link_preview() {
        let sender = Arc::new(FakeSender::default());
        let fanout = FanoutSender::new(sender.clone(), Recipients::new(vec![7]));

        fanout.deliver(&notification()).await;

        let (_, message) = &sender.calls()[0];
        assert_eq!(message.text, "<b>hello</b>");
        assert!(message.disable_link_preview);
    }

    #[tokio::test]
    async fn test_sends_run_concurrently() {
        // Sequential sends would never get past the barrier.
        let sender = Arc::new(BarrierSender {
            barrier: Barrier::new(3),
        });
        let fanout = FanoutSender::new(sender, Recipients::new(vec![1, 2, 3]));

        let report =
            tokio::time::timeout(Duration::from_secs(2), fanout.deliver(&notification()))
                .await
                .expect("sends were not started concurrently");
        assert_eq!(report.delivered(), 3);
    }
}
