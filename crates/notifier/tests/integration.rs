//! End-to-end tests for the relay pipeline: bus → subscriber thread →
//! bridge → delivery loop → fan-out.
//!
//! The live Redis test is ignored by default. Run it with:
//!
//! ```bash
//! REDIS_HOST=localhost REDIS_PORT=6379 \
//!   cargo test -p relay-notifier --test integration -- --ignored --nocapture
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use relay_common::config::BusConfig;
use relay_common::error::RelayError;
use relay_common::types::{ChatId, Recipients};
use relay_notifier::bridge::{self, Handoff};
use relay_notifier::fanout::FanoutSender;
use relay_notifier::sender::{ChatSender, OutgoingMessage};
use relay_notifier::subscriber::{self, BusMessage, ChannelRegistry, EventBus};

// ============================================================
// Shared helpers
// ============================================================

/// Replays scripted messages, then reports the bus as closed.
struct ScriptedBus {
    script: VecDeque<Result<BusMessage, RelayError>>,
}

impl EventBus for ScriptedBus {
    fn next_message(&mut self) -> Result<BusMessage, RelayError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(RelayError::BusClosed("script exhausted".to_string())))
    }
}

/// One recorded delivery attempt.
#[derive(Debug, Clone)]
struct Attempt {
    chat_id: ChatId,
    text: String,
    delivered: bool,
}

/// Fails for the configured chat ids and reports every attempt on a channel.
struct ReportingSender {
    failing: Vec<ChatId>,
    attempts: mpsc::UnboundedSender<Attempt>,
}

#[async_trait]
impl ChatSender for ReportingSender {
    async fn send_message(
        &self,
        chat_id: ChatId,
        message: &OutgoingMessage,
    ) -> Result<(), RelayError> {
        let delivered = !self.failing.contains(&chat_id);
        let _ = self.attempts.send(Attempt {
            chat_id,
            text: message.text.clone(),
            delivered,
        });
        if delivered {
            Ok(())
        } else {
            Err(RelayError::ChatApi {
                code: Some(403),
                description: "Forbidden: bot was blocked by the user".to_string(),
            })
        }
    }
}

fn published(channel: &str, payload: &str) -> Result<BusMessage, RelayError> {
    Ok(BusMessage {
        channel: channel.to_string(),
        payload: payload.as_bytes().to_vec(),
    })
}

fn registry() -> ChannelRegistry {
    ChannelRegistry::from_config(&bus_config())
}

fn bus_config() -> BusConfig {
    BusConfig {
        host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("REDIS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(6379),
        db: 0,
        registration_channel: "user_registered".to_string(),
        application_channel: "application_submitted".to_string(),
    }
}

/// Build the async side and return the bridge plus the attempt stream.
fn start_delivery(
    recipients: Vec<ChatId>,
    failing: Vec<ChatId>,
) -> (
    Arc<dyn Handoff>,
    mpsc::UnboundedReceiver<Attempt>,
    tokio::task::JoinHandle<usize>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = Arc::new(ReportingSender {
        failing,
        attempts: tx,
    });
    let fanout = Arc::new(FanoutSender::new(sender, Recipients::new(recipients)));
    let (bridge, delivery) = bridge::channel(fanout);
    let handle = tokio::spawn(delivery.run());
    (Arc::new(bridge), rx, handle)
}

async fn collect_attempts(rx: &mut mpsc::UnboundedReceiver<Attempt>, n: usize) -> Vec<Attempt> {
    let mut attempts = Vec::with_capacity(n);
    for _ in 0..n {
        let attempt = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a delivery attempt")
            .expect("attempt channel closed");
        attempts.push(attempt);
    }
    attempts
}

// ============================================================
// Pipeline
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_fans_out_with_isolated_failure() {
    let (handoff, mut attempts, _loop) = start_delivery(vec![100, 200, 300], vec![200]);

    let bus = ScriptedBus {
        script: VecDeque::from(vec![published(
            "user_registered",
            r#"{"name":"Ann","phone":"+1 (555) 000-1234"}"#,
        )]),
    };
    let worker = subscriber::spawn_with_bus(bus, registry(), handoff).unwrap();

    let mut seen = collect_attempts(&mut attempts, 3).await;
    seen.sort_by_key(|a| a.chat_id);

    assert_eq!(
        seen.iter().map(|a| a.chat_id).collect::<Vec<_>>(),
        vec![100, 200, 300]
    );
    assert_eq!(seen.iter().filter(|a| a.delivered).count(), 2);
    assert!(!seen[1].delivered);
    for attempt in &seen {
        assert!(attempt.text.contains("Ann"));
        assert!(attempt.text.contains("wa.me/15550001234"));
        assert!(attempt.text.contains("N/A"));
    }

    worker.join().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_survives_bad_messages() {
    let (handoff, mut attempts, delivery) = start_delivery(vec![1], vec![]);

    let bus = ScriptedBus {
        script: VecDeque::from(vec![
            published("user_registered", "definitely not json"),
            published("unknown_channel", r#"{"name":"Ghost"}"#),
            published("application_submitted", r#"{"name":"Boris","amount":5000}"#),
        ]),
    };
    subscriber::spawn_with_bus(bus, registry(), handoff)
        .unwrap()
        .join()
        .unwrap();

    let seen = collect_attempts(&mut attempts, 1).await;
    assert!(seen[0].text.contains("Boris"));
    assert!(!seen[0].text.contains("Ghost"));

    // The subscriber thread held the last bridge; the loop drains and stops.
    let scheduled = tokio::time::timeout(Duration::from_secs(5), delivery)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scheduled, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pipeline_with_no_recipients_sends_nothing() {
    let (handoff, mut attempts, delivery) = start_delivery(vec![], vec![]);

    let bus = ScriptedBus {
        script: VecDeque::from(vec![published("user_registered", r#"{"name":"Ann"}"#)]),
    };
    subscriber::spawn_with_bus(bus, registry(), handoff)
        .unwrap()
        .join()
        .unwrap();

    let scheduled = tokio::time::timeout(Duration::from_secs(5), delivery)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scheduled, 1);
    assert!(attempts.try_recv().is_err());
}

// ============================================================
// Live Redis
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn test_live_redis_registration() {
    let (handoff, mut attempts, _loop) = start_delivery(vec![11, 22], vec![]);
    let config = bus_config();
    let redis_url = config.redis_url();
    let _worker = subscriber::spawn_subscriber(config, registry(), handoff).unwrap();

    // Publish until the subscriber thread is listening.
    let publisher = tokio::task::spawn_blocking(move || {
        let client = redis::Client::open(redis_url).unwrap();
        let mut con = client.get_connection().unwrap();
        for _ in 0..50 {
            let receivers: i64 = redis::cmd("PUBLISH")
                .arg("user_registered")
                .arg(r#"{"name":"Live","surname":"Test","phone":"+7 900 000-00-00"}"#)
                .query(&mut con)
                .unwrap();
            if receivers > 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        panic!("subscriber never joined the channel");
    });
    publisher.await.unwrap();

    let seen = collect_attempts(&mut attempts, 2).await;
    assert!(seen.iter().all(|a| a.delivered));
    assert!(seen.iter().all(|a| a.text.contains("Live")));
    assert!(seen.iter().all(|a| a.text.contains("wa.me/79000000000")));
}
