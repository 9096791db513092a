use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Chat identifier understood by the outbound chat API.
pub type ChatId = i64;

/// Kind of domain event carried by a bus channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// A new user registered.
    Registration,
    /// A loan application was submitted.
    Application,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Registration => write!(f, "registration"),
            ChannelKind::Application => write!(f, "application"),
        }
    }
}

/// Administrator chat ids that receive every notification.
///
/// Loaded once at startup and never mutated afterwards; clones share the
/// same backing slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipients(Arc<[ChatId]>);

impl Recipients {
    pub fn new(ids: impl Into<Vec<ChatId>>) -> Self {
        Self(Arc::from(ids.into()))
    }

    pub fn as_slice(&self) -> &[ChatId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChatId> + '_ {
        self.0.iter().copied()
    }
}

/// A fully rendered notification ready for fan-out.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Correlates the log lines of one fan-out.
    pub id: Uuid,
    pub kind: ChannelKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: ChannelKind, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            text,
            created_at: Utc::now(),
        }
    }
}

/// Result of a single delivery attempt to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Per-recipient outcomes of one notification, in recipient order.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub notification_id: Uuid,
    pub outcomes: Vec<(ChatId, DeliveryOutcome)>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}
