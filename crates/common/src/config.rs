use crate::error::RelayError;
use crate::types::{ChatId, Recipients};

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub bus: BusConfig,

    /// Administrator chat ids (never empty)
    pub recipients: Recipients,
}

/// Outbound chat API settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot API credential
    pub bot_token: String,

    /// Bot API base URL (default: https://api.telegram.org)
    pub api_url: String,

    /// Per-request timeout for outbound sends in seconds (default: 10)
    pub timeout_secs: u64,
}

/// Pub/sub bus settings.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,

    /// Channel carrying user registrations (default: user_registered)
    pub registration_channel: String,

    /// Channel carrying loan applications (default: application_submitted)
    pub application_channel: String,
}

impl BusConfig {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

impl AppConfig {
    /// Load configuration from `.env` and the process environment.
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                RelayError::Config("BOT_TOKEN environment variable is required".to_string())
            })?;

        let recipients = parse_chat_ids(lookup("ADMIN_CHAT_IDS").as_deref())?;

        let bus = BusConfig {
            host: lookup("REDIS_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_or(&lookup, "REDIS_PORT", 6379)?,
            db: parse_or(&lookup, "REDIS_DB", 0)?,
            registration_channel: lookup("REDIS_REGISTRATION_CHANNEL")
                .unwrap_or_else(|| "user_registered".to_string()),
            application_channel: lookup("REDIS_APPLICATION_CHANNEL")
                .unwrap_or_else(|| "application_submitted".to_string()),
        };

        if bus.registration_channel == bus.application_channel {
            return Err(RelayError::Config(format!(
                "REDIS_REGISTRATION_CHANNEL and REDIS_APPLICATION_CHANNEL must differ (both are '{}')",
                bus.registration_channel
            )));
        }

        let telegram = TelegramConfig {
            bot_token,
            api_url: lookup("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: parse_or(&lookup, "TELEGRAM_TIMEOUT_SECS", 10)?,
        };

        Ok(Self {
            telegram,
            bus,
            recipients,
        })
    }
}

/// Parse `ADMIN_CHAT_IDS`, a JSON array such as `[12345, 67890]`.
fn parse_chat_ids(raw: Option<&str>) -> Result<Recipients, RelayError> {
    let raw = raw.filter(|r| !r.trim().is_empty()).ok_or_else(|| {
        RelayError::Config("ADMIN_CHAT_IDS environment variable is required".to_string())
    })?;

    let ids: Vec<ChatId> = serde_json::from_str(raw).map_err(|e| {
        RelayError::Config(format!(
            "ADMIN_CHAT_IDS must be a JSON array of integers, e.g. [12345, 67890]: {}",
            e
        ))
    })?;

    if ids.is_empty() {
        return Err(RelayError::Config(
            "ADMIN_CHAT_IDS must contain at least one chat id".to_string(),
        ));
    }

    Ok(Recipients::new(ids))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, RelayError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| RelayError::Config(format!("{} has an invalid value: '{}'", key, value))),
        None => Ok(default),
    }
}
