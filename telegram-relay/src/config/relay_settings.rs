//! Relay settings: source/targets, admin, backlog strategy and retry policy. Loaded from env.

use anyhow::{bail, Context, Result};
use relay_engine::{BacklogConfig, BacklogStrategy, RetryPolicy};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// A chat as written in configuration: numeric id or public `@username`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    Id(i64),
    Username(String),
}

impl FromStr for ChatRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty chat reference");
        }
        if let Ok(id) = s.parse::<i64>() {
            return Ok(Self::Id(id));
        }
        let name = s.strip_prefix('@').unwrap_or(s);
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("invalid chat reference '{}': expected a numeric id or @username", s);
        }
        Ok(Self::Username(format!("@{}", name)))
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Username(name) => f.write_str(name),
        }
    }
}

/// Relay-specific settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// SOURCE_CHAT
    pub source_chat: ChatRef,
    /// TARGET_CHATS (comma separated)
    pub target_chats: Vec<ChatRef>,
    /// ADMIN_ID: user allowed to run /scan and /status; receives the startup notice
    pub admin_id: Option<i64>,
    /// BACKLOG_STRATEGY, BACKLOG_SOURCE_WINDOW, BACKLOG_TARGET_WINDOW
    pub backlog: BacklogConfig,
    /// RETRY_* variables
    pub retry: RetryPolicy,
    /// RELAY_WORKERS: number of ordered event lanes
    pub workers: usize,
    /// HISTORY_EXPORT_DIR: directory of `<chat_id>.json` history exports
    pub history_export_dir: Option<PathBuf>,
}

impl RelaySettings {
    pub fn from_env() -> Result<Self> {
        let source_chat = env::var("SOURCE_CHAT")
            .context("SOURCE_CHAT not set")?
            .parse::<ChatRef>()
            .context("SOURCE_CHAT")?;
        let target_chats = parse_chat_list(
            &env::var("TARGET_CHATS").context("TARGET_CHATS not set")?,
        )
        .context("TARGET_CHATS")?;
        let admin_id = match env::var("ADMIN_ID") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse::<i64>().context("ADMIN_ID must be a numeric user id")?)
            }
            _ => None,
        };

        let defaults = BacklogConfig::default();
        let strategy = match env::var("BACKLOG_STRATEGY") {
            Ok(raw) => raw
                .parse::<BacklogStrategy>()
                .map_err(|e| anyhow::anyhow!("BACKLOG_STRATEGY: {}", e))?,
            Err(_) => defaults.strategy,
        };
        let backlog = BacklogConfig {
            strategy,
            source_window: env_parse("BACKLOG_SOURCE_WINDOW", defaults.source_window)?,
            target_window: env_parse("BACKLOG_TARGET_WINDOW", defaults.target_window)?,
        };

        let policy = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: env_parse("RETRY_MAX_RETRIES", policy.max_retries)?,
            base_delay: env_millis("RETRY_BASE_DELAY_MS", policy.base_delay)?,
            max_delay: env_millis("RETRY_MAX_DELAY_MS", policy.max_delay)?,
            exponential: env_parse("RETRY_EXPONENTIAL", policy.exponential)?,
            max_rate_limit_waits: env_parse("RETRY_MAX_RATE_LIMIT_WAITS", policy.max_rate_limit_waits)?,
            max_redeliveries: env_parse("RETRY_MAX_REDELIVERIES", policy.max_redeliveries)?,
            redelivery_delay: env_millis("RETRY_REDELIVERY_DELAY_MS", policy.redelivery_delay)?,
        };

        Ok(Self {
            source_chat,
            target_chats,
            admin_id,
            backlog,
            retry,
            workers: env_parse("RELAY_WORKERS", 4)?,
            history_export_dir: env::var("HISTORY_EXPORT_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_chats.is_empty() {
            bail!("TARGET_CHATS must name at least one chat");
        }
        if self.target_chats.contains(&self.source_chat) {
            bail!("SOURCE_CHAT {} is also listed in TARGET_CHATS", self.source_chat);
        }
        for (i, chat) in self.target_chats.iter().enumerate() {
            if self.target_chats[..i].contains(chat) {
                bail!("TARGET_CHATS lists {} more than once", chat);
            }
        }
        if self.backlog.source_window == 0 || self.backlog.target_window == 0 {
            bail!("BACKLOG_SOURCE_WINDOW and BACKLOG_TARGET_WINDOW must be positive");
        }
        if self.workers == 0 {
            bail!("RELAY_WORKERS must be positive");
        }
        if self.retry.base_delay > self.retry.max_delay {
            bail!("RETRY_BASE_DELAY_MS must not exceed RETRY_MAX_DELAY_MS");
        }
        Ok(())
    }
}

/// Comma-separated chat refs; blank entries are skipped.
pub fn parse_chat_list(raw: &str) -> Result<Vec<ChatRef>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<ChatRef>)
        .collect()
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}: invalid value '{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    env_parse(key, default_ms).map(Duration::from_millis)
}
