//! RelayConfig: BaseConfig + RelaySettings. Use load() for env-based loading.

use anyhow::Result;
use relay_engine::{BacklogConfig, RetryPolicy};

use super::{BaseConfig, ChatRef, RelaySettings};

/// Relay config: BaseConfig + relay settings. Use RelayConfig::load() for env-based loading.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub base: BaseConfig,
    pub relay: RelaySettings,
}

impl RelayConfig {
    /// Load full config from environment variables. If `token` is provided it overrides BOT_TOKEN.
    /// Call validate() after load to check config before init.
    pub fn load(token: Option<String>) -> Result<Self> {
        let base = BaseConfig::load(token)?;
        let relay = RelaySettings::from_env()?;
        Ok(Self { base, relay })
    }

    /// Validate config. Call after load() to fail fast before init.
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        self.relay.validate()
    }

    pub fn base(&self) -> &BaseConfig {
        &self.base
    }
    pub fn relay(&self) -> &RelaySettings {
        &self.relay
    }

    pub fn bot_token(&self) -> &str {
        &self.base.bot_token
    }
    pub fn database_url(&self) -> &str {
        &self.base.database_url
    }
    pub fn log_file(&self) -> &str {
        &self.base.log_file
    }
    pub fn telegram_api_url(&self) -> Option<&str> {
        self.base.telegram_api_url.as_deref()
    }

    pub fn source_chat(&self) -> &ChatRef {
        &self.relay.source_chat
    }
    pub fn target_chats(&self) -> &[ChatRef] {
        &self.relay.target_chats
    }
    pub fn admin_id(&self) -> Option<i64> {
        self.relay.admin_id
    }
    pub fn backlog(&self) -> &BacklogConfig {
        &self.relay.backlog
    }
    pub fn retry(&self) -> &RetryPolicy {
        &self.relay.retry
    }
    pub fn workers(&self) -> usize {
        self.relay.workers
    }
}
