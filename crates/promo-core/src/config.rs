//! Promobot configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PromoError, Result};
use crate::types::StatsMode;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

fn default_database_path() -> String { "~/.promobot/promote.db".into() }

impl Default for PromoConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            scheduler: SchedulerConfig::default(),
            render: RenderConfig::default(),
            commands: CommandsConfig::default(),
            channel: ChannelConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl PromoConfig {
    /// Load config from `$PROMOBOT_CONFIG` or the default path
    /// (~/.promobot/config.toml). Missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("PROMOBOT_CONFIG")
            .map(|p| PathBuf::from(shellexpand::tilde(&p).to_string()))
            .unwrap_or_else(|_| Self::default_path());
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PromoError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PromoError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(PromoError::Config("scheduler.tick_interval_secs must be > 0".into()));
        }
        if self.scheduler.delivery_timeout_secs == 0 {
            return Err(PromoError::Config("scheduler.delivery_timeout_secs must be > 0".into()));
        }
        if self.catalog.batch_size == 0 {
            return Err(PromoError::Config("catalog.batch_size must be > 0".into()));
        }
        if self.render.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(PromoError::Config("render.utc_offset_minutes out of range".into()));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Promobot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".promobot")
    }

    /// Database path with `~` expanded.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database_path).to_string())
    }
}

/// Scheduler and dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// How often the dispatch cycle fires.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Minimum age of the last successful promotion before a group is due again.
    #[serde(default = "default_promote_interval")]
    pub promote_interval_secs: u64,
    /// Upper bound on a single delivery call.
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
    #[serde(default)]
    pub accumulate_daily_stats: bool,
    /// Wait after a failed attempt before the group is tried again.
    /// Zero retries on the next tick.
    #[serde(default)]
    pub failure_backoff_secs: u64,
}

fn bool_true() -> bool { true }
fn default_tick_interval() -> u64 { 600 }
fn default_promote_interval() -> u64 { 4 * 60 * 60 }
fn default_delivery_timeout() -> u64 { 30 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: default_tick_interval(),
            promote_interval_secs: default_promote_interval(),
            delivery_timeout_secs: default_delivery_timeout(),
            accumulate_daily_stats: false,
            failure_backoff_secs: 0,
        }
    }
}

impl SchedulerConfig {
    pub fn stats_mode(&self) -> StatsMode {
        if self.accumulate_daily_stats {
            StatsMode::Accumulate
        } else {
            StatsMode::Replace
        }
    }
}

/// Day/month naming used by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locale {
    #[default]
    Indonesian,
    English,
}

/// Placeholder rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub locale: Locale,
    /// Offset applied to wall-clock values and the stats date (WIB by default).
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

fn default_utc_offset() -> i32 { 7 * 60 }

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            utc_offset_minutes: default_utc_offset(),
        }
    }
}

impl RenderConfig {
    pub fn offset(&self) -> chrono::FixedOffset {
        use chrono::Offset;
        chrono::FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| chrono::Utc.fix())
    }
}

/// Command surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Sender identities allowed to run administrative commands.
    #[serde(default)]
    pub admins: Vec<String>,
}

fn default_prefix() -> String { ".".into() }

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            admins: vec![],
        }
    }
}

/// Which transport delivers promotions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Whatsapp,
    Webhook,
    /// Dry run: log the message instead of sending it.
    Log,
}

/// Delivery transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    #[serde(default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub whatsapp: WhatsAppChannelConfig,
    #[serde(default)]
    pub webhook: WebhookChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppChannelConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default = "default_graph_api_base")]
    pub api_base: String,
}

fn default_graph_api_base() -> String { "https://graph.facebook.com/v21.0".into() }

impl Default for WhatsAppChannelConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            api_base: default_graph_api_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookChannelConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

/// External product catalog used by `fetch-products`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    /// Products per generated template.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_catalog_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_catalog_category")]
    pub category: String,
}

fn default_batch_size() -> usize { 15 }
fn default_catalog_timeout() -> u64 { 30 }
fn default_catalog_category() -> String { "produk_api_group".into() }

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            batch_size: default_batch_size(),
            timeout_secs: default_catalog_timeout(),
            category: default_catalog_category(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PromoConfig::default();
        assert_eq!(config.scheduler.promote_interval_secs, 14_400);
        assert_eq!(config.scheduler.delivery_timeout_secs, 30);
        assert_eq!(config.catalog.batch_size, 15);
        assert_eq!(config.commands.prefix, ".");
        assert_eq!(config.channel.kind, ChannelKind::Whatsapp);
        assert_eq!(config.scheduler.stats_mode(), StatsMode::Replace);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            database_path = "/tmp/promo.db"

            [scheduler]
            tick_interval_secs = 60
            accumulate_daily_stats = true

            [render]
            locale = "english"
            utc_offset_minutes = 0

            [commands]
            admins = ["6281234567890"]

            [channel]
            kind = "log"
        "#;

        let config: PromoConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert_eq!(config.scheduler.promote_interval_secs, 14_400);
        assert_eq!(config.scheduler.stats_mode(), StatsMode::Accumulate);
        assert_eq!(config.render.locale, Locale::English);
        assert_eq!(config.commands.admins, vec!["6281234567890".to_string()]);
        assert_eq!(config.channel.kind, ChannelKind::Log);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/promo.db"));
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: PromoConfig = toml::from_str("").unwrap();
        assert_eq!(config.render.utc_offset_minutes, 420);
        assert_eq!(config.render.offset().local_minus_utc(), 7 * 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let mut config = PromoConfig::default();
        config.scheduler.tick_interval_secs = 0;
        assert!(matches!(config.validate(), Err(PromoError::Config(_))));
    }

    #[test]
    fn test_home_dir() {
        let home = PromoConfig::home_dir();
        assert!(home.to_string_lossy().contains("promobot"));
    }
}
