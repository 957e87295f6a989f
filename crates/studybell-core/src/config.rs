//! Studybell configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StudybellError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudybellConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl StudybellConfig {
    /// Load config from the default path (~/.studybell/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default().with_env_overrides())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StudybellError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| StudybellError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config.with_env_overrides())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StudybellError::Config(format!("Failed to create config dir: {e}")))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| StudybellError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)
            .map_err(|e| StudybellError::Config(format!("Failed to write config: {e}")))?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the studybell home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".studybell")
    }

    /// Secrets come from the environment when set, overriding file values.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var("STUDYBELL_CRON_SECRET") {
            self.schedule.cron_secret = secret;
        }
        if let Ok(pass) = std::env::var("STUDYBELL_SMTP_PASSWORD") {
            self.mail.password = pass;
        }
        self
    }
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "~/.studybell/studybell.db".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Identity provider (token → user id/email) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the identity service, e.g. "https://xyz.supabase.co".
    #[serde(default)]
    pub base_url: String,
    /// Project API key sent alongside the user's bearer token.
    #[serde(default)]
    pub api_key: String,
}

/// SMTP relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default)]
    pub from_address: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_from_name() -> String {
    "Study Blocks".into()
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from_name: default_from_name(),
            from_address: String::new(),
        }
    }
}

/// Scheduling and dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Timezone used to interpret wall-clock creation input (date + HH:MM).
    #[serde(default = "default_tz")]
    pub timezone: chrono_tz::Tz,
    /// Timezone used to format start times in reminder emails.
    #[serde(default = "default_tz")]
    pub display_timezone: chrono_tz::Tz,
    /// Built-in dispatcher poll interval in seconds. 0 disables the loop;
    /// the /check-notifications route is then the only trigger.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Shared secret required to trigger the dispatcher over HTTP.
    #[serde(default)]
    pub cron_secret: String,
}

fn default_tz() -> chrono_tz::Tz {
    chrono_tz::Tz::UTC
}
fn default_poll_interval() -> u64 {
    60
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_tz(),
            display_timezone: default_tz(),
            poll_interval_secs: default_poll_interval(),
            cron_secret: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let cfg: StudybellConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.gateway.port, 8080);
        assert_eq!(cfg.mail.smtp_port, 587);
        assert_eq!(cfg.schedule.poll_interval_secs, 60);
        assert_eq!(cfg.schedule.timezone, chrono_tz::Tz::UTC);
    }

    #[test]
    fn parses_timezones_by_name() {
        let cfg: StudybellConfig = toml::from_str(
            "[schedule]\ntimezone = \"Asia/Kolkata\"\ndisplay_timezone = \"America/New_York\"\n",
        )
        .unwrap();
        assert_eq!(cfg.schedule.timezone, chrono_tz::Tz::Asia__Kolkata);
        assert_eq!(cfg.schedule.display_timezone, chrono_tz::Tz::America__New_York);
    }

    #[test]
    fn roundtrips_through_toml() {
        let cfg = StudybellConfig::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let back: StudybellConfig = toml::from_str(&s).unwrap();
        assert_eq!(back.database.path, cfg.database.path);
        assert_eq!(back.schedule.timezone, cfg.schedule.timezone);
    }
}
