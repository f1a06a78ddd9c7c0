/// Feed client settings
///
/// Loaded from YAML (keys matched case-insensitively), optionally overridden from
/// the environment, and validated eagerly before any network activity.

use crate::control_plane::PackageCredentials;
use crate::decoder::Decoder;
use crate::distribution::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::error::ConfigError;
use crate::flow::Flow;
use crate::transport::ConnectOptions;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "ODDS_FEED_CONFIG";
pub const USERNAME_ENV: &str = "ODDS_FEED_USERNAME";
pub const PASSWORD_ENV: &str = "ODDS_FEED_PASSWORD";

const DEFAULT_PREFETCH_COUNT: u16 = 100;
const DEFAULT_HEARTBEAT_SECONDS: u32 = 30;
const DEFAULT_RECOVERY_INTERVAL_SECONDS: u32 = 30;

/// Broker connection settings for one package (one flow)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub virtual_host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub package_id: i64,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    #[serde(default = "default_heartbeat_seconds")]
    pub requested_heartbeat_seconds: u32,
    #[serde(default = "default_recovery_interval_seconds")]
    pub network_recovery_interval_seconds: u32,
    #[serde(default)]
    pub auto_ack: bool,
}

fn default_prefetch_count() -> u16 {
    DEFAULT_PREFETCH_COUNT
}

fn default_heartbeat_seconds() -> u32 {
    DEFAULT_HEARTBEAT_SECONDS
}

fn default_recovery_interval_seconds() -> u32 {
    DEFAULT_RECOVERY_INTERVAL_SECONDS
}

impl PackageSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_text("Host", &self.host)?;
        require_positive("Port", self.port as i64)?;
        require_text("VirtualHost", &self.virtual_host)?;
        require_text("UserName", &self.username)?;
        require_text("Password", &self.password)?;
        require_positive("PackageId", self.package_id)?;
        require_positive("PrefetchCount", self.prefetch_count as i64)?;
        require_positive("RequestedHeartbeatSeconds", self.requested_heartbeat_seconds as i64)?;
        require_positive(
            "NetworkRecoveryIntervalSeconds",
            self.network_recovery_interval_seconds as i64,
        )?;
        Ok(())
    }

    /// Queue the upstream provisions for this package
    pub fn queue_name(&self) -> String {
        format!("_{}_", self.package_id)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.host.clone(),
            port: self.port,
            virtual_host: self.virtual_host.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            queue: self.queue_name(),
            prefetch_count: self.prefetch_count,
            heartbeat: Duration::from_secs(self.requested_heartbeat_seconds as u64),
            recovery_interval: Duration::from_secs(self.network_recovery_interval_seconds as u64),
            auto_ack: self.auto_ack,
        }
    }

    pub fn credentials(&self) -> PackageCredentials {
        PackageCredentials {
            package_id: self.package_id,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Customers (control-plane) API settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomersApiSettings {
    #[serde(default)]
    pub base_url: String,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl CustomersApiSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_text("CustomersApi.BaseUrl", &self.base_url)?;
        reqwest::Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl {
            field: "CustomersApi.BaseUrl",
            value: self.base_url.clone(),
        })?;
        if let Some(attempts) = self.max_attempts {
            require_positive("CustomersApi.MaxAttempts", attempts as i64)?;
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            retry_delay: self
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RETRY_DELAY),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct FeedSettings {
    pub in_play: Option<PackageSettings>,
    pub pre_match: Option<PackageSettings>,
    pub customers_api: Option<CustomersApiSettings>,
}

impl FeedSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.in_play.is_none() && self.pre_match.is_none() {
            return Err(ConfigError::Required {
                field: "InPlay or PreMatch settings",
            });
        }
        for package in self.in_play.iter().chain(self.pre_match.iter()) {
            package.validate()?;
        }
        if let Some(api) = &self.customers_api {
            api.validate()?;
        }
        Ok(())
    }

    pub fn package(&self, flow: Flow) -> Result<&PackageSettings, ConfigError> {
        let package = match flow {
            Flow::InPlay => self.in_play.as_ref(),
            Flow::PreMatch => self.pre_match.as_ref(),
        };
        package.ok_or(ConfigError::FlowNotConfigured(flow))
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let settings = Self::parse_yaml(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    fn parse_yaml(contents: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_yaml::from_str(contents).map_err(|e| ConfigError::Load(e.to_string()))?;
        Decoder::decode_value(value).map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&contents)
    }

    /// Load the YAML file named by `ODDS_FEED_CONFIG`, then apply credential
    /// overrides from `ODDS_FEED_USERNAME` / `ODDS_FEED_PASSWORD`.
    pub fn from_env_or_yaml() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).map_err(|_| ConfigError::Required {
            field: CONFIG_PATH_ENV,
        })?;
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Load(format!("read {}: {}", path, e)))?;
        let mut settings = Self::parse_yaml(&contents)?;

        let username = std::env::var(USERNAME_ENV).ok();
        let password = std::env::var(PASSWORD_ENV).ok();
        for package in settings.in_play.iter_mut().chain(settings.pre_match.iter_mut()) {
            if let Some(value) = &username {
                package.username = value.clone();
            }
            if let Some(value) = &password {
                package.password = value.clone();
            }
        }

        settings.validate()?;
        Ok(settings)
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Required { field })
    } else {
        Ok(())
    }
}

fn require_positive(field: &'static str, value: i64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field })
    }
}
