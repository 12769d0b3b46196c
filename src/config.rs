use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::fs;
use std::time::Duration;

use crate::constants;
use crate::error::ConfigError;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// "memory" or "kafka"
    pub backend: String,
    pub broker: String,
    pub topic: String,
    pub partitions: usize,
    pub publish_timeout_ms: u64,
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            broker: constants::log::DEFAULT_BROKER.to_string(),
            topic: constants::log::PRICE_TOPIC.to_string(),
            partitions: constants::log::DEFAULT_PARTITIONS,
            publish_timeout_ms: constants::log::PUBLISH_TIMEOUT_MS,
            security_protocol: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GroupsConfig {
    pub alert: String,
    pub persistence: String,
    pub daily_analytics: String,
    pub signal_analytics: String,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            alert: constants::groups::ALERT.to_string(),
            persistence: constants::groups::PERSISTENCE.to_string(),
            daily_analytics: constants::groups::DAILY_ANALYTICS.to_string(),
            signal_analytics: constants::groups::SIGNAL_ANALYTICS.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub interval_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            interval_secs: constants::fetcher::DEFAULT_INTERVAL_SECS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PriceSourceConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for PriceSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.alphavantage.co".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: constants::backoff::INITIAL_DELAY_MS,
            max_delay_ms: constants::backoff::MAX_DELAY_MS,
            multiplier: constants::backoff::MULTIPLIER,
            jitter: constants::backoff::JITTER,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub window_capacity: usize,
    pub short_window: usize,
    pub long_window: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window_capacity: constants::signal::WINDOW_CAPACITY,
            short_window: constants::signal::SHORT_WINDOW,
            long_window: constants::signal::LONG_WINDOW,
        }
    }
}

/// Watched symbol seeded into the store at startup.
#[derive(Clone, Debug, Deserialize)]
pub struct WatchEntry {
    pub user_id: u64,
    pub symbol: String,
    pub threshold_price: Decimal,
}

/// Pipeline workers a process can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Fetcher,
    Alert,
    Persistence,
    Daily,
    Signal,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Fetcher,
        Role::Alert,
        Role::Persistence,
        Role::Daily,
        Role::Signal,
    ];

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "fetcher" => Some(Role::Fetcher),
            "alert" => Some(Role::Alert),
            "persistence" => Some(Role::Persistence),
            "daily" => Some(Role::Daily),
            "signal" => Some(Role::Signal),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub roles: Vec<Role>,
    pub event_log: EventLogConfig,
    pub groups: GroupsConfig,
    pub fetcher: FetcherConfig,
    pub price_source: PriceSourceConfig,
    pub backoff: BackoffConfig,
    pub signal: SignalConfig,
    pub shutdown_grace_secs: u64,
    pub watchlist: Vec<WatchEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            roles: Role::ALL.to_vec(),
            event_log: EventLogConfig::default(),
            groups: GroupsConfig::default(),
            fetcher: FetcherConfig::default(),
            price_source: PriceSourceConfig::default(),
            backoff: BackoffConfig::default(),
            signal: SignalConfig::default(),
            shutdown_grace_secs: constants::shutdown::DEFAULT_GRACE_SECS,
            watchlist: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Reads `path` if present, applies environment overrides, validates.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_string(),
                    source,
                })
            }
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        Ok(serde_yaml::from_str(content)?)
    }

    /// Environment wins over the file for secrets and deployment knobs.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("KAFKA_BROKER") {
            self.event_log.broker = v;
        }
        if let Some(v) = lookup("EVENT_LOG_BACKEND") {
            self.event_log.backend = v;
        }
        if let Some(v) = lookup("KAFKA_SECURITY_PROTOCOL") {
            self.event_log.security_protocol = Some(v);
        }
        if let Some(v) = lookup("KAFKA_SASL_MECHANISM") {
            self.event_log.sasl_mechanism = Some(v);
        }
        if let Some(v) = lookup("KAFKA_SASL_USERNAME") {
            self.event_log.sasl_username = Some(v);
        }
        if let Some(v) = lookup("KAFKA_SASL_PASSWORD") {
            self.event_log.sasl_password = Some(v);
        }
        if let Some(v) = lookup("ALPHA_VANTAGE_API_KEY") {
            self.price_source.api_key = Some(v);
        }
        if let Some(v) = lookup("FETCH_INTERVAL_SECS") {
            self.fetcher.interval_secs = v.parse().map_err(|_| ConfigError::Invalid {
                field: "FETCH_INTERVAL_SECS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("PIPELINE_ROLES") {
            self.roles = v
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    Role::parse(s).ok_or_else(|| ConfigError::Invalid {
                        field: "PIPELINE_ROLES",
                        value: s.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roles.is_empty() {
            return Err(ConfigError::Missing("roles"));
        }
        if self.runs(Role::Fetcher)
            && self.price_source.api_key.as_deref().map_or(true, str::is_empty)
        {
            return Err(ConfigError::Missing("ALPHA_VANTAGE_API_KEY"));
        }
        if self.fetcher.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "fetcher.interval_secs",
                value: "0".to_string(),
            });
        }
        if !matches!(self.event_log.backend.as_str(), "memory" | "kafka") {
            return Err(ConfigError::Invalid {
                field: "event_log.backend",
                value: self.event_log.backend.clone(),
            });
        }
        let s = &self.signal;
        if s.short_window == 0 || s.short_window > s.long_window || s.long_window > s.window_capacity {
            return Err(ConfigError::Invalid {
                field: "signal",
                value: format!(
                    "short={} long={} capacity={}",
                    s.short_window, s.long_window, s.window_capacity
                ),
            });
        }
        let b = &self.backoff;
        if !b.multiplier.is_finite() || b.multiplier < 1.0 || !(0.0..=1.0).contains(&b.jitter) {
            return Err(ConfigError::Invalid {
                field: "backoff",
                value: format!("multiplier={} jitter={}", b.multiplier, b.jitter),
            });
        }
        if self.backoff.initial_delay_ms == 0 || self.backoff.max_delay_ms < self.backoff.initial_delay_ms {
            return Err(ConfigError::Invalid {
                field: "backoff",
                value: format!(
                    "initial={}ms max={}ms",
                    self.backoff.initial_delay_ms, self.backoff.max_delay_ms
                ),
            });
        }
        for entry in &self.watchlist {
            if entry.threshold_price <= Decimal::ZERO {
                return Err(ConfigError::Invalid {
                    field: "watchlist.threshold_price",
                    value: format!("{} {}", entry.symbol, entry.threshold_price),
                });
            }
        }
        let groups = [
            &self.groups.alert,
            &self.groups.persistence,
            &self.groups.daily_analytics,
            &self.groups.signal_analytics,
        ];
        for (i, g) in groups.iter().enumerate() {
            if groups[i + 1..].contains(g) {
                return Err(ConfigError::Invalid {
                    field: "groups",
                    value: format!("duplicate group id {}", g),
                });
            }
        }
        Ok(())
    }

    pub fn runs(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_secs(self.fetcher.interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
