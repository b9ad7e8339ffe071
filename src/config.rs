use std::time::Duration;
use serde::Deserialize;

/// Server settings, read from `MATCHDAY_*` environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite file. `None` keeps everything in memory.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 3000 }
fn default_sweep_interval() -> u64 { 30 }

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: default_host(),
            port: default_port(),
            database_path: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_source(config::Environment::with_prefix("MATCHDAY").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self, config::ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Never zero, so a misconfigured interval cannot spin the sweeper.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
