use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;
use std::time::Duration;

/// Namespaces every freshly loaded mirror starts with.
pub const DEFAULT_NAMESPACES: [&str; 6] = ["users", "chats", "stats", "msgs", "sticker", "settings"];

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime_secs: u64,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub sqlx_logging: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_lifetime_secs: default_max_lifetime(),
            acquire_timeout_secs: default_acquire_timeout(),
            sqlx_logging: false,
        }
    }
}

/// Behaviour of the key-value store itself (retry budget, seeded namespaces).
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_namespaces")]
    pub default_namespaces: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connect_attempts: default_connect_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            default_namespaces: default_namespaces(),
        }
    }
}

fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 30 }
fn default_idle_timeout() -> u64 { 600 }
fn default_max_lifetime() -> u64 { 3600 }
fn default_acquire_timeout() -> u64 { 30 }
fn default_connect_attempts() -> u32 { 5 }
fn default_retry_delay_ms() -> u64 { 3000 }
fn default_namespaces() -> Vec<String> { DEFAULT_NAMESPACES.iter().map(|s| s.to_string()).collect() }

pub fn config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
}

pub fn load_default() -> Result<AppConfig> {
    load_from_file(&config_path())
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    /// Load `config.toml` (or `CONFIG_PATH`), falling back to pure environment
    /// configuration when no file is present.
    pub fn load_and_validate() -> Result<Self> {
        let path = config_path();
        let mut cfg = if std::path::Path::new(&path).exists() {
            load_from_file(&path)?
        } else {
            AppConfig::default()
        };
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.database.normalize_from_env();
        self.database.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn normalize_from_env(&mut self) {
        if self.url.trim().is_empty() {
            let _ = dotenvy::dotenv();
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(anyhow!("database.url is empty; set it in config.toml or DATABASE_URL"));
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("postgresql://") || lower.starts_with("postgres://")) {
            return Err(anyhow!("database.url must start with postgresql:// or postgres://"));
        }
        if self.min_connections == 0 {
            return Err(anyhow!("database.min_connections must be >= 1"));
        }
        if self.max_connections < self.min_connections {
            return Err(anyhow!("database.max_connections must be >= min_connections"));
        }
        if self.connect_timeout_secs == 0 || self.acquire_timeout_secs == 0 {
            return Err(anyhow!("database timeouts must be positive seconds"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration { Duration::from_secs(self.connect_timeout_secs) }
    pub fn acquire_timeout(&self) -> Duration { Duration::from_secs(self.acquire_timeout_secs) }
    pub fn idle_timeout(&self) -> Duration { Duration::from_secs(self.idle_timeout_secs) }
    pub fn max_lifetime(&self) -> Duration { Duration::from_secs(self.max_lifetime_secs) }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_attempts == 0 {
            return Err(anyhow!("store.connect_attempts must be >= 1"));
        }
        if self.default_namespaces.is_empty() {
            return Err(anyhow!("store.default_namespaces must list at least one namespace"));
        }
        if self.default_namespaces.iter().any(|n| n.trim().is_empty()) {
            return Err(anyhow!("store.default_namespaces must not contain blank names"));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
