//! Write-through key-value store with an in-memory mirror.
//!
//! Reads are served from the mirror. Writes are upserted row by row and merged
//! into the mirror once the whole batch is persisted. A full load replaces the
//! mirror wholesale with the table contents overlaid on the default namespaces.
//!
//! Locking:
//! - `load_flight` admits one full load at a time; concurrent callers park on it
//!   and reuse the finished result.
//! - `gate` is held exclusively by a load and shared by writes, so a load never
//!   swaps in a snapshot that misses a write persisted while it was scanning.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use configs::{AppConfig, StoreConfig};
use serde_json::{Map, Value};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::backend::{KvBackend, SeaOrmBackend};
use crate::connect::{ConnectRetry, ConnectState};
use crate::errors::ServiceError;

/// In-memory image of the `data` table.
pub type Mirror = Map<String, Value>;

pub struct KeyValueStore<B: KvBackend = SeaOrmBackend> {
    backend: B,
    default_namespaces: Vec<String>,
    retry: Mutex<ConnectRetry>,
    connect_state: watch::Receiver<ConnectState>,
    mirror: RwLock<Option<Mirror>>,
    gate: RwLock<()>,
    load_flight: Mutex<()>,
    load_generation: AtomicU64,
    closed: AtomicBool,
}

impl KeyValueStore<SeaOrmBackend> {
    /// PostgreSQL-backed store built from application config.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let backend = SeaOrmBackend::new(models::db::DatabaseConfig::from(&cfg.database));
        Self::new(backend, &cfg.store)
    }
}

impl<B: KvBackend> KeyValueStore<B> {
    pub fn new(backend: B, cfg: &StoreConfig) -> Self {
        let retry = ConnectRetry::new(cfg.connect_attempts, cfg.retry_delay());
        Self {
            backend,
            default_namespaces: cfg.default_namespaces.clone(),
            connect_state: retry.subscribe(),
            retry: Mutex::new(retry),
            mirror: RwLock::new(None),
            gate: RwLock::new(()),
            load_flight: Mutex::new(()),
            load_generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Connect (with retry), ensure the table exists, then load everything.
    pub async fn initialize(&self) -> Result<Mirror, ServiceError> {
        self.ensure_open()?;
        self.connect_with_retry().await?;
        self.backend.ensure_schema().await?;
        let mirror = self.load().await?;
        info!(keys = mirror.len(), "key-value store initialized");
        Ok(mirror)
    }

    pub async fn connect_with_retry(&self) -> Result<(), ServiceError> {
        self.ensure_open()?;
        let backend = &self.backend;
        let mut retry = self.retry.lock().await;
        retry.run(move || backend.connect()).await
    }

    /// Latest connect state; readable while a retry loop is sleeping.
    pub fn connect_state(&self) -> ConnectState {
        *self.connect_state.borrow()
    }

    /// Full reload from storage. Concurrent calls share a single scan.
    pub async fn load(&self) -> Result<Mirror, ServiceError> {
        self.ensure_open()?;
        let seen = self.load_generation.load(Ordering::Acquire);
        let _flight = match self.load_flight.try_lock() {
            Ok(flight) => flight,
            Err(_) => {
                debug!("load already in flight, waiting");
                let flight = self.load_flight.lock().await;
                if self.load_generation.load(Ordering::Acquire) != seen {
                    if let Some(mirror) = self.mirror.read().await.as_ref() {
                        return Ok(mirror.clone());
                    }
                }
                // The in-flight load failed; run our own.
                flight
            }
        };
        self.reload().await
    }

    async fn reload(&self) -> Result<Mirror, ServiceError> {
        let _gate = self.gate.write().await;
        let rows = self.backend.scan().await?;
        let row_count = rows.len();

        let mut fresh = self.seed();
        fresh.extend(rows);

        *self.mirror.write().await = Some(fresh.clone());
        self.load_generation.fetch_add(1, Ordering::AcqRel);
        info!(rows = row_count, keys = fresh.len(), "mirror reloaded");
        Ok(fresh)
    }

    fn seed(&self) -> Mirror {
        self.default_namespaces
            .iter()
            .map(|ns| (ns.clone(), Value::Object(Map::new())))
            .collect()
    }

    /// Upsert every entry of a non-empty JSON object, then merge it into the mirror.
    ///
    /// Entries are written one statement at a time. A failure stops the batch:
    /// earlier keys stay committed and the mirror is left untouched.
    pub async fn write_all(&self, entries: Value) -> Result<bool, ServiceError> {
        let entries = match entries {
            Value::Object(map) if !map.is_empty() => map,
            Value::Object(_) => return Err(ServiceError::Validation("entries must not be empty".into())),
            other => {
                return Err(ServiceError::Validation(format!(
                    "entries must be a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };
        if let Some(key) = entries.keys().find(|k| k.trim().is_empty()) {
            return Err(ServiceError::Validation(format!("invalid key {key:?}")));
        }
        self.persist(entries).await
    }

    /// Persist a single key. The mirror changes only once storage confirms it.
    pub async fn update(&self, key: &str, value: Value) -> Result<bool, ServiceError> {
        if key.trim().is_empty() {
            return Err(ServiceError::Validation("key is required".into()));
        }
        let mut entry = Mirror::new();
        entry.insert(key.to_string(), value);
        self.persist(entry).await
    }

    async fn persist(&self, entries: Mirror) -> Result<bool, ServiceError> {
        self.ensure_open()?;
        if !self.is_initialized().await {
            return Err(ServiceError::NotInitialized);
        }

        let _gate = self.gate.read().await;
        for (key, value) in &entries {
            self.backend.upsert(key, value).await?;
            debug!(%key, "upserted");
        }

        let mut mirror = self.mirror.write().await;
        let mirror = mirror.get_or_insert_with(|| self.seed());
        let written = entries.len();
        mirror.extend(entries);
        debug!(keys = written, "mirror updated");
        Ok(true)
    }

    /// Value for `key` as currently mirrored.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.mirror.read().await.as_ref().and_then(|m| m.get(key).cloned())
    }

    /// Copy of the mirror without touching storage; empty before the first load.
    pub async fn snapshot(&self) -> Mirror {
        self.mirror.read().await.clone().unwrap_or_default()
    }

    pub async fn is_initialized(&self) -> bool {
        self.mirror.read().await.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the pool. Never fails; close errors are only logged.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.backend.close().await {
            Ok(()) => info!("key-value store closed"),
            Err(e) => error!(error = %e, "failed to close database pool"),
        }
    }

    fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.is_closed() { Err(ServiceError::Closed) } else { Ok(()) }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
