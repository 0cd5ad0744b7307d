use async_trait::async_trait;
use models::db::DatabaseConfig;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::errors::ServiceError;

/// Storage collaborator behind the key-value store.
/// Every method is one round trip; retry and caching live in the store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// A single connection attempt.
    async fn connect(&self) -> Result<(), ServiceError>;
    async fn ensure_schema(&self) -> Result<(), ServiceError>;
    async fn scan(&self) -> Result<Vec<(String, Value)>, ServiceError>;
    async fn upsert(&self, key: &str, value: &Value) -> Result<(), ServiceError>;
    async fn close(&self) -> Result<(), ServiceError>;
}

/// SeaORM/PostgreSQL backend.
pub struct SeaOrmBackend {
    cfg: DatabaseConfig,
    db: RwLock<Option<DatabaseConnection>>,
}

impl SeaOrmBackend {
    pub fn new(cfg: DatabaseConfig) -> Self {
        Self { cfg, db: RwLock::new(None) }
    }

    async fn conn(&self) -> Result<DatabaseConnection, ServiceError> {
        self.db.read().await.clone().ok_or(ServiceError::NotConnected)
    }
}

#[async_trait]
impl KvBackend for SeaOrmBackend {
    async fn connect(&self) -> Result<(), ServiceError> {
        let mut slot = self.db.write().await;
        if slot.is_some() {
            return Ok(());
        }
        let db = models::db::connect_with_config(&self.cfg)
            .await
            .map_err(|e| ServiceError::Connect(e.to_string()))?;
        *slot = Some(db);
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), ServiceError> {
        let db = self.conn().await?;
        models::db::ensure_schema(&db)
            .await
            .map_err(|e| ServiceError::Schema(e.to_string()))
    }

    async fn scan(&self) -> Result<Vec<(String, Value)>, ServiceError> {
        let db = self.conn().await?;
        models::data::list_all(&db)
            .await
            .map_err(|e| ServiceError::Read(e.to_string()))
    }

    async fn upsert(&self, key: &str, value: &Value) -> Result<(), ServiceError> {
        let db = self.conn().await?;
        models::data::upsert(&db, key, value)
            .await
            .map_err(|e| ServiceError::write(key, e))
    }

    async fn close(&self) -> Result<(), ServiceError> {
        let Some(db) = self.db.write().await.take() else {
            return Ok(());
        };
        db.close().await.map_err(|e| ServiceError::Close(e.to_string()))
    }
}
