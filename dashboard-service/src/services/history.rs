//! Usage-history persistence seams.

use async_trait::async_trait;
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::MongoDb;
use crate::config::{PersistenceBackend, PersistenceConfig};
use crate::models::{UsageRecord, UsageStats};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record(&self, record: UsageRecord) -> Result<(), AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait UsageStatsStore: Send + Sync {
    async fn usage_stats(&self, user_id: &str) -> Result<UsageStats, AppError>;
}

/// Process-local history, for `PERSISTENCE_BACKEND=memory` and tests.
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    records: Arc<RwLock<Vec<UsageRecord>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<UsageRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn record(&self, record: UsageRecord) -> Result<(), AppError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl UsageStatsStore for InMemoryHistory {
    async fn usage_stats(&self, user_id: &str) -> Result<UsageStats, AppError> {
        let records = self.records.read().await;
        Ok(UsageStats::from_records(user_id, records.iter()))
    }
}

/// The persistence collaborators handed to the dashboard service.
#[derive(Clone)]
pub struct Stores {
    pub history: Arc<dyn HistoryStore>,
    pub stats: Arc<dyn UsageStatsStore>,
}

impl Stores {
    pub fn in_memory(history: InMemoryHistory) -> Self {
        Self {
            history: Arc::new(history.clone()),
            stats: Arc::new(history),
        }
    }

    pub fn mongodb(db: MongoDb) -> Self {
        Self {
            history: Arc::new(db.clone()),
            stats: Arc::new(db),
        }
    }

    pub async fn from_config(config: &PersistenceConfig) -> Result<Self, AppError> {
        match config.backend {
            PersistenceBackend::Memory => {
                tracing::warn!("Using in-memory usage history; records are lost on restart");
                Ok(Self::in_memory(InMemoryHistory::new()))
            }
            PersistenceBackend::Mongodb => {
                let mongo = config.mongodb.as_ref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!(
                        "MongoDB settings are required for the mongodb backend"
                    ))
                })?;
                let db = MongoDb::connect(&mongo.uri, &mongo.database).await?;
                db.initialize_indexes().await.map_err(|e| {
                    tracing::error!("Failed to initialize database indexes: {}", e);
                    e
                })?;
                Ok(Self::mongodb(db))
            }
        }
    }
}
