use async_trait::async_trait;
use mongodb::{
    bson::doc, options::FindOneOptions, options::IndexOptions, Client as MongoClient, Collection,
    Database, IndexModel,
};
use service_core::error::AppError;

use super::history::{HistoryStore, UsageStatsStore};
use crate::models::{UsageKind, UsageRecord, UsageStats};

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for dashboard-service");

        let usage = self.usage_history();

        // Per-user history, newest first
        let user_time_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("user_time_idx".to_string())
                    .build(),
            )
            .build();

        usage.create_index(user_time_index, None).await.map_err(|e| {
            tracing::error!("Failed to create user_time index: {}", e);
            AppError::from(e)
        })?;

        // Per-user counters by kind
        let user_kind_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "kind": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_kind_idx".to_string())
                    .build(),
            )
            .build();

        usage.create_index(user_kind_index, None).await.map_err(|e| {
            tracing::error!("Failed to create user_kind index: {}", e);
            AppError::from(e)
        })?;

        tracing::info!("Created indexes on usage_history");
        Ok(())
    }

    pub fn usage_history(&self) -> Collection<UsageRecord> {
        self.db.collection("usage_history")
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn count_kind(&self, user_id: &str, kind: UsageKind) -> Result<u64, AppError> {
        self.usage_history()
            .count_documents(doc! { "user_id": user_id, "kind": kind.as_str() }, None)
            .await
            .map_err(AppError::from)
    }
}

#[async_trait]
impl HistoryStore for MongoDb {
    async fn record(&self, record: UsageRecord) -> Result<(), AppError> {
        self.usage_history()
            .insert_one(&record, None)
            .await
            .map_err(|e| {
                tracing::error!(
                    record_id = %record.id,
                    user_id = %record.user_id,
                    "Failed to insert usage record: {}",
                    e
                );
                AppError::from(e)
            })?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }
}

#[async_trait]
impl UsageStatsStore for MongoDb {
    async fn usage_stats(&self, user_id: &str) -> Result<UsageStats, AppError> {
        let image_count = self.count_kind(user_id, UsageKind::Image).await?;
        let text_summary_count = self.count_kind(user_id, UsageKind::TextSummary).await?;

        let latest = self
            .usage_history()
            .find_one(
                doc! { "user_id": user_id },
                FindOneOptions::builder()
                    .sort(doc! { "created_at": -1 })
                    .build(),
            )
            .await?;

        Ok(UsageStats {
            user_id: user_id.to_string(),
            image_count,
            text_summary_count,
            total_count: image_count + text_summary_count,
            last_used_at: latest.map(|record| record.created_at),
        })
    }
}
