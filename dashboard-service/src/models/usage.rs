//! Usage history: one record per successful inference call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageKind {
    Image,
    TextSummary,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageKind::Image => "IMAGE",
            UsageKind::TextSummary => "TEXT_SUMMARY",
        }
    }
}

/// Metadata of an upload once it has been written to the upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub original_filename: String,
    pub extension: String,
    pub stored_filename: String,
    pub stored_path: String,
    pub size: i64,
}

/// What the user sent for this unit of usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputReference {
    File(StoredFile),
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub kind: UsageKind,
    pub result_payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_reference: Option<InputReference>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        principal: &Principal,
        kind: UsageKind,
        result_payload: String,
        input_reference: Option<InputReference>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: principal.id.clone(),
            username: principal.username.clone(),
            kind,
            result_payload,
            input_reference,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate counters returned by the usage-stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub user_id: String,
    pub image_count: u64,
    pub text_summary_count: u64,
    pub total_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl UsageStats {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            image_count: 0,
            text_summary_count: 0,
            total_count: 0,
            last_used_at: None,
        }
    }

    /// Aggregate one user's records into counters.
    pub fn from_records<'a>(
        user_id: &str,
        records: impl IntoIterator<Item = &'a UsageRecord>,
    ) -> Self {
        let mut stats = UsageStats::empty(user_id);

        for record in records.into_iter().filter(|r| r.user_id == user_id) {
            match record.kind {
                UsageKind::Image => stats.image_count += 1,
                UsageKind::TextSummary => stats.text_summary_count += 1,
            }
            stats.total_count += 1;
            stats.last_used_at = stats.last_used_at.max(Some(record.created_at));
        }

        stats
    }
}
