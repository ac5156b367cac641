use crate::dtos::SummaryRequest;
use crate::middleware::AuthenticatedUser;
use crate::models::{InferenceBody, UsageStats};
use crate::services::UploadedFile;
use crate::startup::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use service_core::error::AppError;

const FILE_FIELD: &str = "file";

pub async fn usage_stats(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
) -> Result<Json<UsageStats>, AppError> {
    let stats = state.dashboard.usage_stats(&principal).await?;
    Ok(Json(stats))
}

pub async fn image_class(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<InferenceBody>, AppError> {
    let max_bytes = state.config.storage.max_upload_bytes;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart field: {}", e))
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Failed to read file bytes: {}", e)))?;

        if data.len() > max_bytes {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "File too large (max {} bytes)",
                max_bytes
            )));
        }

        upload = Some(UploadedFile::new(original_name.as_deref(), data.to_vec()));
        break;
    }

    let upload =
        upload.ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No file uploaded")))?;

    let body = state.dashboard.classify_image(&principal, upload).await?;
    Ok(Json(body))
}

pub async fn text_summary(
    State(state): State<AppState>,
    AuthenticatedUser(principal): AuthenticatedUser,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Json<InferenceBody>, AppError> {
    let Json(request) = payload
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e.body_text())))?;

    let body = state.dashboard.summarize_text(&principal, request.text).await?;
    Ok(Json(body))
}
