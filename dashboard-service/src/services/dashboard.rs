//! Request orchestration for the dashboard endpoints.
//!
//! Each operation takes the already-authenticated principal, validates its
//! input, calls one inference endpoint and records the outcome. Errors from
//! any step end the request; nothing is retried.

use serde_json::Value;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;

use super::history::Stores;
use super::inference::{InferenceClient, InferenceError};
use super::metrics::record_inference;
use super::storage::{FileStore, UploadedFile};
use crate::config::{EndpointConfig, InferenceConfig};
use crate::models::{
    ImageInstance, ImagePrediction, InferenceBody, InferenceRequest, InputReference, Principal,
    TextInstance, TextSummary, UsageKind, UsageRecord, UsageStats,
};

pub struct DashboardService {
    endpoints: InferenceConfig,
    inference: Arc<dyn InferenceClient>,
    files: Arc<dyn FileStore>,
    stores: Stores,
}

impl DashboardService {
    pub fn new(
        endpoints: InferenceConfig,
        inference: Arc<dyn InferenceClient>,
        files: Arc<dyn FileStore>,
        stores: Stores,
    ) -> Self {
        Self {
            endpoints,
            inference,
            files,
            stores,
        }
    }

    pub async fn usage_stats(&self, principal: &Principal) -> Result<UsageStats, AppError> {
        self.stores.stats.usage_stats(&principal.id).await
    }

    /// Store the upload, classify it, and record the predictions.
    ///
    /// The stored file is kept even when classification fails; such files
    /// have no matching usage record.
    pub async fn classify_image(
        &self,
        principal: &Principal,
        upload: UploadedFile,
    ) -> Result<InferenceBody, AppError> {
        let upload = ensure_decodable_image(upload).await?;
        if upload.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!("Empty file")));
        }

        let stored = self.files.store(&upload).await?;

        tracing::info!(
            user_id = %principal.id,
            file_id = %stored.id,
            filename = %stored.original_filename,
            size = stored.size,
            "Image stored, requesting classification"
        );

        let payload =
            InferenceRequest::single(ImageInstance::from_bytes(&upload.bytes)).to_json()?;

        let prediction = self
            .call(
                "image",
                &self.endpoints.image,
                &payload,
                ImagePrediction::decode,
            )
            .await
            .map_err(|e| {
                tracing::warn!(
                    file_id = %stored.id,
                    error = %e,
                    "Classification failed; upload kept without a usage record"
                );
                e
            })?;

        let record = UsageRecord::new(
            principal,
            UsageKind::Image,
            prediction.result_payload(),
            Some(InputReference::File(stored)),
        );
        self.stores.history.record(record).await?;

        Ok(prediction.body)
    }

    /// Summarize `text` and record the summary.
    pub async fn summarize_text(
        &self,
        principal: &Principal,
        text: Option<String>,
    ) -> Result<InferenceBody, AppError> {
        let text = text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("No text to summarize")))?;

        tracing::info!(
            user_id = %principal.id,
            text_len = text.len(),
            "Requesting text summary"
        );

        let payload = InferenceRequest::single(TextInstance { text: text.clone() }).to_json()?;

        let summary = self
            .call("text", &self.endpoints.text, &payload, TextSummary::decode)
            .await?;

        let record = UsageRecord::new(
            principal,
            UsageKind::TextSummary,
            summary.summary,
            Some(InputReference::Text { text }),
        );
        self.stores.history.record(record).await?;

        Ok(summary.body)
    }

    async fn call<T>(
        &self,
        label: &'static str,
        endpoint: &EndpointConfig,
        payload: &Value,
        decode: fn(InferenceBody) -> Result<T, InferenceError>,
    ) -> Result<T, InferenceError> {
        let start = Instant::now();
        let result = match self.inference.invoke(endpoint, payload).await {
            Ok(body) => decode(body),
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        record_inference(label, outcome, start.elapsed());

        result
    }
}

async fn ensure_decodable_image(upload: UploadedFile) -> Result<UploadedFile, AppError> {
    let (upload, decodable) = tokio::task::spawn_blocking(move || {
        let decodable = image::load_from_memory(&upload.bytes).is_ok();
        (upload, decodable)
    })
    .await
    .map_err(|e| AppError::InternalError(anyhow::anyhow!("Image validation task failed: {}", e)))?;

    if !decodable {
        return Err(AppError::BadRequest(anyhow::anyhow!("Not a valid image file")));
    }
    Ok(upload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::history::InMemoryHistory;
    use crate::services::storage::LocalFileStore;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Inference client that replays one canned result and records calls.
    struct StubInference {
        result: Mutex<Option<Result<InferenceBody, InferenceError>>>,
        calls: Mutex<Vec<(EndpointConfig, Value)>>,
    }

    impl StubInference {
        fn returning(result: Result<Value, InferenceError>) -> Arc<Self> {
            let result = result.map(|v| match v {
                Value::Object(map) => map,
                _ => panic!("stub body must be an object"),
            });
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(EndpointConfig, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceClient for StubInference {
        async fn invoke(
            &self,
            endpoint: &EndpointConfig,
            payload: &Value,
        ) -> Result<InferenceBody, InferenceError> {
            self.calls
                .lock()
                .unwrap()
                .push((endpoint.clone(), payload.clone()));
            self.result
                .lock()
                .unwrap()
                .take()
                .expect("stub inference called more than once")
        }
    }

    struct Fixture {
        service: DashboardService,
        history: InMemoryHistory,
        inference: Arc<StubInference>,
        upload_dir: tempfile::TempDir,
    }

    fn endpoints() -> InferenceConfig {
        InferenceConfig {
            image: EndpointConfig {
                url: "http://gateway/v1/models/clf:predict".into(),
                host: "clf.example.com".into(),
            },
            text: EndpointConfig {
                url: "http://gateway/v1/models/sum:predict".into(),
                host: "sum.example.com".into(),
            },
            timeout_secs: 5,
        }
    }

    async fn fixture(result: Result<Value, InferenceError>) -> Fixture {
        let upload_dir = tempfile::tempdir().unwrap();
        let files = LocalFileStore::new(upload_dir.path()).await.unwrap();
        let history = InMemoryHistory::new();
        let inference = StubInference::returning(result);
        let service = DashboardService::new(
            endpoints(),
            inference.clone(),
            Arc::new(files),
            Stores::in_memory(history.clone()),
        );
        Fixture {
            service,
            history,
            inference,
            upload_dir,
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn upload_count(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    fn user() -> Principal {
        Principal::new("u-1", "alice")
    }

    #[tokio::test]
    async fn summary_is_returned_and_recorded() {
        let fx = fixture(Ok(json!({ "summary": "hi" }))).await;

        let body = fx
            .service
            .summarize_text(&user(), Some("hello world".into()))
            .await
            .unwrap();

        assert_eq!(Value::Object(body), json!({ "summary": "hi" }));

        let records = fx.history.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, UsageKind::TextSummary);
        assert_eq!(records[0].result_payload, "hi");
        assert_eq!(records[0].username, "alice");
        assert_eq!(
            records[0].input_reference,
            Some(InputReference::Text {
                text: "hello world".into()
            })
        );

        let calls = fx.inference.calls();
        assert_eq!(calls[0].0.host, "sum.example.com");
        assert_eq!(
            calls[0].1,
            json!({ "instances": [ { "text": "hello world" } ] })
        );
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_calling_inference() {
        for text in [None, Some(String::new()), Some("   \n\t".to_string())] {
            let fx = fixture(Ok(json!({ "summary": "unused" }))).await;
            let err = fx.service.summarize_text(&user(), text).await.unwrap_err();

            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert!(fx.inference.calls().is_empty());
            assert!(fx.history.records().await.is_empty());
        }
    }

    #[tokio::test]
    async fn missing_summary_is_bad_gateway_and_not_recorded() {
        let fx = fixture(Ok(json!({ "result": "hi" }))).await;

        let err = fx
            .service
            .summarize_text(&user(), Some("hello".into()))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(fx.history.records().await.is_empty());
    }

    #[tokio::test]
    async fn image_is_stored_classified_and_recorded() {
        let fx = fixture(Ok(json!({ "predictions": [0.9, 0.1] }))).await;
        let bytes = png_bytes();

        let body = fx
            .service
            .classify_image(&user(), UploadedFile::new(Some("cat.png"), bytes.clone()))
            .await
            .unwrap();

        assert_eq!(Value::Object(body), json!({ "predictions": [0.9, 0.1] }));

        let records = fx.history.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, UsageKind::Image);
        assert_eq!(records[0].result_payload, "[0.9, 0.1]");
        match &records[0].input_reference {
            Some(InputReference::File(file)) => {
                assert_eq!(file.original_filename, "cat.png");
                assert_eq!(file.extension, "png");
                assert_eq!(std::fs::read(&file.stored_path).unwrap(), bytes);
            }
            other => panic!("unexpected input reference: {:?}", other),
        }

        let calls = fx.inference.calls();
        assert_eq!(calls[0].0.host, "clf.example.com");
        assert_eq!(
            calls[0].1,
            json!({ "instances": [ { "b64": ImageInstance::from_bytes(&bytes).b64 } ] })
        );
    }

    #[tokio::test]
    async fn non_image_bytes_write_nothing() {
        let fx = fixture(Ok(json!({ "predictions": [] }))).await;

        let err = fx
            .service
            .classify_image(&user(), UploadedFile::new(Some("notes.txt"), b"hello".to_vec()))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(upload_count(&fx.upload_dir), 0);
        assert!(fx.history.records().await.is_empty());
        assert!(fx.inference.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_upload_is_bad_request() {
        let fx = fixture(Ok(json!({ "predictions": [] }))).await;

        let err = fx
            .service
            .classify_image(&user(), UploadedFile::new(Some("empty.png"), Vec::new()))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(upload_count(&fx.upload_dir), 0);
    }

    #[tokio::test]
    async fn upstream_failure_keeps_file_but_skips_history() {
        let fx = fixture(Err(InferenceError::Upstream {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            body: "overloaded".into(),
        }))
        .await;

        let err = fx
            .service
            .classify_image(&user(), UploadedFile::new(Some("cat.png"), png_bytes()))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("503"));
        assert_eq!(upload_count(&fx.upload_dir), 1);
        assert!(fx.history.records().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_model_server_is_gateway_timeout() {
        let fx = fixture(Err(InferenceError::Unreachable("connection refused".into()))).await;

        let err = fx
            .service
            .summarize_text(&user(), Some("hello".into()))
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(fx.history.records().await.is_empty());
    }

    #[tokio::test]
    async fn usage_stats_reflect_recorded_history() {
        let fx = fixture(Ok(json!({ "summary": "hi" }))).await;
        fx.service
            .summarize_text(&user(), Some("hello".into()))
            .await
            .unwrap();

        let stats = fx.service.usage_stats(&user()).await.unwrap();
        assert_eq!(stats.text_summary_count, 1);
        assert_eq!(stats.image_count, 0);

        let other = fx
            .service
            .usage_stats(&Principal::new("u-2", "bob"))
            .await
            .unwrap();
        assert_eq!(other.total_count, 0);
    }
}
