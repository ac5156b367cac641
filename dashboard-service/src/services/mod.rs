pub mod dashboard;
pub mod database;
pub mod history;
pub mod inference;
pub mod metrics;
pub mod storage;
pub mod token;

pub use dashboard::DashboardService;
pub use database::MongoDb;
pub use history::{HistoryStore, InMemoryHistory, Stores, UsageStatsStore};
pub use inference::{HttpInferenceClient, InferenceClient, InferenceError};
pub use metrics::{get_metrics, init_metrics};
pub use storage::{FileStore, LocalFileStore, UploadedFile};
pub use token::{AccessTokenClaims, TokenService};
