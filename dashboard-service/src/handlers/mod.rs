pub mod dashboard;
pub mod health;

pub use dashboard::{image_class, text_summary, usage_stats};
pub use health::{health_check, metrics_endpoint, readiness_check};
