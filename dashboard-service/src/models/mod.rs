pub mod inference;
pub mod principal;
pub mod usage;

pub use inference::{
    render_payload, ImageInstance, ImagePrediction, InferenceBody, InferenceRequest,
    TextInstance, TextSummary,
};
pub use principal::Principal;
pub use usage::{InputReference, StoredFile, UsageKind, UsageRecord, UsageStats};
