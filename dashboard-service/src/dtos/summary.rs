use serde::Deserialize;

/// Body of `POST /text-summary`.
///
/// `text` is optional at the wire level so a missing field yields the same
/// 400 as a blank one instead of a deserialization rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub text: Option<String>,
}
