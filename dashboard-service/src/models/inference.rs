//! Wire types for the inference endpoints.
//!
//! Requests follow the `{"instances": [...]}` prediction protocol. Responses
//! are kept as raw JSON objects (returned to the caller untouched) and decoded
//! into the one field each handler records.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;

use crate::services::InferenceError;

/// Raw response object from an inference endpoint.
pub type InferenceBody = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Serialize)]
pub struct InferenceRequest<T> {
    pub instances: Vec<T>,
}

impl<T: Serialize> InferenceRequest<T> {
    pub fn single(instance: T) -> Self {
        Self {
            instances: vec![instance],
        }
    }

    pub fn to_json(&self) -> Result<Value, InferenceError> {
        serde_json::to_value(self).map_err(|e| InferenceError::Encode(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageInstance {
    pub b64: String,
}

impl ImageInstance {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let encoded = STANDARD.encode(bytes);
        Self {
            b64: encoded.replace(['\r', '\n'], ""),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextInstance {
    pub text: String,
}

/// Image endpoint response with its `predictions` array validated.
#[derive(Debug, Clone)]
pub struct ImagePrediction {
    pub predictions: Vec<Value>,
    pub body: InferenceBody,
}

impl ImagePrediction {
    pub fn decode(body: InferenceBody) -> Result<Self, InferenceError> {
        let predictions = match body.get("predictions") {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(InferenceError::ContractViolation(format!(
                    "`predictions` must be an array, got {}",
                    json_type(other)
                )))
            }
            None => {
                return Err(InferenceError::ContractViolation(
                    "response has no `predictions` field".to_string(),
                ))
            }
        };

        Ok(Self { predictions, body })
    }

    /// `predictions` in the form stored as the usage record's result.
    pub fn result_payload(&self) -> String {
        render_list(&self.predictions)
    }
}

/// Text endpoint response with its `summary` string validated.
#[derive(Debug, Clone)]
pub struct TextSummary {
    pub summary: String,
    pub body: InferenceBody,
}

impl TextSummary {
    pub fn decode(body: InferenceBody) -> Result<Self, InferenceError> {
        let summary = match body.get("summary") {
            Some(Value::String(summary)) => summary.clone(),
            Some(other) => {
                return Err(InferenceError::ContractViolation(format!(
                    "`summary` must be a string, got {}",
                    json_type(other)
                )))
            }
            None => {
                return Err(InferenceError::ContractViolation(
                    "response has no `summary` field".to_string(),
                ))
            }
        };

        Ok(Self { summary, body })
    }
}

/// Render a JSON value the way history has always stored results:
/// lists as `[a, b]`, objects as `{k=v}`, strings unquoted.
pub fn render_payload(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => render_list(items),
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}={}", k, render_payload(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn render_list(items: &[Value]) -> String {
    let rendered: Vec<String> = items.iter().map(render_payload).collect();
    format!("[{}]", rendered.join(", "))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
