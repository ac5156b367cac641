use serde::Deserialize;
use service_core::config::{self as core_config, get_env, is_production};
use service_core::error::AppError;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_ROUTE_PREFIX: &str = "/dashboard";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub route_prefix: String,
    pub inference: InferenceConfig,
    pub storage: StorageConfig,
    pub persistence: PersistenceConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    pub image: EndpointConfig,
    pub text: EndpointConfig,
    pub timeout_secs: u64,
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One inference route: where to connect and which virtual host to ask for.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    /// Sent as the `Host` header; the gateway routes on it rather than on the URL.
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    pub mongodb: Option<MongoConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl DashboardConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common_config = core_config::Config::load()?;
        let is_prod = is_production();

        let backend: PersistenceBackend = get_env("PERSISTENCE_BACKEND", Some("mongodb"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let mongodb = match backend {
            PersistenceBackend::Mongodb => Some(MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("dashboard_db"), is_prod)?,
            }),
            PersistenceBackend::Memory => None,
        };

        let upload_dir = match std::env::var("UPLOAD_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()?.join("uploads"),
        };

        Ok(DashboardConfig {
            common: common_config,
            route_prefix: get_env("ROUTE_PREFIX", Some(DEFAULT_ROUTE_PREFIX), false)?,
            inference: InferenceConfig {
                image: EndpointConfig {
                    url: get_env(
                        "INFERENCE_IMAGE_URL",
                        Some("http://localhost:8081/v1/models/image-classifier:predict"),
                        is_prod,
                    )?,
                    host: get_env(
                        "INFERENCE_IMAGE_HOST",
                        Some("image-classifier.default.example.com"),
                        is_prod,
                    )?,
                },
                text: EndpointConfig {
                    url: get_env(
                        "INFERENCE_TEXT_URL",
                        Some("http://localhost:8081/v1/models/text-summarizer:predict"),
                        is_prod,
                    )?,
                    host: get_env(
                        "INFERENCE_TEXT_HOST",
                        Some("text-summarizer.default.example.com"),
                        is_prod,
                    )?,
                },
                timeout_secs: parse_env("INFERENCE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            },
            storage: StorageConfig {
                upload_dir,
                max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            },
            persistence: PersistenceConfig { backend, mongodb },
            auth: AuthConfig {
                jwt_secret: get_env("JWT_SECRET", Some("dev-only-dashboard-secret"), is_prod)?,
            },
        })
    }
}

impl std::str::FromStr for PersistenceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(PersistenceBackend::Mongodb),
            "memory" => Ok(PersistenceBackend::Memory),
            _ => Err(format!("Invalid persistence backend: {}", s)),
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(&default.to_string()), false)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}
