pub mod app_config;
pub mod catalog;
pub mod config;
pub mod store;

pub use app_config::{AppConfig, Environment};
pub use catalog::{CatalogEntry, Cursor, LocalRecord, LookupTargets, PendingPatch, RecordId};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use store::ProductStore;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
