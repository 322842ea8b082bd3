use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefineryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("External engine error: {0}")]
    Engine(String),

    #[error("Value table at '{path}' is unreadable: {reason}")]
    CorruptTable { path: String, reason: String },

    #[error("Failed to persist value table: {0}")]
    TablePersist(String),

    #[error("Failed to write artifact {asset_id}: {reason}")]
    ArtifactWrite { asset_id: String, reason: String },

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl RefineryError {
    /// True for failures to durably write learned state or artifacts.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            RefineryError::TablePersist(_) | RefineryError::ArtifactWrite { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RefineryError>;
