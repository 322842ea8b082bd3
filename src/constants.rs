/// Shared constants for the refinement pipeline

/// Longest text prefix (in characters) handed to the sentiment engine
pub const SENTIMENT_MAX_CHARS: usize = 512;

/// Rating used when neither a prediction nor an imputed rating exists
pub const DEFAULT_RATING: f64 = 7.0;

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 10.0;

/// Reward handed to the correction agent when no ground-truth rating exists
pub const NEUTRAL_REWARD: f64 = 0.5;

/// Default learning rate for the correction agent
pub const DEFAULT_ALPHA: f64 = 0.5;
/// Default discount factor for the correction agent
pub const DEFAULT_GAMMA: f64 = 0.9;

pub const POSITIVE_LABEL: &str = "POSITIVE";

/// Entity labels treated as person names
pub const PERSON_LABELS: &[&str] = &["PERSON", "PER"];

pub const REDACTION_TOKEN: &str = "[MASKED]";

pub const ASSET_ID_PREFIX: &str = "asset_";
pub const BLOB_EXTENSION: &str = "blob";

// File names under the storage directory
pub const CLEANED_FILE: &str = "cleaned.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const FINAL_FILE: &str = "final_records.json";
pub const QTABLE_FILE: &str = "qtable.json";
pub const LOG_DIR: &str = "logs";

// Pagination for the retrieve endpoint
pub const DEFAULT_PER_PAGE: usize = 5;
pub const MAX_PER_PAGE: usize = 100;

/// Names replaced literally when the NER engine is unavailable
pub fn default_fallback_names() -> Vec<String> {
    vec!["John".to_string(), "Sarah".to_string()]
}
