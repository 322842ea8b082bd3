use serde::{Deserialize, Serialize, Serializer};

/// A record as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    pub text: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Input record after the normalizer has resolved the timestamp and imputed a rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub text: String,
    #[serde(serialize_with = "json_safe::opt_f64")]
    pub rating: Option<f64>,
    pub timestamp: String,
    #[serde(serialize_with = "json_safe::f64")]
    pub rating_imputed: f64,
}

/// Final artifact for one record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedRecord {
    pub asset_id: String,
    pub original_text_masked: String,
    #[serde(serialize_with = "json_safe::f64")]
    pub refined_rating: f64,
    #[serde(serialize_with = "json_safe::f64")]
    pub rating_imputed: f64,
    #[serde(serialize_with = "json_safe::opt_f64")]
    pub original_rating: Option<f64>,
    pub timestamp: String,
}

/// Output of the sentiment engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub confidence: f64,
}

/// Entity span over the UTF-8 text, as byte offsets `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

/// Value produced either by the external engine or by a local fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Estimate<T> {
    Inferred(T),
    Fallback { value: T, reason: String },
}

impl<T> Estimate<T> {
    pub fn value(&self) -> &T {
        match self {
            Estimate::Inferred(v) => v,
            Estimate::Fallback { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Estimate::Inferred(v) => v,
            Estimate::Fallback { value, .. } => value,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Estimate::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Estimate::Inferred(_) => None,
            Estimate::Fallback { reason, .. } => Some(reason),
        }
    }
}

/// Serializers that write NaN and infinities as JSON null.
pub mod json_safe {
    use super::*;

    pub fn f64<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn opt_f64<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) if v.is_finite() => serializer.serialize_some(v),
            _ => serializer.serialize_none(),
        }
    }
}
