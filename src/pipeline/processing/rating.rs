use tracing::debug;

use crate::app::ports::SentimentEngine;
use crate::constants::{DEFAULT_RATING, MAX_RATING, MIN_RATING, POSITIVE_LABEL, SENTIMENT_MAX_CHARS};
use crate::types::{Estimate, Sentiment};

/// Longest prefix of `text` with at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Map a classification to a 0-10 rating rounded to two decimals.
///
/// Returns `None` for a confidence that is not a finite value in [0, 1].
pub fn sentiment_to_rating(sentiment: &Sentiment) -> Option<f64> {
    let confidence = sentiment.confidence;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return None;
    }
    let raw = if sentiment.label.trim().eq_ignore_ascii_case(POSITIVE_LABEL) {
        confidence * 10.0
    } else {
        (1.0 - confidence) * 10.0
    };
    Some(round2(raw).clamp(MIN_RATING, MAX_RATING))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rating used when the engine cannot produce one.
pub fn fallback_rating(imputed: f64, default_rating: f64) -> f64 {
    if imputed.is_finite() {
        imputed
    } else if default_rating.is_finite() {
        default_rating
    } else {
        DEFAULT_RATING
    }
}

/// Predicts ratings from the sentiment engine, falling back to the imputed rating.
pub struct RatingPredictor {
    max_chars: usize,
    default_rating: f64,
}

impl Default for RatingPredictor {
    fn default() -> Self {
        Self::new(DEFAULT_RATING)
    }
}

impl RatingPredictor {
    pub fn new(default_rating: f64) -> Self {
        Self {
            max_chars: SENTIMENT_MAX_CHARS,
            default_rating,
        }
    }

    /// Never fails: any engine error or malformed output yields `Estimate::Fallback`.
    pub async fn predict(
        &self,
        engine: &dyn SentimentEngine,
        text: &str,
        imputed: f64,
    ) -> Estimate<f64> {
        let prefix = truncate_chars(text, self.max_chars);
        let fallback = fallback_rating(imputed, self.default_rating);

        match engine.classify(prefix, self.max_chars).await {
            Ok(sentiment) => match sentiment_to_rating(&sentiment) {
                Some(rating) => {
                    debug!(
                        "Sentiment {} ({:.3}) -> rating {:.2}",
                        sentiment.label, sentiment.confidence, rating
                    );
                    Estimate::Inferred(rating)
                }
                None => Estimate::Fallback {
                    value: fallback,
                    reason: format!(
                        "malformed sentiment output: label={} confidence={}",
                        sentiment.label, sentiment.confidence
                    ),
                },
            },
            Err(e) => Estimate::Fallback {
                value: fallback,
                reason: e.to_string(),
            },
        }
    }
}
