use chrono::{DateTime, SecondsFormat, Utc};

use crate::constants::{DEFAULT_RATING, MAX_RATING, MIN_RATING};
use crate::types::{InputRecord, NormalizedRecord};

/// Median of the finite values, averaging the middle pair for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.total_cmp(b));
    let mid = finite.len() / 2;
    if finite.len() % 2 == 0 {
        Some((finite[mid - 1] + finite[mid]) / 2.0)
    } else {
        Some(finite[mid])
    }
}

/// Fills timestamps, drops non-finite ratings and imputes a rating per record.
pub struct RecordNormalizer {
    default_rating: f64,
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_RATING)
    }
}

impl RecordNormalizer {
    pub fn new(default_rating: f64) -> Self {
        Self { default_rating }
    }

    /// A record keeps its own rating as the imputed value; records without one get the
    /// batch median, or the default when the batch has no ratings at all.
    pub fn normalize_batch(&self, records: &[InputRecord], now: DateTime<Utc>) -> Vec<NormalizedRecord> {
        let observed: Vec<f64> = records.iter().filter_map(|r| r.rating).collect();
        let batch_median = median(&observed).unwrap_or(self.default_rating);
        let now_iso = now.to_rfc3339_opts(SecondsFormat::Micros, true);

        records
            .iter()
            .map(|record| {
                let rating = record.rating.filter(|r| r.is_finite());
                let timestamp = record
                    .timestamp
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| now_iso.clone());
                NormalizedRecord {
                    text: record.text.clone(),
                    rating,
                    timestamp,
                    rating_imputed: rating
                        .unwrap_or(batch_median)
                        .clamp(MIN_RATING, MAX_RATING),
                }
            })
            .collect()
    }
}
