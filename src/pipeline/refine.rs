use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::app::ports::{EntityExtractor, SentimentEngine};
use crate::error::{RefineryError, Result};
use crate::observability::metrics;
use crate::pipeline::processing::correction::CorrectionAgent;
use crate::pipeline::processing::masking::TextMasker;
use crate::pipeline::processing::rating::{fallback_rating, RatingPredictor};
use crate::pipeline::storage::{ArtifactDraft, ArtifactStore};
use crate::types::{NormalizedRecord, RefinedRecord};

/// A record that could not be refined and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub index: usize,
    pub persistence: bool,
    pub error: String,
}

/// Outcome of one batch. `refined` keeps input order and every entry has a durable artifact.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub refined: Vec<RefinedRecord>,
    pub failed: Vec<RecordFailure>,
    pub final_file: PathBuf,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.refined.len() + self.failed.len()
    }
}

/// Drives rating prediction, correction, masking and artifact storage per record.
pub struct Refiner {
    agent: Arc<CorrectionAgent>,
    artifacts: Arc<ArtifactStore>,
    predictor: RatingPredictor,
    masker: TextMasker,
    default_rating: f64,
}

impl Refiner {
    pub fn new(
        agent: Arc<CorrectionAgent>,
        artifacts: Arc<ArtifactStore>,
        masker: TextMasker,
        default_rating: f64,
    ) -> Self {
        Self {
            agent,
            artifacts,
            predictor: RatingPredictor::new(default_rating),
            masker,
            default_rating,
        }
    }

    pub fn agent(&self) -> &Arc<CorrectionAgent> {
        &self.agent
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.artifacts
    }

    /// Refine and persist one record.
    pub async fn refine_record(
        &self,
        record: &NormalizedRecord,
        sentiment: &dyn SentimentEngine,
        ner: &dyn EntityExtractor,
    ) -> Result<RefinedRecord> {
        let imputed = fallback_rating(record.rating_imputed, self.default_rating);

        let prediction = self.predictor.predict(sentiment, &record.text, imputed).await;
        if let Some(reason) = prediction.fallback_reason() {
            warn!("Sentiment fallback to imputed rating {:.2}: {}", imputed, reason);
            metrics::refine::sentiment_fallback();
        }
        let predicted = *prediction.value();

        // Table flush and artifact writes fsync; keep them off the async workers
        let agent = self.agent.clone();
        let actual = record.rating;
        let correction =
            tokio::task::spawn_blocking(move || agent.correct(predicted, imputed, actual)).await??;
        debug!(
            "predicted {:.2} state {} action {} -> refined {:.2} (reward {:.3})",
            predicted,
            correction.state.value(),
            correction.action.delta(),
            correction.refined,
            correction.reward
        );
        metrics::refine::reward_recorded(correction.reward);

        let masked = self.masker.mask(ner, &record.text).await;
        if masked.is_fallback() {
            metrics::refine::masking_fallback();
        }

        let draft = ArtifactDraft {
            original_text_masked: masked.into_value(),
            refined_rating: correction.refined,
            rating_imputed: imputed,
            original_rating: record.rating,
            timestamp: record.timestamp.clone(),
        };
        let artifacts = self.artifacts.clone();
        let stored = tokio::task::spawn_blocking(move || artifacts.store(draft)).await??;
        info!("Uploaded blob for {} to {}", stored.record.asset_id, stored.location);
        Ok(stored.record)
    }

    /// Refine records in input order, isolating per-record persistence failures,
    /// then replace the consolidated final file with the successfully stored records.
    pub async fn refine_batch(
        &self,
        records: &[NormalizedRecord],
        sentiment: &dyn SentimentEngine,
        ner: &dyn EntityExtractor,
    ) -> Result<BatchOutcome> {
        let started = Instant::now();
        let mut refined = Vec::with_capacity(records.len());
        let mut failed = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match self.refine_record(record, sentiment, ner).await {
                Ok(r) => {
                    metrics::refine::record_refined();
                    refined.push(r);
                }
                Err(e) => {
                    warn!("Record {} failed: {}", index, e);
                    metrics::refine::record_failed(e.is_persistence());
                    failed.push(RecordFailure {
                        index,
                        persistence: e.is_persistence(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let artifacts = self.artifacts.clone();
        let (final_file, refined) = tokio::task::spawn_blocking(move || {
            artifacts.write_final(&refined).map(|path| (path, refined))
        })
        .await?
        .map_err(|e| match e {
            RefineryError::Io(io) => RefineryError::ArtifactWrite {
                asset_id: "final_records".to_string(),
                reason: io.to_string(),
            },
            other => other,
        })?;

        metrics::refine::batch_processed(records.len(), started.elapsed().as_secs_f64());
        info!(
            "Refined {} of {} records ({} failed)",
            refined.len(),
            records.len(),
            failed.len()
        );

        Ok(BatchOutcome {
            refined,
            failed,
            final_file,
        })
    }
}
