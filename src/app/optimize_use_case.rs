use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::app::ports::{EntityExtractor, SentimentEngine};
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::processing::metadata::extract_metadata;
use crate::pipeline::processing::normalize::RecordNormalizer;
use crate::pipeline::refine::Refiner;
use crate::pipeline::storage::json_file::write_json_atomic;
use crate::types::InputRecord;

/// Result of one optimize run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizeSummary {
    pub batch_id: String,
    pub total_records: usize,
    pub refined: usize,
    pub failed: usize,
    pub final_file: PathBuf,
}

/// Use case for the full workflow: normalize, extract metadata, refine
pub struct OptimizeUseCase {
    normalizer: RecordNormalizer,
    refiner: Arc<Refiner>,
    sentiment: Arc<dyn SentimentEngine>,
    ner: Arc<dyn EntityExtractor>,
    cleaned_file: PathBuf,
    metadata_file: PathBuf,
}

impl OptimizeUseCase {
    pub fn new(
        normalizer: RecordNormalizer,
        refiner: Arc<Refiner>,
        sentiment: Arc<dyn SentimentEngine>,
        ner: Arc<dyn EntityExtractor>,
        cleaned_file: impl Into<PathBuf>,
        metadata_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            normalizer,
            refiner,
            sentiment,
            ner,
            cleaned_file: cleaned_file.into(),
            metadata_file: metadata_file.into(),
        }
    }

    pub fn refiner(&self) -> &Arc<Refiner> {
        &self.refiner
    }

    pub async fn execute(&self, records: &[InputRecord]) -> Result<OptimizeSummary> {
        let batch_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("optimize", batch_id = %batch_id, records = records.len());
        self.run(batch_id, records).instrument(span).await
    }

    async fn run(&self, batch_id: String, records: &[InputRecord]) -> Result<OptimizeSummary> {
        info!("Received {} records", records.len());

        let cleaned = self.normalizer.normalize_batch(records, Utc::now());
        let imputed = cleaned.iter().filter(|r| r.rating.is_none()).count();
        metrics::normalize::batch_normalized(cleaned.len(), imputed);
        write_json_atomic(&self.cleaned_file, &cleaned)?;
        info!("Step 1: cleaned data written to {}", self.cleaned_file.display());

        let metadata = extract_metadata(self.ner.as_ref(), &cleaned).await;
        write_json_atomic(&self.metadata_file, &metadata)?;
        info!("Step 2: metadata extracted to {}", self.metadata_file.display());

        let outcome = self
            .refiner
            .refine_batch(&cleaned, self.sentiment.as_ref(), self.ner.as_ref())
            .await?;
        info!(
            "Step 3: refinement complete, final data written to {}",
            outcome.final_file.display()
        );

        Ok(OptimizeSummary {
            batch_id,
            total_records: outcome.total(),
            refined: outcome.refined.len(),
            failed: outcome.failed.len(),
            final_file: outcome.final_file,
        })
    }
}
