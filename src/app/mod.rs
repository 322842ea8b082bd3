pub mod optimize_use_case;
pub mod ports;
pub mod retrieve_use_case;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::error::Result;
use crate::infra::{HttpEntityExtractor, HttpSentimentEngine};
use crate::pipeline::processing::correction::{AgentParams, CorrectionAgent};
use crate::pipeline::processing::masking::TextMasker;
use crate::pipeline::processing::normalize::RecordNormalizer;
use crate::pipeline::refine::Refiner;
use crate::pipeline::storage::{ArtifactStore, FsBlobStore, JsonFileTableStore};

pub use optimize_use_case::{OptimizeSummary, OptimizeUseCase};
pub use retrieve_use_case::{RecordPage, RetrieveUseCase};

/// Everything the CLI and the HTTP server share, wired from [`Settings`].
pub struct Services {
    pub optimize: OptimizeUseCase,
    pub retrieve: RetrieveUseCase,
    pub agent: Arc<CorrectionAgent>,
}

/// Wire the use cases onto the filesystem stores and HTTP engines.
/// Fails when the stored value table cannot be read.
pub fn bootstrap(settings: &Settings) -> Result<Services> {
    let timeout = Duration::from_secs(settings.engine_timeout_secs);
    let sentiment = Arc::new(HttpSentimentEngine::new(settings.sentiment_url.clone(), timeout)?);
    let ner = Arc::new(HttpEntityExtractor::new(settings.ner_url.clone(), timeout)?);

    let agent = Arc::new(CorrectionAgent::open(
        Box::new(JsonFileTableStore::new(settings.qtable_file())),
        AgentParams {
            alpha: settings.alpha,
            gamma: settings.gamma,
        },
    )?);
    let artifacts = Arc::new(ArtifactStore::new(
        Arc::new(FsBlobStore::new(settings.blob_dir.clone())),
        settings.final_file(),
    ));
    let refiner = Arc::new(Refiner::new(
        agent.clone(),
        artifacts,
        TextMasker::new(settings.fallback_names.clone()),
        settings.default_rating,
    ));

    Ok(Services {
        optimize: OptimizeUseCase::new(
            RecordNormalizer::new(settings.default_rating),
            refiner,
            sentiment,
            ner,
            settings.cleaned_file(),
            settings.metadata_file(),
        ),
        retrieve: RetrieveUseCase::new(settings.final_file()),
        agent,
    })
}
