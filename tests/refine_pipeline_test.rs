use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

use review_refinery::app::ports::{EntityExtractor, SentimentEngine};
use review_refinery::error::{RefineryError, Result as RefineryResult};
use review_refinery::pipeline::processing::correction::{
    Action, AgentParams, CorrectionAgent, RatingState,
};
use review_refinery::pipeline::processing::masking::TextMasker;
use review_refinery::pipeline::processing::normalize::RecordNormalizer;
use review_refinery::pipeline::refine::Refiner;
use review_refinery::pipeline::storage::json_file::read_json;
use review_refinery::pipeline::storage::{ArtifactStore, FsBlobStore, JsonFileTableStore};
use review_refinery::types::{EntitySpan, InputRecord, RefinedRecord, Sentiment};

struct FixedSentiment {
    label: &'static str,
    confidence: f64,
}

#[async_trait]
impl SentimentEngine for FixedSentiment {
    async fn classify(&self, _text: &str, _max_len: usize) -> RefineryResult<Sentiment> {
        Ok(Sentiment {
            label: self.label.to_string(),
            confidence: self.confidence,
        })
    }
}

/// Tags any capitalized word from a fixed list as a person.
struct KnownPeople(&'static [&'static str]);

#[async_trait]
impl EntityExtractor for KnownPeople {
    async fn extract(&self, text: &str) -> RefineryResult<Vec<EntitySpan>> {
        let mut spans = Vec::new();
        for name in self.0 {
            for (start, _) in text.match_indices(name) {
                spans.push(EntitySpan {
                    start,
                    end: start + name.len(),
                    label: "PERSON".to_string(),
                });
            }
        }
        Ok(spans)
    }
}

struct Offline;

#[async_trait]
impl SentimentEngine for Offline {
    async fn classify(&self, _text: &str, _max_len: usize) -> RefineryResult<Sentiment> {
        Err(RefineryError::Engine("offline".into()))
    }
}

#[async_trait]
impl EntityExtractor for Offline {
    async fn extract(&self, _text: &str) -> RefineryResult<Vec<EntitySpan>> {
        Err(RefineryError::Engine("offline".into()))
    }
}

fn open_refiner(storage: &Path) -> Result<Refiner> {
    let agent = CorrectionAgent::open(
        Box::new(JsonFileTableStore::new(storage.join("qtable.json"))),
        AgentParams::default(),
    )?;
    let artifacts = ArtifactStore::new(
        Arc::new(FsBlobStore::new(storage.join("blobs"))),
        storage.join("final_records.json"),
    );
    Ok(Refiner::new(
        Arc::new(agent),
        Arc::new(artifacts),
        TextMasker::default(),
        7.0,
    ))
}

fn input(text: &str, rating: Option<f64>) -> InputRecord {
    InputRecord {
        text: text.to_string(),
        rating,
        timestamp: Some("2025-05-01T12:00:00Z".to_string()),
    }
}

#[tokio::test]
async fn test_batch_persists_artifacts_and_final_file() -> Result<()> {
    let temp_dir = tempdir()?;
    let refiner = open_refiner(temp_dir.path())?;

    let cleaned = RecordNormalizer::default().normalize_batch(
        &[
            input("Maria recommended the café", Some(9.0)),
            input("Room was noisy", Some(2.0)),
            input("No rating here", None),
        ],
        chrono::Utc::now(),
    );
    let sentiment = FixedSentiment { label: "POSITIVE", confidence: 0.8 };
    let outcome = refiner
        .refine_batch(&cleaned, &sentiment, &KnownPeople(&["Maria"]))
        .await?;

    assert_eq!(outcome.refined.len(), 3);
    assert!(outcome.failed.is_empty());
    assert_eq!(outcome.refined[0].original_text_masked, "[MASKED] recommended the café");

    let ids: HashSet<_> = outcome.refined.iter().map(|r| r.asset_id.clone()).collect();
    assert_eq!(ids.len(), 3);
    for record in &outcome.refined {
        assert!(record.asset_id.starts_with("asset_"));
        assert_eq!(record.asset_id.len(), "asset_".len() + 8);
        assert!(record.refined_rating >= record.rating_imputed);
        assert!((0.0..=10.0).contains(&record.refined_rating));

        let blob = temp_dir.path().join("blobs").join(format!("{}.blob", record.asset_id));
        let stored: RefinedRecord = serde_json::from_slice(&std::fs::read(blob)?)?;
        assert_eq!(&stored, record);
    }

    let finals: Vec<RefinedRecord> = read_json(&outcome.final_file)?.unwrap_or_default();
    assert_eq!(finals, outcome.refined);

    // The record without a rating was imputed from the batch median
    assert_eq!(outcome.refined[2].rating_imputed, 5.5);
    assert_eq!(outcome.refined[2].original_rating, None);
    Ok(())
}

#[tokio::test]
async fn test_learning_survives_restart() -> Result<()> {
    let temp_dir = tempdir()?;
    let sentiment = FixedSentiment { label: "POSITIVE", confidence: 0.95 };
    let cleaned = RecordNormalizer::default()
        .normalize_batch(&[input("John loves the product", Some(9.0))], chrono::Utc::now());

    let before = {
        let refiner = open_refiner(temp_dir.path())?;
        refiner
            .refine_batch(&cleaned, &sentiment, &KnownPeople(&["John"]))
            .await?;
        refiner.agent().snapshot()
    };
    assert!(!before.is_empty());
    let learned = before.get(RatingState::from_rating(9.5), Action::Hold);
    assert!((learned - 0.475).abs() < 1e-12);

    let reopened = open_refiner(temp_dir.path())?;
    assert_eq!(reopened.agent().snapshot(), before);
    Ok(())
}

#[tokio::test]
async fn test_offline_engines_fall_back() -> Result<()> {
    let temp_dir = tempdir()?;
    let refiner = open_refiner(temp_dir.path())?;
    let cleaned = RecordNormalizer::default()
        .normalize_batch(&[input("Sarah and John helped", Some(4.0))], chrono::Utc::now());

    let outcome = refiner.refine_batch(&cleaned, &Offline, &Offline).await?;

    let record = &outcome.refined[0];
    assert_eq!(record.original_text_masked, "[MASKED] and [MASKED] helped");
    assert!(record.refined_rating >= 4.0);
    Ok(())
}

#[tokio::test]
async fn test_corrupt_table_refuses_to_start() -> Result<()> {
    let temp_dir = tempdir()?;
    std::fs::write(temp_dir.path().join("qtable.json"), "{ not json")?;
    let err = CorrectionAgent::open(
        Box::new(JsonFileTableStore::new(temp_dir.path().join("qtable.json"))),
        AgentParams::default(),
    )
    .err()
    .expect("corrupt table must not load");
    assert!(matches!(err, RefineryError::CorruptTable { .. }));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_batches_share_one_table() -> Result<()> {
    let temp_dir = tempdir()?;
    let refiner = Arc::new(open_refiner(temp_dir.path())?);
    let cleaned = RecordNormalizer::default().normalize_batch(
        &(0..8).map(|i| input(&format!("review {i}"), Some(6.0))).collect::<Vec<_>>(),
        chrono::Utc::now(),
    );

    let mut handles = Vec::new();
    for _ in 0..4 {
        let refiner = refiner.clone();
        let cleaned = cleaned.clone();
        handles.push(tokio::spawn(async move {
            let sentiment = FixedSentiment { label: "NEGATIVE", confidence: 0.4 };
            refiner.refine_batch(&cleaned, &sentiment, &Offline).await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let outcome = handle.await??;
        assert_eq!(outcome.refined.len(), 8);
        for r in outcome.refined {
            assert!(ids.insert(r.asset_id));
        }
    }
    assert_eq!(ids.len(), 32);

    let on_disk = JsonFileTableStore::new(temp_dir.path().join("qtable.json"));
    let reloaded = CorrectionAgent::open(Box::new(on_disk), AgentParams::default())?;
    assert_eq!(reloaded.snapshot(), refiner.agent().snapshot());
    Ok(())
}
