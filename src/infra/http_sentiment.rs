use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::app::ports::SentimentEngine;
use crate::error::{RefineryError, Result};
use crate::types::Sentiment;

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

/// Classifier servers answer either a flat list or one list per input.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Flat(Vec<LabelScore>),
    Nested(Vec<Vec<LabelScore>>),
}

impl ClassifyResponse {
    fn top(self) -> Option<LabelScore> {
        let scores = match self {
            ClassifyResponse::Flat(v) => v,
            ClassifyResponse::Nested(v) => v.into_iter().next().unwrap_or_default(),
        };
        scores
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}

/// Sentiment classifier reached over HTTP.
pub struct HttpSentimentEngine {
    client: reqwest::Client,
    url: Option<String>,
}

impl HttpSentimentEngine {
    /// `url = None` builds an adapter that reports itself unavailable on every call.
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl SentimentEngine for HttpSentimentEngine {
    async fn classify(&self, text: &str, _max_len: usize) -> Result<Sentiment> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| RefineryError::Engine("sentiment engine not configured".to_string()))?;

        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "inputs": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RefineryError::Engine(format!(
                "sentiment engine returned HTTP {}",
                resp.status()
            )));
        }

        let body: ClassifyResponse = resp.json().await?;
        let top = body
            .top()
            .ok_or_else(|| RefineryError::Engine("sentiment engine returned no labels".to_string()))?;
        Ok(Sentiment {
            label: top.label,
            confidence: top.score,
        })
    }
}
