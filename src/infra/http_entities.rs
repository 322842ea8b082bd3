use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::app::ports::EntityExtractor;
use crate::error::{RefineryError, Result};
use crate::types::EntitySpan;

#[derive(Debug, Deserialize)]
struct CharSpan {
    start: usize,
    end: usize,
    #[serde(alias = "entity_group")]
    label: String,
}

/// Map character offsets onto byte offsets of `text`. Out-of-range spans are dropped.
fn to_byte_spans(text: &str, spans: Vec<CharSpan>) -> Vec<EntitySpan> {
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());

    spans
        .into_iter()
        .filter_map(|s| {
            let start = *boundaries.get(s.start)?;
            let end = *boundaries.get(s.end)?;
            (start < end).then(|| EntitySpan {
                start,
                end,
                label: s.label,
            })
        })
        .collect()
}

/// Named-entity recognizer reached over HTTP.
pub struct HttpEntityExtractor {
    client: reqwest::Client,
    url: Option<String>,
}

impl HttpEntityExtractor {
    /// `url = None` builds an adapter that reports itself unavailable on every call.
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl EntityExtractor for HttpEntityExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| RefineryError::Engine("ner engine not configured".to_string()))?;

        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(RefineryError::Engine(format!(
                "ner engine returned HTTP {}",
                resp.status()
            )));
        }

        let spans: Vec<CharSpan> = resp.json().await?;
        Ok(to_byte_spans(text, spans))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_span(start: usize, end: usize) -> CharSpan {
        CharSpan { start, end, label: "PERSON".to_string() }
    }

    #[test]
    fn test_ascii_offsets_are_unchanged() {
        let spans = to_byte_spans("John likes it", vec![char_span(0, 4)]);
        assert_eq!(spans, vec![EntitySpan { start: 0, end: 4, label: "PERSON".into() }]);
    }

    #[test]
    fn test_multibyte_offsets_are_converted() {
        // "Zoë " is 4 chars but 5 bytes
        let text = "Zoë Ann sings";
        let spans = to_byte_spans(text, vec![char_span(4, 7)]);
        assert_eq!(&text[spans[0].start..spans[0].end], "Ann");
    }

    #[test]
    fn test_out_of_range_and_empty_spans_dropped() {
        let spans = to_byte_spans("abc", vec![char_span(1, 9), char_span(2, 2), char_span(0, 3)]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, 3);
    }

    #[test]
    fn test_entity_group_alias() {
        let s: CharSpan =
            serde_json::from_str(r#"{"start":0,"end":4,"entity_group":"PER"}"#).unwrap();
        assert_eq!(s.label, "PER");
    }

    #[tokio::test]
    async fn test_unconfigured_extractor_is_unavailable() {
        let ner = HttpEntityExtractor::new(None, Duration::from_secs(1)).unwrap();
        assert!(matches!(ner.extract("John").await, Err(RefineryError::Engine(_))));
    }
}
