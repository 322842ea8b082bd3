use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::ports::EntityExtractor;
use crate::types::NormalizedRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub text: String,
    pub label: String,
}

/// Entities found in one record of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub index: usize,
    pub entities: Vec<EntityMention>,
    pub original_text: String,
}

/// Run the extractor over every record. A failed extraction yields no entities for that record.
pub async fn extract_metadata(
    extractor: &dyn EntityExtractor,
    records: &[NormalizedRecord],
) -> Vec<RecordMetadata> {
    let mut metadata = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let entities = match extractor.extract(&record.text).await {
            Ok(spans) => spans
                .into_iter()
                .filter_map(|span| {
                    record.text.get(span.start..span.end).map(|t| EntityMention {
                        text: t.to_string(),
                        label: span.label,
                    })
                })
                .collect(),
            Err(e) => {
                warn!("Entity extraction failed for record {}: {}", index, e);
                Vec::new()
            }
        };
        metadata.push(RecordMetadata {
            index,
            entities,
            original_text: record.text.clone(),
        });
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RefineryError, Result};
    use crate::types::EntitySpan;
    use async_trait::async_trait;

    struct FirstWordPerson;

    #[async_trait]
    impl EntityExtractor for FirstWordPerson {
        async fn extract(&self, text: &str) -> Result<Vec<EntitySpan>> {
            if text.starts_with('!') {
                return Err(RefineryError::Engine("unsupported input".into()));
            }
            let end = text.find(' ').unwrap_or(text.len());
            Ok(vec![
                EntitySpan { start: 0, end, label: "PERSON".into() },
                EntitySpan { start: 0, end: text.len() + 5, label: "ORG".into() },
            ])
        }
    }

    fn normalized(text: &str) -> NormalizedRecord {
        NormalizedRecord {
            text: text.to_string(),
            rating: None,
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            rating_imputed: 7.0,
        }
    }

    #[tokio::test]
    async fn test_extract_metadata_per_record() {
        let records = vec![normalized("Sarah enjoyed it"), normalized("!broken"), normalized("Ok")];
        let metadata = extract_metadata(&FirstWordPerson, &records).await;

        assert_eq!(metadata.len(), 3);
        assert_eq!(
            metadata[0].entities,
            vec![EntityMention { text: "Sarah".into(), label: "PERSON".into() }]
        );
        assert!(metadata[1].entities.is_empty());
        assert_eq!(metadata[2].index, 2);
        assert_eq!(metadata[2].original_text, "Ok");
    }
}
