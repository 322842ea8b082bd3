use tracing::warn;

use crate::app::ports::EntityExtractor;
use crate::constants::{default_fallback_names, PERSON_LABELS, REDACTION_TOKEN};
use crate::types::{EntitySpan, Estimate};

pub fn is_person_label(label: &str) -> bool {
    PERSON_LABELS.iter().any(|p| label.eq_ignore_ascii_case(p))
}

/// Replace every person span with `token`, keeping all other bytes in order.
///
/// Spans that are out of range, split a character or overlap an earlier span are ignored.
pub fn mask_spans(text: &str, spans: &[EntitySpan], token: &str) -> String {
    let mut persons: Vec<&EntitySpan> = spans
        .iter()
        .filter(|s| is_person_label(&s.label))
        .filter(|s| s.start < s.end && text.get(s.start..s.end).is_some())
        .collect();
    if persons.is_empty() {
        return text.to_string();
    }
    persons.sort_by_key(|s| (s.start, s.end));

    let mut masked = String::with_capacity(text.len());
    let mut last = 0;
    for span in persons {
        if span.start < last {
            continue;
        }
        masked.push_str(&text[last..span.start]);
        masked.push_str(token);
        last = span.end;
    }
    masked.push_str(&text[last..]);
    masked
}

/// Masks person names using the NER engine.
///
/// When the engine fails the masker only replaces a fixed list of known names literally.
/// That degradation path is not a general substitute for entity recognition.
pub struct TextMasker {
    fallback_names: Vec<String>,
    token: String,
}

impl Default for TextMasker {
    fn default() -> Self {
        Self::new(default_fallback_names())
    }
}

impl TextMasker {
    pub fn new(fallback_names: Vec<String>) -> Self {
        Self {
            fallback_names: fallback_names.into_iter().filter(|n| !n.is_empty()).collect(),
            token: REDACTION_TOKEN.to_string(),
        }
    }

    pub fn mask_literal(&self, text: &str) -> String {
        self.fallback_names
            .iter()
            .fold(text.to_string(), |acc, name| acc.replace(name.as_str(), &self.token))
    }

    pub async fn mask(&self, extractor: &dyn EntityExtractor, text: &str) -> Estimate<String> {
        match extractor.extract(text).await {
            Ok(spans) => Estimate::Inferred(mask_spans(text, &spans, &self.token)),
            Err(e) => {
                warn!("Entity extraction failed, masking known names only: {}", e);
                Estimate::Fallback {
                    value: self.mask_literal(text),
                    reason: e.to_string(),
                }
            }
        }
    }
}
