use jsonschema::JSONSchema;
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::{RefineryError, Result};
use crate::types::InputRecord;

const RECORD_SCHEMA: &str = include_str!("../../schemas/record.v1.json");

/// One schema violation, addressed by JSON pointer into the submitted batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn compiled_schema() -> Result<&'static JSONSchema> {
    static SCHEMA: OnceLock<std::result::Result<JSONSchema, String>> = OnceLock::new();
    SCHEMA
        .get_or_init(|| {
            let schema_json: serde_json::Value =
                serde_json::from_str(RECORD_SCHEMA).map_err(|e| e.to_string())?;
            let schema_static: &'static serde_json::Value = Box::leak(Box::new(schema_json));
            JSONSchema::options()
                .compile(schema_static)
                .map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|e| RefineryError::Config(format!("record schema failed to compile: {}", e)))
}

/// Collect every schema violation in `instance`. Empty means valid.
pub fn schema_errors(instance: &serde_json::Value) -> Result<Vec<FieldError>> {
    let schema = compiled_schema()?;
    let errors = match schema.validate(instance) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| FieldError {
                field: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect(),
    };
    Ok(errors)
}

/// Validate a submitted batch against the record schema and decode it.
pub fn validate_records(instance: &serde_json::Value) -> Result<Vec<InputRecord>> {
    let errors = schema_errors(instance)?;
    if let Some(first) = errors.first() {
        return Err(RefineryError::Validation(format!(
            "{} ({} violation(s), first at '{}')",
            first.message,
            errors.len(),
            first.field
        )));
    }
    Ok(serde_json::from_value(instance.clone())?)
}
