use serde::Serialize;
use std::path::PathBuf;

use crate::constants::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
use crate::error::{RefineryError, Result};
use crate::pipeline::storage::json_file::read_json;

/// One page of the consolidated final records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPage {
    pub records: Vec<serde_json::Value>,
    pub total_records: usize,
    pub total_pages: usize,
    pub page: usize,
    pub per_page: usize,
}

/// Use case for paging through the consolidated final file
pub struct RetrieveUseCase {
    final_file: PathBuf,
}

impl RetrieveUseCase {
    pub fn new(final_file: impl Into<PathBuf>) -> Self {
        Self {
            final_file: final_file.into(),
        }
    }

    /// Check bounds and apply the default page size.
    pub fn page_params(page: Option<usize>, per_page: Option<usize>) -> Result<(usize, usize)> {
        let page = page.unwrap_or(1);
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE);
        if page < 1 {
            return Err(RefineryError::Validation("page must be >= 1".to_string()));
        }
        if !(1..=MAX_PER_PAGE).contains(&per_page) {
            return Err(RefineryError::Validation(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE
            )));
        }
        Ok((page, per_page))
    }

    /// `Ok(None)` when no batch has produced a final file yet.
    /// A page past the end is clamped to the last page.
    pub fn execute(&self, page: usize, per_page: usize) -> Result<Option<RecordPage>> {
        let (page, per_page) = Self::page_params(Some(page), Some(per_page))?;
        let Some(all) = read_json::<Vec<serde_json::Value>>(&self.final_file)? else {
            return Ok(None);
        };

        let total = all.len();
        let total_pages = total.div_ceil(per_page);
        let page = if total_pages > 0 { page.min(total_pages) } else { page };

        let records = all
            .into_iter()
            .skip(page.saturating_sub(1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Ok(Some(RecordPage {
            records,
            total_records: total,
            total_pages,
            page,
            per_page,
        }))
    }
}
