use std::collections::HashMap;

use serde::Serialize;

use crate::backend::{BackendOutcome, BackendRow};
use crate::domain::IncludeDatasetResponses;
use crate::error::ErrorPayload;
use crate::handover::Handover;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetAlleleResponse {
    pub dataset_id: String,
    pub exists: bool,
    pub frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dataset_handover: Vec<Handover>,
}

impl DatasetAlleleResponse {
    fn hit(row: &BackendRow) -> Self {
        Self {
            dataset_id: row.dataset_id.clone(),
            exists: true,
            frequency: row.frequency,
            variant_count: Some(row.variant_count),
            call_count: Some(row.call_count),
            sample_count: Some(row.sample_count),
            error: None,
            dataset_handover: Vec::new(),
        }
    }

    fn miss(dataset_id: &str, error: Option<ErrorPayload>) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            exists: false,
            frequency: None,
            variant_count: None,
            call_count: None,
            sample_count: None,
            error,
            dataset_handover: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub exists: bool,
    pub dataset_responses: Vec<DatasetAlleleResponse>,
}

/// Folds backend rows into the per-dataset answer list.
///
/// Hits come first, in the order the backends returned them, with rows of the same
/// dataset from several backends merged into one. Misses follow in scope order; a
/// dataset whose query failed is reported as a miss carrying its error and is dropped
/// only under `NONE`. `exists` is independent of the include mode.
pub fn aggregate(
    scope: &[String],
    outcome: &BackendOutcome,
    include: IncludeDatasetResponses,
) -> Aggregation {
    let exists = !outcome.rows.is_empty();
    let mut dataset_responses = Vec::new();

    if include.includes_hits() {
        let hits = merge_rows(&outcome.rows);
        dataset_responses.extend(hits.iter().map(DatasetAlleleResponse::hit));
    }

    if include != IncludeDatasetResponses::None {
        let failures: HashMap<&str, ErrorPayload> = outcome
            .failures
            .iter()
            .map(|failure| (failure.dataset_id.as_str(), ErrorPayload::from(&failure.error)))
            .collect();
        for dataset_id in scope {
            if outcome.rows.iter().any(|row| &row.dataset_id == dataset_id) {
                continue;
            }
            match failures.get(dataset_id.as_str()) {
                Some(error) => dataset_responses
                    .push(DatasetAlleleResponse::miss(dataset_id, Some(error.clone()))),
                None if include.includes_misses() => {
                    dataset_responses.push(DatasetAlleleResponse::miss(dataset_id, None))
                }
                None => {}
            }
        }
    }

    Aggregation {
        exists,
        dataset_responses,
    }
}

// Counts add up; a frequency survives only when every merged row reports the same one.
fn merge_rows(rows: &[BackendRow]) -> Vec<BackendRow> {
    let mut merged: Vec<BackendRow> = Vec::with_capacity(rows.len());
    for row in rows {
        match merged.iter_mut().find(|seen| seen.dataset_id == row.dataset_id) {
            Some(seen) => {
                if seen.frequency != row.frequency {
                    seen.frequency = None;
                }
                seen.variant_count = seen.variant_count.saturating_add(row.variant_count);
                seen.call_count = seen.call_count.saturating_add(row.call_count);
                seen.sample_count = seen.sample_count.saturating_add(row.sample_count);
            }
            None => merged.push(row.clone()),
        }
    }
    merged
}
