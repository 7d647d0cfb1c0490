use std::collections::{BTreeMap, HashMap};
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{BackendOutcome, BackendRow, VariantBackend};
use crate::domain::{AlleleQuery, Dataset};
use crate::error::BeaconError;
use crate::filters::{FilterTerm, FilterValue, and_clause};

#[derive(Debug, Clone)]
pub struct LocalSearch<'a> {
    pub query: &'a AlleleQuery,
    pub dataset_ids: Vec<u32>,
    pub filters: &'a [FilterTerm],
}

impl LocalSearch<'_> {
    pub fn filter_clause(&self) -> Option<String> {
        and_clause(self.filters)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub dataset_id: u32,
    pub frequency: Option<f64>,
    pub variant_count: u64,
    pub call_count: u64,
    pub sample_count: u64,
}

pub trait LocalVariantStore: Send + Sync {
    // At most one summary per dataset; datasets without a match are absent.
    fn search(&self, search: &LocalSearch<'_>) -> Result<Vec<VariantSummary>, BeaconError>;
}

pub struct LocalBackend<S: LocalVariantStore> {
    store: S,
}

impl<S: LocalVariantStore> LocalBackend<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: LocalVariantStore> VariantBackend for LocalBackend<S> {
    fn name(&self) -> &str {
        "local"
    }

    fn query(
        &self,
        query: &AlleleQuery,
        scope: &[Dataset],
        filters: &[FilterTerm],
    ) -> Result<BackendOutcome, BeaconError> {
        if scope.is_empty() {
            return Ok(BackendOutcome::default());
        }
        let search = LocalSearch {
            query,
            dataset_ids: scope.iter().map(|dataset| dataset.id).collect(),
            filters,
        };
        tracing::debug!(
            datasets = ?search.dataset_ids,
            filters = ?search.filter_clause(),
            "local.search"
        );
        let stable_ids: HashMap<u32, &str> = scope
            .iter()
            .map(|dataset| (dataset.id, dataset.stable_id.as_str()))
            .collect();

        let rows = self
            .store
            .search(&search)?
            .into_iter()
            .filter_map(|summary| {
                let stable_id = stable_ids.get(&summary.dataset_id)?;
                Some(BackendRow {
                    dataset_id: stable_id.to_string(),
                    frequency: summary.frequency,
                    variant_count: summary.variant_count,
                    call_count: summary.call_count,
                    sample_count: summary.sample_count,
                })
            })
            .collect();
        Ok(BackendOutcome {
            rows,
            failures: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub dataset_id: u32,
    pub chromosome: String,
    pub start: u64,
    #[serde(default)]
    pub end: Option<u64>,
    pub reference: String,
    pub alternate: String,
    #[serde(default)]
    pub variant_type: Option<String>,
    #[serde(default)]
    pub frequency: Option<f64>,
    #[serde(default)]
    pub call_count: u64,
    #[serde(default)]
    pub sample_count: u64,
    // Sample-table columns the ontology filters are evaluated against.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl VariantRecord {
    fn end(&self) -> u64 {
        self.end.unwrap_or_else(|| {
            let length = u64::try_from(self.reference.len().max(1)).unwrap_or(u64::MAX);
            self.start.saturating_add(length)
        })
    }

    fn passes(&self, filters: &[FilterTerm]) -> bool {
        filters.iter().all(|filter| {
            let Some(actual) = self.attributes.get(&filter.column) else {
                return false;
            };
            match (&filter.value, actual) {
                (FilterValue::Integer(expected), Value::Number(n)) => n
                    .as_f64()
                    .is_some_and(|n| filter.operator.compare(&n, &(*expected as f64))),
                (FilterValue::Integer(expected), Value::String(s)) => s
                    .parse::<i64>()
                    .is_ok_and(|n| filter.operator.compare(&n, expected)),
                (FilterValue::Text(expected), Value::String(s)) => {
                    filter.operator.compare(&s.as_str(), &expected.as_str())
                }
                _ => false,
            }
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryVariantStore {
    records: Vec<VariantRecord>,
}

impl InMemoryVariantStore {
    pub fn new(records: Vec<VariantRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, BeaconError> {
        let to_err = |message: String| BeaconError::VariantFile {
            path: path.to_path_buf(),
            message,
        };
        let content = fs::read_to_string(path).map_err(|err| to_err(err.to_string()))?;
        let records: Vec<VariantRecord> =
            serde_json::from_str(&content).map_err(|err| to_err(err.to_string()))?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LocalVariantStore for InMemoryVariantStore {
    fn search(&self, search: &LocalSearch<'_>) -> Result<Vec<VariantSummary>, BeaconError> {
        let query = search.query;
        let mut summaries: Vec<VariantSummary> = Vec::new();
        for &dataset_id in &search.dataset_ids {
            let matched = self
                .records
                .iter()
                .filter(|record| record.dataset_id == dataset_id)
                .filter(|record| record.chromosome.eq_ignore_ascii_case(&query.chromosome))
                .filter(|record| query.position_matches(record.start, record.end()))
                .filter(|record| {
                    query.allele_matches(
                        &record.reference,
                        &record.alternate,
                        record.variant_type.as_deref(),
                    )
                })
                .filter(|record| record.passes(search.filters))
                .collect::<Vec<_>>();

            let Some(first) = matched.first() else {
                continue;
            };
            summaries.push(VariantSummary {
                dataset_id,
                frequency: if matched.len() == 1 {
                    first.frequency
                } else {
                    None
                },
                variant_count: matched.len() as u64,
                call_count: matched.iter().map(|r| r.call_count).sum(),
                sample_count: matched.iter().map(|r| r.sample_count).sum(),
            });
        }
        Ok(summaries)
    }
}
