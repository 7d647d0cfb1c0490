use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::domain::{AlleleQuery, Dataset};
use crate::error::BeaconError;
use crate::filters::FilterTerm;

pub mod csvs;
pub mod local;
pub mod opencga;

pub use csvs::CsvsHttpClient;
pub use local::{InMemoryVariantStore, LocalBackend, LocalSearch, LocalVariantStore, VariantSummary};
pub use opencga::OpencgaHttpClient;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendRow {
    pub dataset_id: String,
    pub frequency: Option<f64>,
    pub variant_count: u64,
    pub call_count: u64,
    pub sample_count: u64,
}

#[derive(Debug, Clone)]
pub struct DatasetFailure {
    pub dataset_id: String,
    pub error: BeaconError,
}

#[derive(Debug, Clone, Default)]
pub struct BackendOutcome {
    pub rows: Vec<BackendRow>,
    pub failures: Vec<DatasetFailure>,
}

impl BackendOutcome {
    pub fn merge(mut self, other: BackendOutcome) -> Self {
        self.rows.extend(other.rows);
        self.failures.extend(other.failures);
        self
    }

    pub(crate) fn from_dataset_results(
        scope: &[Dataset],
        results: Vec<Result<Option<BackendRow>, BeaconError>>,
    ) -> Self {
        let mut outcome = BackendOutcome::default();
        for (dataset, result) in scope.iter().zip(results) {
            match result {
                Ok(Some(row)) => outcome.rows.push(row),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(dataset = %dataset.stable_id, %error, "dataset query failed");
                    outcome.failures.push(DatasetFailure {
                        dataset_id: dataset.stable_id.clone(),
                        error,
                    });
                }
            }
        }
        outcome
    }
}

pub trait VariantBackend: Send + Sync {
    fn name(&self) -> &str;

    // An `Err` means the backend as a whole could not answer.
    fn query(
        &self,
        query: &AlleleQuery,
        scope: &[Dataset],
        filters: &[FilterTerm],
    ) -> Result<BackendOutcome, BeaconError>;
}

/// Runs `work` over `inputs` on worker threads, one result slot per input.
///
/// Slots not filled before `timeout` elapses become [`BeaconError::BackendTimeout`];
/// their workers are left to finish in the background.
pub fn fan_out<I, T, F>(
    label: &str,
    inputs: Vec<I>,
    timeout: Duration,
    work: F,
) -> Vec<Result<T, BeaconError>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Result<T, BeaconError> + Send + Sync + 'static,
{
    let count = inputs.len();
    let work = Arc::new(work);
    let (tx, rx) = mpsc::channel();
    for (slot, input) in inputs.into_iter().enumerate() {
        let tx = tx.clone();
        let work = Arc::clone(&work);
        thread::spawn(move || {
            let _ = tx.send((slot, work(input)));
        });
    }
    drop(tx);

    let deadline = Instant::now() + timeout;
    let mut slots: Vec<Option<Result<T, BeaconError>>> = (0..count).map(|_| None).collect();
    let mut filled = 0usize;
    while filled < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((slot, result)) => {
                slots[slot] = Some(result);
                filled += 1;
            }
            Err(_) => break,
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(BeaconError::BackendTimeout {
                    backend: label.to_string(),
                    seconds: timeout.as_secs(),
                })
            })
        })
        .collect()
}
