use serde::Serialize;

use crate::access_levels::{AccessLevelRequest, AccessLevelResponse, AccessLevelTable};
use crate::domain::{AccessType, CallerContext, DataUseConditions, Dataset};
use crate::error::BeaconError;

// Listings are ordered by internal id; assembly matching ignores case.
pub trait DatasetStore: Send + Sync {
    fn find_by_stable_id(&self, stable_id: &str) -> Option<Dataset>;
    fn find_all_by_assembly(&self, assembly_id: &str) -> Vec<Dataset>;
    fn find_all(&self) -> Vec<Dataset>;
    fn access_levels(&self) -> AccessLevelTable;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: String,
    pub assembly_id: String,
    pub access_type: AccessType,
    pub authorized: bool,
    pub variant_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_use_conditions: Option<DataUseConditions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetListing {
    pub datasets: Vec<DatasetSummary>,
    pub info: ListingInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingInfo {
    pub size: u64,
}

pub struct AccessController<'a> {
    store: &'a dyn DatasetStore,
}

impl<'a> AccessController<'a> {
    pub fn new(store: &'a dyn DatasetStore) -> Self {
        Self { store }
    }

    // Explicit ids are checked in order (existence, tier, assembly); the first failure aborts.
    pub fn resolve(
        &self,
        stable_ids: &[String],
        assembly_id: &str,
        caller: &CallerContext,
    ) -> Result<Vec<Dataset>, BeaconError> {
        if stable_ids.is_empty() {
            let scope = self
                .store
                .find_all_by_assembly(assembly_id)
                .into_iter()
                .filter(|dataset| caller.can_access(dataset))
                .collect::<Vec<_>>();
            tracing::debug!(assembly = assembly_id, datasets = scope.len(), "implicit dataset scope");
            return Ok(scope);
        }

        let mut scope = Vec::with_capacity(stable_ids.len());
        for stable_id in stable_ids {
            let dataset = self
                .store
                .find_by_stable_id(stable_id)
                .ok_or_else(|| BeaconError::DatasetNotFound(stable_id.clone()))?;

            if !caller.can_access(&dataset) {
                let message = match dataset.access_type {
                    AccessType::Registered => {
                        format!("Unauthenticated users cannot access dataset {stable_id}")
                    }
                    _ => format!("Dataset {stable_id} requires an explicit access grant"),
                };
                return Err(BeaconError::Unauthorized(message));
            }

            if !dataset.matches_assembly(assembly_id) {
                return Err(BeaconError::validation(format!(
                    "The assemblyId of this dataset ({}) and the provided value ({assembly_id}) do not match",
                    dataset.assembly_id
                )));
            }
            scope.push(dataset);
        }
        Ok(scope)
    }

    pub fn list_datasets(
        &self,
        assembly_id: Option<&str>,
        caller: &CallerContext,
    ) -> DatasetListing {
        let datasets = match assembly_id.map(str::trim).filter(|a| !a.is_empty()) {
            Some(assembly) => self.store.find_all_by_assembly(assembly),
            None => self.store.find_all(),
        };
        let size = datasets.iter().map(|d| d.variant_count).sum();
        let datasets = datasets
            .into_iter()
            .map(|dataset| DatasetSummary {
                authorized: caller.can_access(&dataset),
                id: dataset.stable_id,
                assembly_id: dataset.assembly_id,
                access_type: dataset.access_type,
                variant_count: dataset.variant_count,
                description: dataset.description,
                data_use_conditions: dataset.data_use_conditions,
            })
            .collect();
        DatasetListing {
            datasets,
            info: ListingInfo { size },
        }
    }

    pub fn list_access_levels(
        &self,
        request: &AccessLevelRequest,
    ) -> Result<AccessLevelResponse, BeaconError> {
        if let Some(unknown) = request
            .dataset_ids
            .iter()
            .find(|id| self.store.find_by_stable_id(id).is_none())
        {
            return Err(BeaconError::DatasetNotFound(unknown.clone()));
        }
        self.store.access_levels().list(request)
    }
}
