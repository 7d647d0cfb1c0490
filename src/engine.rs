use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::access::{AccessController, DatasetListing, DatasetStore};
use crate::access_levels::{AccessLevelRequest, AccessLevelResponse};
use crate::aggregate::{DatasetAlleleResponse, aggregate};
use crate::backend::{BackendOutcome, DatasetFailure, VariantBackend, fan_out};
use crate::domain::{AlleleQuery, CallerContext, Dataset, RawAlleleRequest};
use crate::error::{BeaconError, ErrorPayload};
use crate::filters::{FilterTerm, FilterTranslator, FilteringTerm, OntologyLookup};
use crate::handover::{AnnotationResolver, DatasetHandover, Handover, HandoverEnricher, dataset_handovers};
use crate::validate::validate;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const BACKEND_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlleleResponse {
    pub exists: bool,
    pub allele_request: RawAlleleRequest,
    pub dataset_allele_responses: Vec<DatasetAlleleResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    pub beacon_handover: Vec<Handover>,
}

impl AlleleResponse {
    fn failed(allele_request: RawAlleleRequest, error: &BeaconError) -> Self {
        Self {
            exists: false,
            allele_request,
            dataset_allele_responses: Vec::new(),
            error: Some(ErrorPayload::from(error)),
            beacon_handover: Vec::new(),
        }
    }
}

// `datasets: None` serves every dataset.
pub struct BackendBinding {
    pub backend: Arc<dyn VariantBackend>,
    pub datasets: Option<BTreeSet<String>>,
}

impl BackendBinding {
    pub fn all(backend: Arc<dyn VariantBackend>) -> Self {
        Self {
            backend,
            datasets: None,
        }
    }

    fn scope(&self, scope: &[Dataset]) -> Vec<Dataset> {
        scope
            .iter()
            .filter(|dataset| match &self.datasets {
                Some(ids) => ids.contains(&dataset.stable_id),
                None => true,
            })
            .cloned()
            .collect()
    }
}

pub struct BeaconEngine<C> {
    catalog: Arc<C>,
    backends: Vec<BackendBinding>,
    resolver: Option<Box<dyn AnnotationResolver>>,
    dataset_handovers: Vec<DatasetHandover>,
    timeout: Duration,
}

impl<C> BeaconEngine<C>
where
    C: DatasetStore + OntologyLookup,
{
    pub fn new(catalog: Arc<C>, backends: Vec<BackendBinding>) -> Self {
        Self {
            catalog,
            backends,
            resolver: None,
            dataset_handovers: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn AnnotationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_dataset_handovers(mut self, handovers: Vec<DatasetHandover>) -> Self {
        self.dataset_handovers = handovers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn list_datasets(&self, assembly_id: Option<&str>, caller: &CallerContext) -> DatasetListing {
        AccessController::new(self.catalog.as_ref()).list_datasets(assembly_id, caller)
    }

    pub fn list_access_levels(
        &self,
        request: &AccessLevelRequest,
    ) -> Result<AccessLevelResponse, BeaconError> {
        AccessController::new(self.catalog.as_ref()).list_access_levels(request)
    }

    pub fn list_filtering_terms(&self) -> Vec<FilteringTerm> {
        self.catalog.terms()
    }

    // Never fails; errors are reported inside the response.
    pub fn query(&self, raw: &RawAlleleRequest, caller: &CallerContext) -> AlleleResponse {
        let echo = raw.normalized();
        match self.try_query(raw, caller) {
            Ok((mut response, error)) => {
                response.allele_request = echo;
                response.error = error.as_ref().map(ErrorPayload::from);
                response
            }
            Err(err) => {
                tracing::debug!(error = %err, "allele query rejected");
                AlleleResponse::failed(echo, &err)
            }
        }
    }

    fn try_query(
        &self,
        raw: &RawAlleleRequest,
        caller: &CallerContext,
    ) -> Result<(AlleleResponse, Option<BeaconError>), BeaconError> {
        let query = validate(raw)?;
        tracing::debug!(
            assembly = %query.assembly_id,
            chromosome = %query.chromosome,
            reference = %query.reference_bases,
            alternate = ?query.alternate_bases,
            variant_type = ?query.variant_type,
            coordinates = ?query.coordinates,
            datasets = ?query.dataset_ids,
            filters = ?query.filters,
            include = ?query.include,
            "allele query"
        );

        let scope = AccessController::new(self.catalog.as_ref()).resolve(
            &query.dataset_ids,
            &query.assembly_id,
            caller,
        )?;
        let filters = if query.filters.is_empty() {
            Vec::new()
        } else {
            FilterTranslator::new(self.catalog.as_ref()).translate(&query.filters)?
        };

        let (outcome, backend_error) = self.run_backends(&query, &scope, filters);
        let stable_ids = scope.iter().map(|d| d.stable_id.clone()).collect::<Vec<_>>();
        let mut aggregation = aggregate(&stable_ids, &outcome, query.include);
        for entry in &mut aggregation.dataset_responses {
            entry.dataset_handover = dataset_handovers(&entry.dataset_id, &self.dataset_handovers);
        }

        let enricher = HandoverEnricher::new(self.resolver.as_deref());
        let beacon_handover = enricher.enrich(&query, aggregation.exists);

        let response = AlleleResponse {
            exists: aggregation.exists,
            allele_request: RawAlleleRequest::default(),
            dataset_allele_responses: aggregation.dataset_responses,
            error: None,
            beacon_handover,
        };
        Ok((response, backend_error))
    }

    // A backend that fails as a whole marks each of its datasets with the error. The
    // error is also returned when that backend was the only one involved.
    fn run_backends(
        &self,
        query: &AlleleQuery,
        scope: &[Dataset],
        filters: Vec<FilterTerm>,
    ) -> (BackendOutcome, Option<BeaconError>) {
        let jobs = self
            .backends
            .iter()
            .map(|binding| (Arc::clone(&binding.backend), binding.scope(scope)))
            .filter(|(_, datasets)| !datasets.is_empty())
            .collect::<Vec<_>>();
        if jobs.is_empty() {
            return (BackendOutcome::default(), None);
        }

        let assignments = jobs
            .iter()
            .map(|(backend, datasets)| {
                let ids = datasets.iter().map(|d| d.stable_id.clone()).collect::<Vec<_>>();
                (backend.name().to_string(), ids)
            })
            .collect::<Vec<_>>();
        let shared_query = Arc::new(query.clone());
        let shared_filters = Arc::new(filters);
        let results = fan_out(
            "backends",
            jobs,
            self.timeout + BACKEND_GRACE,
            move |(backend, datasets): (Arc<dyn VariantBackend>, Vec<Dataset>)| {
                backend.query(&shared_query, &datasets, &shared_filters)
            },
        );

        let sole = results.len() == 1;
        let mut outcome = BackendOutcome::default();
        let mut failure = None;
        for ((name, dataset_ids), result) in assignments.into_iter().zip(results) {
            match result {
                Ok(part) => outcome = outcome.merge(part),
                Err(err) => {
                    let err = match err {
                        BeaconError::BackendTimeout { seconds, .. } => BeaconError::BackendTimeout {
                            backend: name.clone(),
                            seconds,
                        },
                        other => other,
                    };
                    tracing::warn!(backend = %name, error = %err, "backend failed");
                    outcome.failures.extend(dataset_ids.into_iter().map(|dataset_id| {
                        DatasetFailure {
                            dataset_id,
                            error: err.clone(),
                        }
                    }));
                    if sole {
                        failure = Some(err);
                    }
                }
            }
        }
        (outcome, failure)
    }
}
