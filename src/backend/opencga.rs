use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::backend::{BackendOutcome, BackendRow, VariantBackend, fan_out};
use crate::domain::{AlleleQuery, Dataset};
use crate::error::BeaconError;
use crate::filters::{FilterTerm, and_clause};

const BACKEND: &str = "opencga";
const INCLUDE_GENOTYPE: &str = "0/1,1/1";
const DEFAULT_COHORT: &str = "ALL";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpencgaResponse {
    #[serde(default)]
    pub responses: Vec<OpencgaQueryResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpencgaQueryResult {
    #[serde(default)]
    pub results: Vec<OpencgaVariant>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpencgaVariant {
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub alternate: String,
    #[serde(default, rename = "type")]
    pub variant_type: Option<String>,
    #[serde(default)]
    pub studies: Vec<OpencgaStudy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpencgaStudy {
    #[serde(default)]
    pub study_id: String,
    #[serde(default)]
    pub stats: Vec<OpencgaCohortStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpencgaCohortStats {
    #[serde(default)]
    pub cohort_id: String,
    #[serde(default)]
    pub alt_allele_freq: Option<f64>,
    #[serde(default)]
    pub allele_count: u64,
    #[serde(default)]
    pub genotype_count: BTreeMap<String, u64>,
}

impl OpencgaStudy {
    fn names(&self, dataset_id: &str) -> bool {
        self.study_id.rsplit(':').next() == Some(dataset_id)
    }

    fn cohort(&self) -> Option<&OpencgaCohortStats> {
        self.stats
            .iter()
            .find(|stats| stats.cohort_id == DEFAULT_COHORT)
            .or_else(|| self.stats.first())
    }
}

// Study ids are qualified (`user@project:study`); only the last segment names the dataset.
pub fn summarize(query: &AlleleQuery, dataset_id: &str, response: &OpencgaResponse) -> Option<BackendRow> {
    let cohorts = response
        .responses
        .iter()
        .flat_map(|r| &r.results)
        .filter(|v| query.allele_matches(&v.reference, &v.alternate, v.variant_type.as_deref()))
        .filter_map(|v| v.studies.iter().find(|s| s.names(dataset_id)))
        .filter_map(OpencgaStudy::cohort)
        .collect::<Vec<_>>();
    let first = cohorts.first()?;

    let carriers = |stats: &OpencgaCohortStats| {
        ["0/1", "1/1"]
            .iter()
            .filter_map(|gt| stats.genotype_count.get(*gt))
            .sum::<u64>()
    };
    Some(BackendRow {
        dataset_id: dataset_id.to_string(),
        frequency: if cohorts.len() == 1 {
            first.alt_allele_freq
        } else {
            None
        },
        variant_count: cohorts.len() as u64,
        call_count: cohorts.iter().map(|c| c.allele_count).sum(),
        sample_count: cohorts.iter().map(|c| carriers(*c)).sum(),
    })
}

#[derive(Clone)]
pub struct OpencgaHttpClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OpencgaHttpClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, BeaconError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("allele-beacon/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BeaconError::http(BACKEND, err))?,
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| BeaconError::http(BACKEND, err))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BeaconError::http(BACKEND, err))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn query_url(
        &self,
        locus: &str,
        study: &str,
        sample_filter: Option<&str>,
    ) -> Result<Url, BeaconError> {
        let mut params = vec![
            ("id", locus),
            ("study", study),
            ("includeGenotype", INCLUDE_GENOTYPE),
            ("summary", "true"),
        ];
        if let Some(filter) = sample_filter {
            params.push(("sampleFilter", filter));
        }
        Url::parse_with_params(&format!("{}/analysis/variant/query", self.base_url), &params)
            .map_err(|err| BeaconError::http(BACKEND, err))
    }

    fn fetch(&self, url: Url) -> Result<OpencgaResponse, BeaconError> {
        tracing::debug!(%url, "opencga.request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| BeaconError::http(BACKEND, err))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "OpenCGA request failed".to_string());
            return Err(BeaconError::BackendStatus {
                backend: BACKEND.to_string(),
                status,
                message,
            });
        }
        response
            .json()
            .map_err(|err| BeaconError::http(BACKEND, err))
    }
}

impl VariantBackend for OpencgaHttpClient {
    fn name(&self) -> &str {
        BACKEND
    }

    fn query(
        &self,
        query: &AlleleQuery,
        scope: &[Dataset],
        filters: &[FilterTerm],
    ) -> Result<BackendOutcome, BeaconError> {
        let Some(locus) = query.point_locus() else {
            return Err(BeaconError::Unsupported(
                "OpenCGA backend only answers point queries with a concrete alternate allele"
                    .to_string(),
            ));
        };
        let sample_filter = and_clause(filters);
        let client = self.clone();
        let shared = Arc::new(query.clone());

        let results = fan_out(
            BACKEND,
            scope.iter().map(|d| d.stable_id.clone()).collect(),
            self.timeout + Duration::from_secs(1),
            move |study: String| {
                let url = client.query_url(&locus, &study, sample_filter.as_deref())?;
                let response = client.fetch(url)?;
                Ok(summarize(&shared, &study, &response))
            },
        );
        Ok(BackendOutcome::from_dataset_results(scope, results))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::domain::{Coordinates, IncludeDatasetResponses};

    fn query(coordinates: Coordinates, alternate: Option<&str>) -> AlleleQuery {
        AlleleQuery {
            assembly_id: "GRCh38".to_string(),
            chromosome: "22".to_string(),
            reference_bases: "C".to_string(),
            alternate_bases: alternate.map(str::to_string),
            variant_type: None,
            coordinates,
            dataset_ids: Vec::new(),
            filters: Vec::new(),
            include: IncludeDatasetResponses::All,
        }
    }

    #[test]
    fn stats_from_default_cohort() {
        let payload: OpencgaResponse = serde_json::from_value(json!({
            "responses": [{
                "results": [{
                    "reference": "C",
                    "alternate": "T",
                    "type": "SNV",
                    "studies": [{
                        "studyId": "user@project:study1",
                        "stats": [
                            {"cohortId": "OTHER", "altAlleleFreq": 0.9, "alleleCount": 2},
                            {
                                "cohortId": "ALL",
                                "altAlleleFreq": 0.125,
                                "alleleCount": 16,
                                "genotypeCount": {"0/0": 6, "0/1": 2, "1/1": 0}
                            }
                        ]
                    }]
                }]
            }]
        }))
        .unwrap();
        let q = query(Coordinates::Single { start: 16050075, end: None }, Some("T"));
        let row = summarize(&q, "study1", &payload).unwrap();
        assert_eq!(row.frequency, Some(0.125));
        assert_eq!(row.call_count, 16);
        assert_eq!(row.sample_count, 2);
    }

    #[test]
    fn study_matched_by_last_segment() {
        let payload: OpencgaResponse = serde_json::from_value(json!({
            "responses": [{
                "results": [{
                    "reference": "C",
                    "alternate": "T",
                    "studies": [
                        {"studyId": "user@project:study10", "stats": [{"cohortId": "ALL", "alleleCount": 4}]},
                        {"studyId": "user@project:study1", "stats": [{"cohortId": "ALL", "alleleCount": 8}]}
                    ]
                }]
            }]
        }))
        .unwrap();
        let q = query(Coordinates::Single { start: 16050075, end: None }, Some("T"));
        assert_eq!(summarize(&q, "study1", &payload).map(|row| row.call_count), Some(8));
        assert_eq!(summarize(&q, "study10", &payload).map(|row| row.call_count), Some(4));
        assert!(summarize(&q, "y1", &payload).is_none());
        assert!(summarize(&q, "study2", &payload).is_none());
    }

    #[test]
    fn empty_results_are_miss() {
        let payload: OpencgaResponse =
            serde_json::from_value(json!({"responses": [{"results": []}]})).unwrap();
        let q = query(Coordinates::Single { start: 1, end: None }, Some("T"));
        assert!(summarize(&q, "study1", &payload).is_none());
    }

    #[test]
    fn region_queries_unsupported() {
        let client = OpencgaHttpClient::new("http://localhost/opencga/webservices/rest/v2", None, Duration::from_secs(1)).unwrap();
        let q = query(Coordinates::Single { start: 1, end: Some(100) }, None);
        assert_matches!(client.query(&q, &[], &[]), Err(BeaconError::Unsupported(_)));
    }

    #[test]
    fn query_url_shape() {
        let client = OpencgaHttpClient::new("http://localhost/rest/v2/", Some("secret"), Duration::from_secs(1)).unwrap();
        let url = client.query_url("22:16050075:C:T", "study1", None).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost/rest/v2/analysis/variant/query?id=22%3A16050075%3AC%3AT&study=study1&includeGenotype=0%2F1%2C1%2F1&summary=true"
        );
    }
}
