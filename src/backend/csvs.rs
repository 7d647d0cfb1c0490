use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::backend::{BackendOutcome, BackendRow, VariantBackend, fan_out};
use crate::domain::{AlleleQuery, Coordinates, Dataset, VariantType, infer_variant_type};
use crate::error::BeaconError;
use crate::filters::FilterTerm;

pub const DEFAULT_CSVS_URL: &str = "http://csvs.clinbioinfosspa.es:8080/csvs/rest";
pub const DEFAULT_TECHNOLOGY_ONTOLOGY: &str = "myDictionary";

const BACKEND: &str = "csvs";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvsResponse {
    #[serde(default)]
    pub num_total_results: u64,
    #[serde(default)]
    pub result: Vec<CsvsVariant>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvsVariant {
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub end: Option<u64>,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub alternate: String,
    #[serde(default)]
    pub stats: CsvsStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvsStats {
    #[serde(default)]
    pub gt00: u64,
    #[serde(default)]
    pub gt01: u64,
    #[serde(default)]
    pub gt11: u64,
    #[serde(default)]
    pub gtmissing: u64,
    #[serde(default)]
    pub ref_freq: f64,
    #[serde(default)]
    pub alt_freq: f64,
    #[serde(default)]
    pub maf: f64,
}

// A point becomes a one-base window.
pub fn region(query: &AlleleQuery) -> String {
    let (start, end) = match query.coordinates {
        Coordinates::Single { start, end } => (start, end.unwrap_or(start.saturating_add(1))),
        Coordinates::Range {
            start_min, end_max, ..
        } => (start_min, end_max),
    };
    format!("{}:{}-{}", query.chromosome, start, end)
}

pub fn summarize(query: &AlleleQuery, dataset_id: &str, response: &CsvsResponse) -> Option<BackendRow> {
    if response.num_total_results == 0 {
        return None;
    }
    let matched = response
        .result
        .iter()
        .filter(|variant| match (variant.start, variant.end) {
            (Some(start), end) => {
                query.position_matches(start, end.unwrap_or(start.saturating_add(1)))
            }
            (None, _) => true,
        })
        .filter(|variant| {
            let inferred = infer_variant_type(&variant.reference, &variant.alternate);
            query.allele_matches(
                &variant.reference,
                &variant.alternate,
                inferred.map(VariantType::as_str),
            )
        })
        .collect::<Vec<_>>();
    let first = matched.first()?;

    Some(BackendRow {
        dataset_id: dataset_id.to_string(),
        frequency: (matched.len() == 1).then_some(first.stats.alt_freq),
        variant_count: matched.len() as u64,
        call_count: matched
            .iter()
            .map(|v| v.stats.gt00 + v.stats.gt01 + v.stats.gt11)
            .sum(),
        sample_count: matched.iter().map(|v| v.stats.gt01 + v.stats.gt11).sum(),
    })
}

#[derive(Clone)]
pub struct CsvsHttpClient {
    client: Client,
    base_url: String,
    technology_ontology: String,
    timeout: Duration,
}

impl CsvsHttpClient {
    pub fn new(
        base_url: &str,
        technology_ontology: &str,
        timeout: Duration,
    ) -> Result<Self, BeaconError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("allele-beacon/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BeaconError::http(BACKEND, err))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BeaconError::http(BACKEND, err))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            technology_ontology: technology_ontology.to_string(),
            timeout,
        })
    }

    pub fn technologies(&self, filters: &[FilterTerm]) -> Option<String> {
        let values = filters
            .iter()
            .filter(|f| f.ontology == self.technology_ontology)
            .map(|f| f.term.as_str())
            .collect::<Vec<_>>();
        (!values.is_empty()).then(|| values.join(","))
    }

    pub fn fetch_url(
        &self,
        region: &str,
        dataset_id: &str,
        technologies: Option<&str>,
    ) -> Result<Url, BeaconError> {
        let mut params = vec![("regions", region), ("diseases", dataset_id)];
        if let Some(technologies) = technologies {
            params.push(("technologies", technologies));
        }
        Url::parse_with_params(&format!("{}/variants/fetch", self.base_url), &params)
            .map_err(|err| BeaconError::http(BACKEND, err))
    }

    fn fetch(&self, url: Url) -> Result<CsvsResponse, BeaconError> {
        tracing::debug!(%url, "csvs.request");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| BeaconError::http(BACKEND, err))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "CSVS request failed".to_string());
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

impl VariantBackend for CsvsHttpClient {
    fn name(&self) -> &str {
        BACKEND
    }

    fn query(
        &self,
        query: &AlleleQuery,
        scope: &[Dataset],
        filters: &[FilterTerm],
    ) -> Result<BackendOutcome, BeaconError> {
        let region = region(query);
        let technologies = self.technologies(filters);
        let client = self.clone();
        let shared = Arc::new(query.clone());

        let results = fan_out(
            BACKEND,
            scope.iter().map(|d| d.stable_id.clone()).collect(),
            self.timeout + Duration::from_secs(1),
            move |dataset_id: String| {
                let url = client.fetch_url(&region, &dataset_id, technologies.as_deref())?;
                let response = client.fetch(url)?;
                Ok(summarize(&shared, &dataset_id, &response))
            },
        );
        Ok(BackendOutcome::from_dataset_results(scope, results))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::IncludeDatasetResponses;
    use crate::filters::{FilterValue, Operator};

    fn query(coordinates: Coordinates, reference: &str, alternate: Option<&str>) -> AlleleQuery {
        AlleleQuery {
            assembly_id: "GRCh37".to_string(),
            chromosome: "2".to_string(),
            reference_bases: reference.to_string(),
            alternate_bases: alternate.map(str::to_string),
            variant_type: None,
            coordinates,
            dataset_ids: Vec::new(),
            filters: Vec::new(),
            include: IncludeDatasetResponses::All,
        }
    }

    #[test]
    fn region_strings() {
        let point = query(Coordinates::Single { start: 500, end: None }, "A", Some("T"));
        assert_eq!(region(&point), "2:500-501");
        let range = query(
            Coordinates::Range {
                start_min: 10,
                start_max: 20,
                end_min: 30,
                end_max: 40,
            },
            "N",
            None,
        );
        assert_eq!(region(&range), "2:10-40");
        let last = query(Coordinates::Single { start: u64::MAX, end: None }, "A", Some("T"));
        assert_eq!(region(&last), format!("2:{}-{}", u64::MAX, u64::MAX));
    }

    #[test]
    fn variant_at_last_position_summarized() {
        let payload: CsvsResponse = serde_json::from_value(json!({
            "numTotalResults": 1,
            "result": [{"start": u64::MAX, "reference": "A", "alternate": "T", "stats": {"gt11": 1}}]
        }))
        .unwrap();
        let q = query(Coordinates::Single { start: u64::MAX, end: None }, "A", Some("T"));
        assert_eq!(summarize(&q, "ds1", &payload).map(|row| row.sample_count), Some(1));
    }

    #[test]
    fn missing_stats_default_to_zero() {
        let payload: CsvsResponse = serde_json::from_value(json!({
            "numTotalResults": 1,
            "result": [{"reference": "A", "alternate": "T", "stats": {"gt01": 3, "altFreq": 0.1}}]
        }))
        .unwrap();
        let q = query(Coordinates::Single { start: 500, end: None }, "A", Some("T"));
        let row = summarize(&q, "ds1", &payload).unwrap();
        assert_eq!(row.sample_count, 3);
        assert_eq!(row.call_count, 3);
        assert_eq!(row.frequency, Some(0.1));
    }

    #[test]
    fn alternate_mismatch_is_miss() {
        let payload: CsvsResponse = serde_json::from_value(json!({
            "numTotalResults": 1,
            "result": [{"reference": "A", "alternate": "G"}]
        }))
        .unwrap();
        let q = query(Coordinates::Single { start: 500, end: None }, "A", Some("T"));
        assert!(summarize(&q, "ds1", &payload).is_none());
        let wildcard = query(Coordinates::Single { start: 500, end: None }, "A", Some("N"));
        assert!(summarize(&wildcard, "ds1", &payload).is_some());
    }

    #[test]
    fn fetch_url_carries_technologies() {
        let client =
            CsvsHttpClient::new("http://localhost:8080/csvs/rest/", "myDictionary", Duration::from_secs(1))
                .unwrap();
        let filters = vec![FilterTerm {
            ontology: "myDictionary".to_string(),
            term: "Illumina".to_string(),
            column: "technology".to_string(),
            operator: Operator::Eq,
            value: FilterValue::Text("Illumina".to_string()),
        }];
        let technologies = client.technologies(&filters);
        let url = client
            .fetch_url("2:500-501", "ds1", technologies.as_deref())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/csvs/rest/variants/fetch?regions=2%3A500-501&diseases=ds1&technologies=Illumina"
        );
    }
}
