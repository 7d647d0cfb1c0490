use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::AlleleQuery;
use crate::error::BeaconError;

pub const DEFAULT_CELLBASE_URL: &str =
    "http://cellbase.clinbioinfosspa.es/cb/webservices/rest/v4/hsapiens/genomic/variant";

const DBSNP_TYPE_ID: &str = "data_1106";
const DBSNP_TYPE_LABEL: &str = "dbSNP ID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandoverType {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Handover {
    pub handover_type: HandoverType,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetHandover {
    pub stable_id: String,
    pub id: String,
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub note: Option<String>,
}

pub fn dataset_handovers(stable_id: &str, configured: &[DatasetHandover]) -> Vec<Handover> {
    configured
        .iter()
        .filter(|entry| entry.stable_id.eq_ignore_ascii_case(stable_id))
        .map(|entry| Handover {
            handover_type: HandoverType {
                id: entry.id.clone(),
                label: entry.label.clone(),
            },
            url: entry.url.clone(),
            note: entry.note.clone(),
        })
        .collect()
}

pub trait AnnotationResolver: Send + Sync {
    fn resolve(&self, locus: &str) -> Result<Vec<String>, BeaconError>;
}

#[derive(Clone)]
pub struct CellbaseHttpClient {
    client: Client,
    base_url: String,
}

impl CellbaseHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BeaconError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("allele-beacon/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BeaconError::Enrichment(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BeaconError::Enrichment(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn annotation_url(&self, locus: &str) -> String {
        format!("{}/{locus}/annotation", self.base_url)
    }
}

impl AnnotationResolver for CellbaseHttpClient {
    fn resolve(&self, locus: &str) -> Result<Vec<String>, BeaconError> {
        let url = self.annotation_url(locus);
        tracing::debug!(%url, "cellbase.request");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| BeaconError::Enrichment(err.to_string()))?;
        if !response.status().is_success() {
            return Err(BeaconError::Enrichment(format!(
                "CellBase returned status {}",
                response.status().as_u16()
            )));
        }
        let body: Value = response
            .json()
            .map_err(|err| BeaconError::Enrichment(err.to_string()))?;
        Ok(extract_variant_ids(&body))
    }
}

// `response[].result[].id`
pub fn extract_variant_ids(body: &Value) -> Vec<String> {
    body.get("response")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("result").and_then(Value::as_array))
        .flatten()
        .filter_map(|result| result.get("id").and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn dbsnp_handovers(ids: &[String]) -> Vec<Handover> {
    let handover_type = HandoverType {
        id: DBSNP_TYPE_ID.to_string(),
        label: DBSNP_TYPE_LABEL.to_string(),
    };
    ids.iter()
        .flat_map(|rs_id| {
            let numeric = rs_id.strip_prefix("rs").unwrap_or(rs_id);
            [
                Handover {
                    handover_type: handover_type.clone(),
                    url: format!("https://www.ncbi.nlm.nih.gov/snp/?term={rs_id}"),
                    note: Some("Link to dbSNP database".to_string()),
                },
                Handover {
                    handover_type: handover_type.clone(),
                    url: format!("https://api.ncbi.nlm.nih.gov/variation/v0/beta/refsnp/{numeric}"),
                    note: Some("Link to dbSNP API".to_string()),
                },
            ]
        })
        .collect()
}

pub struct HandoverEnricher<'a> {
    resolver: Option<&'a dyn AnnotationResolver>,
}

impl<'a> HandoverEnricher<'a> {
    pub fn new(resolver: Option<&'a dyn AnnotationResolver>) -> Self {
        Self { resolver }
    }

    pub fn enrich(&self, query: &AlleleQuery, exists: bool) -> Vec<Handover> {
        let Some(resolver) = self.resolver else {
            return Vec::new();
        };
        if !exists {
            return Vec::new();
        }
        let Some(locus) = query.point_locus() else {
            return Vec::new();
        };
        match resolver.resolve(&locus) {
            Ok(ids) => dbsnp_handovers(&ids),
            Err(err) => {
                tracing::warn!(%locus, error = %err, "handover enrichment skipped");
                Vec::new()
            }
        }
    }
}
