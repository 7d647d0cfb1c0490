use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::access_levels::AccessLevelTable;
use crate::backend::csvs::{DEFAULT_CSVS_URL, DEFAULT_TECHNOLOGY_ONTOLOGY};
use crate::backend::{CsvsHttpClient, InMemoryVariantStore, LocalBackend, OpencgaHttpClient, VariantBackend};
use crate::catalog::Catalog;
use crate::domain::Dataset;
use crate::engine::{BackendBinding, BeaconEngine};
use crate::error::BeaconError;
use crate::filters::OntologyMapping;
use crate::handover::{CellbaseHttpClient, DEFAULT_CELLBASE_URL, DatasetHandover};

pub const CONFIG_FILE: &str = "beacon.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub technology_ontology: Option<String>,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default)]
    pub ontology_terms: Vec<OntologyTermEntry>,
    #[serde(default)]
    pub backends: Vec<BackendEntry>,
    #[serde(default)]
    pub handover: HandoverSection,
    #[serde(default)]
    pub access_levels: AccessLevelTable,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OntologyTermEntry {
    pub ontology: String,
    pub term: String,
    pub column: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

// `"csvs"`, `"local:<path>"`, `"opencga:<url>"` or a detailed object.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BackendEntry {
    Shorthand(String),
    Detailed(BackendEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BackendEntryObject {
    #[serde(flatten)]
    pub target: BackendTarget,
    // Absent means every dataset.
    #[serde(default)]
    pub datasets: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendTarget {
    Local {
        path: Utf8PathBuf,
    },
    Csvs {
        #[serde(default)]
        url: Option<String>,
    },
    Opencga {
        url: String,
        #[serde(default)]
        token: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HandoverSection {
    // `"cellbase"` selects the public instance.
    #[serde(default)]
    pub annotation_url: Option<String>,
    #[serde(default)]
    pub datasets: Vec<DatasetHandover>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    pub target: BackendTarget,
    pub datasets: Option<BTreeSet<String>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub timeout: Duration,
    pub technology_ontology: String,
    pub catalog: Catalog,
    pub backends: Vec<BackendRequest>,
    pub annotation_url: Option<String>,
    pub dataset_handovers: Vec<DatasetHandover>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    // `path`, else `beacon.json` in the working directory, else the user config dir.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, BeaconError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => default_config_path().ok_or(BeaconError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BeaconError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BeaconError::ConfigParse(err.to_string()))?;
        tracing::debug!(path = %config_path, "loaded config");

        let base_dir = config_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();
        Self::resolve_config(config, &base_dir)
    }

    // Local store paths are taken relative to `base_dir`.
    pub fn resolve_config(config: Config, base_dir: &Utf8Path) -> Result<ResolvedConfig, BeaconError> {
        let schema_version = config.schema_version.unwrap_or(SCHEMA_VERSION);
        if schema_version != SCHEMA_VERSION {
            return Err(BeaconError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}, expected {SCHEMA_VERSION}"
            )));
        }
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        if timeout.is_zero() {
            return Err(BeaconError::InvalidConfig(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        let labels = config
            .ontology_terms
            .iter()
            .filter_map(|entry| {
                let label = entry.label.clone()?;
                Some((entry.ontology.clone(), entry.term.clone(), label))
            })
            .collect::<Vec<_>>();
        let ontology = config.ontology_terms.into_iter().map(|entry| {
            (
                entry.ontology,
                entry.term,
                OntologyMapping {
                    column: entry.column,
                    value: entry.value,
                },
            )
        });
        let catalog = Catalog::new(config.datasets, ontology)?
            .with_term_labels(labels)
            .with_access_levels(config.access_levels)?;

        let backends = config
            .backends
            .into_iter()
            .map(|entry| match entry {
                BackendEntry::Shorthand(value) => Ok(BackendRequest {
                    target: parse_shorthand(&value, base_dir)?,
                    datasets: None,
                }),
                BackendEntry::Detailed(obj) => Ok(BackendRequest {
                    target: match obj.target {
                        BackendTarget::Local { path } => BackendTarget::Local {
                            path: base_dir.join(path),
                        },
                        other => other,
                    },
                    datasets: obj.datasets,
                }),
            })
            .collect::<Result<Vec<_>, BeaconError>>()?;

        let annotation_url = config.handover.annotation_url.map(|url| {
            if url.eq_ignore_ascii_case("cellbase") {
                DEFAULT_CELLBASE_URL.to_string()
            } else {
                url
            }
        });

        Ok(ResolvedConfig {
            timeout,
            technology_ontology: config
                .technology_ontology
                .unwrap_or_else(|| DEFAULT_TECHNOLOGY_ONTOLOGY.to_string()),
            catalog,
            backends,
            annotation_url,
            dataset_handovers: config.handover.datasets,
        })
    }
}

fn default_config_path() -> Option<Utf8PathBuf> {
    let local = Utf8PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    ProjectDirs::from("", "", "allele-beacon")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.config_dir().join(CONFIG_FILE)).ok())
        .filter(|path| path.exists())
}

fn parse_shorthand(value: &str, base_dir: &Utf8Path) -> Result<BackendTarget, BeaconError> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("csvs") {
        return Ok(BackendTarget::Csvs { url: None });
    }
    match value.split_once(':') {
        Some((kind, path)) if kind.eq_ignore_ascii_case("local") && !path.is_empty() => {
            Ok(BackendTarget::Local {
                path: base_dir.join(path),
            })
        }
        Some((kind, url)) if kind.eq_ignore_ascii_case("opencga") && !url.is_empty() => {
            Ok(BackendTarget::Opencga {
                url: url.to_string(),
                token: None,
            })
        }
        _ => Err(BeaconError::InvalidConfig(format!(
            "unknown backend shorthand: {value}"
        ))),
    }
}

impl ResolvedConfig {
    pub fn build_engine(self) -> Result<BeaconEngine<Catalog>, BeaconError> {
        tracing::debug!(
            datasets = self.catalog.len(),
            backends = self.backends.len(),
            "building engine"
        );
        let mut bindings = Vec::with_capacity(self.backends.len());
        for request in self.backends {
            let backend: Arc<dyn VariantBackend> = match request.target {
                BackendTarget::Local { path } => {
                    let store = InMemoryVariantStore::load(&path)?;
                    tracing::debug!(%path, variants = store.len(), "local variants loaded");
                    Arc::new(LocalBackend::new(store))
                }
                BackendTarget::Csvs { url } => Arc::new(CsvsHttpClient::new(
                    url.as_deref().unwrap_or(DEFAULT_CSVS_URL),
                    &self.technology_ontology,
                    self.timeout,
                )?),
                BackendTarget::Opencga { url, token } => {
                    Arc::new(OpencgaHttpClient::new(&url, token.as_deref(), self.timeout)?)
                }
            };
            bindings.push(BackendBinding {
                backend,
                datasets: request.datasets,
            });
        }

        let mut engine = BeaconEngine::new(Arc::new(self.catalog), bindings)
            .with_dataset_handovers(self.dataset_handovers)
            .with_timeout(self.timeout);
        if let Some(url) = self.annotation_url {
            engine = engine.with_resolver(Box::new(CellbaseHttpClient::new(&url, self.timeout)?));
        }
        Ok(engine)
    }
}
