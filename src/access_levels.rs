use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::AccessType;
use crate::error::BeaconError;

pub const ACCESS_LEVEL_SUMMARY: &str = "accessLevelSummary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    Public,
    Registered,
    Controlled,
    NotSupported,
}

impl From<AccessType> for AccessLevel {
    fn from(value: AccessType) -> Self {
        match value {
            AccessType::Public => AccessLevel::Public,
            AccessType::Registered => AccessLevel::Registered,
            AccessType::Controlled => AccessLevel::Controlled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFieldLevel {
    pub stable_id: String,
    pub parent_field: String,
    pub field: String,
    pub access_level: AccessLevel,
}

impl DatasetFieldLevel {
    pub fn summary(stable_id: &str, access_level: AccessLevel) -> Self {
        Self {
            stable_id: stable_id.to_string(),
            parent_field: ACCESS_LEVEL_SUMMARY.to_string(),
            field: ACCESS_LEVEL_SUMMARY.to_string(),
            access_level,
        }
    }

    pub fn is_summary(&self) -> bool {
        self.parent_field.eq_ignore_ascii_case(ACCESS_LEVEL_SUMMARY)
    }
}

// `fields` maps a parent field to its children; the `accessLevelSummary` child
// holds the level of the parent as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLevelTable {
    #[serde(default)]
    pub fields: BTreeMap<String, BTreeMap<String, AccessLevel>>,
    #[serde(default)]
    pub datasets: Vec<DatasetFieldLevel>,
}

#[derive(Debug, Clone, Default)]
pub struct AccessLevelRequest {
    pub fields: Vec<String>,
    pub dataset_ids: Vec<String>,
    pub level: Option<String>,
    pub include_field_details: bool,
    pub include_dataset_details: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldAccess {
    Level(AccessLevel),
    Fields(BTreeMap<String, AccessLevel>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DatasetAccess {
    Level(AccessLevel),
    Fields(BTreeMap<String, FieldAccess>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessLevelResponse {
    pub fields: BTreeMap<String, FieldAccess>,
    pub datasets: BTreeMap<String, DatasetAccess>,
}

impl AccessLevelTable {
    pub fn list(&self, request: &AccessLevelRequest) -> Result<AccessLevelResponse, BeaconError> {
        if request.level.as_deref().is_some_and(|level| !level.trim().is_empty()) {
            return Err(BeaconError::Unsupported(
                "Searching by 'level' is not implemented".to_string(),
            ));
        }

        let wanted = request
            .fields
            .iter()
            .map(|field| field.trim().to_ascii_lowercase())
            .filter(|field| !field.is_empty())
            .collect::<BTreeSet<_>>();
        let fields = self.select_fields(&wanted, request.include_field_details);
        if !wanted.is_empty() && fields.is_empty() {
            return Err(BeaconError::FieldNotFound(request.fields.join(", ")));
        }

        let entries = self.select_datasets(&wanted, request);
        if !request.dataset_ids.is_empty() && entries.is_empty() {
            return Err(BeaconError::DatasetNotFound(request.dataset_ids.join(", ")));
        }

        Ok(AccessLevelResponse {
            fields,
            datasets: dataset_map(
                &entries,
                request.include_field_details,
                request.include_dataset_details,
            ),
        })
    }

    fn select_fields(
        &self,
        wanted: &BTreeSet<String>,
        include_field_details: bool,
    ) -> BTreeMap<String, FieldAccess> {
        let mut selected = BTreeMap::new();
        for (parent, children) in &self.fields {
            if wanted.is_empty() || wanted.contains(&parent.to_ascii_lowercase()) {
                let value = if include_field_details {
                    FieldAccess::Fields(children.clone())
                } else {
                    FieldAccess::Level(
                        children
                            .get(ACCESS_LEVEL_SUMMARY)
                            .copied()
                            .unwrap_or(AccessLevel::NotSupported),
                    )
                };
                selected.insert(parent.clone(), value);
            } else if include_field_details {
                let matching = children
                    .iter()
                    .filter(|(field, _)| wanted.contains(&field.to_ascii_lowercase()))
                    .map(|(field, level)| (field.clone(), *level))
                    .collect::<BTreeMap<_, _>>();
                if !matching.is_empty() {
                    selected.insert(parent.clone(), FieldAccess::Fields(matching));
                }
            }
        }
        selected
    }

    fn select_datasets(
        &self,
        wanted: &BTreeSet<String>,
        request: &AccessLevelRequest,
    ) -> Vec<&DatasetFieldLevel> {
        self.datasets
            .iter()
            .filter(|entry| {
                request.dataset_ids.is_empty()
                    || request.dataset_ids.iter().any(|id| *id == entry.stable_id)
            })
            .filter(|entry| {
                if !request.include_dataset_details {
                    return entry.is_summary();
                }
                if wanted.is_empty() {
                    return true;
                }
                wanted.contains(&entry.parent_field.to_ascii_lowercase())
                    || (request.include_field_details
                        && wanted.contains(&entry.field.to_ascii_lowercase()))
            })
            .collect()
    }
}

fn dataset_map(
    entries: &[&DatasetFieldLevel],
    include_field_details: bool,
    include_dataset_details: bool,
) -> BTreeMap<String, DatasetAccess> {
    let mut datasets = BTreeMap::new();
    for entry in entries {
        if !include_dataset_details {
            datasets.insert(entry.stable_id.clone(), DatasetAccess::Level(entry.access_level));
            continue;
        }
        if entry.is_summary() {
            continue;
        }
        let slot = datasets
            .entry(entry.stable_id.clone())
            .or_insert_with(|| DatasetAccess::Fields(BTreeMap::new()));
        let DatasetAccess::Fields(parents) = slot else {
            continue;
        };
        if include_field_details {
            if let FieldAccess::Fields(children) = parents
                .entry(entry.parent_field.clone())
                .or_insert_with(|| FieldAccess::Fields(BTreeMap::new()))
            {
                children.insert(entry.field.clone(), entry.access_level);
            }
        } else if entry.field == ACCESS_LEVEL_SUMMARY || !parents.contains_key(&entry.parent_field) {
            parents.insert(entry.parent_field.clone(), FieldAccess::Level(entry.access_level));
        }
    }
    datasets
}
