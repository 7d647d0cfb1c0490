use std::collections::HashMap;

use crate::access::DatasetStore;
use crate::access_levels::{AccessLevelTable, DatasetFieldLevel};
use crate::domain::Dataset;
use crate::error::BeaconError;
use crate::filters::{FilteringTerm, OntologyLookup, OntologyMapping};

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    datasets: Vec<Dataset>,
    by_stable_id: HashMap<String, usize>,
    ontology: HashMap<(String, String), OntologyMapping>,
    labels: HashMap<(String, String), String>,
    access_levels: AccessLevelTable,
}

impl Catalog {
    pub fn new(
        mut datasets: Vec<Dataset>,
        ontology: impl IntoIterator<Item = (String, String, OntologyMapping)>,
    ) -> Result<Self, BeaconError> {
        datasets.sort_by_key(|dataset| dataset.id);
        if let Some(pair) = datasets.windows(2).find(|pair| pair[0].id == pair[1].id) {
            return Err(BeaconError::InvalidConfig(format!(
                "duplicate dataset id {}",
                pair[0].id
            )));
        }

        let mut by_stable_id = HashMap::with_capacity(datasets.len());
        for (index, dataset) in datasets.iter().enumerate() {
            if by_stable_id
                .insert(dataset.stable_id.clone(), index)
                .is_some()
            {
                return Err(BeaconError::InvalidConfig(format!(
                    "duplicate dataset stable id {}",
                    dataset.stable_id
                )));
            }
        }

        let ontology = ontology
            .into_iter()
            .map(|(ontology, term, mapping)| ((ontology, term), mapping))
            .collect();

        Ok(Self {
            datasets,
            by_stable_id,
            ontology,
            labels: HashMap::new(),
            access_levels: AccessLevelTable::default(),
        })
    }

    pub fn with_term_labels(
        mut self,
        labels: impl IntoIterator<Item = (String, String, String)>,
    ) -> Self {
        self.labels = labels
            .into_iter()
            .map(|(ontology, term, label)| ((ontology, term), label))
            .collect();
        self
    }

    pub fn with_access_levels(mut self, table: AccessLevelTable) -> Result<Self, BeaconError> {
        if let Some(entry) = table
            .datasets
            .iter()
            .find(|entry| !self.by_stable_id.contains_key(&entry.stable_id))
        {
            return Err(BeaconError::InvalidConfig(format!(
                "access levels reference unknown dataset {}",
                entry.stable_id
            )));
        }
        self.access_levels = table;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

impl DatasetStore for Catalog {
    fn find_by_stable_id(&self, stable_id: &str) -> Option<Dataset> {
        self.by_stable_id
            .get(stable_id)
            .map(|&index| self.datasets[index].clone())
    }

    fn find_all_by_assembly(&self, assembly_id: &str) -> Vec<Dataset> {
        self.datasets
            .iter()
            .filter(|dataset| dataset.matches_assembly(assembly_id))
            .cloned()
            .collect()
    }

    fn find_all(&self) -> Vec<Dataset> {
        self.datasets.clone()
    }

    // Datasets without a configured summary get one from their access type.
    fn access_levels(&self) -> AccessLevelTable {
        let mut table = self.access_levels.clone();
        for dataset in &self.datasets {
            let configured = table
                .datasets
                .iter()
                .any(|entry| entry.stable_id == dataset.stable_id && entry.is_summary());
            if !configured {
                table.datasets.push(DatasetFieldLevel::summary(
                    &dataset.stable_id,
                    dataset.access_type.into(),
                ));
            }
        }
        table
    }
}

impl OntologyLookup for Catalog {
    fn find(&self, ontology: &str, term: &str) -> Option<OntologyMapping> {
        self.ontology
            .get(&(ontology.to_string(), term.to_string()))
            .cloned()
    }

    fn terms(&self) -> Vec<FilteringTerm> {
        let mut terms = self
            .ontology
            .keys()
            .map(|key| FilteringTerm {
                ontology: key.0.clone(),
                term: key.1.clone(),
                label: self.labels.get(key).cloned(),
            })
            .collect::<Vec<_>>();
        terms.sort();
        terms
    }
}
