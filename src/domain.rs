use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BeaconError;

pub const ANY_BASE: &str = "N";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessType {
    Public,
    Registered,
    Controlled,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::Public => write!(f, "PUBLIC"),
            AccessType::Registered => write!(f, "REGISTERED"),
            AccessType::Controlled => write!(f, "CONTROLLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ConsentCode {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_constraint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ConsentCodeDataUse {
    pub primary_category: ConsentCode,
    #[serde(default)]
    pub secondary_categories: Vec<ConsentCode>,
    #[serde(default)]
    pub requirements: Vec<ConsentCode>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct DataUseConditions {
    pub consent_code_data_use: ConsentCodeDataUse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: u32,
    pub stable_id: String,
    pub access_type: AccessType,
    pub assembly_id: String,
    #[serde(default)]
    pub variant_count: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub data_use_conditions: Option<DataUseConditions>,
}

impl Dataset {
    pub fn matches_assembly(&self, assembly_id: &str) -> bool {
        self.assembly_id.eq_ignore_ascii_case(assembly_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub is_authenticated: bool,
    pub authorized_datasets: BTreeSet<String>,
}

impl CallerContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated<I, S>(authorized: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_authenticated: true,
            authorized_datasets: authorized.into_iter().map(Into::into).collect(),
        }
    }

    pub fn can_access(&self, dataset: &Dataset) -> bool {
        match dataset.access_type {
            AccessType::Public => true,
            AccessType::Registered => self.is_authenticated,
            AccessType::Controlled => self.authorized_datasets.contains(&dataset.stable_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncludeDatasetResponses {
    #[default]
    All,
    Hit,
    Miss,
    None,
}

impl IncludeDatasetResponses {
    pub fn includes_hits(self) -> bool {
        matches!(self, Self::All | Self::Hit)
    }

    pub fn includes_misses(self) -> bool {
        matches!(self, Self::All | Self::Miss)
    }
}

impl FromStr for IncludeDatasetResponses {
    type Err = BeaconError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "hit" => Ok(Self::Hit),
            "miss" => Ok(Self::Miss),
            "none" => Ok(Self::None),
            _ => Err(BeaconError::validation(format!(
                "Invalid 'includeDatasetResponses' parameter: {value}, accepted values are ALL, HIT, MISS, NONE"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantType {
    #[serde(rename = "SNP")]
    Snp,
    #[serde(rename = "MNP")]
    Mnp,
    #[serde(rename = "INS")]
    Insertion,
    #[serde(rename = "DEL")]
    Deletion,
    #[serde(rename = "DUP")]
    Duplication,
    #[serde(rename = "BND")]
    Breakend,
    #[serde(rename = "INV")]
    Inversion,
    #[serde(rename = "CNV")]
    CopyNumber,
    #[serde(rename = "DUP:TANDEM")]
    TandemDuplication,
    #[serde(rename = "DEL:ME")]
    MobileElementDeletion,
    #[serde(rename = "INS:ME")]
    MobileElementInsertion,
}

impl VariantType {
    pub fn as_str(self) -> &'static str {
        match self {
            VariantType::Snp => "SNP",
            VariantType::Mnp => "MNP",
            VariantType::Insertion => "INS",
            VariantType::Deletion => "DEL",
            VariantType::Duplication => "DUP",
            VariantType::Breakend => "BND",
            VariantType::Inversion => "INV",
            VariantType::CopyNumber => "CNV",
            VariantType::TandemDuplication => "DUP:TANDEM",
            VariantType::MobileElementDeletion => "DEL:ME",
            VariantType::MobileElementInsertion => "INS:ME",
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantType {
    type Err = BeaconError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        let parsed = match normalized.as_str() {
            "SNP" => VariantType::Snp,
            "MNP" => VariantType::Mnp,
            "INS" => VariantType::Insertion,
            "DEL" => VariantType::Deletion,
            "DUP" => VariantType::Duplication,
            "BND" => VariantType::Breakend,
            "INV" => VariantType::Inversion,
            "CNV" => VariantType::CopyNumber,
            "DUP:TANDEM" => VariantType::TandemDuplication,
            "DEL:ME" => VariantType::MobileElementDeletion,
            "INS:ME" => VariantType::MobileElementInsertion,
            _ => {
                return Err(BeaconError::validation(format!(
                    "Invalid 'variantType' parameter: {value}"
                )));
            }
        };
        Ok(parsed)
    }
}

pub fn infer_variant_type(reference: &str, alternate: &str) -> Option<VariantType> {
    if reference.is_empty() || alternate.is_empty() {
        return None;
    }
    let inferred = match reference.len().cmp(&alternate.len()) {
        std::cmp::Ordering::Equal if reference.len() == 1 => VariantType::Snp,
        std::cmp::Ordering::Equal => VariantType::Mnp,
        std::cmp::Ordering::Less => VariantType::Insertion,
        std::cmp::Ordering::Greater => VariantType::Deletion,
    };
    Some(inferred)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum Coordinates {
    Single {
        start: u64,
        end: Option<u64>,
    },
    Range {
        start_min: u64,
        start_max: u64,
        end_min: u64,
        end_max: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlleleQuery {
    pub assembly_id: String,
    pub chromosome: String,
    pub reference_bases: String,
    pub alternate_bases: Option<String>,
    pub variant_type: Option<VariantType>,
    pub coordinates: Coordinates,
    pub dataset_ids: Vec<String>,
    pub filters: Vec<String>,
    pub include: IncludeDatasetResponses,
}

impl AlleleQuery {
    pub fn is_region_query(&self) -> bool {
        self.alternate_bases.is_none()
            && match self.coordinates {
                Coordinates::Single { end, .. } => end.is_some(),
                Coordinates::Range { .. } => true,
            }
    }

    pub fn has_wildcard_alternate(&self) -> bool {
        self.alternate_bases.as_deref() == Some(ANY_BASE)
    }

    pub fn point_locus(&self) -> Option<String> {
        let Coordinates::Single { start, .. } = self.coordinates else {
            return None;
        };
        if self.has_wildcard_alternate() {
            return None;
        }
        let alternate = self.alternate_bases.as_deref()?;
        Some(format!(
            "{}:{}:{}:{}",
            self.chromosome, start, self.reference_bases, alternate
        ))
    }

    pub fn allele_matches(
        &self,
        reference: &str,
        alternate: &str,
        variant_type: Option<&str>,
    ) -> bool {
        let reference_ok = if self.is_region_query() && self.reference_bases == ANY_BASE {
            true
        } else {
            self.reference_bases.eq_ignore_ascii_case(reference)
        };
        let alternate_ok = match self.alternate_bases.as_deref() {
            None => true,
            Some(ANY_BASE) => true,
            Some(expected) => expected.eq_ignore_ascii_case(alternate),
        };
        let type_ok = match (self.variant_type, variant_type) {
            (None, _) => true,
            (Some(expected), Some(actual)) => expected.as_str().eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        };
        reference_ok && alternate_ok && type_ok
    }

    pub fn position_matches(&self, start: u64, end: u64) -> bool {
        match self.coordinates {
            Coordinates::Single { start: q, end: None } => start == q,
            Coordinates::Single {
                start: q,
                end: Some(q_end),
            } => start >= q && start < q_end.max(q.saturating_add(1)),
            Coordinates::Range {
                start_min,
                start_max,
                end_min,
                end_max,
            } => (start_min..=start_max).contains(&start) && (end_min..=end_max).contains(&end),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawAlleleRequest {
    pub assembly_id: Option<String>,
    pub reference_name: Option<String>,
    pub reference_bases: Option<String>,
    pub alternate_bases: Option<String>,
    pub variant_type: Option<String>,
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub start_min: Option<u64>,
    pub start_max: Option<u64>,
    pub end_min: Option<u64>,
    pub end_max: Option<u64>,
    pub mate_name: Option<String>,
    pub dataset_ids: Vec<String>,
    pub filters: Vec<String>,
    pub include_dataset_responses: Option<String>,
}

impl RawAlleleRequest {
    pub fn normalized(&self) -> Self {
        Self {
            reference_bases: self.reference_bases.as_ref().map(|v| v.to_ascii_uppercase()),
            alternate_bases: self.alternate_bases.as_ref().map(|v| v.to_ascii_uppercase()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn query(coordinates: Coordinates, reference: &str, alternate: Option<&str>) -> AlleleQuery {
        AlleleQuery {
            assembly_id: "GRCh37".to_string(),
            chromosome: "1".to_string(),
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
    fn parse_include_case_insensitive() {
        assert_eq!(
            "hit".parse::<IncludeDatasetResponses>().unwrap(),
            IncludeDatasetResponses::Hit
        );
        let err = "some".parse::<IncludeDatasetResponses>().unwrap_err();
        assert_matches!(err, BeaconError::Validation(_));
    }

    #[test]
    fn parse_variant_type() {
        assert_eq!("dup:tandem".parse::<VariantType>().unwrap(), VariantType::TandemDuplication);
        assert_matches!("XYZ".parse::<VariantType>(), Err(BeaconError::Validation(_)));
    }

    #[test]
    fn region_reference_wildcard() {
        let q = query(Coordinates::Single { start: 100, end: Some(105) }, "N", None);
        assert!(q.is_region_query());
        assert!(q.allele_matches("G", "T", None));
    }

    #[test]
    fn point_reference_is_never_wildcard() {
        let q = query(Coordinates::Single { start: 100, end: None }, "N", Some("N"));
        assert!(!q.is_region_query());
        assert!(!q.allele_matches("G", "T", None));
        assert!(q.allele_matches("N", "T", None));
    }

    #[test]
    fn alternate_wildcard_matches_any() {
        let q = query(Coordinates::Single { start: 100, end: None }, "A", Some("N"));
        assert!(q.allele_matches("A", "C", None));
        assert!(!q.allele_matches("G", "C", None));
        assert_eq!(q.point_locus(), None);
    }

    #[test]
    fn point_locus_format() {
        let q = query(Coordinates::Single { start: 100, end: None }, "A", Some("T"));
        assert_eq!(q.point_locus().as_deref(), Some("1:100:A:T"));
    }

    #[test]
    fn region_at_end_of_coordinate_space() {
        let q = query(Coordinates::Single { start: u64::MAX - 1, end: Some(0) }, "N", None);
        assert!(q.position_matches(u64::MAX - 1, u64::MAX));
        let q = query(Coordinates::Single { start: u64::MAX, end: Some(u64::MAX) }, "N", None);
        assert!(!q.position_matches(u64::MAX, u64::MAX));
    }

    #[test]
    fn controlled_needs_explicit_grant() {
        let dataset = Dataset {
            id: 1,
            stable_id: "EGAD1".to_string(),
            access_type: AccessType::Controlled,
            assembly_id: "grch37".to_string(),
            variant_count: 0,
            description: None,
            data_use_conditions: None,
        };
        assert!(!CallerContext::authenticated(Vec::<String>::new()).can_access(&dataset));
        assert!(CallerContext::authenticated(["EGAD1"]).can_access(&dataset));
    }
}
