use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{
    ANY_BASE, AlleleQuery, Coordinates, IncludeDatasetResponses, RawAlleleRequest, VariantType,
};
use crate::error::BeaconError;

static ASSEMBLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^grch[1-9]{2}$").expect("assembly pattern"));
static CHROMOSOME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-9][0-9]|[1-9]|X|Y|MT)$").expect("chromosome pattern"));
static BASES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ACGTN]+$").expect("bases pattern"));

// Checks run in a fixed order and the first failing one is reported.
pub fn validate(raw: &RawAlleleRequest) -> Result<AlleleQuery, BeaconError> {
    let chromosome = non_blank(&raw.reference_name);
    let assembly_id = non_blank(&raw.assembly_id);
    let reference_bases = non_blank(&raw.reference_bases).map(|v| v.to_ascii_uppercase());
    let alternate_bases = non_blank(&raw.alternate_bases).map(|v| v.to_ascii_uppercase());

    let (Some(chromosome), Some(assembly_id), Some(reference_bases)) =
        (chromosome, assembly_id, reference_bases)
    else {
        return Err(BeaconError::validation(
            "All 'referenceName', 'referenceBases' and/or 'assemblyId' are required",
        ));
    };

    if !ASSEMBLY_RE.is_match(&assembly_id.to_ascii_lowercase()) {
        return Err(BeaconError::validation(
            "Invalid 'assemblyId' parameter, GRC notation required (e.g. GRCh37)",
        ));
    }

    if !CHROMOSOME_RE.is_match(&chromosome.to_ascii_uppercase()) {
        return Err(BeaconError::validation(
            "Invalid 'referenceName' parameter, accepted values are 1-22, X, Y, MT",
        ));
    }

    let variant_type = non_blank(&raw.variant_type)
        .map(|value| value.parse::<VariantType>())
        .transpose()?;
    match (&variant_type, &alternate_bases) {
        (None, None) => {
            return Err(BeaconError::validation(
                "Either 'alternateBases' or 'variantType' is required",
            ));
        }
        (Some(_), Some(alt)) if alt != ANY_BASE => {
            return Err(BeaconError::validation(
                "If 'variantType' is provided then 'alternateBases' must be empty or equal to 'N'",
            ));
        }
        _ => {}
    }

    let coordinates = coordinates(raw, &reference_bases)?;

    if let Some(alt) = &alternate_bases {
        if !BASES_RE.is_match(alt) {
            return Err(BeaconError::validation(
                "Invalid 'alternateBases' parameter, it must match the pattern ^([ACGTN]+)$",
            ));
        }
    }
    if !BASES_RE.is_match(&reference_bases) {
        return Err(BeaconError::validation(
            "Invalid 'referenceBases' parameter, it must match the pattern ^([ACGTN]+)$",
        ));
    }

    let include = match non_blank(&raw.include_dataset_responses) {
        Some(value) => value.parse()?,
        None => IncludeDatasetResponses::All,
    };

    if non_blank(&raw.mate_name).is_some() {
        return Err(BeaconError::Unsupported(
            "Queries using 'mateName' are not implemented".to_string(),
        ));
    }

    let mut dataset_ids: Vec<String> = Vec::new();
    for id in raw.dataset_ids.iter().map(|id| id.trim()) {
        if !id.is_empty() && !dataset_ids.iter().any(|seen| seen == id) {
            dataset_ids.push(id.to_string());
        }
    }

    Ok(AlleleQuery {
        assembly_id,
        chromosome,
        reference_bases,
        alternate_bases,
        variant_type,
        coordinates,
        dataset_ids,
        filters: raw
            .filters
            .iter()
            .filter(|f| !f.trim().is_empty())
            .cloned()
            .collect(),
        include,
    })
}

fn coordinates(raw: &RawAlleleRequest, reference_bases: &str) -> Result<Coordinates, BeaconError> {
    let bounds = [raw.start_min, raw.start_max, raw.end_min, raw.end_max];
    let Some(start) = raw.start else {
        if raw.end.is_some() {
            return Err(BeaconError::validation(
                "'start' is required if 'end' is provided",
            ));
        }
        return match bounds {
            [Some(start_min), Some(start_max), Some(end_min), Some(end_max)] => {
                Ok(Coordinates::Range {
                    start_min,
                    start_max,
                    end_min,
                    end_max,
                })
            }
            [None, None, None, None] => Err(BeaconError::validation(
                "Either 'start' or all of 'startMin', 'startMax', 'endMin' and 'endMax' are required",
            )),
            _ => Err(BeaconError::validation(
                "All of 'startMin', 'startMax', 'endMin' and 'endMax' are required",
            )),
        };
    };

    if bounds.iter().any(Option::is_some) {
        return Err(BeaconError::validation(
            "'start' cannot be provided at the same time as 'startMin', 'startMax', 'endMin' and 'endMax'",
        ));
    }
    if raw.end.is_none() && reference_bases == ANY_BASE {
        return Err(BeaconError::validation(
            "'referenceBases' cannot be 'N' if 'start' is provided and 'end' is missing",
        ));
    }
    Ok(Coordinates::Single {
        start,
        end: raw.end,
    })
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn snp() -> RawAlleleRequest {
        RawAlleleRequest {
            assembly_id: Some("GRCh37".to_string()),
            reference_name: Some("1".to_string()),
            reference_bases: Some("a".to_string()),
            alternate_bases: Some("t".to_string()),
            start: Some(100),
            ..RawAlleleRequest::default()
        }
    }

    #[test]
    fn uppercases_bases_and_keeps_assembly_case() {
        let query = validate(&snp()).unwrap();
        assert_eq!(query.reference_bases, "A");
        assert_eq!(query.alternate_bases.as_deref(), Some("T"));
        assert_eq!(query.assembly_id, "GRCh37");
        assert_eq!(query.include, IncludeDatasetResponses::All);
    }

    #[test]
    fn missing_required_field_reported_first() {
        let raw = RawAlleleRequest {
            assembly_id: Some("bogus".to_string()),
            reference_name: Some("  ".to_string()),
            ..snp()
        };
        let err = validate(&raw).unwrap_err();
        assert!(err.to_string().contains("are required"));
    }

    #[test]
    fn chromosome_case_insensitive() {
        let raw = RawAlleleRequest {
            reference_name: Some("mt".to_string()),
            ..snp()
        };
        assert_eq!(validate(&raw).unwrap().chromosome, "mt");
    }

    #[test]
    fn blank_dataset_ids_dropped() {
        let raw = RawAlleleRequest {
            dataset_ids: vec!["".to_string(), "D1".to_string(), " D1 ".to_string()],
            ..snp()
        };
        assert_eq!(validate(&raw).unwrap().dataset_ids, vec!["D1".to_string()]);
    }

    #[test]
    fn unknown_variant_type_rejected() {
        let raw = RawAlleleRequest {
            alternate_bases: None,
            variant_type: Some("FOO".to_string()),
            ..snp()
        };
        assert_matches!(validate(&raw), Err(BeaconError::Validation(_)));
    }

    #[test]
    fn invalid_include_rejected() {
        let raw = RawAlleleRequest {
            include_dataset_responses: Some("some".to_string()),
            ..snp()
        };
        assert_matches!(validate(&raw), Err(BeaconError::Validation(_)));
    }
}
