use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::json;

use allele_beacon::access::DatasetStore;
use allele_beacon::access_levels::{AccessLevel, AccessLevelRequest, DatasetAccess, FieldAccess};
use allele_beacon::config::{BackendEntry, BackendTarget, Config, ConfigLoader};
use allele_beacon::domain::{CallerContext, RawAlleleRequest};
use allele_beacon::error::BeaconError;
use allele_beacon::filters::OntologyLookup;

fn write_config(dir: &tempfile::TempDir, config: serde_json::Value) -> String {
    let path = dir.path().join("beacon.json");
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn parse_detailed_backends() {
    let config: Config = serde_json::from_value(json!({
        "timeout_secs": 5,
        "backends": [
            "csvs",
            {"kind": "opencga", "url": "http://opencga/rest/v2", "token": "t", "datasets": ["s1"]},
            {"kind": "local", "path": "/data/variants.json"}
        ]
    }))
    .unwrap();
    assert_matches!(&config.backends[0], BackendEntry::Shorthand(value) if value == "csvs");

    let resolved = ConfigLoader::resolve_config(config, camino::Utf8Path::new("/srv")).unwrap();
    assert_eq!(resolved.timeout, Duration::from_secs(5));
    assert_eq!(
        resolved.backends[1].target,
        BackendTarget::Opencga {
            url: "http://opencga/rest/v2".to_string(),
            token: Some("t".to_string()),
        }
    );
    assert_eq!(
        resolved.backends[1].datasets.as_ref().map(|d| d.len()),
        Some(1)
    );
    assert_eq!(
        resolved.backends[2].target,
        BackendTarget::Local {
            path: Utf8PathBuf::from("/data/variants.json")
        }
    );
}

#[test]
fn zero_timeout_rejected() {
    let config: Config = serde_json::from_value(json!({"timeout_secs": 0})).unwrap();
    let err = ConfigLoader::resolve_config(config, camino::Utf8Path::new(".")).unwrap_err();
    assert_matches!(err, BeaconError::InvalidConfig(_));
}

#[test]
fn missing_file_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, BeaconError::ConfigRead(_));
}

#[test]
fn malformed_json_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beacon.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap_err();
    assert_matches!(err, BeaconError::ConfigParse(_));
}

#[test]
fn engine_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("variants.json"),
        serde_json::to_string(&json!([
            {"dataset_id": 1, "chromosome": "1", "start": 1000, "reference": "A",
             "alternate": "T", "frequency": 0.5, "call_count": 4, "sample_count": 2}
        ]))
        .unwrap(),
    )
    .unwrap();
    let path = write_config(
        &dir,
        json!({
            "datasets": [
                {"id": 1, "stable_id": "ds1", "access_type": "PUBLIC", "assembly_id": "GRCh37"},
                {"id": 2, "stable_id": "ds2", "access_type": "CONTROLLED", "assembly_id": "GRCh37"}
            ],
            "backends": ["local:variants.json"],
            "handover": {
                "datasets": [
                    {"stable_id": "ds1", "id": "CUSTOM", "label": "Dataset", "url": "https://example.org/ds1"}
                ]
            }
        }),
    );

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(resolved.catalog.find_all().len(), 2);
    assert!(resolved.annotation_url.is_none());
    let engine = resolved.build_engine().unwrap();

    let raw = RawAlleleRequest {
        assembly_id: Some("GRCh37".to_string()),
        reference_name: Some("1".to_string()),
        reference_bases: Some("A".to_string()),
        alternate_bases: Some("T".to_string()),
        start: Some(1000),
        ..RawAlleleRequest::default()
    };
    let response = engine.query(&raw, &CallerContext::anonymous());
    assert!(response.exists);
    assert_eq!(response.dataset_allele_responses.len(), 1);
    assert_eq!(response.dataset_allele_responses[0].dataset_handover.len(), 1);

    let granted = engine.query(&raw, &CallerContext::authenticated(["ds2"]));
    assert_eq!(granted.dataset_allele_responses.len(), 2);
}

#[test]
fn missing_variant_file_fails_engine_build() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, json!({"backends": ["local:absent.json"]}));
    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_matches!(resolved.build_engine().err(), Some(BeaconError::VariantFile { .. }));
}

#[test]
fn listing_metadata_from_config() {
    let config: Config = serde_json::from_value(json!({
        "schema_version": 1,
        "datasets": [
            {
                "id": 1, "stable_id": "ds1", "access_type": "PUBLIC", "assembly_id": "GRCh37",
                "data_use_conditions": {
                    "consent_code_data_use": {
                        "primary_category": {"code": "HMB"},
                        "requirements": [{"code": "PUB", "description": "Publication required"}],
                        "version": "0.1"
                    }
                }
            },
            {"id": 2, "stable_id": "ds2", "access_type": "CONTROLLED", "assembly_id": "GRCh37"}
        ],
        "ontology_terms": [
            {"ontology": "PATO", "term": "0000383", "column": "sex", "value": "female", "label": "female"}
        ],
        "access_levels": {
            "fields": {
                "datasetAlleleResponses": {"accessLevelSummary": "PUBLIC", "frequency": "REGISTERED"}
            },
            "datasets": [
                {"stable_id": "ds1", "parent_field": "datasetAlleleResponses",
                 "field": "frequency", "access_level": "REGISTERED"}
            ]
        }
    }))
    .unwrap();
    let resolved = ConfigLoader::resolve_config(config, camino::Utf8Path::new(".")).unwrap();

    let terms = resolved.catalog.terms();
    assert_eq!(terms[0].label.as_deref(), Some("female"));
    let ds1 = resolved.catalog.find_by_stable_id("ds1").unwrap();
    let conditions = ds1.data_use_conditions.unwrap();
    assert_eq!(conditions.consent_code_data_use.primary_category.code, "HMB");
    assert_eq!(conditions.consent_code_data_use.requirements.len(), 1);

    let engine = resolved.build_engine().unwrap();
    let levels = engine.list_access_levels(&AccessLevelRequest::default()).unwrap();
    assert_eq!(
        levels.fields["datasetAlleleResponses"],
        FieldAccess::Level(AccessLevel::Public)
    );
    assert_eq!(levels.datasets["ds2"], DatasetAccess::Level(AccessLevel::Controlled));
}

#[test]
fn access_levels_for_unknown_dataset_rejected() {
    let config: Config = serde_json::from_value(json!({
        "access_levels": {
            "datasets": [
                {"stable_id": "ghost", "parent_field": "accessLevelSummary",
                 "field": "accessLevelSummary", "access_level": "PUBLIC"}
            ]
        }
    }))
    .unwrap();
    let err = ConfigLoader::resolve_config(config, camino::Utf8Path::new(".")).unwrap_err();
    assert_matches!(err, BeaconError::InvalidConfig(_));
}
