use assert_matches::assert_matches;

use allele_beacon::catalog::Catalog;
use allele_beacon::error::BeaconError;
use allele_beacon::filters::{FilterTranslator, FilterValue, OntologyMapping, Operator, and_clause};

fn catalog() -> Catalog {
    let mapping = |column: &str, value: Option<&str>| OntologyMapping {
        column: column.to_string(),
        value: value.map(str::to_string),
    };
    Catalog::new(
        Vec::new(),
        vec![
            ("PATO".to_string(), "0000383".to_string(), mapping("sex", Some("female"))),
            ("HP".to_string(), "0011007".to_string(), mapping("age_of_onset", None)),
            ("myDictionary".to_string(), "Illumina".to_string(), mapping("technology", Some("Illumina"))),
        ],
    )
    .unwrap()
}

fn translate(filters: &[&str]) -> Result<Vec<allele_beacon::filters::FilterTerm>, BeaconError> {
    let catalog = catalog();
    let owned = filters.iter().map(|f| f.to_string()).collect::<Vec<_>>();
    FilterTranslator::new(&catalog).translate(&owned)
}

#[test]
fn fixed_value_from_lookup() {
    let terms = translate(&["PATO:0000383"]).unwrap();
    assert_eq!(terms[0].column, "sex");
    assert_eq!(terms[0].operator, Operator::Eq);
    assert_eq!(terms[0].value, FilterValue::Text("female".to_string()));
    assert_eq!(terms[0].to_string(), "sex='female'");
}

#[test]
fn operator_and_value_parsed() {
    let terms = translate(&["HP:0011007 >= 49"]).unwrap();
    assert_eq!(terms[0].term, "0011007");
    assert_eq!(terms[0].operator, Operator::Ge);
    assert_eq!(terms[0].value, FilterValue::Integer(49));
    assert_eq!(terms[0].to_string(), "age_of_onset>=49");
}

#[test]
fn predicates_joined_with_and() {
    let terms = translate(&["PATO:0000383", "HP:0011007<10"]).unwrap();
    assert_eq!(
        and_clause(&terms).as_deref(),
        Some("sex='female' AND age_of_onset<10")
    );
    assert_eq!(and_clause(&[]), None);
}

#[test]
fn unknown_term_names_pair() {
    let err = translate(&["HP:9999999"]).unwrap_err();
    assert_matches!(&err, BeaconError::Validation(message) if message.contains("HP") && message.contains("9999999"));
}

#[test]
fn missing_colon_rejected() {
    assert_matches!(translate(&["PATO0000383"]), Err(BeaconError::Validation(_)));
}

#[test]
fn term_without_any_value_rejected() {
    assert_matches!(translate(&["HP:0011007"]), Err(BeaconError::Validation(_)));
}
