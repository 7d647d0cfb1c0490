use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BeaconError;

static OPERATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d(<=|>=|=|<|>)\d").expect("operator pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyMapping {
    pub column: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilteringTerm {
    pub ontology: String,
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

pub trait OntologyLookup: Send + Sync {
    fn find(&self, ontology: &str, term: &str) -> Option<OntologyMapping>;
    // Ordered by ontology, then term.
    fn terms(&self) -> Vec<FilteringTerm>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "=" => Some(Operator::Eq),
            "<" => Some(Operator::Lt),
            ">" => Some(Operator::Gt),
            "<=" => Some(Operator::Le),
            ">=" => Some(Operator::Ge),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }

    pub fn compare<T: PartialOrd>(self, left: &T, right: &T) -> bool {
        match self {
            Operator::Eq => left == right,
            Operator::Lt => left < right,
            Operator::Gt => left > right,
            Operator::Le => left <= right,
            Operator::Ge => left >= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Integer(i64),
    Text(String),
}

impl FilterValue {
    fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(value) => FilterValue::Integer(value),
            Err(_) => FilterValue::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Integer(value) => write!(f, "{value}"),
            FilterValue::Text(value) => write!(f, "'{}'", value.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTerm {
    pub ontology: String,
    pub term: String,
    pub column: String,
    pub operator: Operator,
    pub value: FilterValue,
}

impl fmt::Display for FilterTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.column, self.operator.as_str(), self.value)
    }
}

pub fn and_clause(terms: &[FilterTerm]) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" AND "),
    )
}

pub struct FilterTranslator<'a> {
    lookup: &'a dyn OntologyLookup,
}

impl<'a> FilterTranslator<'a> {
    pub fn new(lookup: &'a dyn OntologyLookup) -> Self {
        Self { lookup }
    }

    // The first unknown expression aborts.
    pub fn translate(&self, filters: &[String]) -> Result<Vec<FilterTerm>, BeaconError> {
        filters.iter().map(|filter| self.translate_one(filter)).collect()
    }

    fn translate_one(&self, filter: &str) -> Result<FilterTerm, BeaconError> {
        let compact: String = filter.chars().filter(|ch| !ch.is_whitespace()).collect();
        let (ontology, remainder) = compact.split_once(':').ok_or_else(|| {
            BeaconError::validation(format!(
                "Invalid filter ({filter}), expected ONTOLOGY:TERM[OPERATOR VALUE]"
            ))
        })?;

        let symbol = OPERATOR_RE
            .captures(remainder)
            .and_then(|caps| caps.get(1));
        let (term, operator, parsed_value) = match symbol {
            Some(symbol) => {
                let operator = Operator::parse(symbol.as_str()).unwrap_or(Operator::Eq);
                let term = &remainder[..symbol.start()];
                let value = &remainder[symbol.end()..];
                (term, operator, Some(value))
            }
            None => (remainder, Operator::Eq, None),
        };

        let mapping = self.lookup.find(ontology, term).ok_or_else(|| {
            BeaconError::validation(format!(
                "Ontology ({ontology}) and/or term ({term}) not known in this Beacon. \
                 Remember that only the following operators are accepted in some terms \
                 (e.g. age_of_onset): <=, >=, =, <, >"
            ))
        })?;

        let value = mapping
            .value
            .as_deref()
            .filter(|v| !v.is_empty())
            .or(parsed_value)
            .ok_or_else(|| {
                BeaconError::validation(format!(
                    "Filter ({filter}) needs a value for term {ontology}:{term}"
                ))
            })?;

        Ok(FilterTerm {
            ontology: ontology.to_string(),
            term: term.to_string(),
            column: mapping.column,
            operator,
            value: FilterValue::parse(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    struct Table(HashMap<(String, String), OntologyMapping>);

    impl OntologyLookup for Table {
        fn find(&self, ontology: &str, term: &str) -> Option<OntologyMapping> {
            self.0
                .get(&(ontology.to_string(), term.to_string()))
                .cloned()
        }

        fn terms(&self) -> Vec<FilteringTerm> {
            Vec::new()
        }
    }

    fn table() -> Table {
        let mut map = HashMap::new();
        map.insert(
            ("HP".to_string(), "0001507".to_string()),
            OntologyMapping {
                column: "age_onset".to_string(),
                value: None,
            },
        );
        map.insert(
            ("PATO".to_string(), "0000383".to_string()),
            OntologyMapping {
                column: "sex".to_string(),
                value: Some("female".to_string()),
            },
        );
        Table(map)
    }

    #[test]
    fn numeric_comparison() {
        let table = table();
        let terms = FilterTranslator::new(&table)
            .translate(&["HP:0001507>=10".to_string()])
            .unwrap();
        assert_eq!(terms[0].to_string(), "age_onset>=10");
        assert_eq!(terms[0].operator, Operator::Ge);
    }

    #[test]
    fn whitespace_is_stripped() {
        let table = table();
        let terms = FilterTranslator::new(&table)
            .translate(&[" HP : 0001507 < 4 ".to_string()])
            .unwrap();
        assert_eq!(terms[0].to_string(), "age_onset<4");
    }

    #[test]
    fn fixed_value_is_quoted_text() {
        let table = table();
        let terms = FilterTranslator::new(&table)
            .translate(&["PATO:0000383".to_string()])
            .unwrap();
        assert_eq!(terms[0].to_string(), "sex='female'");
        assert_eq!(and_clause(&terms).as_deref(), Some("sex='female'"));
    }

    #[test]
    fn embedded_quotes_doubled() {
        let term = FilterTerm {
            ontology: "NCIT".to_string(),
            term: "C25464".to_string(),
            column: "country".to_string(),
            operator: Operator::Eq,
            value: FilterValue::Text("Cote d'Ivoire' OR '1'='1".to_string()),
        };
        assert_eq!(term.to_string(), "country='Cote d''Ivoire'' OR ''1''=''1'");
    }

    #[test]
    fn unknown_pair_names_it() {
        let table = table();
        let err = FilterTranslator::new(&table)
            .translate(&["PATO:0000383".to_string(), "EFO:0009656".to_string()])
            .unwrap_err();
        assert_matches!(&err, BeaconError::Validation(msg) if msg.contains("EFO") && msg.contains("0009656"));
    }

    #[test]
    fn missing_separator_rejected() {
        let table = table();
        let err = FilterTranslator::new(&table)
            .translate(&["HP0001507".to_string()])
            .unwrap_err();
        assert_matches!(err, BeaconError::Validation(_));
    }
}
