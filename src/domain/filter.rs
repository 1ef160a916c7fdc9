//! Vendor-neutral filter DSL over chunk payload fields
//!
//! A small algebraic predicate language translated by each vector-store
//! backend into its native filter. Translation is a pure function; backends
//! that cannot express a construct reject it with a validation error at
//! translation time, never silently.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::{Error, Result};
use crate::domain::types::payload;

/// Predicate over vector point payloads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// `field == value`
    Eq { field: String, value: Value },
    /// `field ∈ values`
    In { field: String, values: Vec<Value> },
    /// Numeric range, inclusive on both ends; either bound may be open
    Range {
        field: String,
        gte: Option<f64>,
        lte: Option<f64>,
    },
    /// Field present in the payload
    Exists { field: String },
    /// String field starts with the given path prefix
    PathPrefix { field: String, prefix: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Convenience constructor for the common equality case
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Restrict to files under a directory prefix
    pub fn path_prefix(prefix: impl Into<String>) -> Self {
        Filter::PathPrefix {
            field: payload::FILE_PATH.to_string(),
            prefix: prefix.into(),
        }
    }

    /// Reject filters referencing fields outside the payload schema.
    ///
    /// Backends call this as the first step of translation so an unknown
    /// field fails with `Validation` regardless of the backend in use.
    pub fn validate_fields(&self) -> Result<()> {
        match self {
            Filter::Eq { field, .. }
            | Filter::In { field, .. }
            | Filter::Range { field, .. }
            | Filter::Exists { field }
            | Filter::PathPrefix { field, .. } => {
                if payload::KNOWN_FIELDS.contains(&field.as_str()) {
                    Ok(())
                } else {
                    Err(Error::validation(format!(
                        "unknown filter field: {field}"
                    )))
                }
            }
            Filter::And(inner) | Filter::Or(inner) => {
                inner.iter().try_for_each(Filter::validate_fields)
            }
            Filter::Not(inner) => inner.validate_fields(),
        }
    }

    /// Evaluate the predicate against a payload.
    ///
    /// This is the reference semantics; the in-process vector stores
    /// translate the DSL to exactly this evaluation.
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        match self {
            Filter::Eq { field, value } => payload.get(field) == Some(value),
            Filter::In { field, values } => payload
                .get(field)
                .is_some_and(|v| values.iter().any(|candidate| candidate == v)),
            Filter::Range { field, gte, lte } => payload
                .get(field)
                .and_then(Value::as_f64)
                .is_some_and(|v| {
                    gte.is_none_or(|lo| v >= lo) && lte.is_none_or(|hi| v <= hi)
                }),
            Filter::Exists { field } => payload.contains_key(field),
            Filter::PathPrefix { field, prefix } => payload
                .get(field)
                .and_then(Value::as_str)
                .is_some_and(|v| v.starts_with(prefix.as_str())),
            Filter::And(inner) => inner.iter().all(|f| f.matches(payload)),
            Filter::Or(inner) => inner.iter().any(|f| f.matches(payload)),
            Filter::Not(inner) => !inner.matches(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("file_path".into(), json!("src/auth/login.rs"));
        map.insert("language".into(), json!("rust"));
        map.insert("line_start".into(), json!(42));
        map.insert("chunk_kind".into(), json!("function"));
        map
    }

    #[test]
    fn unknown_fields_fail_validation() {
        let filter = Filter::eq("geo_location", "here");
        let err = filter.validate_fields().unwrap_err();
        assert_eq!(err.kind(), "validation");

        let nested = Filter::And(vec![
            Filter::eq("language", "rust"),
            Filter::Not(Box::new(Filter::Exists {
                field: "no_such_field".into(),
            })),
        ]);
        assert!(nested.validate_fields().is_err());
    }

    #[test]
    fn known_fields_pass_validation() {
        let filter = Filter::And(vec![
            Filter::eq("language", "rust"),
            Filter::path_prefix("src/"),
            Filter::Range {
                field: "line_start".into(),
                gte: Some(1.0),
                lte: None,
            },
        ]);
        assert!(filter.validate_fields().is_ok());
    }

    #[test]
    fn predicate_semantics() {
        let payload = sample_payload();
        assert!(Filter::eq("language", "rust").matches(&payload));
        assert!(!Filter::eq("language", "go").matches(&payload));
        assert!(Filter::In {
            field: "chunk_kind".into(),
            values: vec![json!("function"), json!("method")],
        }
        .matches(&payload));
        assert!(Filter::Range {
            field: "line_start".into(),
            gte: Some(40.0),
            lte: Some(50.0),
        }
        .matches(&payload));
        assert!(Filter::path_prefix("src/auth").matches(&payload));
        assert!(!Filter::path_prefix("tests/").matches(&payload));
        assert!(Filter::Not(Box::new(Filter::eq("language", "go"))).matches(&payload));
        assert!(Filter::Or(vec![
            Filter::eq("language", "go"),
            Filter::Exists {
                field: "line_start".into()
            },
        ])
        .matches(&payload));
    }
}
