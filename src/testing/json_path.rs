//! JSON path expressions for body assertions
//!
//! Expressions are checked when the suite loads and evaluated with
//! `jsonpath_lib` against each response document.

use std::fmt;

use jsonpath_lib::{select, Selector};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// A syntax-checked JSON path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
}

impl JsonPath {
    /// Check an expression, returning a description of the problem
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('$') {
            return Err(format!("path '{}' must start with '$'", raw));
        }
        Selector::new()
            .str_path(trimmed)
            .map(|_| ())
            .map_err(|e| format!("path '{}' is not a valid JSON path: {:?}", raw, e))?;

        Ok(Self {
            raw: trimmed.to_string(),
        })
    }

    /// Resolve the path against a document
    ///
    /// No match is `None`. A single match is returned as-is and several
    /// matches are collected into an array.
    pub fn resolve(&self, document: &Value) -> Result<Option<Value>, String> {
        let matches = select(document, &self.raw)
            .map_err(|e| format!("failed to evaluate '{}': {:?}", self.raw, e))?;
        match matches.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some((*single).clone())),
            many => Ok(Some(Value::Array(many.iter().map(|v| (*v).clone()).collect()))),
        }
    }

    /// The path as written (trimmed)
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for JsonPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claim_response() -> Value {
        json!({
            "status": "CREATED",
            "data": [
                { "claimReferenceNumber": "X1", "note": null },
                { "claimReferenceNumber": "X2" }
            ],
            "odd key": { "x": 1 }
        })
    }

    fn resolve(raw: &str) -> Option<Value> {
        JsonPath::parse(raw).unwrap().resolve(&claim_response()).unwrap()
    }

    #[test]
    fn test_member_and_index_access() {
        assert_eq!(resolve("$.data[0].claimReferenceNumber"), Some(json!("X1")));
        assert_eq!(resolve("$.status"), Some(json!("CREATED")));
        assert_eq!(resolve("$['odd key'].x"), Some(json!(1)));
    }

    #[test]
    fn test_wildcard_and_deep_scan_collect_matches() {
        assert_eq!(resolve("$.data[*].claimReferenceNumber"), Some(json!(["X1", "X2"])));
        assert_eq!(resolve("$..claimReferenceNumber"), Some(json!(["X1", "X2"])));
        assert_eq!(resolve("$..x"), Some(json!(1)));
    }

    #[test]
    fn test_missing_steps_are_absent() {
        for raw in ["$.message", "$.data[3]", "$.status.inner", "$..missing"] {
            assert_eq!(resolve(raw), None, "{} should be absent", raw);
        }
    }

    #[test]
    fn test_invalid_paths_rejected() {
        for raw in ["status", "", "data[0]", "$[", "$.data[0"] {
            assert!(JsonPath::parse(raw).is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn test_path_is_trimmed() {
        let path = JsonPath::parse("  $.status ").unwrap();
        assert_eq!(path.as_str(), "$.status");
        assert_eq!(path.to_string(), "$.status");
    }
}
