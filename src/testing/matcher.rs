//! Response matching
//!
//! A pure function of (scenario, captured response). Every check runs, so a
//! failing scenario reports all of its mismatches at once.

use serde::Serialize;
use serde_json::Value;

use super::config::{BodyAssertion, Predicate, Scenario};
use super::executor::CapturedResponse;

/// Longest body excerpt quoted in a failure
const BODY_EXCERPT_CHARS: usize = 200;

/// Terminal state of one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Matched,
    Mismatched,
    Errored,
}

/// One expected-versus-actual divergence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// What was checked, e.g. `status` or `$.status equals`
    pub check: String,
    pub expected: String,
    pub actual: String,
}

impl Failure {
    pub fn new(check: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result of matching one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub outcome: Outcome,
    pub failures: Vec<Failure>,
}

/// Evaluate every expectation of `scenario` against `response`
pub fn evaluate(scenario: &Scenario, response: &CapturedResponse) -> MatchResult {
    let expectation = &scenario.expectation;
    let mut failures = Vec::new();
    let mut errored = false;

    if response.status != expectation.status {
        failures.push(Failure::new(
            "status",
            expectation.status.to_string(),
            response.status.to_string(),
        ));
    }

    if !expectation.body.is_empty() {
        if scenario.request.has_malformed_json_payload() {
            failures.push(Failure::new(
                "body",
                "body assertions evaluated",
                "not evaluated: the request payload is not valid JSON",
            ));
        } else {
            match serde_json::from_str::<Value>(&response.body) {
                Ok(document) => {
                    failures.extend(
                        expectation
                            .body
                            .iter()
                            .filter_map(|assertion| check_assertion(assertion, &document)),
                    );
                }
                Err(e) => {
                    errored = true;
                    failures.push(Failure::new(
                        "body",
                        "a JSON document",
                        format!("unparseable ({}): {}", e, excerpt(&response.body)),
                    ));
                }
            }
        }
    }

    let outcome = if errored {
        Outcome::Errored
    } else if failures.is_empty() {
        Outcome::Matched
    } else {
        Outcome::Mismatched
    };

    MatchResult { outcome, failures }
}

fn check_assertion(assertion: &BodyAssertion, document: &Value) -> Option<Failure> {
    let path = assertion.path.as_str();
    let found = match assertion.path.resolve(document) {
        Ok(found) => found,
        Err(e) => return Some(Failure::new(path, "an evaluable path", e)),
    };

    // A JSON null counts as absent for existence checks
    let present = found.as_ref().filter(|value| !value.is_null());

    match &assertion.predicate {
        Predicate::Equals(expected) if found.as_ref() == Some(expected) => None,
        Predicate::Equals(expected) => Some(Failure::new(
            format!("{} equals", path),
            expected.to_string(),
            describe(found.as_ref()),
        )),
        Predicate::Exists => match present {
            Some(_) => None,
            None => Some(Failure::new(
                format!("{} exists", path),
                "a non-null value",
                describe(found.as_ref()),
            )),
        },
        Predicate::NotExists => present.map(|actual| {
            Failure::new(format!("{} not_exists", path), "absent or null", actual.to_string())
        }),
    }
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "absent".to_string(), Value::to_string)
}

fn excerpt(body: &str) -> String {
    if body.is_empty() {
        return "<empty body>".to_string();
    }
    let mut out: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
    if body.chars().count() > BODY_EXCERPT_CHARS {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::config::{parse_suite_yaml, LoadOptions, Suite};
    use std::time::Duration;

    const SUITE: &str = r#"
defaults:
  path: /quick-claim
scenarios:
  - name: created
    request: { json: { claimId: 0 } }
    expect:
      status: 201
      body:
        - { path: "$.status", equals: CREATED }
        - { path: "$.data[0].claimReferenceNumber", exists: true }
        - { path: "$.message", exists: false }
  - name: status-only
    request: { raw: '{"claimId": 0,', content_type: application/json }
    expect: { status: 400 }
  - name: malformed-with-assertions
    request: { raw: '{"claimId": 0,', content_type: application/json }
    expect:
      status: 400
      body:
        - { path: "$.status", equals: ERROR }
"#;

    fn suite() -> Suite {
        parse_suite_yaml(SUITE, &LoadOptions::default()).unwrap()
    }

    fn response(status: u16, body: &str) -> CapturedResponse {
        CapturedResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_created_response_matches() {
        let suite = suite();
        let result = evaluate(
            &suite.scenarios[0],
            &response(201, r#"{"status":"CREATED","data":[{"claimReferenceNumber":"X1"}]}"#),
        );
        assert_eq!(result.outcome, Outcome::Matched);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_every_mismatch_is_reported() {
        let suite = suite();
        let result = evaluate(
            &suite.scenarios[0],
            &response(400, r#"{"status":"ERROR","message":"invalid email"}"#),
        );
        assert_eq!(result.outcome, Outcome::Mismatched);
        assert_eq!(
            result.failures,
            vec![
                Failure::new("status", "201", "400"),
                Failure::new("$.status equals", "\"CREATED\"", "\"ERROR\""),
                Failure::new("$.data[0].claimReferenceNumber exists", "a non-null value", "absent"),
                Failure::new("$.message not_exists", "absent or null", "\"invalid email\""),
            ]
        );
    }

    #[test]
    fn test_null_leaf_does_not_exist() {
        let suite = suite();
        let result = evaluate(
            &suite.scenarios[0],
            &response(
                201,
                r#"{"status":"CREATED","data":[{"claimReferenceNumber":null}],"message":null}"#,
            ),
        );
        assert_eq!(result.outcome, Outcome::Mismatched);
        assert_eq!(
            result.failures,
            vec![Failure::new(
                "$.data[0].claimReferenceNumber exists",
                "a non-null value",
                "null"
            )]
        );
    }

    #[test]
    fn test_equals_null_requires_explicit_null() {
        let suite = parse_suite_yaml(
            r#"
scenarios:
  - name: null-note
    request: { path: /x }
    expect:
      status: 200
      body:
        - { path: "$.note", equals: null }
"#,
            &LoadOptions::default(),
        )
        .unwrap();
        let scenario = &suite.scenarios[0];

        assert_eq!(evaluate(scenario, &response(200, r#"{"note":null}"#)).outcome, Outcome::Matched);
        let missing = evaluate(scenario, &response(200, "{}"));
        assert_eq!(missing.outcome, Outcome::Mismatched);
        assert_eq!(missing.failures[0].actual, "absent");
    }

    #[test]
    fn test_wildcard_paths_are_evaluated() {
        let suite = parse_suite_yaml(
            r#"
scenarios:
  - name: refs
    request: { path: /x }
    expect:
      status: 200
      body:
        - { path: "$..claimReferenceNumber", exists: true }
        - { path: "$.data[*].claimReferenceNumber", equals: [X1, X2] }
"#,
            &LoadOptions::default(),
        )
        .unwrap();
        let result = evaluate(
            &suite.scenarios[0],
            &response(
                200,
                r#"{"data":[{"claimReferenceNumber":"X1"},{"claimReferenceNumber":"X2"}]}"#,
            ),
        );
        assert_eq!(result.outcome, Outcome::Matched, "{:?}", result.failures);
    }

    #[test]
    fn test_unparseable_body_is_errored() {
        let suite = suite();
        let result = evaluate(&suite.scenarios[0], &response(201, "<html>oops</html>"));
        assert_eq!(result.outcome, Outcome::Errored);
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].actual.contains("<html>oops</html>"));
    }

    #[test]
    fn test_status_only_ignores_body() {
        let suite = suite();
        for body in ["", "not json", r#"{"status":"ERROR"}"#] {
            let result = evaluate(&suite.scenarios[1], &response(400, body));
            assert_eq!(result.outcome, Outcome::Matched, "body {:?}", body);
        }
        let result = evaluate(&suite.scenarios[1], &response(500, ""));
        assert_eq!(result.outcome, Outcome::Mismatched);
    }

    #[test]
    fn test_malformed_request_with_body_assertions_never_matches() {
        let suite = suite();
        let result = evaluate(&suite.scenarios[2], &response(400, r#"{"status":"ERROR"}"#));
        assert_eq!(result.outcome, Outcome::Mismatched);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].check, "body");
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let suite = suite();
        let resp = response(400, r#"{"status":"ERROR","message":"x"}"#);
        let first = evaluate(&suite.scenarios[0], &resp);
        let second = evaluate(&suite.scenarios[0], &resp);
        assert_eq!(first, second);
    }

    #[test]
    fn test_excerpt_truncates_long_bodies() {
        let long = "x".repeat(500);
        let text = excerpt(&long);
        assert_eq!(text.chars().count(), BODY_EXCERPT_CHARS + 1);
        assert_eq!(excerpt(""), "<empty body>");
    }
}
