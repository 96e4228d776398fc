//! Scenario suite definitions
//!
//! Suites are deserialized into loose `*Def` shapes first and then validated
//! into the immutable [`Suite`] the runner consumes. Validation collects
//! every problem in the file so authors can fix them in one pass.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::common::{Error, Result};

use super::json_path::JsonPath;

/// Content type used for structured payloads when nothing else is given
pub const JSON_CONTENT_TYPE: &str = "application/json";

// ---------------------------------------------------------------------------
// File shapes
// ---------------------------------------------------------------------------

/// A suite as written on disk
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct SuiteDef {
    /// Name of the suite, defaults to the file stem
    name: Option<String>,
    /// Request settings shared by every scenario
    #[serde(default)]
    defaults: DefaultsDef,
    /// The scenarios, in reporting order
    #[serde(default)]
    scenarios: Vec<ScenarioDef>,
}

/// Request settings shared by every scenario in a suite
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct DefaultsDef {
    method: Option<String>,
    path: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    content_type: Option<Option<String>>,
    #[serde(default)]
    headers: HeadersDef,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ScenarioDef {
    name: String,
    description: Option<String>,
    #[serde(default)]
    request: RequestDef,
    expect: ExpectDef,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RequestDef {
    method: Option<String>,
    path: Option<String>,
    /// Explicit `null` means "send no Content-Type at all"
    #[serde(default, deserialize_with = "deserialize_some")]
    content_type: Option<Option<String>>,
    #[serde(default)]
    headers: HeadersDef,
    /// Whether suite-level headers apply to this scenario
    #[serde(default = "default_inherit_headers")]
    inherit_headers: bool,
    /// Structured payload, serialized as JSON; an explicit `null` is sent as `null`
    #[serde(default, deserialize_with = "deserialize_some")]
    json: Option<Value>,
    /// Payload sent byte-for-byte, may be deliberately malformed
    raw: Option<String>,
}

fn default_inherit_headers() -> bool {
    true
}

impl Default for RequestDef {
    fn default() -> Self {
        Self {
            method: None,
            path: None,
            content_type: None,
            headers: HeadersDef::default(),
            inherit_headers: default_inherit_headers(),
            json: None,
            raw: None,
        }
    }
}

/// Headers may be written as a map or as a list of `Name: value` strings
///
/// Map values may be any scalar, so `RequestID: 12345` works unquoted.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum HeadersDef {
    Map(BTreeMap<String, Value>),
    Lines(Vec<String>),
}

impl Default for HeadersDef {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct ExpectDef {
    status: u16,
    #[serde(default)]
    body: Vec<AssertionDef>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct AssertionDef {
    path: String,
    /// Present-but-null means "equals null"
    #[serde(default, deserialize_with = "deserialize_some")]
    equals: Option<Value>,
    exists: Option<bool>,
    not_exists: Option<bool>,
}

/// Distinguish an absent field from an explicit `null`
fn deserialize_some<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Validated model
// ---------------------------------------------------------------------------

/// A validated, immutable suite of scenarios
#[derive(Debug, Clone)]
pub struct Suite {
    /// Suite name used in reports
    pub name: String,
    /// Scenarios in definition order
    pub scenarios: Vec<Arc<Scenario>>,
}

/// One independent test case
#[derive(Debug)]
pub struct Scenario {
    /// Unique name within the suite
    pub name: String,
    /// Optional human description
    pub description: Option<String>,
    /// The request to send
    pub request: RequestSpec,
    /// What the response must look like
    pub expectation: ExpectationSpec,
}

/// A fully resolved request
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    /// Path relative to the target base URL, may carry a query string
    pub path: String,
    /// Merged headers, Content-Type excluded
    pub headers: Vec<(String, String)>,
    /// Content-Type to send, if any
    pub content_type: Option<String>,
    pub body: Option<RequestBody>,
}

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Structured payload, serialized once as JSON
    Json(Value),
    /// Verbatim payload, never re-encoded
    Raw(String),
}

impl RequestSpec {
    /// The exact bytes put on the wire, if any
    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        match &self.body {
            Some(RequestBody::Json(value)) => Some(value.to_string().into_bytes()),
            Some(RequestBody::Raw(raw)) => Some(raw.clone().into_bytes()),
            None => None,
        }
    }

    /// True when a raw payload declared as JSON does not parse as JSON
    pub fn has_malformed_json_payload(&self) -> bool {
        let declared_json = self
            .content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        match &self.body {
            Some(RequestBody::Raw(raw)) if declared_json => {
                serde_json::from_str::<Value>(raw).is_err()
            }
            _ => false,
        }
    }
}

/// Expected response shape
#[derive(Debug, Clone)]
pub struct ExpectationSpec {
    pub status: u16,
    /// Evaluated in order, every one of them, on each run
    pub body: Vec<BodyAssertion>,
}

/// One JSON body check
#[derive(Debug, Clone)]
pub struct BodyAssertion {
    pub path: JsonPath,
    pub predicate: Predicate,
}

/// What must hold at a JSON path
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Deep equality with the given value
    Equals(Value),
    /// Path resolves to a non-null value
    Exists,
    /// Path does not resolve, or resolves to `null`
    NotExists,
}

/// Harness-side settings merged into every suite on load
#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    /// Headers from the config file, overridden by suite defaults
    pub config_headers: Vec<(String, String)>,
    /// Headers from the command line, overriding suite defaults
    pub cli_headers: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load and validate a suite file
///
/// `.json` files are parsed as JSON, everything else as YAML.
pub fn load_suite(path: &Path, options: &LoadOptions) -> Result<Suite> {
    let origin = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| Error::SuiteRead {
        path: origin.clone(),
        error: e.to_string(),
    })?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let def: SuiteDef = if is_json {
        serde_json::from_str(&content).map_err(|e| Error::SuiteParse {
            path: origin.clone(),
            error: e.to_string(),
        })?
    } else {
        serde_yaml::from_str(&content).map_err(|e| Error::SuiteParse {
            path: origin.clone(),
            error: e.to_string(),
        })?
    };

    let fallback_name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("suite")
        .to_string();

    let suite = build_suite(def, &origin, fallback_name, options)?;
    tracing::debug!(
        suite = %suite.name,
        scenarios = suite.scenarios.len(),
        "Loaded suite"
    );
    Ok(suite)
}

/// Parse and validate a YAML suite held in memory
pub fn parse_suite_yaml(content: &str, options: &LoadOptions) -> Result<Suite> {
    let def: SuiteDef = serde_yaml::from_str(content).map_err(|e| Error::SuiteParse {
        path: "<inline>".to_string(),
        error: e.to_string(),
    })?;
    build_suite(def, "<inline>", "suite".to_string(), options)
}

fn build_suite(
    def: SuiteDef,
    origin: &str,
    fallback_name: String,
    options: &LoadOptions,
) -> Result<Suite> {
    let mut problems = Vec::new();

    if def.scenarios.is_empty() {
        problems.push("suite has no scenarios".to_string());
    }

    // Config headers < suite defaults < CLI headers
    let mut shared_headers = Vec::new();
    merge_headers(&mut shared_headers, options.config_headers.iter().cloned());
    merge_headers(
        &mut shared_headers,
        flatten_headers(&def.defaults.headers, "defaults", &mut problems),
    );
    merge_headers(&mut shared_headers, options.cli_headers.iter().cloned());

    let mut seen = HashSet::new();
    let mut scenarios = Vec::with_capacity(def.scenarios.len());

    for (index, scenario) in def.scenarios.into_iter().enumerate() {
        let label = if scenario.name.trim().is_empty() {
            format!("scenario #{}", index + 1)
        } else {
            format!("scenario '{}'", scenario.name)
        };

        if scenario.name.trim().is_empty() {
            problems.push(format!("{}: name must not be empty", label));
        } else if !seen.insert(scenario.name.clone()) {
            problems.push(format!("{}: duplicate scenario name", label));
        }

        let request = build_request(
            scenario.request,
            &def.defaults,
            &shared_headers,
            &label,
            &mut problems,
        );
        let expectation = build_expectation(scenario.expect, &label, &mut problems);

        if let (Some(request), Some(expectation)) = (request, expectation) {
            scenarios.push(Arc::new(Scenario {
                name: scenario.name,
                description: scenario.description,
                request,
                expectation,
            }));
        }
    }

    if !problems.is_empty() {
        return Err(Error::suite_invalid(origin, problems));
    }

    Ok(Suite {
        name: def.name.unwrap_or(fallback_name),
        scenarios,
    })
}

fn build_request(
    def: RequestDef,
    defaults: &DefaultsDef,
    shared_headers: &[(String, String)],
    label: &str,
    problems: &mut Vec<String>,
) -> Option<RequestSpec> {
    let before = problems.len();

    let method_name = def
        .method
        .or_else(|| defaults.method.clone())
        .unwrap_or_else(|| "POST".to_string())
        .to_ascii_uppercase();
    let method = match Method::from_bytes(method_name.as_bytes()) {
        Ok(method) => Some(method),
        Err(_) => {
            problems.push(format!("{}: invalid method '{}'", label, method_name));
            None
        }
    };

    let path = def.path.or_else(|| defaults.path.clone());
    match &path {
        None => problems.push(format!("{}: no request path and no default path", label)),
        Some(p) if !p.starts_with('/') => {
            problems.push(format!("{}: path '{}' must start with '/'", label, p))
        }
        Some(_) => {}
    }

    let body = match (def.json, def.raw) {
        (Some(_), Some(_)) => {
            problems.push(format!("{}: request sets both 'json' and 'raw'", label));
            None
        }
        (Some(value), None) => Some(RequestBody::Json(value)),
        (None, Some(raw)) => Some(RequestBody::Raw(raw)),
        (None, None) => None,
    };

    let content_type = match def.content_type {
        Some(explicit) => explicit,
        None => match &defaults.content_type {
            Some(shared) => shared.clone(),
            None => match &body {
                Some(RequestBody::Json(_)) => Some(JSON_CONTENT_TYPE.to_string()),
                _ => None,
            },
        },
    };
    if let Some(ct) = &content_type {
        if HeaderValue::from_str(ct).is_err() {
            problems.push(format!("{}: invalid content type '{}'", label, ct));
        }
    }

    let mut headers = Vec::new();
    if def.inherit_headers {
        merge_headers(&mut headers, shared_headers.iter().cloned());
    }
    merge_headers(&mut headers, flatten_headers(&def.headers, label, problems));

    for (name, value) in &headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            problems.push(format!("{}: invalid header name '{}'", label, name));
        } else if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
            problems.push(format!(
                "{}: set the content type with 'content_type', not as a header",
                label
            ));
        }
        if HeaderValue::from_str(value).is_err() {
            problems.push(format!("{}: invalid value for header '{}'", label, name));
        }
    }

    if problems.len() > before {
        return None;
    }

    Some(RequestSpec {
        method: method?,
        path: path?,
        headers,
        content_type,
        body,
    })
}

fn build_expectation(
    def: ExpectDef,
    label: &str,
    problems: &mut Vec<String>,
) -> Option<ExpectationSpec> {
    let before = problems.len();

    if !(100..=599).contains(&def.status) {
        problems.push(format!("{}: status {} is not a valid HTTP status", label, def.status));
    }

    let mut body = Vec::with_capacity(def.body.len());
    for (i, assertion) in def.body.into_iter().enumerate() {
        let at = format!("{} assertion #{}", label, i + 1);

        let path = match JsonPath::parse(&assertion.path) {
            Ok(path) => Some(path),
            Err(e) => {
                problems.push(format!("{}: {}", at, e));
                None
            }
        };

        let mut predicates = Vec::new();
        if let Some(value) = assertion.equals {
            predicates.push(Predicate::Equals(value));
        }
        match assertion.exists {
            Some(true) => predicates.push(Predicate::Exists),
            Some(false) => predicates.push(Predicate::NotExists),
            None => {}
        }
        match assertion.not_exists {
            Some(true) => predicates.push(Predicate::NotExists),
            Some(false) => predicates.push(Predicate::Exists),
            None => {}
        }

        if predicates.len() != 1 {
            problems.push(format!(
                "{}: expected exactly one of 'equals', 'exists' or 'not_exists', found {}",
                at,
                predicates.len()
            ));
            continue;
        }

        if let (Some(path), Some(predicate)) = (path, predicates.pop()) {
            body.push(BodyAssertion { path, predicate });
        }
    }

    if problems.len() > before {
        return None;
    }
    Some(ExpectationSpec {
        status: def.status,
        body,
    })
}

fn flatten_headers(
    def: &HeadersDef,
    label: &str,
    problems: &mut Vec<String>,
) -> Vec<(String, String)> {
    match def {
        HeadersDef::Map(map) => map
            .iter()
            .filter_map(|(name, value)| match value {
                Value::String(text) => Some((name.clone(), text.clone())),
                Value::Number(_) | Value::Bool(_) => Some((name.clone(), value.to_string())),
                _ => {
                    problems.push(format!(
                        "{}: header '{}' must be a string, number or boolean",
                        label, name
                    ));
                    None
                }
            })
            .collect(),
        HeadersDef::Lines(lines) => lines
            .iter()
            .filter_map(|line| {
                let pair = parse_header_line(line);
                if pair.is_none() {
                    problems.push(format!("{}: malformed header '{}'", label, line));
                }
                pair
            })
            .collect(),
    }
}

/// Parse a `Name: value` header line
pub fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Insert headers, replacing earlier ones with the same case-insensitive name
fn merge_headers(
    target: &mut Vec<(String, String)>,
    incoming: impl IntoIterator<Item = (String, String)>,
) {
    for (name, value) in incoming {
        target.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        target.push((name, value));
    }
}

impl Suite {
    /// Keep only scenarios whose name contains `needle`, preserving order
    pub fn filtered(&self, needle: &str) -> Result<Suite> {
        let scenarios: Vec<_> = self
            .scenarios
            .iter()
            .filter(|s| s.name.contains(needle))
            .cloned()
            .collect();
        if scenarios.is_empty() {
            return Err(Error::EmptySelection(needle.to_string()));
        }
        Ok(Suite {
            name: self.name.clone(),
            scenarios,
        })
    }
}
