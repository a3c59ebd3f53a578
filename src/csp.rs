use crate::message;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

const CSP_VIOLATION_TYPE: &str = "csp-violation";

/// Legacy `report-uri` payload: `{"csp-report": {...}}`.
#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct CspEnvelope {
    #[serde(rename = "csp-report", default, deserialize_with = "lenient_object")]
    pub csp_report: Option<CspReport>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CspReport {
    #[serde(default, deserialize_with = "lenient_string")]
    pub blocked_uri: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub line_number: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub column_number: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub document_uri: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_file: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub violated_directive: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub original_policy: Option<String>,
}

/// One entry of a Reporting-API (`report-to`) delivery.
#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
pub struct ReportToItem {
    #[serde(default, deserialize_with = "lenient_number")]
    pub age: Option<i64>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub body: Option<ReportToBody>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub type_field: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportToBody {
    #[serde(rename = "blockedURL", default, deserialize_with = "lenient_string")]
    pub blocked_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub line_number: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub column_number: Option<i64>,
    #[serde(rename = "documentURL", default, deserialize_with = "lenient_string")]
    pub document_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_file: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub effective_directive: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub original_policy: Option<String>,
}

/// Fields shared by both report formats once mapped onto one naming scheme.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    #[serde(rename = "blockedURI", skip_serializing_if = "Option::is_none")]
    pub blocked_uri: Option<String>,
    #[serde(rename = "lineNumber", skip_serializing_if = "Option::is_none")]
    pub line_number: Option<i64>,
    #[serde(rename = "columnNumber", skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,
    #[serde(rename = "documentURI", skip_serializing_if = "Option::is_none")]
    pub document_uri: Option<String>,
    #[serde(rename = "sourceFile", skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(rename = "violatedDirective", skip_serializing_if = "Option::is_none")]
    pub violated_directive: Option<String>,
    #[serde(rename = "originalPolicy", skip_serializing_if = "Option::is_none")]
    pub original_policy: Option<String>,
}

/// Canonical report. The message is always derived from the violation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(flatten)]
    violation: Violation,
    #[serde(skip_serializing_if = "Option::is_none")]
    actual_timestamp: Option<i64>,
    message: String,
}

impl ViolationRecord {
    fn new(violation: Violation, timestamp: Option<i64>, actual_timestamp: Option<i64>) -> Self {
        let message = message::format(&violation);
        ViolationRecord {
            timestamp,
            violation,
            actual_timestamp,
            message,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Output of one `report-to` request; every item shares `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportToBatch {
    pub timestamp: i64,
    pub items: Vec<ViolationRecord>,
}

impl CspEnvelope {
    /// Anything that is not an object carrying `csp-report` yields an empty envelope.
    pub fn from_value(value: Value) -> Self {
        decode_object(value).unwrap_or_default()
    }
}

pub fn normalize_csp_report(raw: CspReport, now: i64) -> ViolationRecord {
    let violation = Violation {
        blocked_uri: raw.blocked_uri,
        line_number: raw.line_number,
        column_number: raw.column_number,
        document_uri: raw.document_uri,
        source_file: raw.source_file,
        violated_directive: raw.violated_directive,
        original_policy: raw.original_policy,
    };
    ViolationRecord::new(violation, Some(now), None)
}

pub fn normalize_report_to_item(raw: ReportToItem, now: i64) -> ViolationRecord {
    if let Some(kind) = raw.type_field.as_deref().filter(|t| *t != CSP_VIOLATION_TYPE) {
        debug!(kind, "normalizing report-to item of unexpected type");
    }
    let body = raw.body.unwrap_or_default();
    let violation = Violation {
        blocked_uri: body.blocked_url,
        line_number: body.line_number,
        column_number: body.column_number,
        document_uri: body.document_url,
        source_file: body.source_file,
        violated_directive: body.effective_directive,
        original_policy: body.original_policy,
    };
    let actual_timestamp = raw.age.map(|age| now.saturating_sub(age));
    ViolationRecord::new(violation, None, actual_timestamp)
}

/// Normalizes a `report-to` body. A single object counts as a batch of one.
pub fn normalize_report_to_batch(value: Value, now: i64) -> ReportToBatch {
    let raw_items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    let items = raw_items
        .into_iter()
        .map(|item| decode_object::<ReportToItem>(item).unwrap_or_default())
        .map(|item| normalize_report_to_item(item, now))
        .collect();

    ReportToBatch {
        timestamp: now,
        items,
    }
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(decode_object(value))
}

/// Derived structs would also fill their fields from an array by position,
/// so only JSON objects are decoded.
fn decode_object<T: DeserializeOwned>(value: Value) -> Option<T> {
    match value {
        Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
