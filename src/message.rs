use crate::csp::Violation;
use std::fmt::Write;

/// Placeholder printed for required fields a browser did not send.
const ABSENT: &str = "undefined";

/// Builds the one-line description logged next to every normalized report.
pub fn format(violation: &Violation) -> String {
    let document_uri = violation.document_uri.as_deref().unwrap_or(ABSENT);

    let mut msg = format!(
        "Violation of {}.",
        violation.violated_directive.as_deref().unwrap_or(ABSENT)
    );

    match violation.source_file.as_deref() {
        Some(source_file) if Some(source_file) != violation.document_uri.as_deref() => {
            let _ = write!(msg, " Problem(s) at {document_uri} in {source_file}.");
        }
        _ => {
            let _ = write!(msg, " Problem(s) in {document_uri}.");
        }
    }

    match violation.blocked_uri.as_deref() {
        Some("inline") => {
            let mut location = String::new();
            if let Some(line) = violation.line_number {
                let _ = write!(location, " Line {line}");
            }
            if let Some(column) = violation.column_number {
                let _ = write!(location, ", column {column}");
            }
            if !location.is_empty() {
                msg.push_str(&location);
                msg.push('.');
            }
        }
        blocked => {
            let _ = write!(msg, " Blocked URI is {}.", blocked.unwrap_or(ABSENT));
        }
    }

    msg
}
