//! Dashboard JSON documents: the local artifact and its remote mirror.
//!
//! Documents are kept as raw JSON objects so that fields gsync does not
//! know about pass through untouched in both directions.

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::WatchError;

/// A dashboard document as a JSON object.
pub type Document = Map<String, Value>;

/// Length of generated mirror identifiers.
pub const MIRROR_UID_LEN: usize = 14;

/// Fields that stay locally authoritative when remote content is written back.
pub const IDENTITY_FIELDS: [&str; 4] = ["id", "uid", "title", "description"];

/// Parse an artifact and check the fields required to start a watch.
pub fn parse_artifact(content: &str) -> Result<Document, WatchError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| WatchError::InvalidArtifact(format!("malformed dashboard JSON: {}", e)))?;

    let Value::Object(document) = value else {
        return Err(WatchError::InvalidArtifact(
            "dashboard JSON must be an object".to_string(),
        ));
    };

    match document.get("uid") {
        Some(Value::String(uid)) if !uid.trim().is_empty() => {}
        _ => {
            return Err(WatchError::InvalidArtifact(
                "dashboard uid attribute not found".to_string(),
            ))
        }
    }

    document_version(&document)?;
    Ok(document)
}

/// Convert a wire version number to an integer without losing precision.
///
/// Grafana serializes versions as JSON numbers that may arrive as floats
/// (`3.0`). Anything with a fractional part, negative, or out of range is rejected.
pub fn version_from_value(value: &Value) -> Result<i64, WatchError> {
    if let Some(v) = value.as_i64() {
        if v < 0 {
            return Err(WatchError::InvalidVersion(format!("negative version {}", v)));
        }
        return Ok(v);
    }

    match value.as_f64() {
        Some(f) if f.is_finite() && f.fract() == 0.0 && (0.0..i64::MAX as f64).contains(&f) => {
            Ok(f as i64)
        }
        _ => Err(WatchError::InvalidVersion(format!(
            "expected a whole number, got {}",
            value
        ))),
    }
}

/// Version recorded in a document. A missing version counts as 0.
pub fn document_version(document: &Document) -> Result<i64, WatchError> {
    match document.get("version") {
        None | Some(Value::Null) => Ok(0),
        Some(v) => version_from_value(v),
    }
}

/// Title as plain text, for use in generated titles and messages.
pub fn document_title(document: &Document) -> String {
    match document.get("title") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Generate a random alphanumeric mirror identifier.
///
/// Not guaranteed unique; callers that care check the remote first.
pub fn generate_mirror_uid() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(MIRROR_UID_LEN)
        .map(char::from)
        .collect()
}

/// Build the body of a disposable mirror from the local artifact.
pub fn mirror_document(source: &Document, mirror_uid: &str) -> Document {
    let title = document_title(source);
    let mut mirror = source.clone();

    mirror.insert("uid".to_string(), Value::String(mirror_uid.to_string()));
    mirror.insert(
        "title".to_string(),
        Value::String(format!("{} (Gsync {})", title, mirror_uid)),
    );
    mirror.insert("version".to_string(), Value::from(0));
    mirror.insert("id".to_string(), Value::Null);
    mirror.insert(
        "description".to_string(),
        Value::String(format!("Generated by gsync. Watcher for {}", title)),
    );

    mirror
}

/// Merge remote dashboard content with the locally authoritative fields.
///
/// Remote content wins everywhere except `id`, `uid`, `title`, `description`
/// (copied from `local`, dropped if absent there) and `version` (set to `version`).
pub fn overlay_local_identity(remote: &Document, local: &Document, version: i64) -> Document {
    let mut merged = remote.clone();

    for field in IDENTITY_FIELDS {
        match local.get(field) {
            Some(value) => {
                merged.insert(field.to_string(), value.clone());
            }
            None => {
                merged.remove(field);
            }
        }
    }
    merged.insert("version".to_string(), Value::from(version));

    merged
}

/// Serialize a document with tab indentation, matching Grafana exports.
pub fn to_pretty_json(document: &Document) -> Result<Vec<u8>, WatchError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document
        .serialize(&mut serializer)
        .map_err(|e| WatchError::Serialization(format!("Failed to serialize dashboard: {}", e)))?;
    Ok(buf)
}
