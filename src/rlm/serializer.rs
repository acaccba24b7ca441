//! Context Serializer: turns a caller's `payload` into the bytes the sandbox
//! will deserialize, plus a compact [`ContextDescriptor`] for the initial prompt.

use serde_json::Value;

use crate::rlm::error::RlmError;

/// A one-level-deep summary of `payload`, placed into the initial user turn
/// so the model can plan before fetching bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextDescriptor {
    /// `payload` was a JSON string.
    Text { char_count: usize },
    /// `payload` was a JSON array.
    Sequence {
        element_count: usize,
        element_char_counts: Vec<usize>,
    },
    /// `payload` was a JSON object.
    Mapping {
        keys: Vec<String>,
        value_char_counts: Vec<(String, usize)>,
    },
    /// `payload` was a bare number, boolean, or null.
    Scalar { char_count: usize },
}

impl ContextDescriptor {
    /// Canonical type label used in the descriptor's rendered text.
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Text { .. } => "string",
            Self::Sequence { .. } => "sequence",
            Self::Mapping { .. } => "mapping",
            Self::Scalar { .. } => "scalar",
        }
    }

    /// Render the descriptor as prose for the initial user turn.
    pub fn render(&self) -> String {
        match self {
            Self::Text { char_count } => {
                format!("payload is a string of {char_count} characters")
            }
            Self::Scalar { char_count } => {
                format!("payload is a scalar value ({char_count} characters serialized)")
            }
            Self::Sequence {
                element_count,
                element_char_counts,
            } => {
                let preview: Vec<String> = element_char_counts
                    .iter()
                    .take(20)
                    .enumerate()
                    .map(|(i, n)| format!("[{i}]={n} chars"))
                    .collect();
                let suffix = if *element_count > 20 { ", ..." } else { "" };
                format!(
                    "payload is a sequence of {element_count} elements: {}{}",
                    preview.join(", "),
                    suffix
                )
            }
            Self::Mapping {
                keys,
                value_char_counts,
            } => {
                let preview: Vec<String> = value_char_counts
                    .iter()
                    .take(20)
                    .map(|(k, n)| format!("{k:?}={n} chars"))
                    .collect();
                let suffix = if keys.len() > 20 { ", ..." } else { "" };
                format!(
                    "payload is a mapping with {} keys: {}{}",
                    keys.len(),
                    preview.join(", "),
                    suffix
                )
            }
        }
    }
}

/// Validate and serialize `payload`, returning the UTF-8 JSON bytes the
/// sandbox bootstrap will deserialize, along with its descriptor.
///
/// Fails before any model or sandbox activity if `payload` contains a
/// non-finite float (rejected by `serde_json` itself) or exceeds
/// `max_payload_bytes`.
pub fn serialize_payload(
    payload: &Value,
    max_payload_bytes: usize,
) -> Result<(Vec<u8>, ContextDescriptor), RlmError> {
    let bytes = serde_json::to_vec(payload).map_err(|e| RlmError::Serialization {
        message: format!("payload is not JSON-serializable: {e}"),
    })?;

    if bytes.len() > max_payload_bytes {
        return Err(RlmError::Serialization {
            message: format!(
                "payload serialized to {} bytes, exceeding the configured cap of {max_payload_bytes}",
                bytes.len()
            ),
        });
    }

    let descriptor = describe(payload)?;
    Ok((bytes, descriptor))
}

fn describe(payload: &Value) -> Result<ContextDescriptor, RlmError> {
    match payload {
        Value::String(s) => Ok(ContextDescriptor::Text {
            char_count: s.chars().count(),
        }),
        Value::Array(items) => {
            let mut element_char_counts = Vec::with_capacity(items.len());
            for item in items {
                element_char_counts.push(char_count_of(item)?);
            }
            Ok(ContextDescriptor::Sequence {
                element_count: items.len(),
                element_char_counts,
            })
        }
        Value::Object(map) => {
            let mut keys = Vec::with_capacity(map.len());
            let mut value_char_counts = Vec::with_capacity(map.len());
            for (k, v) in map {
                keys.push(k.clone());
                value_char_counts.push((k.clone(), char_count_of(v)?));
            }
            Ok(ContextDescriptor::Mapping {
                keys,
                value_char_counts,
            })
        }
        other => Ok(ContextDescriptor::Scalar {
            char_count: char_count_of(other)?,
        }),
    }
}

/// Character count reported for one payload element or mapping value.
///
/// Strings report their own length, not their re-serialized (quoted) JSON
/// form: the descriptor is meant to tell the model how much text an element
/// holds, and counting the wrapping quotes would overstate that by two
/// characters per string with no benefit to planning. Non-string values
/// (numbers, booleans, null, nested mappings/sequences) report the length of
/// their JSON text, since they have no other textual representation.
fn char_count_of(value: &Value) -> Result<usize, RlmError> {
    match value {
        Value::String(s) => Ok(s.chars().count()),
        other => {
            let text = serde_json::to_string(other).map_err(|e| RlmError::Serialization {
                message: format!("value is not JSON-serializable: {e}"),
            })?;
            Ok(text.chars().count())
        }
    }
}
