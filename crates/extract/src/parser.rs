use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::{ExtractionError, ExtractionFailure};
use crate::schema::ExtractionTarget;

/// Parsed JSON, or the untouched model text plus why nothing was recovered.
pub type ExtractionOutcome = Result<Value, ExtractionError>;

/// An array literal whose first element is an object.
static ARRAY_OF_OBJECTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\s*\{").unwrap());

/// Pull a JSON value of the requested shape out of free-form model output.
///
/// Strict parse of the whole text first. If that fails, or yields the wrong
/// top-level kind, scan for embedded candidates (prose around the JSON,
/// markdown fences, trailing commentary) and take the first one that parses.
/// On failure the raw text is returned as-is.
pub fn extract(raw: &str, target: ExtractionTarget) -> ExtractionOutcome {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if matches_kind(&value, target) {
            return Ok(value);
        }
    }

    let recovered = match target {
        ExtractionTarget::ObjectList => recover_list(raw),
        ExtractionTarget::SingleObject { required_key } => recover_object(raw, required_key),
    };

    recovered.map_err(|reason| ExtractionError {
        raw: raw.to_string(),
        reason,
    })
}

fn matches_kind(value: &Value, target: ExtractionTarget) -> bool {
    match target {
        ExtractionTarget::ObjectList => value.is_array(),
        ExtractionTarget::SingleObject { .. } => value.is_object(),
    }
}

fn recover_list(raw: &str) -> Result<Value, ExtractionFailure> {
    let mut first_failure = None;

    for m in ARRAY_OF_OBJECTS.find_iter(raw) {
        let start = m.start();
        let parsed = closing_index(raw, start).and_then(|end| {
            serde_json::from_str::<Value>(&raw[start..=end]).map_err(|e| ExtractionFailure::Malformed {
                detail: e.to_string(),
            })
        });

        match parsed {
            Ok(value) => return Ok(value),
            Err(failure) => {
                first_failure.get_or_insert(failure);
            }
        }
    }

    Err(first_failure.unwrap_or(ExtractionFailure::NoArray))
}

fn recover_object(raw: &str, required_key: &str) -> Result<Value, ExtractionFailure> {
    let needle = format!("\"{}\"", required_key);
    let mut first_failure = None;

    for (start, _) in raw.match_indices('{') {
        if !raw[start..].contains(&needle) {
            // Nothing after this point can carry the key
            break;
        }

        let end = match closing_index(raw, start) {
            Ok(end) => end,
            Err(failure) => {
                first_failure.get_or_insert(failure);
                continue;
            }
        };

        let candidate = &raw[start..=end];
        if !candidate.contains(&needle) {
            continue;
        }

        match serde_json::from_str::<Value>(candidate) {
            Ok(value) if value.get(required_key).is_some() => return Ok(value),
            // Key only appears nested; a later `{` may be the object we want
            Ok(_) => continue,
            Err(e) => {
                first_failure.get_or_insert(ExtractionFailure::Malformed {
                    detail: e.to_string(),
                });
            }
        }
    }

    Err(first_failure.unwrap_or_else(|| ExtractionFailure::NoObject {
        key: required_key.to_string(),
    }))
}

/// Byte index of the bracket that closes the one opened at `start`.
/// Brackets inside JSON strings are ignored.
fn closing_index(text: &str, start: usize) -> Result<usize, ExtractionFailure> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    // Delimiters are ASCII, so byte scanning is safe on UTF-8
    for (offset, &byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => stack.push(byte),
            b']' | b'}' => {
                let expected = match stack.pop() {
                    Some(b'[') => b']',
                    Some(_) => b'}',
                    None => break,
                };
                if byte != expected {
                    return Err(ExtractionFailure::Malformed {
                        detail: format!(
                            "mismatched '{}' at byte {}",
                            byte as char,
                            start + offset
                        ),
                    });
                }
                if stack.is_empty() {
                    return Ok(start + offset);
                }
            }
            _ => {}
        }
    }

    Err(ExtractionFailure::Truncated)
}
