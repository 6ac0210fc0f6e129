//! Faults raised by script code

use serde::Deserialize;
use serde_json::Value as JsonValue;
use sprocket_core::{FaultEncodeError, FaultRecord, FaultValue, TraceFrame};
use std::fmt;

/// A value thrown by a script, captured while its context was still alive
///
/// The structured snapshot is taken inside the interpreter. Values that
/// cannot be snapshotted (cyclic objects, BigInts, symbols) keep the reason
/// instead, and the encoder falls back to the text rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct JsFault {
    kind: String,
    display: String,
    snapshot: Result<JsonValue, String>,
    frames: Vec<TraceFrame>,
}

/// Shape produced by the in-context describer
#[derive(Debug, Deserialize)]
pub(crate) struct FaultDescription {
    pub kind: String,
    pub display: String,
    #[serde(default)]
    pub chain: Vec<ChainLink>,
    #[serde(default)]
    pub snapshot: Option<String>,
    #[serde(default, rename = "snapshotError")]
    pub snapshot_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChainLink {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}

impl JsFault {
    pub(crate) fn from_description(description: FaultDescription) -> Self {
        let snapshot = match (description.snapshot, description.snapshot_error) {
            (_, Some(reason)) => Err(reason),
            (Some(text), None) => serde_json::from_str(&text).map_err(|e| e.to_string()),
            (None, None) => Ok(JsonValue::Null),
        };

        let frames = description
            .chain
            .into_iter()
            .map(|link| {
                let frame = TraceFrame::new(link.name, link.message);
                match link.stack.as_deref().and_then(first_stack_location) {
                    Some(location) => frame.with_location(location),
                    None => frame,
                }
            })
            .collect();

        Self {
            kind: description.kind,
            display: description.display,
            snapshot,
            frames,
        }
    }

    /// Fault for an error the describer itself could not look into
    pub(crate) fn opaque(kind: impl Into<String>, display: impl Into<String>) -> Self {
        let kind = kind.into();
        let display = display.into();
        Self {
            frames: vec![TraceFrame::new(kind.clone(), display.clone())],
            snapshot: Err("fault value could not be inspected".to_string()),
            kind,
            display,
        }
    }

    /// Fault for an engine limit (recursion depth, stack size)
    pub(crate) fn runtime_limit(detail: impl AsRef<str>) -> Self {
        let detail = detail.as_ref();
        let message = detail
            .split_once(": ")
            .map_or(detail, |(_, message)| message)
            .to_string();
        let kind = "RangeError".to_string();
        Self {
            display: format!("{}: {}", kind, message),
            snapshot: Ok(serde_json::json!({ "name": kind, "message": message })),
            frames: vec![TraceFrame::new(kind.clone(), message)],
            kind,
        }
    }

    /// Error class name, e.g. `RangeError`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Outermost fault first, then each `cause`
    pub fn frames(&self) -> &[TraceFrame] {
        &self.frames
    }

    pub fn into_fault_record(self) -> FaultRecord {
        let kind = self.kind.clone();
        let frames = self.frames.clone();
        FaultRecord::new(kind, self, frames)
    }
}

impl fmt::Display for JsFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl FaultValue for JsFault {
    fn snapshot(&self) -> Result<JsonValue, FaultEncodeError> {
        self.snapshot.clone().map_err(FaultEncodeError)
    }
}

/// First `at ...` location of a stack trace, if the engine produced one
fn first_stack_location(stack: &str) -> Option<String> {
    stack
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("at "))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_description_with_snapshot() {
        let description: FaultDescription = serde_json::from_value(json!({
            "kind": "DataError",
            "display": "DataError: bad row",
            "chain": [
                {"name": "DataError", "message": "bad row", "stack": "DataError: bad row\n    at parse (lib.js:3:9)"},
                {"name": "SyntaxError", "message": "unexpected token"}
            ],
            "snapshot": "{\"name\":\"DataError\",\"message\":\"bad row\"}"
        }))
        .unwrap();

        let fault = JsFault::from_description(description);
        assert_eq!(fault.kind(), "DataError");
        assert_eq!(fault.to_string(), "DataError: bad row");
        assert_eq!(fault.frames().len(), 2);
        assert_eq!(fault.frames()[0].location.as_deref(), Some("parse (lib.js:3:9)"));
        assert_eq!(fault.snapshot().unwrap()["message"], "bad row");
    }

    #[test]
    fn test_description_with_snapshot_error() {
        let description: FaultDescription = serde_json::from_value(json!({
            "kind": "Object",
            "display": "[object Object]",
            "chain": [{"name": "Object", "message": "[object Object]"}],
            "snapshotError": "TypeError: cyclic object value"
        }))
        .unwrap();

        let fault = JsFault::from_description(description);
        let err = fault.snapshot().unwrap_err();
        assert!(err.0.contains("cyclic"));

        let record = fault.into_fault_record();
        assert_eq!(record.error_kind, "Object");
        assert_eq!(record.causal_chain.len(), 1);
    }
}
