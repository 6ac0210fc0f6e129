//! Execution outcomes and their wire form

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::fault::{FaultEncodeError, FaultRecord, TraceFrame};

/// Result of running one task package
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// The callable returned a value
    Success {
        value: JsonValue,
        search_path: Vec<String>,
    },

    /// Some stage failed; the fault says which and why
    Failure {
        fault: FaultRecord,
        search_path: Vec<String>,
    },
}

impl ExecutionOutcome {
    pub fn success(value: JsonValue, search_path: Vec<String>) -> Self {
        Self::Success { value, search_path }
    }

    pub fn failure(fault: FaultRecord, search_path: Vec<String>) -> Self {
        Self::Failure { fault, search_path }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Module search path as it was when the outcome was produced
    pub fn search_path(&self) -> &[String] {
        match self {
            Self::Success { search_path, .. } | Self::Failure { search_path, .. } => search_path,
        }
    }

    pub fn fault(&self) -> Option<&FaultRecord> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { fault, .. } => Some(fault),
        }
    }
}

/// Causal chain as stored in an output object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CausalChain {
    /// Structured frames from the primary encoding
    Frames(Vec<TraceFrame>),

    /// Text rendering from the degraded encoding
    Text(String),
}

impl CausalChain {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Frames(frames) => frames.is_empty(),
            Self::Text(text) => text.is_empty(),
        }
    }
}

/// Decoded form of an output object
///
/// Success records carry `result`. Failure records carry `error_kind`,
/// `error_value` and `causal_chain`; in a degraded record all three are
/// text and `encoding_error` says why the structured form was dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub success: bool,

    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_value: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causal_chain: Option<CausalChain>,

    #[serde(default)]
    pub search_path: Vec<String>,

    #[serde(default)]
    pub encoding_degraded: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding_error: Option<String>,
}

/// A field that is present decodes to `Some`, even when it holds `null`
fn present_value<'de, D>(deserializer: D) -> Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

impl OutcomeRecord {
    /// Record published when nothing better could be produced
    pub fn unreported() -> Self {
        Self {
            success: false,
            result: None,
            error_kind: None,
            error_value: None,
            causal_chain: None,
            search_path: Vec::new(),
            encoding_degraded: false,
            encoding_error: None,
        }
    }

    /// Full-fidelity record; fails when a fault value has no snapshot
    pub fn primary(outcome: &ExecutionOutcome) -> Result<Self, FaultEncodeError> {
        match outcome {
            ExecutionOutcome::Success { value, search_path } => Ok(Self {
                success: true,
                result: Some(value.clone()),
                search_path: search_path.clone(),
                ..Self::unreported()
            }),
            ExecutionOutcome::Failure { fault, search_path } => Ok(Self {
                success: false,
                error_kind: Some(fault.error_kind.clone()),
                error_value: Some(fault.error_value.snapshot()?),
                causal_chain: Some(CausalChain::Frames(fault.causal_chain.clone())),
                search_path: search_path.clone(),
                ..Self::unreported()
            }),
        }
    }

    /// Text-only record; building it cannot fail
    pub fn degraded(outcome: &ExecutionOutcome, encoding_error: impl Into<String>) -> Self {
        let mut record = match outcome {
            ExecutionOutcome::Success { value, search_path } => Self {
                success: true,
                result: Some(JsonValue::String(value.to_string())),
                search_path: search_path.clone(),
                ..Self::unreported()
            },
            ExecutionOutcome::Failure { fault, search_path } => Self {
                success: false,
                error_kind: Some(fault.error_kind.clone()),
                error_value: Some(JsonValue::String(fault.error_value.to_string())),
                causal_chain: Some(CausalChain::Text(fault.render_chain())),
                search_path: search_path.clone(),
                ..Self::unreported()
            },
        };
        record.encoding_degraded = true;
        record.encoding_error = Some(encoding_error.into());
        record
    }
}
