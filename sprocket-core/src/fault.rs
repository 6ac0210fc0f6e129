//! Fault capture types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use thiserror::Error;

/// A fault value whose structured form may not be encodable.
///
/// Values raised by task code are kept "live" until the outcome is encoded,
/// so the encoder can still ask for a structured snapshot. Implementations
/// report a snapshot they cannot produce with [`FaultEncodeError`] instead
/// of panicking; the encoder then falls back to the `Display` rendering.
pub trait FaultValue: fmt::Debug + fmt::Display + Send + Sync {
    /// Structured snapshot used by the primary outcome encoding
    fn snapshot(&self) -> Result<JsonValue, FaultEncodeError>;
}

/// Raised when a fault value has no structured snapshot
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fault value cannot be encoded: {0}")]
pub struct FaultEncodeError(pub String);

/// One link of a causal chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Error type, script function or pipeline stage that produced the link
    pub function: String,

    /// Source location, when the runtime knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Rendered message of this link
    pub message: String,
}

impl TraceFrame {
    pub fn new(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            location: None,
            message: message.into(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "  at {} ({}): {}", self.function, location, self.message),
            None => write!(f, "  at {}: {}", self.function, self.message),
        }
    }
}

/// Fault value built from a Rust error and its `source()` chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFault {
    kind: String,
    message: String,
    sources: Vec<String>,
}

impl ErrorFault {
    pub fn from_error<E>(kind: impl Into<String>, error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut sources = Vec::new();
        let mut current = error.source();
        while let Some(source) = current {
            sources.push(source.to_string());
            current = source.source();
        }

        Self {
            kind: kind.into(),
            message: error.to_string(),
            sources,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }
}

impl fmt::Display for ErrorFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl FaultValue for ErrorFault {
    fn snapshot(&self) -> Result<JsonValue, FaultEncodeError> {
        Ok(json!({
            "type": self.kind,
            "message": self.message,
            "sources": self.sources,
        }))
    }
}

/// Structured record of a fault and how it came about
#[derive(Debug)]
pub struct FaultRecord {
    /// Error class name or tag, e.g. `RangeError` or `RetryExhausted`
    pub error_kind: String,

    /// The fault itself, kept live for the encoder
    pub error_value: Box<dyn FaultValue>,

    /// Outermost fault first, root cause last
    pub causal_chain: Vec<TraceFrame>,
}

impl FaultRecord {
    pub fn new(
        error_kind: impl Into<String>,
        error_value: impl FaultValue + 'static,
        causal_chain: Vec<TraceFrame>,
    ) -> Self {
        Self {
            error_kind: error_kind.into(),
            error_value: Box::new(error_value),
            causal_chain,
        }
    }

    /// Capture a Rust error, walking its `source()` chain into frames
    pub fn from_error<E>(kind: impl Into<String>, error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let kind = kind.into();
        let mut causal_chain = vec![TraceFrame::new(kind.clone(), error.to_string())];
        let mut current = error.source();
        while let Some(source) = current {
            causal_chain.push(TraceFrame::new("caused by", source.to_string()));
            current = source.source();
        }

        Self {
            error_value: Box::new(ErrorFault::from_error(kind.clone(), error)),
            error_kind: kind,
            causal_chain,
        }
    }

    /// Append a frame describing where the fault surfaced
    pub fn push_frame(&mut self, frame: TraceFrame) {
        self.causal_chain.push(frame);
    }

    /// Text rendering of the chain, one frame per line
    pub fn render_chain(&self) -> String {
        let mut rendered = self.error_value.to_string();
        for frame in &self.causal_chain {
            rendered.push('\n');
            rendered.push_str(&frame.to_string());
        }
        rendered
    }
}
