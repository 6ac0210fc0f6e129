//! Error types for task packages and script execution

use sprocket_core::FaultRecord;
use std::path::PathBuf;
use thiserror::Error;

use crate::fault::JsFault;

/// Errors turning a fetched task package into a callable
#[derive(Error, Debug)]
pub enum DeserializationError {
    #[error("Task package is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Callable blob is malformed: {0}")]
    InvalidBlob(#[from] serde_json::Error),

    #[error("Callable blob has an empty {field}")]
    MissingField { field: &'static str },

    #[error("Cannot find module '{name}' on search path [{}]", .search_path.join(", "))]
    UnresolvedModule {
        name: String,
        search_path: Vec<String>,
    },

    #[error("Failed to load module {}: {source}", .path.display())]
    ModuleRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while invoking a callable
#[derive(Error, Debug)]
pub enum JsExecutionError {
    /// The script raised; carries the captured fault
    #[error("{0}")]
    Thrown(Box<JsFault>),

    #[error("Entry function '{entry}' is not defined")]
    EntryNotFound { entry: String },

    #[error("Failed to prepare script context: {0}")]
    ContextError(String),

    #[error("Input preparation error: {0}")]
    InputError(String),

    #[error("Output conversion error: {0}")]
    OutputError(String),

    #[error("Script engine panicked: {0}")]
    Panic(String),
}

impl JsExecutionError {
    /// Tag used as the fault kind when the error is not a script fault
    pub fn kind(&self) -> &str {
        match self {
            JsExecutionError::Thrown(fault) => fault.kind(),
            JsExecutionError::EntryNotFound { .. } => "EntryNotFound",
            JsExecutionError::ContextError(_) => "ContextError",
            JsExecutionError::InputError(_) => "InputError",
            JsExecutionError::OutputError(_) => "OutputError",
            JsExecutionError::Panic(_) => "Panic",
        }
    }

    /// Convert into the fault record reported for this invocation
    pub fn into_fault_record(self) -> FaultRecord {
        match self {
            JsExecutionError::Thrown(fault) => fault.into_fault_record(),
            other => {
                let kind = other.kind().to_string();
                FaultRecord::from_error(kind, &other)
            }
        }
    }
}
