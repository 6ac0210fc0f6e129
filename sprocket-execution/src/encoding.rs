//! Two-tier outcome encoding

use sprocket_core::{ExecutionOutcome, OutcomeRecord};
use thiserror::Error;
use tracing::{debug, warn};

/// Raised only when the text-only fallback cannot be encoded either
#[derive(Debug, Error)]
#[error("Fallback outcome encoding failed: {0}")]
pub struct EncodeError(#[source] pub serde_json::Error);

/// Encoded outcome and which tier produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedOutcome {
    pub bytes: Vec<u8>,
    pub degraded: bool,
}

/// Encode an outcome, degrading to text when the primary form fails
pub fn encode(outcome: &ExecutionOutcome) -> Result<EncodedOutcome, EncodeError> {
    match encode_primary(outcome) {
        Ok(bytes) => {
            debug!("Encoded outcome ({} bytes)", bytes.len());
            Ok(EncodedOutcome {
                bytes,
                degraded: false,
            })
        }
        Err(reason) => {
            warn!("Primary outcome encoding failed, degrading to text: {}", reason);
            let record = OutcomeRecord::degraded(outcome, reason);
            let bytes = serde_json::to_vec(&record).map_err(EncodeError)?;
            Ok(EncodedOutcome {
                bytes,
                degraded: true,
            })
        }
    }
}

/// Structured encoding followed by a decode check
fn encode_primary(outcome: &ExecutionOutcome) -> Result<Vec<u8>, String> {
    let record = OutcomeRecord::primary(outcome).map_err(|e| e.to_string())?;
    let bytes = serde_json::to_vec(&record).map_err(|e| e.to_string())?;

    let decoded = decode_outcome(&bytes).map_err(|e| format!("encoded outcome does not decode: {}", e))?;
    if decoded != record {
        return Err("encoded outcome does not decode to the same record".to_string());
    }

    Ok(bytes)
}

/// Bytes of the record published when the pipeline produced nothing usable
pub fn encode_unreported() -> Result<Vec<u8>, EncodeError> {
    serde_json::to_vec(&OutcomeRecord::unreported()).map_err(EncodeError)
}

pub fn decode_outcome(bytes: &[u8]) -> Result<OutcomeRecord, serde_json::Error> {
    serde_json::from_slice(bytes)
}
