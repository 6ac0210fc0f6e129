//! Core domain types for Sprocket
//!
//! A job run ends in exactly one [`ExecutionOutcome`]. Failures carry a
//! [`FaultRecord`]: the fault's kind, its live value and the chain of frames
//! that led to it. [`OutcomeRecord`] is the wire form that lands in the
//! output object and that consumers decode.

pub mod fault;
pub mod outcome;

pub use fault::{ErrorFault, FaultEncodeError, FaultRecord, FaultValue, TraceFrame};
pub use outcome::{CausalChain, ExecutionOutcome, OutcomeRecord};
