//! Script task packages for Sprocket
//!
//! Task callables are JavaScript, executed on the Boa engine. A package is
//! deserialized against a [`ResolutionContext`] into a [`JsCallable`], which
//! runs each invocation in a fresh interpreter with CommonJS-style modules.
//! Script faults are captured as [`JsFault`] values with their `cause` chain.

pub mod callable;
pub mod conversion;
pub mod error;
pub mod error_handling;
pub mod fault;
pub mod package;

pub use callable::JsCallable;
pub use error::{DeserializationError, JsExecutionError};
pub use error_handling::{register_error_types, JS_ERROR_CONFIGS};
pub use fault::JsFault;
pub use package::{deserialize, CallableSpec, ResolutionContext, TaskPackage};
