//! JSON conversion at the script boundary

use crate::error::JsExecutionError;
use boa_engine::{property::PropertyKey, Context as BoaContext, JsString, JsValue, Source};
use serde_json::Value as JsonValue;
use tracing::{trace, warn};

const RESULT_GLOBAL: &str = "__sprocket_result";

/// Build a script value from JSON by handing the text to `JSON.parse`
pub fn json_to_js(context: &mut BoaContext, value: &JsonValue) -> Result<JsValue, JsExecutionError> {
    trace!("Converting input data to script value");
    let text = serde_json::to_string(value).map_err(|e| JsExecutionError::InputError(e.to_string()))?;
    // A JSON string literal is also a valid script string literal
    let literal =
        serde_json::to_string(&text).map_err(|e| JsExecutionError::InputError(e.to_string()))?;

    context
        .eval(Source::from_bytes(&format!("JSON.parse({})", literal)))
        .map_err(|e| JsExecutionError::InputError(format!("Failed to parse input JSON: {}", e)))
}

/// Install a JSON value as a global binding
pub fn set_global(
    context: &mut BoaContext,
    name: &str,
    value: &JsonValue,
) -> Result<(), JsExecutionError> {
    let js_value = json_to_js(context, value)?;
    context
        .global_object()
        .set(PropertyKey::from(JsString::from(name)), js_value, true, context)
        .map_err(|e| JsExecutionError::ContextError(format!("Failed to set global {}: {}", name, e)))?;
    Ok(())
}

/// Convert a script value back to JSON via `JSON.stringify`
///
/// `undefined` (and anything else `JSON.stringify` drops) becomes `null`.
/// Output that is valid for the script but not for serde, such as a string
/// holding a lone surrogate, is returned as its JSON text.
pub fn js_to_json(context: &mut BoaContext, value: JsValue) -> Result<JsonValue, JsExecutionError> {
    trace!("Converting script result back to JSON");

    context
        .global_object()
        .set(PropertyKey::from(JsString::from(RESULT_GLOBAL)), value, true, context)
        .map_err(|e| JsExecutionError::OutputError(format!("Failed to set temporary result: {}", e)))?;

    let stringified = context
        .eval(Source::from_bytes(&format!("JSON.stringify({})", RESULT_GLOBAL)))
        .map_err(|e| JsExecutionError::OutputError(format!("Failed to stringify result: {}", e)))?;

    if stringified.is_undefined() {
        return Ok(JsonValue::Null);
    }

    let text = stringified
        .to_string(context)
        .map_err(|e| JsExecutionError::OutputError(e.to_string()))?
        .to_std_string_escaped();

    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("Script result is not representable as JSON ({}), keeping its text form", e);
            Ok(JsonValue::String(text))
        }
    }
}
