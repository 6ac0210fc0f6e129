use boa_engine::{
    error::JsNativeErrorKind, property::PropertyKey, Context as BoaContext, JsError, JsString, Source,
};
use tracing::{debug, warn};

use crate::fault::{FaultDescription, JsFault};
use crate::JsExecutionError;

/// Configuration for JavaScript error types
#[derive(Debug, Clone)]
pub struct JsErrorConfig {
    pub name: &'static str,
    pub default_message: &'static str,
}

/// Error classes available to every task script
pub const JS_ERROR_CONFIGS: &[JsErrorConfig] = &[
    JsErrorConfig {
        name: "ValidationError",
        default_message: "Validation error",
    },
    JsErrorConfig {
        name: "DataError",
        default_message: "Data error",
    },
    JsErrorConfig {
        name: "ConfigurationError",
        default_message: "Configuration error",
    },
    JsErrorConfig {
        name: "TimeoutError",
        default_message: "Timeout error",
    },
    JsErrorConfig {
        name: "NotFoundError",
        default_message: "Resource not found",
    },
    JsErrorConfig {
        name: "ModuleNotFoundError",
        default_message: "Module not found",
    },
];

const FAULT_GLOBAL: &str = "__sprocket_fault";

/// Walks the thrown value and its `cause` chain inside the context and
/// returns a JSON description. Snapshot failures (cycles, BigInt) are
/// reported rather than thrown.
const DESCRIBE_FAULT: &str = r#"
(function (fault) {
    function render(value) {
        try {
            return String(value);
        } catch (e) {
            return Object.prototype.toString.call(value);
        }
    }
    function isObject(value) {
        return value !== null && (typeof value === "object" || typeof value === "function");
    }
    function nameOf(value) {
        if (isObject(value)) {
            try {
                if (typeof value.name === "string" && value.name.length > 0) return value.name;
                if (value.constructor && typeof value.constructor.name === "string") return value.constructor.name;
            } catch (e) {}
            return "Object";
        }
        return value === null ? "null" : typeof value;
    }

    var chain = [];
    var seen = [];
    var current = fault;
    while (chain.length < 32 && seen.indexOf(current) < 0) {
        seen.push(current);
        var link = { name: nameOf(current), message: render(current), stack: null };
        if (isObject(current)) {
            try {
                if ("message" in current) link.message = render(current.message);
                if (typeof current.stack === "string") link.stack = current.stack;
            } catch (e) {}
        }
        chain.push(link);
        if (!isObject(current) || !("cause" in current) || current.cause === undefined) break;
        current = current.cause;
    }

    var snapshot = null;
    var snapshotError = null;
    try {
        var view = fault;
        if (fault instanceof Error) {
            view = { name: fault.name, message: fault.message };
            Object.keys(fault).forEach(function (key) { view[key] = fault[key]; });
            if ("cause" in fault) view.cause = fault.cause;
        }
        var text = JSON.stringify(view);
        snapshot = text === undefined ? "null" : text;
    } catch (e) {
        snapshotError = render(e);
    }

    return JSON.stringify({
        kind: nameOf(fault),
        display: render(fault),
        chain: chain,
        snapshot: snapshot,
        snapshotError: snapshotError
    });
})(__sprocket_fault)
"#;

/// Generate JavaScript error class definition for a single error type
///
/// Classes accept an options bag so scripts can chain faults with
/// `new DataError("bad row", { cause: err })`.
pub fn generate_error_class(error_config: &JsErrorConfig) -> String {
    format!(
        r#"
        class {name} extends Error {{
            constructor(message, options) {{
                super(message === undefined ? "{default_message}" : message);
                this.name = "{name}";
                if (options !== undefined && options !== null && "cause" in options) {{
                    this.cause = options.cause;
                }}
            }}
        }}
        globalThis.{name} = {name};"#,
        name = error_config.name,
        default_message = error_config.default_message
    )
}

/// Generate all JavaScript error class definitions
pub fn generate_all_error_classes() -> String {
    JS_ERROR_CONFIGS
        .iter()
        .map(generate_error_class)
        .collect::<Vec<String>>()
        .join("\n")
}

/// Register custom error types in the JavaScript context
pub fn register_error_types(context: &mut BoaContext) -> Result<(), JsExecutionError> {
    let error_classes = generate_all_error_classes();

    context
        .eval(Source::from_bytes(&error_classes))
        .map_err(|e| {
            JsExecutionError::ContextError(format!("Failed to register error types: {}", e))
        })?;

    Ok(())
}

/// Capture a script error while its context is still alive
///
/// Engine limit errors cannot be turned into script objects; they are
/// reported as a `RangeError`.
pub fn capture_fault(context: &mut BoaContext, error: JsError) -> JsFault {
    if let Some(native) = error.as_native() {
        if matches!(native.kind, JsNativeErrorKind::RuntimeLimit) {
            let fault = JsFault::runtime_limit(native.to_string());
            debug!("Captured runtime limit fault: {}", fault);
            return fault;
        }
    }

    let thrown = error.to_opaque(context);

    let described = context
        .global_object()
        .set(PropertyKey::from(JsString::from(FAULT_GLOBAL)), thrown, true, context)
        .and_then(|_| context.eval(Source::from_bytes(DESCRIBE_FAULT)))
        .and_then(|value| value.to_string(context));

    match described {
        Ok(text) => {
            let text = text.to_std_string_escaped();
            match serde_json::from_str::<FaultDescription>(&text) {
                Ok(description) => {
                    let fault = JsFault::from_description(description);
                    debug!("Captured script fault {}: {}", fault.kind(), fault);
                    fault
                }
                Err(e) => {
                    warn!("Fault description was not valid JSON: {}", e);
                    JsFault::opaque("Error", error.to_string())
                }
            }
        }
        Err(e) => {
            warn!("Failed to describe script fault: {}", e);
            JsFault::opaque("Error", error.to_string())
        }
    }
}
