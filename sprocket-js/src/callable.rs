use boa_engine::{property::PropertyKey, Context as BoaContext, JsError, JsString, JsValue, Script, Source};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info};

use crate::conversion::{js_to_json, json_to_js, set_global};
use crate::error::JsExecutionError;
use crate::error_handling::{capture_fault, register_error_types};

/// Nested script calls allowed before a `RangeError` is raised
const RECURSION_LIMIT: usize = 512;

/// CommonJS-style module registry and `require`
const REQUIRE_PRELUDE: &str = r#"
var __sprocket_modules = {};
var __sprocket_cache = {};
function __sprocket_define(path, factory) {
    __sprocket_modules[path] = factory;
}
function require(name) {
    var base = String(name);
    if (base.indexOf("./") === 0) base = base.slice(2);
    var candidates = [base, base + ".js", base + "/index.js"];
    for (var i = 0; i < candidates.length; i++) {
        var path = candidates[i];
        if (Object.prototype.hasOwnProperty.call(__sprocket_cache, path)) {
            return __sprocket_cache[path].exports;
        }
        if (Object.prototype.hasOwnProperty.call(__sprocket_modules, path)) {
            var module = { exports: {} };
            __sprocket_cache[path] = module;
            __sprocket_modules[path].call(module.exports, module, module.exports, require);
            return module.exports;
        }
    }
    throw new ModuleNotFoundError("Cannot find module '" + name + "'");
}
"#;

/// A deserialized task callable
///
/// Holds everything needed to rebuild the function in a fresh interpreter:
/// its source, captured globals and the module sources it may `require`.
#[derive(Debug, Clone)]
pub struct JsCallable {
    entry: String,
    source: String,
    captured: Map<String, JsonValue>,
    modules: BTreeMap<String, String>,
}

impl JsCallable {
    pub(crate) fn new(
        entry: String,
        source: String,
        captured: Map<String, JsonValue>,
        modules: BTreeMap<String, String>,
    ) -> Self {
        Self {
            entry,
            source,
            captured,
            modules,
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Module paths available to `require`
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Call the entry function once with `input`
    ///
    /// Script faults come back as [`JsExecutionError::Thrown`]. A panic inside
    /// the engine is caught and reported as [`JsExecutionError::Panic`].
    pub fn invoke(&self, input: &JsonValue) -> Result<JsonValue, JsExecutionError> {
        info!("Invoking entry function '{}'", self.entry);

        match panic::catch_unwind(AssertUnwindSafe(|| self.invoke_in_fresh_context(input))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(JsExecutionError::Panic(message))
            }
        }
    }

    fn invoke_in_fresh_context(&self, input: &JsonValue) -> Result<JsonValue, JsExecutionError> {
        let mut context = BoaContext::default();
        context.runtime_limits_mut().set_recursion_limit(RECURSION_LIMIT);
        register_error_types(&mut context)?;

        context
            .eval(Source::from_bytes(REQUIRE_PRELUDE))
            .map_err(|e| JsExecutionError::ContextError(format!("Failed to install require: {}", e)))?;

        for (path, source) in &self.modules {
            let path_literal = serde_json::to_string(path)
                .map_err(|e| JsExecutionError::ContextError(e.to_string()))?;
            let definition = format!(
                "__sprocket_define({}, function (module, exports, require) {{\n{}\n}});",
                path_literal, source
            );
            context
                .eval(Source::from_bytes(&definition))
                .map_err(|e| thrown(&mut context, e))?;
        }
        debug!("Registered {} module(s)", self.modules.len());

        for (name, value) in &self.captured {
            set_global(&mut context, name, value)?;
        }

        let script = Script::parse(Source::from_bytes(&self.source), None, &mut context)
            .map_err(|e| thrown(&mut context, e))?;
        let completion = script
            .evaluate(&mut context)
            .map_err(|e| thrown(&mut context, e))?;

        let entry = self.lookup_entry(&mut context, completion)?;
        let input_arg = json_to_js(&mut context, input)?;

        let result = match entry.as_callable() {
            Some(function) => function
                .call(&JsValue::undefined(), &[input_arg], &mut context)
                .map_err(|e| thrown(&mut context, e))?,
            None => {
                return Err(JsExecutionError::EntryNotFound {
                    entry: self.entry.clone(),
                })
            }
        };

        js_to_json(&mut context, result)
    }

    /// Entry global, or the script's completion value when that is a function
    fn lookup_entry(
        &self,
        context: &mut BoaContext,
        completion: JsValue,
    ) -> Result<JsValue, JsExecutionError> {
        let named = context
            .global_object()
            .get(PropertyKey::from(JsString::from(self.entry.as_str())), context)
            .map_err(|e| thrown(context, e))?;

        if named.is_callable() {
            debug!("Using named entry function '{}'", self.entry);
            return Ok(named);
        }
        if completion.is_callable() {
            debug!("Using script completion value as entry");
            return Ok(completion);
        }

        Err(JsExecutionError::EntryNotFound {
            entry: self.entry.clone(),
        })
    }
}

fn thrown(context: &mut BoaContext, error: JsError) -> JsExecutionError {
    JsExecutionError::Thrown(Box::new(capture_fault(context, error)))
}
