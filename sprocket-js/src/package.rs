//! Task packages and module resolution
//!
//! A task package is the JSON document stored at the function key. It holds
//! the base64 callable blob and an archive of dependency files. The archive
//! is written to disk by the runner; the callable is deserialized afterwards,
//! against a [`ResolutionContext`] that already contains the module root.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::callable::JsCallable;
use crate::error::DeserializationError;

/// Fetched task package: callable blob plus dependency archive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskPackage {
    /// Base64 encoding of a [`CallableSpec`] JSON document
    #[serde(alias = "func")]
    pub callable: String,

    /// Relative path to base64 file contents
    #[serde(default, alias = "module_data")]
    pub dependencies: BTreeMap<String, String>,
}

impl TaskPackage {
    /// Build a package from a callable spec and raw dependency files
    pub fn build(
        spec: &CallableSpec,
        files: impl IntoIterator<Item = (String, Vec<u8>)>,
    ) -> Result<Self, DeserializationError> {
        let blob = serde_json::to_vec(spec)?;
        Ok(Self {
            callable: STANDARD.encode(blob),
            dependencies: files
                .into_iter()
                .map(|(path, contents)| (path, STANDARD.encode(contents)))
                .collect(),
        })
    }
}

fn default_entry() -> String {
    "main".to_string()
}

/// Decoded callable blob
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallableSpec {
    /// Global function invoked with the input
    #[serde(default = "default_entry")]
    pub entry: String,

    /// Script defining the entry function
    pub source: String,

    /// Closure environment, installed as globals before `source` runs
    #[serde(default)]
    pub captured: Map<String, JsonValue>,

    /// Modules that must resolve on the search path
    #[serde(default)]
    pub requires: Vec<String>,
}

impl CallableSpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            entry: default_entry(),
            source: source.into(),
            captured: Map::new(),
            requires: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    pub fn with_captured(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.captured.insert(name.into(), value);
        self
    }

    pub fn with_requires(mut self, name: impl Into<String>) -> Self {
        self.requires.push(name.into());
        self
    }
}

/// Ordered module search path
///
/// Roots are searched in insertion order; the first root that holds a
/// module wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionContext {
    search_path: Vec<PathBuf>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a root unless it is already on the path
    pub fn push_root(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if !self.search_path.contains(&root) {
            self.search_path.push(root);
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Search path rendered for outcome records
    pub fn snapshot(&self) -> Vec<String> {
        self.search_path
            .iter()
            .map(|root| root.display().to_string())
            .collect()
    }

    /// Locate a module file: `<name>`, `<name>.js`, then `<name>/index.js`
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let name = name.strip_prefix("./").unwrap_or(name);
        if name.is_empty() {
            return None;
        }

        self.search_path.iter().find_map(|root| {
            module_candidates(name)
                .into_iter()
                .map(|candidate| root.join(candidate))
                .find(|path| path.is_file())
        })
    }

    /// Every `.js` file under the search path, keyed by path relative to its root
    fn load_modules(&self) -> Result<BTreeMap<String, String>, DeserializationError> {
        let mut modules = BTreeMap::new();

        for root in &self.search_path {
            if !root.is_dir() {
                debug!("Skipping missing module root {}", root.display());
                continue;
            }

            for entry in WalkDir::new(root).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                        continue;
                    }
                };

                let path = entry.path();
                if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("js") {
                    continue;
                }

                let Some(name) = module_name(root, path) else {
                    continue;
                };
                if modules.contains_key(&name) {
                    continue;
                }

                let source = std::fs::read_to_string(path).map_err(|source| {
                    DeserializationError::ModuleRead {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                modules.insert(name, source);
            }
        }

        Ok(modules)
    }
}

fn module_candidates(name: &str) -> [String; 3] {
    [
        name.to_string(),
        format!("{}.js", name),
        format!("{}/index.js", name),
    ]
}

fn module_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}

/// Decode a callable blob and bind it to the modules on the search path
pub fn deserialize(
    callable: &str,
    resolution: &ResolutionContext,
) -> Result<JsCallable, DeserializationError> {
    let blob = STANDARD.decode(callable.trim())?;
    let spec: CallableSpec = serde_json::from_slice(&blob)?;

    if spec.entry.trim().is_empty() {
        return Err(DeserializationError::MissingField { field: "entry" });
    }
    if spec.source.trim().is_empty() {
        return Err(DeserializationError::MissingField { field: "source" });
    }

    for name in &spec.requires {
        if resolution.resolve(name).is_none() {
            return Err(DeserializationError::UnresolvedModule {
                name: name.clone(),
                search_path: resolution.snapshot(),
            });
        }
    }

    let modules = resolution.load_modules()?;
    info!(
        "Deserialized callable '{}' with {} module(s) on the search path",
        spec.entry,
        modules.len()
    );

    Ok(JsCallable::new(spec.entry, spec.source, spec.captured, modules))
}
