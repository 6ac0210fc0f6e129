//! The per-invocation job document

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};

/// Where to find the task package and its input, and where to report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub func_bucket: String,
    pub func_key: String,

    pub data_bucket: String,
    pub data_key: String,

    /// Inclusive `[start, end]` byte range of the data object
    #[serde(default)]
    pub data_byte_range: Option<(u64, u64)>,

    pub output_bucket: String,
    pub output_key: String,

    /// Root directory the dependency archive is materialized into
    #[serde(alias = "python_module_path")]
    pub module_path: PathBuf,

    /// File receiving one `<name> <value>` line per measurement
    pub stats_filename: PathBuf,
}

impl JobConfig {
    /// Read a job document, YAML for `.yaml`/`.yml` files and JSON otherwise
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let job: JobConfig = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        job.validate()?;
        Ok(job)
    }
}

impl Validatable for JobConfig {
    fn validate(&self) -> ConfigResult<()> {
        let domain = self.domain_name();
        validate_required_string(&self.func_bucket, "func_bucket", domain)?;
        validate_required_string(&self.func_key, "func_key", domain)?;
        validate_required_string(&self.data_bucket, "data_bucket", domain)?;
        validate_required_string(&self.data_key, "data_key", domain)?;
        validate_required_string(&self.output_bucket, "output_bucket", domain)?;
        validate_required_string(&self.output_key, "output_key", domain)?;
        validate_required_string(&self.module_path.to_string_lossy(), "module_path", domain)?;
        validate_required_string(
            &self.stats_filename.to_string_lossy(),
            "stats_filename",
            domain,
        )?;

        if let Some((start, end)) = self.data_byte_range {
            if start > end {
                return Err(self.validation_error(format!(
                    "data_byte_range start {} is past its end {}",
                    start, end
                )));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "job"
    }
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}
