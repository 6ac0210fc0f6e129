//! Writes a dependency archive out as a module tree

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("Failed to reset module root {}: {source}", .root.display())]
    Reset {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Refusing to write '{path}' outside the module root")]
    UnsafePath { path: String },

    #[error("Archive entry '{path}' is not valid base64: {source}")]
    Decode {
        path: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Recreate `root` and write every archive entry below it
///
/// `root` is removed first, so the resulting tree depends only on the
/// archive. One leading `/` is stripped from each entry path; paths that
/// would still leave `root` are rejected.
pub async fn materialize(
    archive: &BTreeMap<String, String>,
    root: &Path,
) -> Result<usize, MaterializeError> {
    info!(
        "Materializing {} module file(s) into {}",
        archive.len(),
        root.display()
    );

    match tokio::fs::remove_dir_all(root).await {
        Ok(()) => debug!("Removed previous module tree at {}", root.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(MaterializeError::Reset {
                root: root.to_path_buf(),
                source,
            })
        }
    }
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|source| MaterializeError::Reset {
            root: root.to_path_buf(),
            source,
        })?;

    for (path, contents) in archive {
        let relative = relative_entry_path(path)?;
        let target = root.join(relative);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| MaterializeError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let bytes = STANDARD
            .decode(contents.trim())
            .map_err(|source| MaterializeError::Decode {
                path: path.clone(),
                source,
            })?;

        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|source| MaterializeError::Write {
                path: target.clone(),
                source,
            })?;
        debug!("Wrote {} ({} bytes)", target.display(), bytes.len());
    }

    Ok(archive.len())
}

fn relative_entry_path(path: &str) -> Result<&Path, MaterializeError> {
    let stripped = path.strip_prefix('/').unwrap_or(path);
    let relative = Path::new(stripped);

    let safe = relative.components().next().is_some()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if safe {
        Ok(relative)
    } else {
        Err(MaterializeError::UnsafePath {
            path: path.to_string(),
        })
    }
}
