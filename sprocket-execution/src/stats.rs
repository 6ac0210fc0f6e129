//! Per-job measurements, one `<name> <value>` line each

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Failed to open stats file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write stats file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Append-only stats file, flushed after every line
///
/// Opened once when the job starts; the file is closed when the recorder is
/// dropped, on every exit path.
#[derive(Debug)]
pub struct StatRecorder {
    path: PathBuf,
    file: File,
    written: usize,
}

impl StatRecorder {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StatsError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| StatsError::Open {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written so far
    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Append one measurement
    ///
    /// A failed write is logged; losing a measurement never fails the job.
    pub fn record(&mut self, name: &str, value: f64) {
        if let Err(e) = self.try_record(name, value) {
            warn!("{}", e);
        }
    }

    pub fn record_duration(&mut self, name: &str, duration: Duration) {
        self.record(name, duration.as_secs_f64());
    }

    pub fn try_record(&mut self, name: &str, value: f64) -> Result<(), StatsError> {
        writeln!(self.file, "{} {:.6}", name, value)
            .and_then(|_| self.file.flush())
            .map_err(|source| StatsError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.written += 1;
        Ok(())
    }

    /// Sync and close the file
    pub fn finish(self) -> Result<(), StatsError> {
        self.file.sync_all().map_err(|source| StatsError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lines_are_visible_before_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.txt");

        let mut recorder = StatRecorder::create(&path).unwrap();
        recorder.record("func_num_tries", 1.0);
        recorder.record_duration("func_total_time", Duration::from_millis(1500));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "func_num_tries 1.000000\nfunc_total_time 1.500000\n");
        assert_eq!(recorder.len(), 2);

        recorder.finish().unwrap();
    }

    #[test]
    fn test_open_failure() {
        let dir = TempDir::new().unwrap();
        let err = StatRecorder::create(dir.path().join("missing/stats.txt")).unwrap_err();
        assert!(matches!(err, StatsError::Open { .. }));
    }
}
