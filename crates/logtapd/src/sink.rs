//! Log sink: the on-disk copy of every tailed line.
//!
//! On open the previous file is kept as `<name>.bak` and a fresh, empty
//! file takes its place. Lines are appended verbatim for the life of the
//! daemon.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::DaemonError;

const SINK_MODE: u32 = 0o644;

/// Append-only log file owned by the tail loop.
#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    file: File,
    failing: bool,
}

impl LogSink {
    /// Rotates any existing file to `.bak` and opens a fresh one.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let path = path.into();
        let sink_err = |source: io::Error| DaemonError::Sink {
            path: path.clone(),
            source,
        };

        rotate_previous(&path).map_err(sink_err)?;

        // Truncate first: std refuses `append` together with `truncate`.
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(SINK_MODE)
            .open(&path)
            .map_err(sink_err)?;
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(sink_err)?;

        debug!(path = %path.display(), "Log sink opened");
        Ok(Self {
            path,
            file: File::from_std(file),
            failing: false,
        })
    }

    /// Path of the sink file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one raw line.
    ///
    /// Write failures are logged once per failure streak and otherwise
    /// ignored; the sink never stops the tail loop.
    pub async fn append(&mut self, line: &[u8]) {
        let result = async {
            self.file.write_all(line).await?;
            self.file.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                if self.failing {
                    debug!(path = %self.path.display(), "Log sink writable again");
                    self.failing = false;
                }
            }
            Err(e) => {
                if !self.failing {
                    warn!(path = %self.path.display(), error = %e, "Log sink write failed");
                    self.failing = true;
                }
            }
        }
    }

    /// Flushes buffered data to the file.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.file.flush().await
    }
}

/// Path the previous sink file is moved to.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

fn rotate_previous(path: &Path) -> io::Result<()> {
    match std::fs::rename(path, backup_path(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
