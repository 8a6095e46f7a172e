//! Append-only raw capture of valid pings.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Result, SonarError};

/// Binary output stream that mirrors the raw bytes of every valid ping.
///
/// Writes go straight to the file with no extra framing, so a capture can be
/// replayed with [`CaptureReader`](super::CaptureReader).
#[derive(Debug)]
pub struct CaptureSink {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
    messages_written: u64,
}

impl CaptureSink {
    /// Create (or truncate) `path` for binary writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening capture file {}", path.display());

        let file = File::create(&path).map_err(|e| SonarError::capture_error(path.clone(), e))?;

        Ok(Self { path, file: Some(file), bytes_written: 0, messages_written: 0 })
    }

    /// Append `bytes` exactly as given.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(SonarError::capture_error(
                self.path.clone(),
                std::io::Error::new(std::io::ErrorKind::NotConnected, "capture sink is closed"),
            ));
        };

        file.write_all(bytes).map_err(|e| SonarError::capture_error(self.path.clone(), e))?;
        self.bytes_written += bytes.len() as u64;
        self.messages_written += 1;
        Ok(())
    }

    /// Flush and release the file. Calling this again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| SonarError::capture_error(self.path.clone(), e))?;
        debug!(
            bytes = self.bytes_written,
            messages = self.messages_written,
            "Closed capture file {}",
            self.path.display()
        );
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn messages_written(&self) -> u64 {
        self.messages_written
    }
}

impl Drop for CaptureSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close capture file: {}", e);
        }
    }
}
