//! Capture file reader for replay
//!
//! A capture file is a raw stream of sonar messages written back-to-back, exactly as
//! [`CaptureSink`](super::CaptureSink) produces it.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use sonarlink::capture::CaptureReader;
//!
//! fn read_messages() -> sonarlink::Result<()> {
//!     let mut reader = CaptureReader::open("dive.oculus")?;
//!     println!("File holds {} bytes", reader.total_bytes());
//!
//!     while let Some(message) = reader.next_message()? {
//!         println!("{} byte message", message.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! The whole file is loaded at open time; framing then works on the in-memory buffer.

use bytes::{Bytes, BytesMut};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::codec::Decoder;
use tracing::{debug, info};

use crate::protocol::MessageCodec;
use crate::protocol::format::OCULUS_ID;
use crate::{Result, SonarError};

/// Sequential reader over a raw capture file.
#[derive(Debug)]
pub struct CaptureReader {
    path: PathBuf,
    buffer: BytesMut,
    codec: MessageCodec,
    total_bytes: usize,
    messages_read: u64,
    eof: bool,
}

impl CaptureReader {
    /// Open a capture file, failing if it cannot be read or is not a raw message stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path).map_err(|e| SonarError::file_error(path.clone(), e))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| SonarError::file_error(path.clone(), e))?;

        Self::from_bytes_with_path(Bytes::from(data), path)
    }

    /// Reader over an in-memory capture.
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        Self::from_bytes_with_path(data, PathBuf::from("<memory>"))
    }

    fn from_bytes_with_path(data: Bytes, path: PathBuf) -> Result<Self> {
        if data.is_empty() {
            return Err(SonarError::UnrecognizedFormat {
                path,
                reason: "file is empty".to_string(),
            });
        }
        if !data.starts_with(&OCULUS_ID.to_le_bytes()) {
            return Err(SonarError::UnrecognizedFormat {
                path,
                reason: format!(
                    "does not start with a message header (first bytes {:02x?})",
                    &data[..data.len().min(4)]
                ),
            });
        }

        info!("Opened capture file {} ({} bytes)", path.display(), data.len());

        let total_bytes = data.len();
        Ok(Self {
            path,
            buffer: BytesMut::from(&data[..]),
            codec: MessageCodec::new(),
            total_bytes,
            messages_read: 0,
            eof: false,
        })
    }

    /// Next complete message, or `None` at end of file.
    ///
    /// A partial message at the end of the file is dropped with a warning.
    pub fn next_message(&mut self) -> Result<Option<Bytes>> {
        if self.eof {
            return Ok(None);
        }

        match self.codec.decode_eof(&mut self.buffer)? {
            Some(message) => {
                self.messages_read += 1;
                Ok(Some(message))
            }
            None => {
                debug!(
                    "Reached end of {} after {} messages",
                    self.path.display(),
                    self.messages_read
                );
                self.eof = true;
                Ok(None)
            }
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.path
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Bytes not yet consumed.
    pub fn remaining_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn messages_read(&self) -> u64 {
        self.messages_read
    }

    /// Bytes skipped while resynchronising on corrupt input.
    pub fn discarded_bytes(&self) -> u64 {
        self.codec.discarded()
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::format::MessageId;
    use crate::protocol::{SimplePingBuilder, build_message};
    use anyhow::Result;

    fn capture_of(messages: &[Bytes]) -> Bytes {
        let mut data = BytesMut::new();
        for message in messages {
            data.extend_from_slice(message);
        }
        data.freeze()
    }

    #[test]
    fn reads_messages_in_order() -> Result<()> {
        let first = SimplePingBuilder::new().ping_id(1).build();
        let second = build_message(MessageId::Dummy, &[1, 2]);
        let mut reader = CaptureReader::from_bytes(capture_of(&[first.clone(), second.clone()]))?;

        assert_eq!(reader.next_message()?, Some(first));
        assert_eq!(reader.next_message()?, Some(second));
        assert_eq!(reader.next_message()?, None);
        assert!(reader.is_eof());
        assert_eq!(reader.messages_read(), 2);
        assert_eq!(reader.next_message()?, None);
        Ok(())
    }

    #[test]
    fn trailing_partial_message_ends_stream() -> Result<()> {
        let message = SimplePingBuilder::new().build();
        let data = capture_of(&[message.clone(), message.slice(..20)]);
        let mut reader = CaptureReader::from_bytes(data)?;

        assert_eq!(reader.next_message()?, Some(message));
        assert_eq!(reader.next_message()?, None);
        assert_eq!(reader.discarded_bytes(), 20);
        Ok(())
    }

    #[test]
    fn rejects_empty_and_foreign_files() {
        let empty = CaptureReader::from_bytes(Bytes::new()).unwrap_err();
        assert!(matches!(empty, SonarError::UnrecognizedFormat { .. }));

        let foreign = CaptureReader::from_bytes(Bytes::from_static(b"\x89PNG\r\n")).unwrap_err();
        assert!(matches!(foreign, SonarError::UnrecognizedFormat { .. }));
    }

    #[test]
    fn open_missing_file_is_file_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = CaptureReader::open(dir.path().join("missing.oculus")).unwrap_err();
        assert!(matches!(err, SonarError::File { .. }));
        assert!(err.is_open_error());
        Ok(())
    }

    #[test]
    fn open_reads_file_from_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dive.oculus");
        let message = SimplePingBuilder::new().build();
        std::fs::write(&path, &message)?;

        let mut reader = CaptureReader::open(&path)?;
        assert_eq!(reader.file_path(), path.as_path());
        assert_eq!(reader.total_bytes(), message.len());
        assert_eq!(reader.next_message()?, Some(message));
        assert_eq!(reader.remaining_bytes(), 0);
        Ok(())
    }
}
