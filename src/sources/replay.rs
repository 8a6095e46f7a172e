//! Replay source: pull pings from a capture file

use std::path::Path;
use tracing::{debug, info, warn};

use crate::capture::CaptureReader;
use crate::source::StopHandle;
use crate::{Ping, Result};

/// File-backed source driven entirely by the caller.
#[derive(Debug)]
pub struct ReplaySource {
    reader: CaptureReader,
    stop: StopHandle,
    finished: bool,
}

impl ReplaySource {
    /// Open a capture file. Fails if the file cannot be read or is not a capture.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = CaptureReader::open(path)?;
        info!("Replaying {} ({} bytes)", reader.file_path().display(), reader.total_bytes());
        Ok(Self { reader, stop: StopHandle::new(), finished: false })
    }

    /// Next ping, or `None` at end of stream or after a stop request.
    ///
    /// Framing errors are logged and skipped; the reader resynchronises on the next message.
    pub fn next(&mut self) -> Result<Option<Ping>> {
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.stop.is_stopped() {
                debug!("Replay stopped after {} messages", self.reader.messages_read());
                self.finished = true;
                return Ok(None);
            }

            match self.reader.next_message() {
                Ok(Some(raw)) => return Ok(Some(Ping::decode(raw))),
                Ok(None) => {
                    info!("End of replay after {} messages", self.reader.messages_read());
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) if e.is_retryable() => warn!("Skipping unreadable data in replay: {}", e),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn messages_read(&self) -> u64 {
        self.reader.messages_read()
    }
}
