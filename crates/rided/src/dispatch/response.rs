//! Event serialization for session output.

use std::io::Write;

use ride_protocol::ServerEvent;

use super::errors::DispatchError;

/// Writer that frames server events as JSONL lines.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one event as a JSONL line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization, writing, or flushing fails.
    pub fn write_event(&mut self, event: &ServerEvent) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
