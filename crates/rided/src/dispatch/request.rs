//! Event deserialization for the dispatch loop.

use ride_protocol::ClientEvent;

use super::errors::DispatchError;

/// Parses one JSONL line into a client event.
///
/// Trailing whitespace (including the newline delimiter) is trimmed before
/// parsing.
///
/// # Errors
///
/// Returns `DispatchError::MalformedJsonl` if the line is empty or is not a
/// known, well-formed event.
pub fn parse_event(line: &[u8]) -> Result<ClientEvent, DispatchError> {
    let trimmed = trim_trailing_whitespace(line);
    if trimmed.is_empty() {
        return Err(DispatchError::malformed("empty request line"));
    }

    serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    &bytes[..end]
}
