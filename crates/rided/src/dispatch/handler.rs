//! Connection handler that runs one dispatch session per connection.
//!
//! The reading side parses bounded JSONL lines and routes them. A dedicated
//! writer thread drains the session's bounded outbox to the socket, so
//! broadcasts from other sessions never wait on this client's reads. Writes
//! carry a timeout: a peer that stops reading is dropped instead of pinning
//! the writer thread.

use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};
use ride_protocol::{ServerEvent, SessionId};
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::transport::{ConnectionHandler, ConnectionStream};

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::parse_event;
use super::response::ResponseWriter;
use super::router::{EventRouter, SessionState};

/// Maximum size of a single event line in bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Events queued for one connection before further events are dropped.
pub(crate) const OUTBOX_CAPACITY: usize = 1024;

/// Longest a single write may block before the peer is considered gone.
pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection handler that turns each connection into a dispatch session.
#[derive(Clone)]
pub struct DispatchConnectionHandler {
    coordinator: Arc<Coordinator>,
    router: EventRouter,
}

impl DispatchConnectionHandler {
    /// Creates a handler over the shared coordinator.
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            router: EventRouter::new(Arc::clone(&coordinator)),
            coordinator,
        }
    }

    fn serve(&self, stream: ConnectionStream) {
        let session = self.coordinator.open_session();
        let writer_stream = match prepare_writer(&stream, WRITE_TIMEOUT) {
            Ok(clone) => clone,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %session, %error, "failed to prepare connection writer");
                return;
            }
        };
        let (outbox, inbox) = bounded(OUTBOX_CAPACITY);
        let writer = match thread::Builder::new()
            .name(format!("rided-writer-{session}"))
            .spawn(move || drain_outbox(session, writer_stream, &inbox))
        {
            Ok(writer) => writer,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %session, %error, "failed to spawn writer");
                return;
            }
        };

        info!(target: DISPATCH_TARGET, %session, "session opened");
        let mut state = SessionState::new(session, outbox);
        let mut reader = BufReader::new(stream);
        self.read_loop(&mut reader, &mut state);

        let departure = self.coordinator.disconnect(session);
        info!(
            target: DISPATCH_TARGET,
            %session,
            drivers = departure.drivers.len(),
            flagged_rides = departure.flagged_rides.len(),
            "session closed"
        );
        // Last outbox sender; the writer drains and exits. Each of its writes
        // is bounded by WRITE_TIMEOUT.
        drop(state);
        if writer.join().is_err() {
            warn!(target: DISPATCH_TARGET, %session, "writer thread panicked");
        }
        if let Err(error) = reader.get_ref().shutdown() {
            debug!(target: DISPATCH_TARGET, %session, %error, "socket already closed");
        }
    }

    fn read_loop<R: BufRead>(&self, reader: &mut R, state: &mut SessionState) {
        let mut line = Vec::new();
        loop {
            match read_event_line(reader, &mut line) {
                Ok(true) => {}
                Ok(false) => break,
                Err(DispatchError::Io(error)) => {
                    debug!(target: DISPATCH_TARGET, session = %state.id(), %error, "read failed");
                    break;
                }
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, session = %state.id(), %error, "closing session");
                    state.send(error.to_event());
                    break;
                }
            }

            let outcome = parse_event(&line).and_then(|event| self.router.route(state, event));
            if let Err(error) = outcome {
                debug!(
                    target: DISPATCH_TARGET,
                    session = %state.id(),
                    kind = error.kind().as_str(),
                    %error,
                    "event failed"
                );
                state.send(error.to_event());
            }
        }
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}

/// Reads one bounded JSONL line into `line`.
///
/// Returns `Ok(false)` at end of stream. A final line without a newline is
/// still returned.
fn read_event_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> Result<bool, DispatchError> {
    line.clear();
    let limit = u64::try_from(MAX_REQUEST_BYTES + 1).unwrap_or(u64::MAX);
    let read = reader.by_ref().take(limit).read_until(b'\n', line)?;
    if read == 0 {
        return Ok(false);
    }
    if line.len() > MAX_REQUEST_BYTES {
        return Err(DispatchError::request_too_large(
            line.len(),
            MAX_REQUEST_BYTES,
        ));
    }
    Ok(true)
}

/// Opens the writer half of a connection with a bounded write timeout.
fn prepare_writer(
    stream: &ConnectionStream,
    timeout: Duration,
) -> std::io::Result<ConnectionStream> {
    let writer = stream.try_clone()?;
    writer.set_write_timeout(Some(timeout))?;
    Ok(writer)
}

fn drain_outbox(session: SessionId, stream: ConnectionStream, inbox: &Receiver<ServerEvent>) {
    let mut writer = ResponseWriter::new(stream);
    for event in inbox {
        if let Err(error) = writer.write_event(&event) {
            debug!(
                target: DISPATCH_TARGET,
                %session,
                %error,
                "dropping session output"
            );
            break;
        }
    }
}
