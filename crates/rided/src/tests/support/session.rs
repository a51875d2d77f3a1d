//! Line-oriented client used by scenarios that talk to a live listener.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;
use std::time::Duration;

use ride_protocol::{ClientEvent, ServerEvent};

use crate::transport::ConnectionStream;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// One rider or driver connection.
pub struct SessionClient {
    writer: ConnectionStream,
    reader: BufReader<ConnectionStream>,
    received: Vec<ServerEvent>,
}

impl SessionClient {
    pub fn connect_tcp(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect to listener");
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("read timeout");
        Self::wrap(ConnectionStream::Tcp(stream))
    }

    #[cfg(unix)]
    pub fn connect_unix(path: &Path) -> Self {
        let stream = UnixStream::connect(path).expect("connect to daemon socket");
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("read timeout");
        Self::wrap(ConnectionStream::Unix(stream))
    }

    fn wrap(stream: ConnectionStream) -> Self {
        let reader = BufReader::new(stream.try_clone().expect("clone client stream"));
        Self {
            writer: stream,
            reader,
            received: Vec::new(),
        }
    }

    pub fn send(&mut self, event: &ClientEvent) {
        let mut line = serde_json::to_vec(event).expect("serialise client event");
        line.push(b'\n');
        self.send_raw(&line);
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write event");
        self.writer.flush().expect("flush event");
    }

    /// Reads events until one named `name` arrives, keeping everything read.
    pub fn wait_for(&mut self, name: &str) -> ServerEvent {
        loop {
            let event = self.next_event();
            if event.name() == name {
                return event;
            }
        }
    }

    /// Whether an event named `name` has been read already.
    pub fn has_received(&self, name: &str) -> bool {
        self.received.iter().any(|event| event.name() == name)
    }

    fn next_event(&mut self) -> ServerEvent {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).expect("read event line");
        assert!(read > 0, "connection closed while waiting for events");
        let event: ServerEvent = serde_json::from_str(&line).expect("server event json");
        self.received.push(event.clone());
        event
    }
}
