//! JSONL session dispatch.
//!
//! Every accepted connection is one session. The client opens with `hello`
//! to declare its role, then sends one [`ClientEvent`] per line:
//!
//! ```json
//! {"event":"hello","data":{"role":"driver"}}
//! {"event":"go-online","data":{"driverId":"d-17","initialLocation":{"lat":23.34,"lng":85.3}}}
//! ```
//!
//! Replies and room broadcasts arrive on the same connection as
//! [`ServerEvent`] lines, interleaved in the order the coordinator produced
//! them. A failed event yields a single `error` line for that session and
//! the session stays open; only an oversized line or a read failure closes
//! it.
//!
//! [`ClientEvent`]: ride_protocol::ClientEvent
//! [`ServerEvent`]: ride_protocol::ServerEvent

mod errors;
mod handler;
mod request;
mod response;
mod router;

pub use self::errors::DispatchError;
pub(crate) use self::handler::DispatchConnectionHandler;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
