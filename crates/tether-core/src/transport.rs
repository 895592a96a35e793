#![forbid(unsafe_code)]

//! Collaborator traits the runtime must be given.
//!
//! The proxy layer does not parse wire bytes, own sockets, or run an
//! event loop. It correlates request tokens to decoded replies, routes
//! decoded notifications, and cooperatively suspends callers through
//! the [`EventLoop`] hook. Everything below these traits belongs to the
//! embedding application.

use crate::error::Result;
use crate::handle::RemoteHandle;
use crate::notification::{Notification, Reply, RequestToken};
use crate::value::Value;

/// Decoded outcome of one request: the reply fields, or the server's
/// error payload as `(code, detail)`.
pub type ReplyOutcome = std::result::Result<Reply, (u16, String)>;

/// Non-blocking connection to the server.
///
/// `send_request` queues; the `poll_*` methods never block. Replies are
/// correlated by token, never by position: the transport is free to
/// deliver them in any order.
pub trait Transport {
    /// Queue a request and return its correlation token.
    fn send_request(
        &mut self,
        opcode: u16,
        target: Option<RemoteHandle>,
        fields: Vec<(&'static str, Value)>,
    ) -> Result<RequestToken>;

    /// The next decoded reply, if one has arrived.
    fn poll_reply(&mut self) -> Option<(RequestToken, ReplyOutcome)>;

    /// The next decoded push notification, if one has arrived.
    fn poll_notification(&mut self) -> Option<Notification>;

    /// Whether the connection is still usable.
    fn is_connected(&self) -> bool;
}

/// Generates client-side handles for not-yet-created resources.
pub trait HandleAllocator {
    /// A handle guaranteed unused on this connection.
    fn generate_handle(&mut self) -> RemoteHandle;
}

/// Cooperative-suspension hooks provided by the embedding event loop.
///
/// A cache-missing read parks its logical flow here between transport
/// polls; the loop keeps servicing other I/O meanwhile. The proxy layer
/// never owns the loop.
pub trait EventLoop {
    /// Flush queued outgoing writes. Called before each park.
    fn flush(&self) {}

    /// Suspend the calling flow until the transport may have new input.
    ///
    /// An `Err` means the wait was abandoned (external timeout or
    /// cancellation); the suspended read surfaces it exactly like a
    /// protocol-level failure.
    fn park(&self) -> Result<()>;
}

/// Busy-pump loop for synchronous transports and tests: parking returns
/// immediately and the caller re-polls.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventLoop;

impl EventLoop for NullEventLoop {
    fn park(&self) -> Result<()> {
        Ok(())
    }
}
