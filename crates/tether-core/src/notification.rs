#![forbid(unsafe_code)]

//! Decoded inbound records: push notifications and request replies.

use crate::handle::RemoteHandle;
use crate::signal::SignalKind;
use crate::value::Value;

/// Opaque correlator between a request and its eventual reply.
///
/// Tokens are compared for identity only; their numeric order carries no
/// meaning (replies may arrive out of request order).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RequestToken(u64);

impl RequestToken {
    /// Wrap a raw token produced by a transport.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw token value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// An unsolicited push event decoded by the transport.
///
/// Immutable once constructed; consumed by dispatch, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// The signal kind this notification publishes as.
    pub kind: &'static SignalKind,
    /// The handle the server addressed the notification to.
    pub origin: RemoteHandle,
    /// Decoded payload fields.
    pub fields: Vec<(&'static str, Value)>,
}

impl Notification {
    /// Build a notification with no payload fields.
    #[must_use]
    pub fn new(kind: &'static SignalKind, origin: RemoteHandle) -> Self {
        Self {
            kind,
            origin,
            fields: Vec::new(),
        }
    }

    /// Append a payload field (builder style).
    #[must_use]
    pub fn with_field(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    /// Look up a payload field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Look up a payload field carrying a handle.
    #[must_use]
    pub fn handle_field(&self, name: &str) -> Option<RemoteHandle> {
        self.field(name).and_then(Value::as_handle)
    }
}

/// The decoded fields of one request's reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    /// Decoded reply fields.
    pub fields: Vec<(&'static str, Value)>,
}

impl Reply {
    /// An empty reply (acknowledgement with no data).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reply field (builder style).
    #[must_use]
    pub fn with_field(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    /// Look up a reply field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::GEOMETRY_CHANGED;

    #[test]
    fn field_lookup() {
        let n = Notification::new(&GEOMETRY_CHANGED, RemoteHandle::new(7))
            .with_field("width", 150u32)
            .with_field("window", RemoteHandle::new(7));
        assert_eq!(n.field("width").and_then(Value::as_unsigned), Some(150));
        assert_eq!(n.handle_field("window"), Some(RemoteHandle::new(7)));
        assert!(n.field("height").is_none());
    }

    #[test]
    fn reply_lookup() {
        let r = Reply::new().with_field("x", -3i32);
        assert_eq!(r.field("x").and_then(Value::as_signed), Some(-3));
        assert!(r.field("y").is_none());
    }
}
