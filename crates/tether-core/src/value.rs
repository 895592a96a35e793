#![forbid(unsafe_code)]

//! Payload scalar carried by attributes, notifications, and replies.

use crate::handle::RemoteHandle;

/// A decoded protocol value.
///
/// The transport decodes wire bytes into these; the proxy layer never
/// sees raw encodings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// Unsigned 32-bit quantity (dimensions, masks, ids).
    Unsigned(u32),
    /// Signed 32-bit quantity (coordinates).
    Signed(i32),
    /// Boolean flag.
    Boolean(bool),
    /// UTF-8 text (names, properties).
    Text(String),
    /// A resource handle embedded in a payload.
    Handle(RemoteHandle),
}

impl Value {
    /// The unsigned value, if this is [`Value::Unsigned`].
    #[must_use]
    pub fn as_unsigned(&self) -> Option<u32> {
        match self {
            Self::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    /// The signed value, if this is [`Value::Signed`].
    #[must_use]
    pub fn as_signed(&self) -> Option<i32> {
        match self {
            Self::Signed(v) => Some(*v),
            _ => None,
        }
    }

    /// The boolean value, if this is [`Value::Boolean`].
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// The text value, if this is [`Value::Text`].
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// The handle value, if this is [`Value::Handle`].
    #[must_use]
    pub fn as_handle(&self) -> Option<RemoteHandle> {
        match self {
            Self::Handle(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Unsigned(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Signed(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<RemoteHandle> for Value {
    fn from(v: RemoteHandle) -> Self {
        Self::Handle(v)
    }
}
