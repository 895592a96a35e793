#![forbid(unsafe_code)]

//! Request opcodes used by the built-in attribute tables.
//!
//! The numeric values mirror the wire protocol's major opcodes. The
//! proxy layer never encodes request bodies; it hands the opcode and
//! decoded fields to the transport.

/// Create a window from a client-generated handle.
pub const CREATE_WINDOW: u16 = 1;

/// Fetch mapping state and event mask of a window.
pub const GET_WINDOW_ATTRIBUTES: u16 = 3;

/// Destroy a window.
pub const DESTROY_WINDOW: u16 = 4;

/// Reconfigure window geometry (position, size, border).
pub const CONFIGURE_WINDOW: u16 = 12;

/// Fetch window geometry; the reply carries every geometry field.
pub const GET_GEOMETRY: u16 = 14;

/// Store a named property.
pub const CHANGE_PROPERTY: u16 = 18;

/// Fetch a named property.
pub const GET_PROPERTY: u16 = 20;
