#![forbid(unsafe_code)]

//! Core vocabulary for the tether proxy layer.
//!
//! This crate defines the leaf types shared by everything above it:
//! remote handles and resource classes, signal kinds, payload values,
//! notification/reply records, the error taxonomy, and the collaborator
//! traits the runtime must be given (transport, handle allocator, event
//! loop). It has no dependency on the runtime crate and no knowledge of
//! wire encodings.

pub mod error;
pub mod handle;
pub mod notification;
pub mod opcode;
pub mod signal;
pub mod transport;
pub mod value;

pub use error::{Error, Result};
pub use handle::{ProxyId, RemoteHandle, ResourceClass};
pub use notification::{Notification, Reply, RequestToken};
pub use signal::SignalKind;
pub use transport::{EventLoop, HandleAllocator, NullEventLoop, ReplyOutcome, Transport};
pub use value::Value;
