#![forbid(unsafe_code)]

//! Umbrella crate for the tether proxy layer.
//!
//! Depend on this crate and pull in [`prelude`] for the common surface,
//! or reach into [`core`] and [`runtime`] directly.

pub use tether_core as core;
pub use tether_runtime as runtime;

/// The types most applications need.
pub mod prelude {
    pub use tether_core::{
        Error, EventLoop, HandleAllocator, Notification, ProxyId, RemoteHandle, Reply,
        ReplyOutcome, RequestToken, ResourceClass, Result, SignalKind, Transport, Value,
    };
    pub use tether_runtime::{
        Connection, Emission, HandlerResult, KindFilter, Payload, Proxy, SenderFilter,
    };
}
