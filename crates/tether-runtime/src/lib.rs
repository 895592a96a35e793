#![forbid(unsafe_code)]

//! The tether runtime: signal bus, identity pool, attribute caches,
//! invalidation coordinator, proxies, and the connection that ties them
//! together.
//!
//! Everything here is single-threaded and cooperative. Shared state
//! lives behind `Rc`/`RefCell`; no interior borrow is held across a
//! handler dispatch or a suspension point, so handlers and resumed
//! flows may freely reenter the runtime.
//!
//! The entry point is [`Connection`]: give it a [`Transport`], a
//! [`HandleAllocator`], and an [`EventLoop`](tether_core::EventLoop),
//! then resolve window proxies through [`Connection::window`] or
//! [`Connection::create_window`].
//!
//! [`Transport`]: tether_core::Transport
//! [`HandleAllocator`]: tether_core::HandleAllocator

pub mod bus;
pub mod cache;
pub mod connection;
pub mod coordinator;
pub mod pool;
pub mod proxy;
pub mod testkit;

pub use bus::{
    Emission, Handler, HandlerError, HandlerResult, InputEvent, KindFilter, Payload, SenderFilter,
    SignalBus, SubscriptionId,
};
pub use cache::{Access, AttrSpec, SlotState, SlotTable};
pub use connection::Connection;
pub use coordinator::{Binding, Coordinator, Effect};
pub use pool::IdentityPool;
pub use proxy::{Lifecycle, Proxy, WINDOW_ATTRS};
