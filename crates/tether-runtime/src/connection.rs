#![forbid(unsafe_code)]

//! The connection: composition root of the proxy layer.
//!
//! Owns the transport, the handle allocator, the event-loop hooks, the
//! signal bus, the window identity pool, the coordinator binding table,
//! and the reply-outcome map. All dispatch runs on the single event-loop
//! thread; a cache-missing read suspends its logical flow in
//! [`Connection::wait_reply`] while `pump` keeps every other proxy's
//! traffic moving.
//!
//! # Dispatch ordering
//!
//! For each inbound notification: coordinator effects first (caches
//! reflect the pushed values), then the raw notification is republished
//! on the bus with the resolved primary proxy as sender, then any
//! synthesized events, and only then are destroyed handles forgotten by
//! the pool.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::{debug, trace};

use tether_core::{
    opcode, Error, EventLoop, HandleAllocator, Notification, RemoteHandle, Reply, ReplyOutcome,
    RequestToken, Result, SignalKind, Transport, Value,
};
use tether_core::handle::WINDOW;

use crate::bus::{Payload, SignalBus};
use crate::coordinator::Coordinator;
use crate::pool::IdentityPool;
use crate::proxy::{Proxy, WINDOW_ATTRS};

/// One client connection to the server.
pub struct Connection {
    transport: RefCell<Box<dyn Transport>>,
    allocator: RefCell<Box<dyn HandleAllocator>>,
    event_loop: Box<dyn EventLoop>,
    bus: SignalBus,
    windows: IdentityPool<RemoteHandle, Proxy>,
    coordinator: Coordinator,
    outcomes: RefCell<AHashMap<RequestToken, ReplyOutcome>>,
}

impl Connection {
    /// Build a connection with the default window coordinator rules.
    #[must_use]
    pub fn new(
        transport: Box<dyn Transport>,
        allocator: Box<dyn HandleAllocator>,
        event_loop: Box<dyn EventLoop>,
    ) -> Rc<Self> {
        Self::with_coordinator(transport, allocator, event_loop, Coordinator::window_defaults())
    }

    /// Build a connection with a custom coordinator table.
    #[must_use]
    pub fn with_coordinator(
        transport: Box<dyn Transport>,
        allocator: Box<dyn HandleAllocator>,
        event_loop: Box<dyn EventLoop>,
        coordinator: Coordinator,
    ) -> Rc<Self> {
        Rc::new(Self {
            transport: RefCell::new(transport),
            allocator: RefCell::new(allocator),
            event_loop,
            bus: SignalBus::new(),
            windows: IdentityPool::new(),
            coordinator,
            outcomes: RefCell::new(AHashMap::new()),
        })
    }

    /// The connection's signal bus.
    #[must_use]
    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    /// Number of live pooled window proxies.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    // ─── Proxy entry points ──────────────────────────────────────────────────

    /// The unique proxy for an existing window handle. Two calls with
    /// the same handle return the same instance while any external
    /// owner keeps it alive.
    #[must_use]
    pub fn window(self: &Rc<Self>, handle: RemoteHandle) -> Rc<Proxy> {
        let (proxy, created) = self.windows.get_or_create(handle, || {
            Proxy::bound(Rc::downgrade(self), &WINDOW, handle, WINDOW_ATTRS)
        });
        if created {
            trace!(handle = %handle, "window proxy created");
        }
        proxy
    }

    /// Create a window server-side from a client-generated handle and
    /// return its proxy. The requested geometry is installed into the
    /// cache (the client is its source) while everything else fetches
    /// lazily.
    pub fn create_window(
        self: &Rc<Self>,
        parent: RemoteHandle,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Result<Rc<Proxy>> {
        let proxy = Proxy::unbound(Rc::downgrade(self), &WINDOW, WINDOW_ATTRS);
        let handle = proxy.bind()?;
        self.send_request(
            opcode::CREATE_WINDOW,
            Some(handle),
            vec![
                ("parent", Value::Handle(parent)),
                ("x", Value::Signed(x)),
                ("y", Value::Signed(y)),
                ("width", Value::Unsigned(width)),
                ("height", Value::Unsigned(height)),
            ],
        )?;
        for (name, value) in [
            ("x", Value::Signed(x)),
            ("y", Value::Signed(y)),
            ("width", Value::Unsigned(width)),
            ("height", Value::Unsigned(height)),
        ] {
            proxy.set_from_push(name, value)?;
        }
        Ok(proxy)
    }

    /// Register an externally built proxy under its handle.
    pub(crate) fn adopt(&self, proxy: &Rc<Proxy>, handle: RemoteHandle) {
        if !self.windows.insert(handle, proxy) {
            debug!(handle = %handle, "handle already pooled; keeping existing entry");
        }
    }

    /// Deterministically forget a handle (local destroy or recycle).
    pub(crate) fn forget(&self, handle: RemoteHandle) {
        self.windows.release(&handle);
    }

    pub(crate) fn allocate_handle(&self) -> RemoteHandle {
        self.allocator.borrow_mut().generate_handle()
    }

    // ─── Request plumbing ────────────────────────────────────────────────────

    /// Queue a request on the transport.
    pub(crate) fn send_request(
        &self,
        opcode: u16,
        target: Option<RemoteHandle>,
        fields: Vec<(&'static str, Value)>,
    ) -> Result<RequestToken> {
        if !self.transport.borrow().is_connected() {
            return Err(Error::unavailable("transport disconnected"));
        }
        self.transport.borrow_mut().send_request(opcode, target, fields)
    }

    /// Drain everything the transport has: replies into the outcome
    /// map, notifications through dispatch.
    pub fn pump(&self) {
        loop {
            // The transport borrow is released before any dispatch so
            // handlers may issue requests of their own.
            let polled = self.transport.borrow_mut().poll_reply();
            match polled {
                Some((token, outcome)) => {
                    trace!(token = token.raw(), "reply arrived");
                    self.outcomes.borrow_mut().insert(token, outcome);
                }
                None => break,
            }
        }
        loop {
            let polled = self.transport.borrow_mut().poll_notification();
            match polled {
                Some(notification) => self.dispatch_notification(notification),
                None => break,
            }
        }
    }

    /// Suspend the calling flow until `token`'s reply arrives.
    ///
    /// Other traffic keeps flowing: each turn pumps the transport, so
    /// interleaved replies and notifications for unrelated proxies are
    /// processed while this flow waits. Correlation is by token, never
    /// by arrival order.
    pub fn wait_reply(&self, token: RequestToken) -> Result<Reply> {
        loop {
            self.pump();
            if let Some(outcome) = self.outcomes.borrow_mut().remove(&token) {
                return outcome.map_err(|(code, detail)| Error::Protocol { code, detail });
            }
            self.idle()?;
        }
    }

    /// One cooperative turn: fail if the transport died, flush queued
    /// writes, park until there may be new input.
    pub(crate) fn idle(&self) -> Result<()> {
        if !self.transport.borrow().is_connected() {
            return Err(Error::unavailable("disconnected while waiting"));
        }
        self.event_loop.flush();
        self.event_loop.park()
    }

    // ─── Notification dispatch ───────────────────────────────────────────────

    /// Route one push notification: coordinator effects, then the raw
    /// republish, then synthesized events, then pool cleanup.
    ///
    /// The republish sender is the resolved *primary* proxy. A compound
    /// notification is addressed to one handle but affects the resource
    /// its primary field names; subscribers on the affected proxy must
    /// see it even when the addressee differs or is not pooled.
    pub fn dispatch_notification(&self, notification: Notification) {
        debug!(
            kind = notification.kind.name,
            origin = %notification.origin,
            "dispatching notification"
        );
        let mut synthesized: Vec<(&'static SignalKind, Payload)> = Vec::new();
        let mut destroyed: Vec<RemoteHandle> = Vec::new();
        // No binding for this kind means the origin is the primary.
        let mut primary = notification.origin;
        for (position, binding) in self.coordinator.matching(notification.kind).enumerate() {
            let handle = binding.primary_handle(&notification);
            if position == 0 {
                primary = handle;
            }
            let Some(proxy) = self.windows.lookup(&handle) else {
                trace!(handle = %handle, "notification for unknown handle");
                continue;
            };
            binding.apply(&notification, &proxy, &mut synthesized);
            if proxy.is_destroyed() {
                destroyed.push(handle);
            }
        }

        // Effects above ran first, so handlers reading attributes see
        // the pushed values.
        if let Some(proxy) = self.windows.lookup(&primary) {
            if let Some(id) = proxy.proxy_id() {
                let kind = notification.kind;
                let payload = Payload::Notification(notification);
                self.bus.publish(kind, id, &payload);
                for (synth_kind, synth_payload) in synthesized {
                    self.bus.publish(synth_kind, id, &synth_payload);
                }
            }
        } else {
            trace!(primary = %primary, "dropping notification for unknown primary");
        }

        for handle in destroyed {
            self.forget(handle);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("windows", &self.windows)
            .field("bus", &self.bus)
            .finish()
    }
}
