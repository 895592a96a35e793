#![forbid(unsafe_code)]

//! Proxy resource objects.
//!
//! A [`Proxy`] is the in-process representative of one remote handle:
//! identity-pool membership, a table of cache slots, and signal-bus
//! participation. Reads go through the cache; a miss issues a
//! round-trip request and cooperatively suspends the calling flow until
//! the reply arrives, while the connection keeps pumping other traffic.
//!
//! # Lifecycle
//!
//! ```text
//! Unbound --bind--> Bound --destroy--> Destroyed
//! ```
//!
//! The Bound→Destroyed transition happens exactly once; a local destroy
//! call racing a server destroy notification is a no-op the second
//! time. Destruction forces every slot Empty; further reads fail with
//! `Destroyed`, and replies to fetches that were in flight are
//! discarded silently.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use tether_core::signal::{ATTRIBUTE_CHANGED, DESTROY_NOTIFY};
use tether_core::{
    opcode, Error, ProxyId, RemoteHandle, Reply, RequestToken, ResourceClass, Result, Value,
};

use crate::bus::{Handler, KindFilter, Payload, SenderFilter, SubscriptionId};
use crate::cache::{Access, AttrSpec, SlotState, SlotTable};
use crate::connection::Connection;

/// Where a proxy is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// No handle assigned yet; reads fail with `Unavailable`.
    Unbound,
    /// Handle assigned and registered in the identity pool.
    Bound,
    /// Handle invalidated; every operation fails with `Destroyed`.
    Destroyed,
}

/// Default attribute table for window proxies.
///
/// The five geometry slots share one fetch opcode: a single geometry
/// round trip fills all of them. The two name encodings alias the
/// canonical `"name"`, so filling either announces one canonical
/// change signal.
pub static WINDOW_ATTRS: &[AttrSpec] = &[
    AttrSpec::read_write("x", opcode::GET_GEOMETRY, opcode::CONFIGURE_WINDOW, "x"),
    AttrSpec::read_write("y", opcode::GET_GEOMETRY, opcode::CONFIGURE_WINDOW, "y"),
    AttrSpec::read_write(
        "width",
        opcode::GET_GEOMETRY,
        opcode::CONFIGURE_WINDOW,
        "width",
    ),
    AttrSpec::read_write(
        "height",
        opcode::GET_GEOMETRY,
        opcode::CONFIGURE_WINDOW,
        "height",
    ),
    AttrSpec::read_write(
        "border_width",
        opcode::GET_GEOMETRY,
        opcode::CONFIGURE_WINDOW,
        "border_width",
    ),
    // Kept current by visibility pushes; clearing it locally would
    // desynchronize from the server, so it cannot be invalidated.
    AttrSpec::read_only("mapped", opcode::GET_WINDOW_ATTRIBUTES, "mapped").pinned(),
    AttrSpec::read_write(
        "wm_name",
        opcode::GET_PROPERTY,
        opcode::CHANGE_PROPERTY,
        "wm_name",
    )
    .aliased("name"),
    AttrSpec::read_write(
        "net_name",
        opcode::GET_PROPERTY,
        opcode::CHANGE_PROPERTY,
        "net_name",
    )
    .aliased("name"),
];

/// Client-side representative of one remote resource.
pub struct Proxy {
    conn: Weak<Connection>,
    class: &'static ResourceClass,
    attrs: &'static [AttrSpec],
    handle: Cell<Option<RemoteHandle>>,
    lifecycle: Cell<Lifecycle>,
    slots: SlotTable,
}

impl Proxy {
    /// A proxy bound to an existing server-side handle.
    pub(crate) fn bound(
        conn: Weak<Connection>,
        class: &'static ResourceClass,
        handle: RemoteHandle,
        attrs: &'static [AttrSpec],
    ) -> Rc<Self> {
        Rc::new(Self {
            conn,
            class,
            attrs,
            handle: Cell::new(Some(handle)),
            lifecycle: Cell::new(Lifecycle::Bound),
            slots: SlotTable::new(),
        })
    }

    /// A proxy for a resource that does not exist server-side yet.
    pub(crate) fn unbound(
        conn: Weak<Connection>,
        class: &'static ResourceClass,
        attrs: &'static [AttrSpec],
    ) -> Rc<Self> {
        Rc::new(Self {
            conn,
            class,
            attrs,
            handle: Cell::new(None),
            lifecycle: Cell::new(Lifecycle::Unbound),
            slots: SlotTable::new(),
        })
    }

    /// The proxy's resource class.
    #[must_use]
    pub fn class(&self) -> &'static ResourceClass {
        self.class
    }

    /// The assigned handle, once bound.
    #[must_use]
    pub fn handle(&self) -> Option<RemoteHandle> {
        self.handle.get()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    /// Whether the proxy has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.lifecycle.get() == Lifecycle::Destroyed
    }

    /// The proxy's bus identity, once bound.
    #[must_use]
    pub fn proxy_id(&self) -> Option<ProxyId> {
        self.handle.get().map(|h| ProxyId::new(self.class, h))
    }

    fn connection(&self) -> Result<Rc<Connection>> {
        self.conn
            .upgrade()
            .ok_or_else(|| Error::unavailable("connection dropped"))
    }

    fn spec(&self, name: &str) -> Result<&'static AttrSpec> {
        self.attrs
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| Error::unavailable(format!("unknown attribute: {name}")))
    }

    fn bound_handle(&self) -> Result<RemoteHandle> {
        match self.lifecycle.get() {
            Lifecycle::Destroyed => Err(Error::Destroyed),
            Lifecycle::Unbound => Err(Error::unavailable("proxy is not bound to a handle")),
            Lifecycle::Bound => Ok(self
                .handle
                .get()
                .expect("bound proxy always carries a handle")),
        }
    }

    /// Assign a client-generated handle and register in the pool.
    ///
    /// Idempotent for an already-bound proxy; fails with `Destroyed`
    /// after destruction.
    pub fn bind(self: &Rc<Self>) -> Result<RemoteHandle> {
        match self.lifecycle.get() {
            Lifecycle::Destroyed => Err(Error::Destroyed),
            Lifecycle::Bound => Ok(self
                .handle
                .get()
                .expect("bound proxy always carries a handle")),
            Lifecycle::Unbound => {
                let conn = self.connection()?;
                let handle = conn.allocate_handle();
                self.handle.set(Some(handle));
                self.lifecycle.set(Lifecycle::Bound);
                conn.adopt(self, handle);
                debug!(proxy = %ProxyId::new(self.class, handle), "proxy bound");
                Ok(handle)
            }
        }
    }

    // ─── Cached attribute access ─────────────────────────────────────────────

    /// Read an attribute through its cache slot.
    ///
    /// Filled returns immediately. Empty issues a fetch and suspends
    /// the calling flow until the reply arrives; a reply that fills
    /// sibling slots served by the same fetch opcode installs those
    /// too. A push update racing the fetch wins: the read returns the
    /// pushed value and the stale reply is discarded.
    pub fn read_attr(&self, name: &'static str) -> Result<Value> {
        let spec = self.spec(name)?;
        let handle = self.bound_handle()?;
        match self.slots.state(name) {
            SlotState::Filled(value) => Ok(value),
            SlotState::Pending(_) => self.wait_slot_settled(spec),
            SlotState::Empty => {
                let conn = self.connection()?;
                let token = conn.send_request(
                    spec.fetch_opcode,
                    Some(handle),
                    vec![("attribute", Value::Text(spec.name.to_owned()))],
                )?;
                self.slots.begin_fetch(name, token);
                self.await_fetch(spec, token)
            }
        }
    }

    /// Write a writable attribute: issue the store request and install
    /// the value locally so an immediate read hits the cache.
    pub fn write_attr(&self, name: &'static str, value: impl Into<Value>) -> Result<()> {
        let spec = self.spec(name)?;
        let handle = self.bound_handle()?;
        if spec.access != Access::ReadWrite {
            return Err(Error::ReadOnly { attribute: spec.name });
        }
        let Some(store_opcode) = spec.store_opcode else {
            return Err(Error::ReadOnly { attribute: spec.name });
        };
        let value = value.into();
        let conn = self.connection()?;
        conn.send_request(
            store_opcode,
            Some(handle),
            vec![(spec.reply_field, value.clone())],
        )?;
        self.install_value(spec, value);
        Ok(())
    }

    /// Clear an attribute's cache without fetching. The next read
    /// fetches fresh.
    pub fn invalidate_attr(&self, name: &'static str) -> Result<()> {
        let spec = self.spec(name)?;
        if spec.undeletable {
            return Err(Error::Undeletable { attribute: spec.name });
        }
        self.slots.invalidate(spec.name);
        Ok(())
    }

    /// Install a value carried by a push notification, without issuing
    /// a request. The slot is filled before the change signal is
    /// published, so a handler reading the attribute sees the fresh
    /// value. No-op on a destroyed proxy (a late push must not
    /// resurrect its slots).
    pub fn set_from_push(&self, name: &'static str, value: Value) -> Result<()> {
        let spec = self.spec(name)?;
        if self.is_destroyed() {
            trace!(attribute = name, "dropping push install on destroyed proxy");
            return Ok(());
        }
        self.install_value(spec, value);
        Ok(())
    }

    /// The display name: prefers the modern encoding, falls back to the
    /// legacy one. Both alias the canonical `"name"` signal.
    pub fn display_name(&self) -> Result<String> {
        match self.read_attr("net_name") {
            Ok(Value::Text(text)) if !text.is_empty() => return Ok(text),
            Ok(_) => {}
            Err(Error::Destroyed) => return Err(Error::Destroyed),
            Err(_) => {}
        }
        match self.read_attr("wm_name")? {
            Value::Text(text) if !text.is_empty() => Ok(text),
            _ => Err(Error::unavailable("no name property set")),
        }
    }

    fn install_value(&self, spec: &'static AttrSpec, value: Value) {
        if let Some(cancelled) = self.slots.install(spec.name, value.clone()) {
            trace!(
                attribute = spec.name,
                token = cancelled.raw(),
                "install cancelled in-flight fetch"
            );
        }
        self.publish_change(spec, value);
    }

    fn publish_change(&self, spec: &'static AttrSpec, value: Value) {
        let (Ok(conn), Some(id)) = (self.connection(), self.proxy_id()) else {
            return;
        };
        conn.bus().publish(
            &ATTRIBUTE_CHANGED,
            id,
            &Payload::Attribute {
                name: spec.canonical_name(),
                value,
            },
        );
    }

    /// Wait for the fetch this flow initiated, then install the reply.
    fn await_fetch(&self, spec: &'static AttrSpec, token: RequestToken) -> Result<Value> {
        let conn = self.connection()?;
        let outcome = conn.wait_reply(token);
        // Re-check after suspension: a destroy or push may have won.
        if self.is_destroyed() {
            trace!(attribute = spec.name, "discarding reply for destroyed proxy");
            return Err(Error::Destroyed);
        }
        match outcome {
            Ok(reply) => self.install_reply(spec, token, &reply),
            Err(err) => {
                self.slots.fail_fetch(spec.name, token);
                // A push may have filled the slot while this fetch was
                // failing; the stale failure is discarded like a stale
                // reply and the read returns the current value.
                match self.slots.state(spec.name) {
                    SlotState::Filled(value) => {
                        trace!(
                            attribute = spec.name,
                            token = token.raw(),
                            "discarding stale fetch failure"
                        );
                        Ok(value)
                    }
                    _ => Err(err),
                }
            }
        }
    }

    /// Install every attribute the reply carries for this fetch opcode
    /// (one geometry round trip fills all geometry slots), then return
    /// the requested attribute's current value.
    fn install_reply(
        &self,
        spec: &'static AttrSpec,
        token: RequestToken,
        reply: &Reply,
    ) -> Result<Value> {
        for sibling in self
            .attrs
            .iter()
            .filter(|s| s.fetch_opcode == spec.fetch_opcode)
        {
            let Some(value) = reply.field(sibling.reply_field) else {
                continue;
            };
            let installed = match self.slots.state(sibling.name) {
                // This flow's own fetch.
                SlotState::Pending(current) if current == token => {
                    self.slots.complete_fetch(sibling.name, token, value.clone())
                }
                // Sibling slot served by the same round trip.
                SlotState::Empty => {
                    let _ = self.slots.install(sibling.name, value.clone());
                    true
                }
                // Another flow owns the fetch, or a push already won.
                _ => false,
            };
            if installed {
                self.publish_change(sibling, value.clone());
            }
        }
        match self.slots.state(spec.name) {
            SlotState::Filled(value) => Ok(value),
            _ => {
                self.slots.fail_fetch(spec.name, token);
                Err(Error::unavailable(format!(
                    "reply carried no value for {}",
                    spec.name
                )))
            }
        }
    }

    /// Wait for another flow's in-flight fetch of this attribute.
    fn wait_slot_settled(&self, spec: &'static AttrSpec) -> Result<Value> {
        let conn = self.connection()?;
        loop {
            conn.pump();
            if self.is_destroyed() {
                return Err(Error::Destroyed);
            }
            match self.slots.state(spec.name) {
                SlotState::Filled(value) => return Ok(value),
                SlotState::Empty => {
                    // The owning fetch failed; this read fails the same
                    // way and the next one retries.
                    return Err(Error::unavailable("concurrent fetch failed"));
                }
                SlotState::Pending(_) => conn.idle()?,
            }
        }
    }

    // ─── Signal-bus participation ────────────────────────────────────────────

    /// Subscribe a handler to signals published by this proxy.
    pub fn subscribe(
        &self,
        kind: KindFilter,
        handler: impl Fn(&crate::bus::Emission<'_>) -> crate::bus::HandlerResult + 'static,
    ) -> Result<SubscriptionId> {
        let conn = self.connection()?;
        let id = self
            .proxy_id()
            .ok_or_else(|| Error::unavailable("proxy is not bound to a handle"))?;
        Ok(conn
            .bus()
            .subscribe_strong(kind, SenderFilter::Handle(id), handler))
    }

    /// Weakly subscribe a shared handler to signals from this proxy.
    pub fn subscribe_weak(&self, kind: KindFilter, handler: &Rc<Handler>) -> Result<SubscriptionId> {
        let conn = self.connection()?;
        let id = self
            .proxy_id()
            .ok_or_else(|| Error::unavailable("proxy is not bound to a handle"))?;
        Ok(conn
            .bus()
            .subscribe_weak(kind, SenderFilter::Handle(id), handler))
    }

    // ─── Destruction ─────────────────────────────────────────────────────────

    /// Locally destroy the resource: issue the destroy request,
    /// transition to Destroyed, and announce. Calling this twice, or
    /// racing it with a server destroy notification, is a no-op the
    /// second time.
    pub fn destroy(&self) -> Result<()> {
        if !self.transition_destroyed() {
            return Ok(());
        }
        let Ok(conn) = self.connection() else {
            return Ok(());
        };
        if let Some(handle) = self.handle.get() {
            // Destruction is locally authoritative: a send failure does
            // not resurrect the proxy.
            if let Err(err) = conn.send_request(opcode::DESTROY_WINDOW, Some(handle), Vec::new()) {
                debug!(handle = %handle, error = %err, "destroy request not sent");
            }
            conn.forget(handle);
            if let Some(id) = self.proxy_id() {
                conn.bus().publish(&DESTROY_NOTIFY, id, &Payload::None);
            }
        }
        Ok(())
    }

    /// Destroy confirmed by the server. No request is sent and no
    /// signal is published here: the raw destroy notification is
    /// republished by the dispatching connection.
    pub(crate) fn destroy_from_server(&self) {
        let _ = self.transition_destroyed();
    }

    /// The single Bound/Unbound → Destroyed transition. Returns whether
    /// this call performed it.
    fn transition_destroyed(&self) -> bool {
        if self.is_destroyed() {
            return false;
        }
        self.lifecycle.set(Lifecycle::Destroyed);
        let cancelled = self.slots.clear_all();
        if !cancelled.is_empty() {
            trace!(
                cancelled = cancelled.len(),
                "destroy cancelled in-flight fetches"
            );
        }
        true
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("class", &self.class.name)
            .field("handle", &self.handle.get())
            .field("lifecycle", &self.lifecycle.get())
            .finish()
    }
}
