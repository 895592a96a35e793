#![forbid(unsafe_code)]

//! Typed publish/subscribe signal bus.
//!
//! Delivers protocol notifications and user-level events to subscribers
//! matching on a (signal-kind, sender) pair. Matching supports exact,
//! wildcard, and hierarchical filters on both axes: a subscription to an
//! ancestor kind sees every descendant kind, and a subscription to an
//! ancestor resource class sees every descendant sender.
//!
//! # Invariants
//!
//! 1. Each handler is invoked at most once per publish, even when it
//!    matches through several subscriptions (dedup by handler identity).
//! 2. Matching handlers run in registration order.
//! 3. Dispatch is synchronous and reentrant: a handler may publish,
//!    subscribe, or unsubscribe. Subscriptions added mid-dispatch are
//!    not visited by the in-flight publish; removals mid-dispatch do not
//!    disturb the iteration (snapshot-on-publish).
//! 4. A handler returning `Err` is logged and does not stop delivery to
//!    the remaining handlers.
//! 5. A dead weakly-held handler is skipped and lazily pruned.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::{trace, warn};

use tether_core::{Notification, ProxyId, ResourceClass, SignalKind, Value};

/// Failure reported by a signal handler. Isolated per spec: delivery to
/// the remaining handlers continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signal handler failed: {0}")]
pub struct HandlerError(pub String);

/// Outcome of one handler invocation.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// A boxed-in-`Rc` signal handler. Subscribers hold these; weak
/// subscriptions keep only a `Weak` to the allocation, so dropping the
/// last strong `Rc` retires the subscription.
pub type Handler = dyn Fn(&Emission<'_>) -> HandlerResult;

/// Higher-level input event synthesized from raw press/release traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputEvent {
    /// Keycode or button number.
    pub detail: u32,
    /// Modifier state at the time of the event.
    pub state: u32,
    /// Pointer x, relative to the addressed window.
    pub x: i32,
    /// Pointer y, relative to the addressed window.
    pub y: i32,
}

/// What a publish carries.
#[derive(Clone, Debug)]
pub enum Payload {
    /// No payload (synthetic/user-level events).
    None,
    /// A raw push notification being republished.
    Notification(Notification),
    /// A cached attribute transitioned into Filled.
    Attribute {
        /// Canonical attribute name.
        name: &'static str,
        /// The new value.
        value: Value,
    },
    /// A synthesized input event.
    Input(InputEvent),
}

/// One delivered signal: kind, sender, and payload.
#[derive(Debug)]
pub struct Emission<'a> {
    /// The published kind.
    pub kind: &'static SignalKind,
    /// The publishing proxy.
    pub sender: ProxyId,
    /// The payload, borrowed for the duration of dispatch.
    pub payload: &'a Payload,
}

/// Filter on the signal-kind axis.
#[derive(Clone, Copy, Debug)]
pub enum KindFilter {
    /// Match every kind.
    Any,
    /// Match this kind and all of its descendants.
    Is(&'static SignalKind),
}

impl KindFilter {
    fn matches(self, kind: &'static SignalKind) -> bool {
        match self {
            Self::Any => true,
            Self::Is(filter) => kind.is_a(filter),
        }
    }
}

/// Filter on the sender axis.
#[derive(Clone, Copy, Debug)]
pub enum SenderFilter {
    /// Match every sender.
    Any,
    /// Match exactly this proxy.
    Handle(ProxyId),
    /// Match any sender whose class is this class or a descendant.
    Class(&'static ResourceClass),
}

impl SenderFilter {
    fn matches(self, sender: ProxyId) -> bool {
        match self {
            Self::Any => true,
            Self::Handle(id) => id == sender,
            Self::Class(class) => sender.class.is_a(class),
        }
    }
}

/// Identifies a registered subscription for later removal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SubscriptionId(u64);

enum HandlerRef {
    Strong(Rc<Handler>),
    Weak(Weak<Handler>),
}

impl HandlerRef {
    fn upgrade(&self) -> Option<Rc<Handler>> {
        match self {
            Self::Strong(rc) => Some(Rc::clone(rc)),
            Self::Weak(weak) => weak.upgrade(),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Self::Strong(_) => true,
            Self::Weak(weak) => weak.strong_count() > 0,
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    kind: KindFilter,
    sender: SenderFilter,
    handler: HandlerRef,
}

#[derive(Default)]
struct BusInner {
    subs: Vec<Subscription>,
    next_id: u64,
}

/// The signal bus. Single-threaded; mutation during dispatch is allowed
/// (see module invariants) but cross-thread use is not supported.
#[derive(Default)]
pub struct SignalBus {
    inner: RefCell<BusInner>,
}

impl SignalBus {
    /// An empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler the bus keeps alive until unsubscribed.
    pub fn subscribe_strong(
        &self,
        kind: KindFilter,
        sender: SenderFilter,
        handler: impl Fn(&Emission<'_>) -> HandlerResult + 'static,
    ) -> SubscriptionId {
        self.register(kind, sender, HandlerRef::Strong(Rc::new(handler)))
    }

    /// Register a handler held weakly: the subscription retires when the
    /// caller drops its last strong `Rc`.
    pub fn subscribe_weak(
        &self,
        kind: KindFilter,
        sender: SenderFilter,
        handler: &Rc<Handler>,
    ) -> SubscriptionId {
        self.register(kind, sender, HandlerRef::Weak(Rc::downgrade(handler)))
    }

    fn register(
        &self,
        kind: KindFilter,
        sender: SenderFilter,
        handler: HandlerRef,
    ) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subs.push(Subscription {
            id,
            kind,
            sender,
            handler,
        });
        id
    }

    /// Remove a subscription. Returns whether it was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.subs.len();
        inner.subs.retain(|sub| sub.id != id);
        inner.subs.len() != before
    }

    /// Number of registered subscriptions, counting dead weak entries
    /// not yet pruned.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.borrow().subs.len()
    }

    /// Publish a signal to every matching live subscription.
    ///
    /// Returns each invoked handler's outcome, in dispatch order.
    pub fn publish(
        &self,
        kind: &'static SignalKind,
        sender: ProxyId,
        payload: &Payload,
    ) -> Vec<HandlerResult> {
        // Snapshot matching handlers before running any of them, so a
        // reentrant subscribe/unsubscribe cannot disturb this dispatch.
        let mut matched: Vec<Rc<Handler>> = Vec::new();
        let mut saw_dead = false;
        {
            let inner = self.inner.borrow();
            for sub in &inner.subs {
                if !sub.kind.matches(kind) || !sub.sender.matches(sender) {
                    continue;
                }
                match sub.handler.upgrade() {
                    Some(handler) => {
                        if !matched.iter().any(|seen| Rc::ptr_eq(seen, &handler)) {
                            matched.push(handler);
                        }
                    }
                    None => saw_dead = true,
                }
            }
        }
        if saw_dead {
            self.prune();
        }

        trace!(
            signal = kind.name,
            sender = %sender,
            handlers = matched.len(),
            "publishing signal"
        );

        let emission = Emission {
            kind,
            sender,
            payload,
        };
        let mut results = Vec::with_capacity(matched.len());
        for handler in matched {
            let result = handler(&emission);
            if let Err(ref err) = result {
                warn!(signal = kind.name, sender = %sender, error = %err, "signal handler failed");
            }
            results.push(result);
        }
        results
    }

    /// Drop subscriptions whose weak handler has died.
    pub fn prune(&self) {
        self.inner
            .borrow_mut()
            .subs
            .retain(|sub| sub.handler.is_live());
    }
}

impl std::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalBus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
