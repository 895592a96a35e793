#![forbid(unsafe_code)]

//! Invalidation coordinator.
//!
//! A table of [`Binding`]s maps notification kinds to cache effects on
//! the proxy the notification addresses: clear slots, install values
//! carried in the payload (avoiding a refetch), synthesize a derived
//! higher-level event, or destroy the proxy.
//!
//! Handle resolution: each binding names the payload field carrying the
//! affected resource's handle (defaulting to the notification origin)
//! and, for compound notifications, the field naming the secondary
//! resource. Effects run only against the primary, so a parent and
//! child that are both live proxies never double-process one event.
//!
//! Ordering: the dispatching connection applies effects *before*
//! republishing the raw notification, so any handler reading an
//! attribute during dispatch sees the pushed value, never a stale one.

use tether_core::signal::{
    BUTTON_PRESS, BUTTON_RELEASE, DESTROY_NOTIFY, ENTER, FOCUS_IN, FOCUS_OUT, GEOMETRY_CHANGED,
    KEY_PRESS, KEY_RELEASE, LEAVE, POINTER_MOTION, PROPERTY_CHANGED, RAW_BUTTON, RAW_CROSSING,
    RAW_FOCUS, RAW_KEY, RAW_MOTION, VISIBILITY_CHANGED,
};
use tether_core::{Notification, RemoteHandle, SignalKind, Value};
use tracing::trace;

use crate::bus::{InputEvent, Payload};
use crate::proxy::Proxy;

/// What a binding does to the resolved primary proxy.
pub enum Effect {
    /// Force the named slots Empty.
    Clear(&'static [&'static str]),
    /// Install `(attribute, payload field)` pairs from the notification
    /// without a refetch. Fields absent from the payload are skipped.
    Install(&'static [(&'static str, &'static str)]),
    /// Clear the slots mapped from the value of a payload field: the
    /// entry whose key equals the field's text selects which slots to
    /// clear.
    ClearKeyed {
        /// Payload field naming what changed.
        field: &'static str,
        /// `(field value, slots to clear)` pairs.
        map: &'static [(&'static str, &'static [&'static str])],
    },
    /// Build a derived event to republish addressed to the primary.
    Synthesize(fn(&Notification) -> Option<(&'static SignalKind, Payload)>),
    /// The server destroyed the resource.
    Destroy,
}

/// One notification-kind → effect rule.
pub struct Binding {
    kind: &'static SignalKind,
    primary_field: Option<&'static str>,
    secondary_field: Option<&'static str>,
    effect: Effect,
}

impl Binding {
    /// Bind an effect to a notification kind (and its descendants).
    #[must_use]
    pub fn new(kind: &'static SignalKind, effect: Effect) -> Self {
        Self {
            kind,
            primary_field: None,
            secondary_field: None,
            effect,
        }
    }

    /// Resolve the affected proxy from this payload field instead of
    /// the notification origin.
    #[must_use]
    pub fn primary_field(mut self, field: &'static str) -> Self {
        self.primary_field = Some(field);
        self
    }

    /// Name the payload field identifying the secondary resource of a
    /// compound notification (informational; effects never run against
    /// it).
    #[must_use]
    pub fn secondary_field(mut self, field: &'static str) -> Self {
        self.secondary_field = Some(field);
        self
    }

    /// Whether this binding reacts to `kind`.
    #[must_use]
    pub fn matches(&self, kind: &'static SignalKind) -> bool {
        kind.is_a(self.kind)
    }

    /// The handle whose proxy the effect runs against.
    #[must_use]
    pub fn primary_handle(&self, notification: &Notification) -> RemoteHandle {
        self.primary_field
            .and_then(|field| notification.handle_field(field))
            .unwrap_or(notification.origin)
    }

    /// The compound notification's secondary handle, if declared and
    /// present.
    #[must_use]
    pub fn secondary_handle(&self, notification: &Notification) -> Option<RemoteHandle> {
        self.secondary_field
            .and_then(|field| notification.handle_field(field))
    }

    /// Run the effect against the resolved primary proxy. Synthesized
    /// events are appended to `synthesized` for the connection to
    /// publish after the raw notification.
    pub(crate) fn apply(
        &self,
        notification: &Notification,
        proxy: &Proxy,
        synthesized: &mut Vec<(&'static SignalKind, Payload)>,
    ) {
        match &self.effect {
            Effect::Clear(names) => {
                for name in *names {
                    // Undeletable slots stay put; everything else clears.
                    let _ = proxy.invalidate_attr(name);
                }
            }
            Effect::Install(pairs) => {
                for (attr, field) in *pairs {
                    if let Some(value) = notification.field(field) {
                        let _ = proxy.set_from_push(attr, value.clone());
                    }
                }
            }
            Effect::ClearKeyed { field, map } => {
                let Some(key) = notification.field(field).and_then(Value::as_text) else {
                    return;
                };
                for (candidate, names) in *map {
                    if *candidate == key {
                        for name in *names {
                            let _ = proxy.invalidate_attr(name);
                        }
                    }
                }
            }
            Effect::Synthesize(build) => {
                if let Some(event) = build(notification) {
                    synthesized.push(event);
                }
            }
            Effect::Destroy => {
                trace!(origin = %notification.origin, "server destroy");
                proxy.destroy_from_server();
            }
        }
    }
}

/// The binding table a connection dispatches through.
#[derive(Default)]
pub struct Coordinator {
    bindings: Vec<Binding>,
}

impl Coordinator {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding.
    pub fn bind(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    /// Bindings reacting to `kind`, in registration order.
    pub(crate) fn matching(
        &self,
        kind: &'static SignalKind,
    ) -> impl Iterator<Item = &Binding> {
        self.bindings.iter().filter(move |b| b.matches(kind))
    }

    /// The default window rules:
    ///
    /// - geometry pushes install the carried fields directly (no
    ///   refetch);
    /// - a property push clears the name slots it names;
    /// - map/unmap pushes install the `mapped` flag;
    /// - destroy notifications destroy the proxy;
    /// - raw input traffic is synthesized into `INPUT`-family events.
    #[must_use]
    pub fn window_defaults() -> Self {
        let mut table = Self::new();
        table.bind(
            Binding::new(
                &GEOMETRY_CHANGED,
                Effect::Install(&[
                    ("x", "x"),
                    ("y", "y"),
                    ("width", "width"),
                    ("height", "height"),
                    ("border_width", "border_width"),
                ]),
            )
            .primary_field("window")
            .secondary_field("parent"),
        );
        table.bind(
            Binding::new(
                &PROPERTY_CHANGED,
                Effect::ClearKeyed {
                    field: "property",
                    map: &[
                        ("WM_NAME", &["wm_name"]),
                        ("_NET_WM_NAME", &["net_name"]),
                    ],
                },
            )
            .primary_field("window"),
        );
        table.bind(
            Binding::new(
                &VISIBILITY_CHANGED,
                Effect::Install(&[("mapped", "mapped")]),
            )
            .primary_field("window"),
        );
        table.bind(Binding::new(&DESTROY_NOTIFY, Effect::Destroy).primary_field("window"));
        table.bind(Binding::new(&RAW_KEY, Effect::Synthesize(synthesize_key)));
        table.bind(Binding::new(&RAW_BUTTON, Effect::Synthesize(synthesize_button)));
        table.bind(Binding::new(&RAW_MOTION, Effect::Synthesize(synthesize_motion)));
        table.bind(Binding::new(&RAW_CROSSING, Effect::Synthesize(synthesize_crossing)));
        table.bind(Binding::new(&RAW_FOCUS, Effect::Synthesize(synthesize_focus)));
        table
    }
}

fn input_event(notification: &Notification) -> InputEvent {
    let unsigned = |field: &str| {
        notification
            .field(field)
            .and_then(Value::as_unsigned)
            .unwrap_or(0)
    };
    let signed = |field: &str| {
        notification
            .field(field)
            .and_then(Value::as_signed)
            .unwrap_or(0)
    };
    InputEvent {
        detail: unsigned("detail"),
        state: unsigned("state"),
        x: signed("x"),
        y: signed("y"),
    }
}

fn synthesize_key(n: &Notification) -> Option<(&'static SignalKind, Payload)> {
    let pressed = n.field("pressed").and_then(Value::as_boolean)?;
    let kind = if pressed { &KEY_PRESS } else { &KEY_RELEASE };
    Some((kind, Payload::Input(input_event(n))))
}

fn synthesize_button(n: &Notification) -> Option<(&'static SignalKind, Payload)> {
    let pressed = n.field("pressed").and_then(Value::as_boolean)?;
    let kind = if pressed { &BUTTON_PRESS } else { &BUTTON_RELEASE };
    Some((kind, Payload::Input(input_event(n))))
}

fn synthesize_motion(n: &Notification) -> Option<(&'static SignalKind, Payload)> {
    Some((&POINTER_MOTION, Payload::Input(input_event(n))))
}

fn synthesize_crossing(n: &Notification) -> Option<(&'static SignalKind, Payload)> {
    let entered = n.field("entered").and_then(Value::as_boolean)?;
    let kind = if entered { &ENTER } else { &LEAVE };
    Some((kind, Payload::Input(input_event(n))))
}

fn synthesize_focus(n: &Notification) -> Option<(&'static SignalKind, Payload)> {
    let focused = n.field("focused").and_then(Value::as_boolean)?;
    let kind = if focused { &FOCUS_IN } else { &FOCUS_OUT };
    Some((kind, Payload::Input(input_event(n))))
}
