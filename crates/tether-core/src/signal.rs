#![forbid(unsafe_code)]

//! Signal-kind descriptors.
//!
//! Signal kinds use the same precomputed-lineage shape as resource
//! classes: subscribing to an ancestor kind (e.g. [`INPUT`]) matches
//! every descendant kind published later, without runtime reflection.
//!
//! Three families exist:
//!
//! - [`NOTIFICATION`] and children: raw push traffic decoded by the
//!   transport (`RAW_*` kinds plus structural notifications).
//! - [`INPUT`] and children: higher-level events synthesized by the
//!   invalidation coordinator from raw press/release/motion traffic.
//! - [`ATTRIBUTE_CHANGED`]: cache-change announcements, published under
//!   an attribute's canonical name whenever a slot transitions into
//!   Filled.

/// Static descriptor of a signal kind with precomputed lineage.
#[derive(Debug)]
pub struct SignalKind {
    /// Kind name, unique within the hierarchy.
    pub name: &'static str,
    /// `name` first, then every ancestor name up to the root.
    pub lineage: &'static [&'static str],
}

impl SignalKind {
    /// Whether `self` is `other` or a descendant of it.
    #[must_use]
    pub fn is_a(&self, other: &SignalKind) -> bool {
        self.lineage.contains(&other.name)
    }
}

impl PartialEq for SignalKind {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.name == other.name
    }
}

impl Eq for SignalKind {}

/// Root kind; subscribing to it matches every signal.
pub static ANYTHING: SignalKind = SignalKind {
    name: "anything",
    lineage: &["anything"],
};

// ─── Push notifications ──────────────────────────────────────────────────────

/// Root of all push traffic from the server.
pub static NOTIFICATION: SignalKind = SignalKind {
    name: "notification",
    lineage: &["notification", "anything"],
};

/// Geometry of a window changed (position, size, or border).
pub static GEOMETRY_CHANGED: SignalKind = SignalKind {
    name: "geometry-changed",
    lineage: &["geometry-changed", "notification", "anything"],
};

/// A named property of a resource changed server-side.
pub static PROPERTY_CHANGED: SignalKind = SignalKind {
    name: "property-changed",
    lineage: &["property-changed", "notification", "anything"],
};

/// A window was mapped or unmapped.
pub static VISIBILITY_CHANGED: SignalKind = SignalKind {
    name: "visibility-changed",
    lineage: &["visibility-changed", "notification", "anything"],
};

/// A child resource was created under a parent.
pub static CHILD_CREATED: SignalKind = SignalKind {
    name: "child-created",
    lineage: &["child-created", "notification", "anything"],
};

/// The server confirmed destruction of a resource.
pub static DESTROY_NOTIFY: SignalKind = SignalKind {
    name: "destroy-notify",
    lineage: &["destroy-notify", "notification", "anything"],
};

/// Raw keyboard press/release traffic.
pub static RAW_KEY: SignalKind = SignalKind {
    name: "raw-key",
    lineage: &["raw-key", "notification", "anything"],
};

/// Raw pointer-button press/release traffic.
pub static RAW_BUTTON: SignalKind = SignalKind {
    name: "raw-button",
    lineage: &["raw-button", "notification", "anything"],
};

/// Raw pointer-motion traffic.
pub static RAW_MOTION: SignalKind = SignalKind {
    name: "raw-motion",
    lineage: &["raw-motion", "notification", "anything"],
};

/// Raw pointer enter/leave traffic.
pub static RAW_CROSSING: SignalKind = SignalKind {
    name: "raw-crossing",
    lineage: &["raw-crossing", "notification", "anything"],
};

/// Raw focus-change traffic.
pub static RAW_FOCUS: SignalKind = SignalKind {
    name: "raw-focus",
    lineage: &["raw-focus", "notification", "anything"],
};

// ─── Synthesized input events ────────────────────────────────────────────────

/// Root of all synthesized input events.
pub static INPUT: SignalKind = SignalKind {
    name: "input",
    lineage: &["input", "anything"],
};

/// A key went down.
pub static KEY_PRESS: SignalKind = SignalKind {
    name: "key-press",
    lineage: &["key-press", "input", "anything"],
};

/// A key went up.
pub static KEY_RELEASE: SignalKind = SignalKind {
    name: "key-release",
    lineage: &["key-release", "input", "anything"],
};

/// A pointer button went down.
pub static BUTTON_PRESS: SignalKind = SignalKind {
    name: "button-press",
    lineage: &["button-press", "input", "anything"],
};

/// A pointer button went up.
pub static BUTTON_RELEASE: SignalKind = SignalKind {
    name: "button-release",
    lineage: &["button-release", "input", "anything"],
};

/// The pointer moved inside a window.
pub static POINTER_MOTION: SignalKind = SignalKind {
    name: "pointer-motion",
    lineage: &["pointer-motion", "input", "anything"],
};

/// The pointer entered a window.
pub static ENTER: SignalKind = SignalKind {
    name: "enter",
    lineage: &["enter", "input", "anything"],
};

/// The pointer left a window.
pub static LEAVE: SignalKind = SignalKind {
    name: "leave",
    lineage: &["leave", "input", "anything"],
};

/// A window gained input focus.
pub static FOCUS_IN: SignalKind = SignalKind {
    name: "focus-in",
    lineage: &["focus-in", "input", "anything"],
};

/// A window lost input focus.
pub static FOCUS_OUT: SignalKind = SignalKind {
    name: "focus-out",
    lineage: &["focus-out", "input", "anything"],
};

// ─── Cache-change announcements ──────────────────────────────────────────────

/// A cached attribute transitioned into Filled. The payload carries the
/// attribute's canonical name and the new value.
pub static ATTRIBUTE_CHANGED: SignalKind = SignalKind {
    name: "attribute-changed",
    lineage: &["attribute-changed", "anything"],
};
