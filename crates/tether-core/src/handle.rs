#![forbid(unsafe_code)]

//! Remote handles and resource-class descriptors.
//!
//! A [`RemoteHandle`] is the opaque integer the server uses to name a
//! resource. A [`ResourceClass`] is a static descriptor carrying the
//! class name plus its full lineage (self first, then every ancestor),
//! precomputed at declaration so hierarchical sender matching on the
//! signal bus is a slice-containment check rather than any runtime
//! reflection.
//!
//! # Invariants
//!
//! 1. A handle is immutable once assigned and unique per (connection,
//!    class) while the resource is live.
//! 2. `lineage[0]` is always the class's own name and the slice ends at
//!    the hierarchy root.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Opaque integer naming a server-side resource.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RemoteHandle(u32);

impl RemoteHandle {
    /// Wrap a raw id received from the server or generated client-side.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteHandle({:#x})", self.0)
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Static descriptor of a resource class.
///
/// Classes form a single-inheritance hierarchy rooted at [`RESOURCE`].
/// Each descriptor carries its lineage as a precomputed tag slice; two
/// classes compare equal when they have the same name.
#[derive(Debug)]
pub struct ResourceClass {
    /// Class name, unique within the hierarchy.
    pub name: &'static str,
    /// `name` first, then every ancestor name up to the root.
    pub lineage: &'static [&'static str],
}

impl ResourceClass {
    /// Whether `self` is `other` or a descendant of it.
    #[must_use]
    pub fn is_a(&self, other: &ResourceClass) -> bool {
        self.lineage.contains(&other.name)
    }
}

impl PartialEq for ResourceClass {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.name == other.name
    }
}

impl Eq for ResourceClass {}

/// Root of the class hierarchy.
pub static RESOURCE: ResourceClass = ResourceClass {
    name: "resource",
    lineage: &["resource"],
};

/// Anything that can be drawn into.
pub static DRAWABLE: ResourceClass = ResourceClass {
    name: "drawable",
    lineage: &["drawable", "resource"],
};

/// An on-screen (or reparentable) window.
pub static WINDOW: ResourceClass = ResourceClass {
    name: "window",
    lineage: &["window", "drawable", "resource"],
};

/// Off-screen pixel storage.
pub static PIXMAP: ResourceClass = ResourceClass {
    name: "pixmap",
    lineage: &["pixmap", "drawable", "resource"],
};

/// An allocated colormap entry.
pub static COLOR: ResourceClass = ResourceClass {
    name: "color",
    lineage: &["color", "resource"],
};

/// A loaded server-side font.
pub static FONT: ResourceClass = ResourceClass {
    name: "font",
    lineage: &["font", "resource"],
};

/// An interned named constant.
pub static ATOM: ResourceClass = ResourceClass {
    name: "atom",
    lineage: &["atom", "resource"],
};

/// Bus identity of a proxy: its class plus its handle.
#[derive(Clone, Copy, Debug)]
pub struct ProxyId {
    /// The proxy's resource class (used for hierarchical matching).
    pub class: &'static ResourceClass,
    /// The remote handle the proxy represents.
    pub handle: RemoteHandle,
}

impl ProxyId {
    /// Build an id from a class and handle.
    #[must_use]
    pub fn new(class: &'static ResourceClass, handle: RemoteHandle) -> Self {
        Self { class, handle }
    }
}

impl PartialEq for ProxyId {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && self.class == other.class
    }
}

impl Eq for ProxyId {}

impl Hash for ProxyId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.class.name.hash(state);
        self.handle.hash(state);
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class.name, self.handle)
    }
}
