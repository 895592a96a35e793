#![forbid(unsafe_code)]

//! Cache slots and attribute descriptors.
//!
//! A [`SlotTable`] holds one [`SlotState`] per attribute of a proxy.
//! Slots move through a small machine:
//!
//! ```text
//! Empty --read--> Pending --reply--> Filled
//! Pending --error--> Empty            (failed fetch retried next read)
//! Filled --invalidate--> Empty
//! Filled --write--> Filled(new)
//! Empty/Filled/Pending --push--> Filled (push cancels an in-flight fetch)
//! ```
//!
//! # Invariants
//!
//! 1. Pending implies exactly one outstanding request token; a reply
//!    whose token is no longer current is discarded, never installed.
//! 2. A push install while Pending wins: the cancelled token's reply
//!    cannot overwrite the pushed value.
//! 3. A failed fetch leaves Empty, not a poisoned state.

use std::cell::RefCell;

use ahash::AHashMap;
use tracing::trace;

use tether_core::{RequestToken, Value};

/// Freshness state of one attribute's memoized value.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum SlotState {
    /// No value cached; the next read fetches.
    #[default]
    Empty,
    /// A fetch with this token is outstanding.
    Pending(RequestToken),
    /// The memoized value of the last fetch, write, or push.
    Filled(Value),
}

impl SlotState {
    /// Whether no value is cached and no fetch is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Whether a fetch is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The cached value, if filled.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Filled(value) => Some(value),
            _ => None,
        }
    }
}

/// Access capability of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Readable only; writes fail with `ReadOnly`.
    ReadOnly,
    /// Readable and writable.
    ReadWrite,
}

/// Static descriptor of one cached attribute.
///
/// Tables of these are declared per resource class; the proxy resolves
/// reads and writes through them. Two attributes that are alternate
/// encodings of the same logical value share a `canonical` name so that
/// filling either slot announces a single canonical change signal.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    /// Slot name, unique within the table.
    pub name: &'static str,
    /// Alias target for change announcements; `None` announces under
    /// `name` itself.
    pub canonical: Option<&'static str>,
    /// Read/write capability.
    pub access: Access,
    /// Whether explicit invalidation is forbidden.
    pub undeletable: bool,
    /// Opcode of the fetch request.
    pub fetch_opcode: u16,
    /// Opcode of the store request, for writable attributes.
    pub store_opcode: Option<u16>,
    /// Field of the fetch reply carrying this attribute's value.
    pub reply_field: &'static str,
}

impl AttrSpec {
    /// A read-only attribute.
    #[must_use]
    pub const fn read_only(name: &'static str, fetch_opcode: u16, reply_field: &'static str) -> Self {
        Self {
            name,
            canonical: None,
            access: Access::ReadOnly,
            undeletable: false,
            fetch_opcode,
            store_opcode: None,
            reply_field,
        }
    }

    /// A read-write attribute.
    #[must_use]
    pub const fn read_write(
        name: &'static str,
        fetch_opcode: u16,
        store_opcode: u16,
        reply_field: &'static str,
    ) -> Self {
        Self {
            name,
            canonical: None,
            access: Access::ReadWrite,
            undeletable: false,
            fetch_opcode,
            store_opcode: Some(store_opcode),
            reply_field,
        }
    }

    /// Announce changes under `canonical` instead of `name`.
    #[must_use]
    pub const fn aliased(mut self, canonical: &'static str) -> Self {
        self.canonical = Some(canonical);
        self
    }

    /// Forbid explicit invalidation of this slot.
    #[must_use]
    pub const fn pinned(mut self) -> Self {
        self.undeletable = true;
        self
    }

    /// The name change signals are published under.
    #[must_use]
    pub fn canonical_name(&self) -> &'static str {
        self.canonical.unwrap_or(self.name)
    }
}

/// Per-proxy table of named cache slots.
///
/// Absent entries read as [`SlotState::Empty`].
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: RefCell<AHashMap<&'static str, SlotState>>,
}

impl SlotTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a slot.
    #[must_use]
    pub fn state(&self, name: &'static str) -> SlotState {
        self.slots.borrow().get(name).cloned().unwrap_or_default()
    }

    /// Mark a fetch outstanding. Overwrites Empty only; a Filled or
    /// already-Pending slot is left alone and `false` is returned.
    pub fn begin_fetch(&self, name: &'static str, token: RequestToken) -> bool {
        let mut slots = self.slots.borrow_mut();
        let slot = slots.entry(name).or_default();
        if slot.is_empty() {
            trace!(attribute = name, token = token.raw(), "slot empty -> pending");
            *slot = SlotState::Pending(token);
            true
        } else {
            false
        }
    }

    /// Install a fetched value, but only if the slot still awaits this
    /// exact token. Returns `false` when the reply is stale (the slot
    /// was pushed, invalidated, or the proxy destroyed meanwhile).
    pub fn complete_fetch(&self, name: &'static str, token: RequestToken, value: Value) -> bool {
        let mut slots = self.slots.borrow_mut();
        let slot = slots.entry(name).or_default();
        match slot {
            SlotState::Pending(current) if *current == token => {
                trace!(attribute = name, token = token.raw(), "slot pending -> filled");
                *slot = SlotState::Filled(value);
                true
            }
            _ => {
                trace!(
                    attribute = name,
                    token = token.raw(),
                    "discarding stale fetch result"
                );
                false
            }
        }
    }

    /// Return a failed fetch's slot to Empty, if this token still owns
    /// it.
    pub fn fail_fetch(&self, name: &'static str, token: RequestToken) {
        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = slots.get_mut(name)
            && matches!(slot, SlotState::Pending(current) if *current == token)
        {
            trace!(attribute = name, token = token.raw(), "slot pending -> empty (fetch failed)");
            *slot = SlotState::Empty;
        }
    }

    /// Install a value unconditionally (write or push). Returns the
    /// token of a cancelled in-flight fetch, if one was outstanding.
    pub fn install(&self, name: &'static str, value: Value) -> Option<RequestToken> {
        let mut slots = self.slots.borrow_mut();
        let slot = slots.entry(name).or_default();
        let cancelled = match slot {
            SlotState::Pending(token) => Some(*token),
            _ => None,
        };
        trace!(attribute = name, cancelled = cancelled.is_some(), "slot -> filled (install)");
        *slot = SlotState::Filled(value);
        cancelled
    }

    /// Clear a Filled slot. A Pending slot is left alone (the fetch in
    /// flight settles it); Empty is a no-op. Returns whether a value
    /// was dropped.
    pub fn invalidate(&self, name: &'static str) -> bool {
        let mut slots = self.slots.borrow_mut();
        if let Some(slot) = slots.get_mut(name)
            && matches!(slot, SlotState::Filled(_))
        {
            trace!(attribute = name, "slot filled -> empty (invalidated)");
            *slot = SlotState::Empty;
            return true;
        }
        false
    }

    /// Force every slot Empty (destroy path). Returns the tokens of all
    /// cancelled in-flight fetches so their replies can be discarded.
    pub fn clear_all(&self) -> Vec<RequestToken> {
        let mut slots = self.slots.borrow_mut();
        let mut cancelled = Vec::new();
        for slot in slots.values_mut() {
            if let SlotState::Pending(token) = slot {
                cancelled.push(*token);
            }
            *slot = SlotState::Empty;
        }
        cancelled
    }
}
