//! Model-based property test for cache-slot transitions.
//!
//! # Invariants
//!
//! 1. `begin_fetch` only moves Empty to Pending; Filled and Pending
//!    slots refuse a new fetch.
//! 2. `complete_fetch` installs only while the slot awaits that exact
//!    token; any other reply is discarded without changing the slot.
//! 3. `install` (write or push) always wins, cancelling an in-flight
//!    fetch, and the cancelled token can never install afterwards.
//! 4. `fail_fetch` returns the slot to Empty only for the owning token.
//! 5. `invalidate` clears Filled slots only.
//!
//! Every operation sequence is replayed against a four-state model and
//! the real table must agree after each step.

use proptest::prelude::*;

use tether_core::{RequestToken, Value};
use tether_runtime::{SlotState, SlotTable};

const SLOT: &str = "width";

#[derive(Clone, Debug)]
enum Op {
    Begin(u64),
    Complete(u64, u32),
    Fail(u64),
    Install(u32),
    Invalidate,
    ClearAll,
}

fn op() -> impl Strategy<Value = Op> {
    // Tokens drawn from a tiny range so stale-token collisions happen.
    prop_oneof![
        (0u64..4).prop_map(Op::Begin),
        (0u64..4, 0u32..1000).prop_map(|(t, v)| Op::Complete(t, v)),
        (0u64..4).prop_map(Op::Fail),
        (0u32..1000).prop_map(Op::Install),
        Just(Op::Invalidate),
        Just(Op::ClearAll),
    ]
}

#[derive(Clone, Debug, PartialEq)]
enum Model {
    Empty,
    Pending(u64),
    Filled(u32),
}

impl Model {
    fn as_real(&self) -> SlotState {
        match self {
            Self::Empty => SlotState::Empty,
            Self::Pending(t) => SlotState::Pending(RequestToken::new(*t)),
            Self::Filled(v) => SlotState::Filled(Value::Unsigned(*v)),
        }
    }
}

proptest! {
    #[test]
    fn slot_agrees_with_model(ops in prop::collection::vec(op(), 0..48)) {
        let table = SlotTable::new();
        let mut model = Model::Empty;

        for op in ops {
            match op {
                Op::Begin(t) => {
                    let accepted = table.begin_fetch(SLOT, RequestToken::new(t));
                    let expected = model == Model::Empty;
                    prop_assert_eq!(accepted, expected);
                    if expected {
                        model = Model::Pending(t);
                    }
                }
                Op::Complete(t, v) => {
                    let installed =
                        table.complete_fetch(SLOT, RequestToken::new(t), Value::Unsigned(v));
                    let expected = model == Model::Pending(t);
                    prop_assert_eq!(installed, expected);
                    if expected {
                        model = Model::Filled(v);
                    }
                }
                Op::Fail(t) => {
                    table.fail_fetch(SLOT, RequestToken::new(t));
                    if model == Model::Pending(t) {
                        model = Model::Empty;
                    }
                }
                Op::Install(v) => {
                    let cancelled = table.install(SLOT, Value::Unsigned(v));
                    match model {
                        Model::Pending(t) => {
                            prop_assert_eq!(cancelled, Some(RequestToken::new(t)));
                        }
                        _ => prop_assert_eq!(cancelled, None),
                    }
                    model = Model::Filled(v);
                }
                Op::Invalidate => {
                    let dropped = table.invalidate(SLOT);
                    let expected = matches!(model, Model::Filled(_));
                    prop_assert_eq!(dropped, expected);
                    if expected {
                        model = Model::Empty;
                    }
                }
                Op::ClearAll => {
                    let cancelled = table.clear_all();
                    match model {
                        Model::Pending(t) => {
                            prop_assert_eq!(cancelled, vec![RequestToken::new(t)]);
                        }
                        _ => prop_assert!(cancelled.is_empty()),
                    }
                    model = Model::Empty;
                }
            }
            prop_assert_eq!(table.state(SLOT), model.as_real());
        }
    }
}
