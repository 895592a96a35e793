//! End-to-end scenarios through a full connection rig: lazy fetches,
//! sibling fills, push-vs-fetch races, pooling, destruction, name
//! aliasing, and input synthesis, all against a scripted transport.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tether_core::signal::{
    ATTRIBUTE_CHANGED, DESTROY_NOTIFY, GEOMETRY_CHANGED, KEY_PRESS, PROPERTY_CHANGED, RAW_KEY,
};
use tether_core::{opcode, Error, Notification, RemoteHandle, Reply, Value};
use tether_runtime::testkit::{DeadlineLoop, ScriptedTransport, SequentialAllocator};
use tether_runtime::{Connection, Handler, KindFilter, Payload};

fn rig() -> (Rc<Connection>, ScriptedTransport) {
    let transport = ScriptedTransport::new();
    let conn = Connection::new(
        Box::new(transport.clone()),
        Box::new(SequentialAllocator::new()),
        Box::new(DeadlineLoop::default()),
    );
    (conn, transport)
}

fn geometry_reply() -> Reply {
    Reply::new()
        .with_field("x", 5i32)
        .with_field("y", 10i32)
        .with_field("width", 100u32)
        .with_field("height", 80u32)
        .with_field("border_width", 2u32)
}

#[test]
fn lazy_fetch_fills_siblings_and_caches() {
    let (conn, transport) = rig();
    transport.script_reply(opcode::GET_GEOMETRY, Ok(geometry_reply()));

    let window = conn.window(RemoteHandle::new(7));
    assert_eq!(window.read_attr("width").unwrap(), Value::Unsigned(100));
    assert_eq!(transport.sent_with_opcode(opcode::GET_GEOMETRY).len(), 1);

    // The same round trip filled every geometry slot.
    assert_eq!(window.read_attr("height").unwrap(), Value::Unsigned(80));
    assert_eq!(window.read_attr("x").unwrap(), Value::Signed(5));
    assert_eq!(window.read_attr("width").unwrap(), Value::Unsigned(100));
    assert_eq!(transport.sent_with_opcode(opcode::GET_GEOMETRY).len(), 1);
}

#[test]
fn fill_publishes_attribute_changed() {
    let (conn, transport) = rig();
    transport.script_reply(opcode::GET_GEOMETRY, Ok(geometry_reply()));

    let window = conn.window(RemoteHandle::new(7));
    let seen: Rc<RefCell<Vec<(&'static str, Value)>>> = Rc::new(RefCell::new(Vec::new()));
    let seen_in = Rc::clone(&seen);
    window
        .subscribe(KindFilter::Is(&ATTRIBUTE_CHANGED), move |emission| {
            if let Payload::Attribute { name, value } = emission.payload {
                seen_in.borrow_mut().push((*name, value.clone()));
            }
            Ok(())
        })
        .unwrap();

    window.read_attr("width").unwrap();
    let seen = seen.borrow();
    assert!(seen.contains(&("width", Value::Unsigned(100))));
    assert!(seen.contains(&("height", Value::Unsigned(80))));
}

#[test]
fn push_wins_over_inflight_fetch() {
    let (conn, transport) = rig();
    let window = conn.window(RemoteHandle::new(7));

    // The push is inbound ahead of the fetch reply, so the connection
    // processes it while the fetch is outstanding.
    transport.push_notification(
        Notification::new(&GEOMETRY_CHANGED, RemoteHandle::new(7))
            .with_field("window", RemoteHandle::new(7))
            .with_field("width", 150u32),
    );
    transport.script_reply(opcode::GET_GEOMETRY, Ok(geometry_reply()));

    let seen_width = Rc::new(Cell::new(0u32));
    let seen_in = Rc::clone(&seen_width);
    let window_in = Rc::clone(&window);
    window
        .subscribe(KindFilter::Is(&GEOMETRY_CHANGED), move |_| {
            // The cache is updated before the signal, so a handler
            // reading the attribute sees the pushed value.
            if let Ok(Value::Unsigned(w)) = window_in.read_attr("width") {
                seen_in.set(w);
            }
            Ok(())
        })
        .unwrap();

    // The stale reply (width 100) must not overwrite the push.
    assert_eq!(window.read_attr("width").unwrap(), Value::Unsigned(150));
    assert_eq!(seen_width.get(), 150);
}

#[test]
fn push_survives_stale_fetch_failure() {
    let (conn, transport) = rig();
    let window = conn.window(RemoteHandle::new(7));

    // The push lands while the fetch is outstanding; the fetch then
    // settles with a server error. The failure is as stale as a stale
    // reply would be, so the read returns the pushed value.
    transport.push_notification(
        Notification::new(&GEOMETRY_CHANGED, RemoteHandle::new(7))
            .with_field("window", RemoteHandle::new(7))
            .with_field("width", 150u32),
    );
    transport.script_reply(opcode::GET_GEOMETRY, Err((3, "boom".to_owned())));

    assert_eq!(window.read_attr("width").unwrap(), Value::Unsigned(150));
}

#[test]
fn write_is_immediately_readable_without_fetch() {
    let (conn, transport) = rig();
    let window = conn.window(RemoteHandle::new(7));

    window.write_attr("width", 200u32).unwrap();
    assert_eq!(transport.sent_with_opcode(opcode::CONFIGURE_WINDOW).len(), 1);
    assert_eq!(window.read_attr("width").unwrap(), Value::Unsigned(200));
    assert!(transport.sent_with_opcode(opcode::GET_GEOMETRY).is_empty());
}

#[test]
fn write_read_only_attribute_fails() {
    let (conn, _transport) = rig();
    let window = conn.window(RemoteHandle::new(7));
    assert!(matches!(
        window.write_attr("mapped", true),
        Err(Error::ReadOnly { attribute: "mapped" })
    ));
}

#[test]
fn pool_returns_one_instance_and_reclaims() {
    let (conn, transport) = rig();
    transport.script_reply(opcode::GET_GEOMETRY, Ok(geometry_reply()));
    transport.script_reply(opcode::GET_GEOMETRY, Ok(geometry_reply()));

    let a = conn.window(RemoteHandle::new(7));
    let b = conn.window(RemoteHandle::new(7));
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(conn.window_count(), 1);

    a.read_attr("width").unwrap();
    drop(a);
    drop(b);
    assert_eq!(conn.window_count(), 0);

    // A fresh proxy starts with empty caches and fetches again.
    let rebuilt = conn.window(RemoteHandle::new(7));
    rebuilt.read_attr("width").unwrap();
    assert_eq!(transport.sent_with_opcode(opcode::GET_GEOMETRY).len(), 2);
}

#[test]
fn local_destroy_is_idempotent() {
    let (conn, transport) = rig();
    let window = conn.window(RemoteHandle::new(7));

    window.destroy().unwrap();
    window.destroy().unwrap();
    assert_eq!(transport.sent_with_opcode(opcode::DESTROY_WINDOW).len(), 1);
    assert!(matches!(window.read_attr("width"), Err(Error::Destroyed)));
    assert_eq!(conn.window_count(), 0);
}

#[test]
fn server_destroy_races_local_destroy() {
    let (conn, transport) = rig();
    let window = conn.window(RemoteHandle::new(7));

    let destroyed_seen = Rc::new(Cell::new(false));
    let seen_in = Rc::clone(&destroyed_seen);
    window
        .subscribe(KindFilter::Is(&DESTROY_NOTIFY), move |_| {
            seen_in.set(true);
            Ok(())
        })
        .unwrap();

    transport.push_notification(Notification::new(&DESTROY_NOTIFY, RemoteHandle::new(7)));
    conn.pump();
    assert!(window.is_destroyed());
    assert!(destroyed_seen.get());

    // The already-destroyed proxy sends no destroy request of its own.
    window.destroy().unwrap();
    assert!(transport.sent_with_opcode(opcode::DESTROY_WINDOW).is_empty());
    assert_eq!(conn.window_count(), 0);
}

#[test]
fn name_attributes_announce_under_canonical_alias() {
    let (conn, _transport) = rig();
    let window = conn.window(RemoteHandle::new(7));

    let names: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let names_in = Rc::clone(&names);
    window
        .subscribe(KindFilter::Is(&ATTRIBUTE_CHANGED), move |emission| {
            if let Payload::Attribute { name, .. } = emission.payload {
                names_in.borrow_mut().push(*name);
            }
            Ok(())
        })
        .unwrap();

    window.write_attr("wm_name", "legacy title").unwrap();
    window.write_attr("net_name", "modern title").unwrap();
    // Both encodings announce under the one canonical name.
    assert_eq!(*names.borrow(), vec!["name", "name"]);
}

#[test]
fn property_push_invalidates_only_the_named_slot() {
    let (conn, transport) = rig();
    transport.script_reply(
        opcode::GET_PROPERTY,
        Ok(Reply::new().with_field("net_name", "first title")),
    );
    transport.script_reply(
        opcode::GET_PROPERTY,
        Ok(Reply::new().with_field("net_name", "second title")),
    );

    let window = conn.window(RemoteHandle::new(7));
    assert_eq!(
        window.read_attr("net_name").unwrap(),
        Value::Text("first title".to_owned())
    );

    transport.push_notification(
        Notification::new(&PROPERTY_CHANGED, RemoteHandle::new(7))
            .with_field("window", RemoteHandle::new(7))
            .with_field("property", "_NET_WM_NAME"),
    );
    conn.pump();

    // The cleared slot refetches; nothing else was touched.
    assert_eq!(
        window.read_attr("net_name").unwrap(),
        Value::Text("second title".to_owned())
    );
    assert_eq!(transport.sent_with_opcode(opcode::GET_PROPERTY).len(), 2);
}

#[test]
fn display_name_prefers_modern_encoding() {
    let (conn, transport) = rig();
    transport.script_reply(
        opcode::GET_PROPERTY,
        Ok(Reply::new().with_field("net_name", "Modern")),
    );
    let window = conn.window(RemoteHandle::new(7));
    assert_eq!(window.display_name().unwrap(), "Modern");
}

#[test]
fn display_name_falls_back_to_legacy() {
    let (conn, transport) = rig();
    transport.script_reply(
        opcode::GET_PROPERTY,
        Ok(Reply::new().with_field("net_name", "")),
    );
    transport.script_reply(
        opcode::GET_PROPERTY,
        Ok(Reply::new().with_field("wm_name", "Legacy")),
    );
    let window = conn.window(RemoteHandle::new(7));
    assert_eq!(window.display_name().unwrap(), "Legacy");
}

#[test]
fn raw_input_synthesizes_user_level_event() {
    let (conn, transport) = rig();
    let window = conn.window(RemoteHandle::new(7));

    let seen_detail = Rc::new(Cell::new(0u32));
    let seen_in = Rc::clone(&seen_detail);
    window
        .subscribe(KindFilter::Is(&KEY_PRESS), move |emission| {
            if let Payload::Input(event) = emission.payload {
                seen_in.set(event.detail);
            }
            Ok(())
        })
        .unwrap();

    transport.push_notification(
        Notification::new(&RAW_KEY, RemoteHandle::new(7))
            .with_field("pressed", true)
            .with_field("detail", 38u32)
            .with_field("state", 0u32),
    );
    conn.pump();
    assert_eq!(seen_detail.get(), 38);
}

#[test]
fn compound_notification_is_delivered_to_the_primary() {
    let (conn, transport) = rig();
    let parent = conn.window(RemoteHandle::new(1));
    let child = conn.window(RemoteHandle::new(7));

    let child_hits = Rc::new(Cell::new(0));
    let child_in = Rc::clone(&child_hits);
    child
        .subscribe(KindFilter::Is(&GEOMETRY_CHANGED), move |_| {
            child_in.set(child_in.get() + 1);
            Ok(())
        })
        .unwrap();
    let parent_hits = Rc::new(Cell::new(0));
    let parent_in = Rc::clone(&parent_hits);
    parent
        .subscribe(KindFilter::Is(&GEOMETRY_CHANGED), move |_| {
            parent_in.set(parent_in.get() + 1);
            Ok(())
        })
        .unwrap();

    // Addressed to the parent, but the primary field names the child.
    transport.push_notification(
        Notification::new(&GEOMETRY_CHANGED, RemoteHandle::new(1))
            .with_field("window", RemoteHandle::new(7))
            .with_field("parent", RemoteHandle::new(1))
            .with_field("width", 150u32),
    );
    conn.pump();

    assert_eq!(child_hits.get(), 1);
    assert_eq!(parent_hits.get(), 0);
    assert_eq!(child.read_attr("width").unwrap(), Value::Unsigned(150));
    assert!(transport.sent_requests().is_empty());
}

#[test]
fn unpooled_addressee_does_not_drop_the_republish() {
    let (conn, transport) = rig();
    let child = conn.window(RemoteHandle::new(7));

    let hits = Rc::new(Cell::new(0));
    let hits_in = Rc::clone(&hits);
    child
        .subscribe(KindFilter::Is(&GEOMETRY_CHANGED), move |_| {
            hits_in.set(hits_in.get() + 1);
            Ok(())
        })
        .unwrap();

    // The addressee (99) was never pooled; the primary (7) still hears.
    transport.push_notification(
        Notification::new(&GEOMETRY_CHANGED, RemoteHandle::new(99))
            .with_field("window", RemoteHandle::new(7))
            .with_field("width", 150u32),
    );
    conn.pump();

    assert_eq!(hits.get(), 1);
    assert_eq!(child.read_attr("width").unwrap(), Value::Unsigned(150));
}

#[test]
fn pinned_attribute_cannot_be_invalidated() {
    let (conn, _transport) = rig();
    let window = conn.window(RemoteHandle::new(7));
    assert!(matches!(
        window.invalidate_attr("mapped"),
        Err(Error::Undeletable {
            attribute: "mapped"
        })
    ));
    // Ordinary slots still clear.
    window.write_attr("width", 10u32).unwrap();
    window.invalidate_attr("width").unwrap();
}

#[test]
fn weak_subscription_retires_with_its_handler() {
    let (conn, transport) = rig();
    let window = conn.window(RemoteHandle::new(7));

    let hits = Rc::new(Cell::new(0));
    let hits_in = Rc::clone(&hits);
    let handler: Rc<Handler> = Rc::new(move |_| {
        hits_in.set(hits_in.get() + 1);
        Ok(())
    });
    window
        .subscribe_weak(KindFilter::Is(&GEOMETRY_CHANGED), &handler)
        .unwrap();

    let resize = |width: u32| {
        Notification::new(&GEOMETRY_CHANGED, RemoteHandle::new(7))
            .with_field("window", RemoteHandle::new(7))
            .with_field("width", width)
    };
    transport.push_notification(resize(150));
    conn.pump();
    assert_eq!(hits.get(), 1);

    drop(handler);
    transport.push_notification(resize(160));
    conn.pump();
    // The dropped observer's subscription retired with it.
    assert_eq!(hits.get(), 1);
}

#[test]
fn notification_for_unknown_handle_is_dropped() {
    let (conn, transport) = rig();
    transport.push_notification(
        Notification::new(&GEOMETRY_CHANGED, RemoteHandle::new(99)).with_field("width", 1u32),
    );
    // Nothing pooled under 99; dispatch is a quiet no-op.
    conn.pump();
    assert_eq!(conn.window_count(), 0);
}

#[test]
fn create_window_prefills_requested_geometry() {
    let (conn, transport) = rig();
    let window = conn
        .create_window(RemoteHandle::new(1), 10, 20, 300, 200)
        .unwrap();

    assert_eq!(transport.sent_with_opcode(opcode::CREATE_WINDOW).len(), 1);
    assert_eq!(window.read_attr("width").unwrap(), Value::Unsigned(300));
    assert_eq!(window.read_attr("x").unwrap(), Value::Signed(10));
    // The client is the source of the requested geometry.
    assert!(transport.sent_with_opcode(opcode::GET_GEOMETRY).is_empty());
    assert_eq!(conn.window_count(), 1);
}

#[test]
fn protocol_error_reply_surfaces_and_allows_retry() {
    let (conn, transport) = rig();
    transport.script_reply(opcode::GET_GEOMETRY, Err((3, "bad window".to_owned())));
    transport.script_reply(opcode::GET_GEOMETRY, Ok(geometry_reply()));

    let window = conn.window(RemoteHandle::new(7));
    match window.read_attr("width") {
        Err(Error::Protocol { code, detail }) => {
            assert_eq!(code, 3);
            assert_eq!(detail, "bad window");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
    // The failed slot is Empty again, not poisoned.
    assert_eq!(window.read_attr("width").unwrap(), Value::Unsigned(100));
}

#[test]
fn disconnect_fails_reads_retryably() {
    let (conn, transport) = rig();
    let window = conn.window(RemoteHandle::new(7));
    transport.disconnect();
    match window.read_attr("width") {
        Err(err) => assert!(err.is_retryable()),
        Ok(value) => panic!("read succeeded over dead transport: {value:?}"),
    }
}
