#![forbid(unsafe_code)]

//! Deterministic collaborators for exercising the runtime without a
//! server: a scripted transport, a sequential handle allocator, and an
//! event loop with a bounded park budget.
//!
//! The transport keeps replies and notifications in one arrival-order
//! queue, so a test can script "push lands before the fetch reply" and
//! the connection observes exactly that interleaving.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ahash::AHashMap;

use tether_core::{
    Error, EventLoop, HandleAllocator, Notification, RemoteHandle, ReplyOutcome, RequestToken,
    Result, Transport, Value,
};

/// One request recorded by the scripted transport.
#[derive(Clone, Debug)]
pub struct SentRequest {
    pub token: RequestToken,
    pub opcode: u16,
    pub target: Option<RemoteHandle>,
    pub fields: Vec<(&'static str, Value)>,
}

#[derive(Debug)]
enum Inbound {
    Reply(RequestToken, ReplyOutcome),
    Notification(Notification),
}

struct Inner {
    next_token: u64,
    connected: bool,
    sent: Vec<SentRequest>,
    scripts: AHashMap<u16, VecDeque<ReplyOutcome>>,
    inbound: VecDeque<Inbound>,
}

/// A transport that answers requests from per-opcode scripts.
///
/// Clone it before handing one copy to the connection; both copies
/// share the same state, so the test keeps scripting and inspecting
/// after the connection takes ownership.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Rc<RefCell<Inner>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                next_token: 0,
                connected: true,
                sent: Vec::new(),
                scripts: AHashMap::new(),
                inbound: VecDeque::new(),
            })),
        }
    }

    /// Queue the outcome the next request with `opcode` receives. The
    /// reply is enqueued at send time, behind anything already inbound.
    pub fn script_reply(&self, opcode: u16, outcome: ReplyOutcome) {
        self.inner
            .borrow_mut()
            .scripts
            .entry(opcode)
            .or_default()
            .push_back(outcome);
    }

    /// Deliver a server push, in arrival order relative to replies.
    pub fn push_notification(&self, notification: Notification) {
        self.inner
            .borrow_mut()
            .inbound
            .push_back(Inbound::Notification(notification));
    }

    /// Deliver a reply for an already-issued token, bypassing scripts.
    pub fn push_reply(&self, token: RequestToken, outcome: ReplyOutcome) {
        self.inner
            .borrow_mut()
            .inbound
            .push_back(Inbound::Reply(token, outcome));
    }

    /// Sever the connection; subsequent sends and waits fail.
    pub fn disconnect(&self) {
        self.inner.borrow_mut().connected = false;
    }

    /// Every request sent so far, oldest first.
    #[must_use]
    pub fn sent_requests(&self) -> Vec<SentRequest> {
        self.inner.borrow().sent.clone()
    }

    /// Number of requests sent so far.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.inner.borrow().sent.len()
    }

    /// Requests sent with `opcode`, oldest first.
    #[must_use]
    pub fn sent_with_opcode(&self, opcode: u16) -> Vec<SentRequest> {
        self.inner
            .borrow()
            .sent
            .iter()
            .filter(|r| r.opcode == opcode)
            .cloned()
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn send_request(
        &mut self,
        opcode: u16,
        target: Option<RemoteHandle>,
        fields: Vec<(&'static str, Value)>,
    ) -> Result<RequestToken> {
        let mut inner = self.inner.borrow_mut();
        if !inner.connected {
            return Err(Error::unavailable("scripted transport disconnected"));
        }
        inner.next_token += 1;
        let token = RequestToken::new(inner.next_token);
        inner.sent.push(SentRequest {
            token,
            opcode,
            target,
            fields,
        });
        if let Some(outcome) = inner
            .scripts
            .get_mut(&opcode)
            .and_then(VecDeque::pop_front)
        {
            inner.inbound.push_back(Inbound::Reply(token, outcome));
        }
        Ok(token)
    }

    fn poll_reply(&mut self) -> Option<(RequestToken, ReplyOutcome)> {
        let mut inner = self.inner.borrow_mut();
        match inner.inbound.front() {
            Some(Inbound::Reply(..)) => match inner.inbound.pop_front() {
                Some(Inbound::Reply(token, outcome)) => Some((token, outcome)),
                _ => None,
            },
            _ => None,
        }
    }

    fn poll_notification(&mut self) -> Option<Notification> {
        let mut inner = self.inner.borrow_mut();
        match inner.inbound.front() {
            Some(Inbound::Notification(_)) => match inner.inbound.pop_front() {
                Some(Inbound::Notification(notification)) => Some(notification),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.borrow().connected
    }
}

/// Hands out handles 1, 2, 3, ...
#[derive(Debug, Default)]
pub struct SequentialAllocator {
    next: u32,
}

impl SequentialAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HandleAllocator for SequentialAllocator {
    fn generate_handle(&mut self) -> RemoteHandle {
        self.next += 1;
        RemoteHandle::new(self.next)
    }
}

/// An event loop that tolerates a bounded number of parks before
/// declaring the wait stuck. Keeps a buggy wait loop from hanging the
/// test binary.
#[derive(Debug)]
pub struct DeadlineLoop {
    remaining: std::cell::Cell<u32>,
}

impl DeadlineLoop {
    #[must_use]
    pub fn new(budget: u32) -> Self {
        Self {
            remaining: std::cell::Cell::new(budget),
        }
    }
}

impl Default for DeadlineLoop {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventLoop for DeadlineLoop {
    fn park(&self) -> Result<()> {
        let remaining = self.remaining.get();
        if remaining == 0 {
            return Err(Error::unavailable("park budget exhausted"));
        }
        self.remaining.set(remaining - 1);
        Ok(())
    }
}
