//! Outbound delivery types for Parley.
//!
//! The hub never writes to sockets. Each input it handles produces an
//! [`Outbox`]: lines addressed to sessions, in order, followed by the
//! sessions whose connections should be released once those lines are
//! queued.

use crate::session::SessionId;
use parley_protocol::Reply;
use std::sync::Arc;

/// A line ready for delivery to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Target session.
    pub target: SessionId,
    /// The line, without terminator (shared for broadcast).
    pub line: Arc<str>,
}

impl Delivery {
    /// Create a new delivery.
    #[must_use]
    pub fn new(target: SessionId, line: Arc<str>) -> Self {
        Self { target, line }
    }
}

/// Everything a single hub call wants done.
#[derive(Debug, Default)]
pub struct Outbox {
    deliveries: Vec<Delivery>,
    closed: Vec<SessionId>,
}

impl Outbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw line for one session.
    pub fn send(&mut self, target: SessionId, line: impl Into<Arc<str>>) {
        self.deliveries.push(Delivery::new(target, line.into()));
    }

    /// Queue a reply for one session.
    pub fn send_reply(&mut self, target: SessionId, reply: &Reply) {
        self.send(target, reply.to_string());
    }

    /// Queue the same reply for every target, rendered once.
    pub fn broadcast<I>(&mut self, targets: I, reply: &Reply)
    where
        I: IntoIterator<Item = SessionId>,
    {
        let line: Arc<str> = reply.to_string().into();
        self.deliveries.extend(
            targets
                .into_iter()
                .map(|target| Delivery::new(target, Arc::clone(&line))),
        );
    }

    /// Ask for a session's connection to be released after delivery.
    pub fn close(&mut self, target: SessionId) {
        if !self.closed.contains(&target) {
            self.closed.push(target);
        }
    }

    /// Append another outbox, keeping order.
    pub fn merge(&mut self, other: Outbox) {
        self.deliveries.extend(other.deliveries);
        for id in other.closed {
            self.close(id);
        }
    }

    /// Queued deliveries, in order.
    #[must_use]
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Sessions to release.
    #[must_use]
    pub fn closed(&self) -> &[SessionId] {
        &self.closed
    }

    /// Lines queued for one session, in order.
    #[must_use]
    pub fn lines_for(&self, target: SessionId) -> Vec<&str> {
        self.deliveries
            .iter()
            .filter(|d| d.target == target)
            .map(|d| &*d.line)
            .collect()
    }

    /// Check if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty() && self.closed.is_empty()
    }

    /// Split into deliveries and closures.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Delivery>, Vec<SessionId>) {
        (self.deliveries, self.closed)
    }
}
