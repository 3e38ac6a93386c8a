// src/concurrency/slot.rs

//! Per-tier semaphore state.
//!
//! Everything in here is synchronous and runs under the tier's mutex; the
//! async side lives in [`manager`](super::manager).

use std::collections::VecDeque;

use tokio::sync::oneshot;

/// What a queued waiter eventually receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant {
    /// A slot was handed over; the waiter now counts as an active holder.
    Slot,
    /// The queue was cancelled; the waiter holds nothing.
    Cancelled,
}

/// A caller suspended in `acquire`.
///
/// `tx` is taken on the first settlement, so a second `settle` is a no-op:
/// the waiter observes exactly one of `Slot` / `Cancelled`, whichever path
/// got the tier lock first.
#[derive(Debug)]
pub(crate) struct QueueEntry {
    id: u64,
    tx: Option<oneshot::Sender<Grant>>,
}

impl QueueEntry {
    /// Deliver `grant` unless already settled.
    ///
    /// Returns `true` only if the waiter is still listening and received it.
    fn settle(&mut self, grant: Grant) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(grant).is_ok(),
            None => false,
        }
    }

    fn is_settled(&self) -> bool {
        self.tx.is_none()
    }
}

/// Result of a single `release` on a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// The slot moved straight to the waiter with this id.
    HandedOff(u64),
    /// No live waiter; the active count went down by one.
    Freed,
    /// Nothing was held; nothing changed.
    Idle,
}

/// Counters and FIFO queue for one tier.
#[derive(Debug)]
pub(crate) struct TierSlot {
    /// Maximum concurrent holders; `0` means unlimited.
    limit: usize,
    active: usize,
    queue: VecDeque<QueueEntry>,
    next_waiter_id: u64,
}

impl TierSlot {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            active: 0,
            queue: VecDeque::new(),
            next_waiter_id: 0,
        }
    }

    pub(crate) fn limit(&self) -> usize {
        self.limit
    }

    pub(crate) fn active(&self) -> usize {
        self.active
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn has_capacity(&self) -> bool {
        self.limit == 0 || self.active < self.limit
    }

    /// Take a slot immediately if one is free and nobody is queued ahead.
    pub(crate) fn try_admit(&mut self) -> bool {
        if self.queue.is_empty() && self.has_capacity() {
            self.active += 1;
            true
        } else {
            false
        }
    }

    /// Append a waiter to the back of the queue.
    pub(crate) fn enqueue(&mut self) -> (u64, oneshot::Receiver<Grant>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        self.queue.push_back(QueueEntry { id, tx: Some(tx) });
        (id, rx)
    }

    /// Give one slot back.
    ///
    /// While the tier is over its limit (after `set_limit` lowered it) the
    /// slot is retired instead of handed off. Otherwise the oldest live
    /// waiter gets it and `active` stays the same.
    pub(crate) fn release(&mut self) -> Release {
        if self.active == 0 {
            return Release::Idle;
        }

        if self.limit != 0 && self.active > self.limit {
            self.active -= 1;
            return Release::Freed;
        }

        while let Some(mut entry) = self.queue.pop_front() {
            if entry.settle(Grant::Slot) {
                return Release::HandedOff(entry.id);
            }
        }

        self.active -= 1;
        Release::Freed
    }

    /// Reject every queued waiter and empty the queue.
    ///
    /// Returns how many waiters were settled by this call.
    pub(crate) fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for mut entry in self.queue.drain(..) {
            if !entry.is_settled() {
                entry.settle(Grant::Cancelled);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Remove a single waiter that gave up before being served.
    pub(crate) fn remove_waiter(&mut self, id: u64) -> bool {
        match self.queue.iter().position(|e| e.id == id) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Change the limit, admitting queued waiters if it grew.
    ///
    /// Returns the number of waiters admitted.
    pub(crate) fn set_limit(&mut self, limit: usize) -> usize {
        self.limit = limit;

        let mut admitted = 0;
        while self.has_capacity() {
            let Some(mut entry) = self.queue.pop_front() else {
                break;
            };
            if entry.settle(Grant::Slot) {
                self.active += 1;
                admitted += 1;
            }
        }
        admitted
    }

    /// Cancel all waiters and forget every holder.
    pub(crate) fn reset(&mut self) -> usize {
        let cancelled = self.cancel_all();
        self.active = 0;
        cancelled
    }
}
