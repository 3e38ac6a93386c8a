// src/concurrency/manager.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::concurrency::slot::{Grant, Release, TierSlot};
use crate::config::model::ConcurrencyLimits;
use crate::errors::{Result, WaveschedError};
use crate::types::Tier;

/// Keyed semaphore with FIFO handoff.
///
/// Each tier has its own limit, active count and waiter queue behind its
/// own mutex; the outer map lock is only held long enough to look a tier
/// up, so work on one tier never contends with another.
///
/// Construct one per scheduler and share it by `Arc`; call [`clear`] at
/// shutdown so that no waiter is left suspended.
///
/// [`clear`]: ConcurrencyManager::clear
#[derive(Debug)]
pub struct ConcurrencyManager {
    /// Limit for tiers without an explicit entry in `limits`.
    default_limit: usize,
    /// Configured per-tier limits.
    limits: HashMap<Tier, usize>,
    /// Live per-tier state, created on first use.
    tiers: RwLock<HashMap<Tier, Arc<Mutex<TierSlot>>>>,
}

impl Default for ConcurrencyManager {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ConcurrencyManager {
    /// Create a manager whose unknown tiers use `default_limit`
    /// (`0` = unlimited).
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit,
            limits: HashMap::new(),
            tiers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a manager from validated configuration.
    pub fn from_limits(limits: &ConcurrencyLimits) -> Self {
        let mut manager = Self::new(limits.default_limit);
        for (tier, limit) in &limits.tiers {
            manager.limits.insert(tier.clone(), *limit);
        }
        manager
    }

    /// Builder-style helper to configure a tier limit before first use.
    pub fn with_tier_limit(mut self, tier: impl Into<Tier>, limit: usize) -> Self {
        self.limits.insert(tier.into(), limit);
        self
    }

    /// Wait for a slot on `tier`.
    ///
    /// Resolves immediately while the tier has free capacity and nobody is
    /// queued; otherwise the caller joins the back of the tier's queue and
    /// resolves when a [`release`](Self::release) hands it a slot.
    ///
    /// The only failure is [`WaveschedError::QueueCancelled`], produced by
    /// [`cancel_waiters`](Self::cancel_waiters) or [`clear`](Self::clear).
    ///
    /// Dropping the returned future while it is queued (for example because
    /// the caller's own timeout fired) withdraws it from the queue. If a slot
    /// had already been handed to it, that slot is released again.
    pub async fn acquire(&self, tier: &str) -> Result<()> {
        let slot = self.slot(tier);

        let (waiter_id, rx) = {
            let mut state = lock(&slot);
            if state.try_admit() {
                debug!(
                    tier = %tier,
                    active = state.active(),
                    limit = state.limit(),
                    "slot granted immediately"
                );
                return Ok(());
            }
            let (id, rx) = state.enqueue();
            debug!(
                tier = %tier,
                waiter = id,
                queued = state.queue_len(),
                limit = state.limit(),
                "tier at capacity; queued acquire"
            );
            (id, rx)
        };

        let mut pending = PendingAcquire {
            tier: tier.to_string(),
            slot,
            waiter_id,
            rx,
            armed: true,
        };

        let grant = (&mut pending.rx).await;
        pending.armed = false;

        match grant {
            Ok(Grant::Slot) => {
                debug!(tier = %tier, waiter = waiter_id, "slot handed off to queued acquire");
                Ok(())
            }
            Ok(Grant::Cancelled) | Err(_) => {
                warn!(tier = %tier, waiter = waiter_id, "queued acquire cancelled");
                Err(WaveschedError::queue_cancelled(tier))
            }
        }
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self, tier: &str) -> bool {
        let slot = self.slot(tier);
        let admitted = lock(&slot).try_admit();
        debug!(tier = %tier, admitted, "try_acquire");
        admitted
    }

    /// Give a slot back to `tier`.
    ///
    /// If anyone is queued, the slot goes straight to the longest-waiting
    /// caller. Releasing a tier with no active holders is a no-op.
    pub fn release(&self, tier: &str) {
        let Some(slot) = self.existing_slot(tier) else {
            debug!(tier = %tier, "release on unused tier; ignoring");
            return;
        };

        let mut state = lock(&slot);
        match state.release() {
            Release::HandedOff(waiter) => {
                debug!(tier = %tier, waiter, active = state.active(), "slot handed off");
            }
            Release::Freed => {
                debug!(tier = %tier, active = state.active(), "slot freed");
            }
            Release::Idle => {
                debug!(tier = %tier, "release with no active holders; ignoring");
            }
        }
    }

    /// Reject every queued acquire on `tier` and empty its queue.
    ///
    /// Active holders are unaffected. Returns the number of rejected waiters.
    pub fn cancel_waiters(&self, tier: &str) -> usize {
        let Some(slot) = self.existing_slot(tier) else {
            return 0;
        };

        let cancelled = lock(&slot).cancel_all();
        if cancelled > 0 {
            warn!(tier = %tier, cancelled, "cancelled queued acquires");
        }
        cancelled
    }

    /// Cancel every queue and zero every active count.
    pub fn clear(&self) {
        let slots: Vec<(Tier, Arc<Mutex<TierSlot>>)> = read(&self.tiers)
            .iter()
            .map(|(tier, slot)| (tier.clone(), Arc::clone(slot)))
            .collect();

        let mut cancelled = 0;
        for (tier, slot) in slots {
            let n = lock(&slot).reset();
            if n > 0 {
                debug!(tier = %tier, cancelled = n, "cancelled waiters during clear");
            }
            cancelled += n;
        }

        info!(cancelled, "concurrency manager cleared");
    }

    /// Change the limit of `tier` at runtime.
    ///
    /// Raising the limit admits queued callers immediately, in FIFO order.
    /// Lowering it never evicts holders; releases retire slots until the
    /// active count is back under the new limit.
    pub fn set_limit(&self, tier: &str, limit: usize) {
        let slot = self.slot(tier);
        let admitted = lock(&slot).set_limit(limit);
        info!(tier = %tier, limit, admitted, "tier limit updated");
    }

    /// Current limit of `tier` (`0` = unlimited).
    pub fn limit(&self, tier: &str) -> usize {
        match self.existing_slot(tier) {
            Some(slot) => lock(&slot).limit(),
            None => self.configured_limit(tier),
        }
    }

    /// Number of active holders on `tier`.
    pub fn count(&self, tier: &str) -> usize {
        self.existing_slot(tier)
            .map(|slot| lock(&slot).active())
            .unwrap_or(0)
    }

    /// Number of callers queued on `tier`.
    pub fn queue_length(&self, tier: &str) -> usize {
        self.existing_slot(tier)
            .map(|slot| lock(&slot).queue_len())
            .unwrap_or(0)
    }

    fn configured_limit(&self, tier: &str) -> usize {
        self.limits.get(tier).copied().unwrap_or(self.default_limit)
    }

    fn existing_slot(&self, tier: &str) -> Option<Arc<Mutex<TierSlot>>> {
        read(&self.tiers).get(tier).cloned()
    }

    fn slot(&self, tier: &str) -> Arc<Mutex<TierSlot>> {
        if let Some(slot) = self.existing_slot(tier) {
            return slot;
        }

        let limit = self.configured_limit(tier);
        let mut tiers = self.tiers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            tiers
                .entry(tier.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TierSlot::new(limit)))),
        )
    }
}

/// Queue membership of an in-flight `acquire`.
///
/// Disarmed once the receiver produced a value. If the future is dropped
/// while still armed, the waiter is taken out of the queue, and a slot that
/// raced in just before the drop is passed on.
struct PendingAcquire {
    tier: Tier,
    slot: Arc<Mutex<TierSlot>>,
    waiter_id: u64,
    rx: oneshot::Receiver<Grant>,
    armed: bool,
}

impl Drop for PendingAcquire {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut state = lock(&self.slot);
        if state.remove_waiter(self.waiter_id) {
            debug!(tier = %self.tier, waiter = self.waiter_id, "abandoned queued acquire");
            return;
        }

        // Already settled under the lock; a granted slot must not leak.
        if let Ok(Grant::Slot) = self.rx.try_recv() {
            let outcome = state.release();
            debug!(
                tier = %self.tier,
                waiter = self.waiter_id,
                ?outcome,
                "abandoned acquire after handoff; slot passed on"
            );
        }
    }
}

fn lock(slot: &Mutex<TierSlot>) -> MutexGuard<'_, TierSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}
