//! The forward registry: computations parked until the scheduler runs them.
//!
//! All state sits behind one mutex. Registering, taking and releasing are
//! each a single critical section, so two threads can never consume the same
//! computation and a finished caller can never remove a registration made by
//! a sibling after it.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

use kiln_rules::BoxError;

use crate::slot::ForwardSlot;

/// A parked computation producing its result as a [`ForwardSlot`].
pub type Computation = Box<dyn FnOnce() -> Result<ForwardSlot, BoxError> + Send>;

static GLOBAL: LazyLock<Arc<ForwardRegistry>> = LazyLock::new(|| Arc::new(ForwardRegistry::new()));

struct SlotEntry {
    generation: u64,
    holders: usize,
    pending: VecDeque<Computation>,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<ForwardSlot, SlotEntry>,
    next_generation: u64,
}

/// Parked computations keyed by slot.
#[derive(Default)]
pub struct ForwardRegistry {
    slots: Mutex<Slots>,
}

impl ForwardRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<ForwardRegistry> {
        Arc::clone(&GLOBAL)
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parks `computation` under `slot`.
    ///
    /// The returned guard keeps the slot's entry alive; the entry is removed
    /// once every guard for it has been dropped, along with any computation
    /// nobody took.
    pub fn register(self: &Arc<Self>, slot: ForwardSlot, computation: Computation) -> Registration {
        let mut slots = self.lock();
        let generation = slots.next_generation;
        let entry = slots.entries.entry(slot.clone()).or_insert_with(|| SlotEntry {
            generation,
            holders: 0,
            pending: VecDeque::new(),
        });
        entry.holders += 1;
        entry.pending.push_back(computation);
        let generation = entry.generation;
        if generation == slots.next_generation {
            slots.next_generation += 1;
        }
        tracing::debug!(slot = %slot, generation, "registered forward computation");
        Registration {
            registry: Arc::clone(self),
            slot,
            generation,
        }
    }

    /// Removes and returns one parked computation for `slot`.
    pub fn take(&self, slot: &ForwardSlot) -> Option<Computation> {
        let computation = self
            .lock()
            .entries
            .get_mut(slot)
            .and_then(|entry| entry.pending.pop_front());
        tracing::debug!(slot = %slot, found = computation.is_some(), "took forward computation");
        computation
    }

    /// Drops the entry for `slot` outright, returning how many computations
    /// were still parked.
    ///
    /// Outstanding guards for the purged entry become no-ops.
    pub fn purge(&self, slot: &ForwardSlot) -> usize {
        let Some(entry) = self.lock().entries.remove(slot) else {
            return 0;
        };
        let leftover = entry.pending.len();
        if leftover > 0 || entry.holders > 0 {
            tracing::warn!(
                slot = %slot,
                leftover,
                holders = entry.holders,
                "purged live forward slot"
            );
        }
        leftover
    }

    /// Number of computations parked under `slot`.
    pub fn pending(&self, slot: &ForwardSlot) -> usize {
        self.lock()
            .entries
            .get(slot)
            .map_or(0, |entry| entry.pending.len())
    }

    /// Returns `true` if `slot` has an entry.
    pub fn contains(&self, slot: &ForwardSlot) -> bool {
        self.lock().entries.contains_key(slot)
    }

    /// Number of slots with an entry.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if no slot has an entry.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    fn release(&self, slot: &ForwardSlot, generation: u64) {
        let mut slots = self.lock();
        let Some(entry) = slots.entries.get_mut(slot) else {
            return;
        };
        if entry.generation != generation {
            return;
        }
        entry.holders = entry.holders.saturating_sub(1);
        if entry.holders == 0 {
            if let Some(entry) = slots.entries.remove(slot) {
                tracing::debug!(
                    slot = %slot,
                    untaken = entry.pending.len(),
                    "released forward slot"
                );
            }
        }
    }
}

impl fmt::Debug for ForwardRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardRegistry")
            .field("slots", &self.len())
            .finish()
    }
}

/// Keeps a registration's slot entry alive until dropped.
#[must_use = "dropping the registration releases the forward slot"]
pub struct Registration {
    registry: Arc<ForwardRegistry>,
    slot: ForwardSlot,
    generation: u64,
}

impl Registration {
    /// The registered slot.
    pub fn slot(&self) -> &ForwardSlot {
        &self.slot
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(&self.slot, self.generation);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .finish()
    }
}
