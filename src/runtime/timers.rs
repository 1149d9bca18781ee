//! One-shot timers owned by stack entries.
//!
//! Callbacks never run after their owner has been popped: popping cancels the entry's timers,
//! and a timer is re-checked against its token and the live stack right before it fires. The
//! owner is the push, not the screen name, so a screen that also sits lower in the stack does
//! not keep the popped entry's timers alive.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use tracing::debug;

use super::context::EventCtx;
use super::navigation::{EntryId, StackEntry};

pub type TimerCallback = Box<dyn FnOnce(&mut EventCtx<'_>)>;

#[repr(transparent)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TimerId(u64);

impl TimerId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Shared cancel flag. Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

#[derive(Clone, Debug)]
pub struct TimerHandle {
    pub id: TimerId,
    pub token: CancellationToken,
}

pub struct PendingTimer {
    pub(crate) id: TimerId,
    pub(crate) deadline: Instant,
    pub(crate) owner: Option<StackEntry>,
    pub(crate) debounce_key: Option<String>,
    pub(crate) token: CancellationToken,
    pub(crate) callback: TimerCallback,
}

impl PendingTimer {
    pub(crate) fn new(
        id: TimerId,
        deadline: Instant,
        owner: Option<StackEntry>,
        debounce_key: Option<String>,
        callback: TimerCallback,
    ) -> (Self, TimerHandle) {
        let token = CancellationToken::new();
        let handle = TimerHandle {
            id,
            token: token.clone(),
        };
        let timer = Self {
            id,
            deadline,
            owner,
            debounce_key,
            token,
            callback,
        };
        (timer, handle)
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn owner(&self) -> Option<&StackEntry> {
        self.owner.as_ref()
    }
}

impl fmt::Debug for PendingTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTimer")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .field("owner", &self.owner)
            .field("debounce_key", &self.debounce_key)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    pending: Vec<PendingTimer>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a timer. A pending timer with the same debounce key is cancelled first.
    pub fn insert(&mut self, timer: PendingTimer) {
        if let Some(key) = timer.debounce_key.as_deref() {
            let mut index = 0;
            while index < self.pending.len() {
                if self.pending[index].debounce_key.as_deref() == Some(key) {
                    let replaced = self.pending.remove(index);
                    replaced.token.cancel();
                    debug!(timer = replaced.id.raw(), key, "debounced timer replaced");
                } else {
                    index += 1;
                }
            }
        }
        self.pending.push(timer);
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let Some(index) = self.pending.iter().position(|timer| timer.id == id) else {
            return false;
        };
        let timer = self.pending.remove(index);
        timer.token.cancel();
        true
    }

    /// Cancels every timer owned by the stack entry `entry`, returning how many were pending.
    pub fn cancel_owned_by(&mut self, entry: EntryId) -> usize {
        let before = self.pending.len();
        self.pending.retain(|timer| {
            let owned = timer.owner.as_ref().is_some_and(|owner| owner.id == entry);
            if owned {
                timer.token.cancel();
            }
            !owned
        });
        before - self.pending.len()
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingTimer> {
        let (mut due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|timer| timer.deadline <= now);
        self.pending = rest;
        due.sort_by_key(|timer| (timer.deadline, timer.id));
        due
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|timer| timer.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
