//! Transition guard.
//!
//! A freshly pushed screen ignores input until its transition window closes, so the keystroke
//! that caused the push (or one buffered right behind it) cannot act on the new screen.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use super::navigation::ScreenId;

pub const DEFAULT_SETTLE: Duration = Duration::from_millis(100);

/// Which test decides that a window still guards its screen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GuardPolicy {
    /// Refuse keys until the settle duration has elapsed.
    SettleWindow,
    /// Refuse keys numbered at or below the sequence number current at push time.
    Sequence,
    /// Refuse if either test refuses.
    #[default]
    Both,
}

impl GuardPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "settle" | "settle_window" | "window" => Some(Self::SettleWindow),
            "sequence" | "seq" => Some(Self::Sequence),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    fn uses_clock(self) -> bool {
        matches!(self, Self::SettleWindow | Self::Both)
    }

    fn uses_sequence(self) -> bool {
        matches!(self, Self::Sequence | Self::Both)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionWindow {
    pub screen: ScreenId,
    pub activated_at: Instant,
    pub settle: Duration,
    /// Last keystroke sequence number issued when the window opened.
    pub armed_seq: u64,
}

impl TransitionWindow {
    pub fn settles_at(&self) -> Instant {
        self.activated_at + self.settle
    }

    fn clock_refuses(&self, now: Instant) -> bool {
        now < self.settles_at()
    }

    fn sequence_refuses(&self, seq: u64) -> bool {
        seq <= self.armed_seq
    }

    fn refuses(&self, policy: GuardPolicy, seq: u64, now: Instant) -> bool {
        (policy.uses_clock() && self.clock_refuses(now))
            || (policy.uses_sequence() && self.sequence_refuses(seq))
    }

    fn is_spent(&self, policy: GuardPolicy, last_seq: u64, now: Instant) -> bool {
        let clock_done = !policy.uses_clock() || !self.clock_refuses(now);
        let sequence_done = !policy.uses_sequence() || last_seq > self.armed_seq;
        clock_done && sequence_done
    }
}

#[derive(Debug)]
pub struct TransitionGuard {
    policy: GuardPolicy,
    settle: Duration,
    windows: HashMap<ScreenId, TransitionWindow>,
}

impl Default for TransitionGuard {
    fn default() -> Self {
        Self::new(GuardPolicy::default(), DEFAULT_SETTLE)
    }
}

impl TransitionGuard {
    pub fn new(policy: GuardPolicy, settle: Duration) -> Self {
        Self {
            policy,
            settle,
            windows: HashMap::new(),
        }
    }

    pub fn policy(&self) -> GuardPolicy {
        self.policy
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Opens (or re-arms) the window for `screen` with the default settle duration.
    pub fn open(&mut self, screen: &ScreenId, now: Instant, armed_seq: u64) {
        self.open_for(screen, now, armed_seq, self.settle);
    }

    pub fn open_for(&mut self, screen: &ScreenId, now: Instant, armed_seq: u64, settle: Duration) {
        let settle_ms = u64::try_from(settle.as_millis()).unwrap_or(u64::MAX);
        debug!(screen = %screen, settle_ms, armed_seq, "transition window opened");
        self.windows.insert(
            screen.clone(),
            TransitionWindow {
                screen: screen.clone(),
                activated_at: now,
                settle,
                armed_seq,
            },
        );
    }

    pub fn close(&mut self, screen: &ScreenId) -> bool {
        let closed = self.windows.remove(screen).is_some();
        if closed {
            debug!(screen = %screen, "transition window closed");
        }
        closed
    }

    pub fn window(&self, screen: &ScreenId) -> Option<&TransitionWindow> {
        self.windows.get(screen)
    }

    /// Whether keystroke `seq` arriving at `now` must be withheld from `screen`'s handlers.
    pub fn refuses(&self, screen: &ScreenId, seq: u64, now: Instant) -> bool {
        self.windows
            .get(screen)
            .is_some_and(|window| window.refuses(self.policy, seq, now))
    }

    /// Whether `screen` is still inside its wall-clock settle period.
    pub fn is_settling(&self, screen: &ScreenId, now: Instant) -> bool {
        self.policy.uses_clock()
            && self
                .windows
                .get(screen)
                .is_some_and(|window| window.clock_refuses(now))
    }

    /// Drops windows that can no longer refuse anything.
    pub fn prune(&mut self, last_seq: u64, now: Instant) {
        let policy = self.policy;
        self.windows.retain(|screen, window| {
            let keep = !window.is_spent(policy, last_seq, now);
            if !keep {
                debug!(screen = %screen, "transition window settled");
            }
            keep
        });
    }

    /// Earliest instant a clock-based window settles.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.policy.uses_clock() {
            return None;
        }
        self.windows
            .values()
            .map(TransitionWindow::settles_at)
            .min()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
