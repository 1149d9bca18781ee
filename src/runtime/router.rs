//! Input router.
//!
//! Broadcast dispatch: every eligible registration sees every keystroke, in delivery order
//! (priority descending, then most recently registered first). Consuming a key does not stop
//! delivery; it only raises the shared suppression flag later handlers may honor.

use std::cmp::Reverse;
use std::fmt;
use std::time::Instant;

use tracing::trace;

use super::context::EventCtx;
use super::guard::TransitionGuard;
use super::navigation::ScreenId;
use crate::core::input::NormalizedKey;

pub type KeyHandler = Box<dyn FnMut(&NormalizedKey, &mut EventCtx<'_>) -> KeyOutcome>;
pub type ActivePredicate = Box<dyn Fn() -> bool>;

/// Stable identifier of a handler registration. Never reused within a session.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Eligible on every screen.
    Global,
    /// Eligible only while this screen is current and settled.
    Screen(ScreenId),
}

impl Scope {
    pub fn screen(&self) -> Option<&ScreenId> {
        match self {
            Self::Global => None,
            Self::Screen(screen) => Some(screen),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyOutcome {
    #[default]
    Ignored,
    Consumed,
}

pub struct HandlerSpec {
    scope: Scope,
    priority: i32,
    enabled: bool,
    active_when: Option<ActivePredicate>,
    wants_key_release: bool,
    label: Option<String>,
    handler: KeyHandler,
}

impl HandlerSpec {
    pub fn new(
        scope: Scope,
        handler: impl FnMut(&NormalizedKey, &mut EventCtx<'_>) -> KeyOutcome + 'static,
    ) -> Self {
        Self {
            scope,
            priority: 0,
            enabled: true,
            active_when: None,
            wants_key_release: false,
            label: None,
            handler: Box::new(handler),
        }
    }

    pub fn global(
        handler: impl FnMut(&NormalizedKey, &mut EventCtx<'_>) -> KeyOutcome + 'static,
    ) -> Self {
        Self::new(Scope::Global, handler)
    }

    pub fn screen(
        screen: impl Into<ScreenId>,
        handler: impl FnMut(&NormalizedKey, &mut EventCtx<'_>) -> KeyOutcome + 'static,
    ) -> Self {
        Self::new(Scope::Screen(screen.into()), handler)
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Extra activity check evaluated on every dispatch.
    pub fn active_when(mut self, predicate: impl Fn() -> bool + 'static) -> Self {
        self.active_when = Some(Box::new(predicate));
        self
    }

    pub fn wants_key_release(mut self) -> Self {
        self.wants_key_release = true;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("scope", &self.scope)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("has_predicate", &self.active_when.is_some())
            .field("wants_key_release", &self.wants_key_release)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// What happened to one keystroke.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchReport {
    pub seq: u64,
    pub key_id: String,
    /// Current screen when the dispatch started.
    pub screen: ScreenId,
    pub delivered: Vec<HandlerId>,
    pub inactive: Vec<HandlerId>,
    /// Held back by a transition window.
    pub guarded: Vec<HandlerId>,
    pub consumed: bool,
    pub suppressed: bool,
    /// Intercepted as Ctrl+C before routing.
    pub interrupted: bool,
}

impl DispatchReport {
    pub(crate) fn new(seq: u64, key: &NormalizedKey, screen: ScreenId) -> Self {
        Self {
            seq,
            key_id: key.key_id(),
            screen,
            delivered: Vec::new(),
            inactive: Vec::new(),
            guarded: Vec::new(),
            consumed: false,
            suppressed: false,
            interrupted: false,
        }
    }

    /// No handler received the key.
    pub fn is_dropped(&self) -> bool {
        self.delivered.is_empty()
    }

    pub fn was_delivered_to(&self, id: HandlerId) -> bool {
        self.delivered.contains(&id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eligibility {
    Deliver,
    Inactive,
    Guarded,
}

struct Entry {
    id: HandlerId,
    order: u64,
    spec: HandlerSpec,
}

#[derive(Default)]
pub struct Router {
    entries: Vec<Entry>,
    next_order: u64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: HandlerId, spec: HandlerSpec) {
        trace!(handler = id.raw(), scope = ?spec.scope, label = ?spec.label, "handler registered");
        let order = self.next_order;
        self.next_order += 1;
        self.entries.retain(|entry| entry.id != id);
        self.entries.push(Entry { id, order, spec });
    }

    pub fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        let removed = self.entries.len() != before;
        if removed {
            trace!(handler = id.raw(), "handler unregistered");
        }
        removed
    }

    /// Unregisters every handler scoped to `screen`.
    pub fn remove_screen(&mut self, screen: &ScreenId) -> Vec<HandlerId> {
        let mut removed = Vec::new();
        self.entries.retain(|entry| {
            let owned = entry.spec.scope.screen() == Some(screen);
            if owned {
                removed.push(entry.id);
            }
            !owned
        });
        removed
    }

    pub fn set_enabled(&mut self, id: HandlerId, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.spec.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn scope_of(&self, id: HandlerId) -> Option<&Scope> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| &entry.spec.scope)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn delivery_order(&self) -> Vec<HandlerId> {
        self.ordered_indices()
            .into_iter()
            .map(|index| self.entries[index].id)
            .collect()
    }

    /// Delivers `key` to every eligible handler. Effects requested through `ctx` are left
    /// for the caller to apply.
    pub(crate) fn dispatch(
        &mut self,
        key: &NormalizedKey,
        guard: &TransitionGuard,
        ctx: &mut EventCtx<'_>,
        report: &mut DispatchReport,
    ) {
        let current = ctx.current_screen().clone();
        let seq = ctx.seq();
        let now = ctx.now();

        for index in self.ordered_indices() {
            let entry = &mut self.entries[index];
            match eligibility(&entry.spec, key, &current, guard, seq, now) {
                Eligibility::Inactive => {
                    trace!(handler = entry.id.raw(), seq, "handler inactive");
                    report.inactive.push(entry.id);
                }
                Eligibility::Guarded => {
                    trace!(handler = entry.id.raw(), seq, "handler held by transition guard");
                    report.guarded.push(entry.id);
                }
                Eligibility::Deliver => {
                    // Screen-scoped handlers only run while their screen is on top.
                    let origin = entry.spec.scope.screen().map(|_| ctx.stack().current_entry());
                    ctx.set_origin(origin);
                    let outcome = (entry.spec.handler)(key, ctx);
                    report.delivered.push(entry.id);
                    if outcome == KeyOutcome::Consumed {
                        report.consumed = true;
                        ctx.suppress();
                    }
                }
            }
        }
        ctx.set_origin(None);
        report.suppressed = ctx.is_suppressed();
    }

    fn ordered_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.entries.len()).collect();
        indices.sort_by_key(|&index| {
            let entry = &self.entries[index];
            (Reverse(entry.spec.priority), Reverse(entry.order))
        });
        indices
    }
}

fn eligibility(
    spec: &HandlerSpec,
    key: &NormalizedKey,
    current: &ScreenId,
    guard: &TransitionGuard,
    seq: u64,
    now: Instant,
) -> Eligibility {
    if !spec.enabled || (key.is_release() && !spec.wants_key_release) {
        return Eligibility::Inactive;
    }
    if let Scope::Screen(screen) = &spec.scope {
        if screen != current {
            return Eligibility::Inactive;
        }
        if guard.refuses(screen, seq, now) {
            return Eligibility::Guarded;
        }
    }
    match &spec.active_when {
        Some(predicate) if !predicate() => Eligibility::Inactive,
        _ => Eligibility::Deliver,
    }
}
