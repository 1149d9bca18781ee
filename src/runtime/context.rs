//! Handler-side view of a dispatch.
//!
//! Handlers and timer callbacks never mutate the session directly. Every side effect is recorded
//! on an [`EventCtx`] and applied in request order once the current dispatch (or timer) has
//! finished, so all handlers of one keystroke observe the same stack.

use std::time::{Duration, Instant};

use super::navigation::{ScreenId, ScreenStack, StackEntry};
use super::router::{HandlerId, HandlerSpec};
use super::timers::{PendingTimer, TimerCallback, TimerHandle, TimerId};

pub(crate) enum Effect {
    Push(ScreenId),
    Pop,
    Reset,
    Register(HandlerId, HandlerSpec),
    Unregister(HandlerId),
    SetEnabled(HandlerId, bool),
    Schedule(PendingTimer),
    CancelTimer(TimerId),
    Exit,
}

#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next_handler: u64,
    next_timer: u64,
}

impl IdAllocator {
    pub(crate) fn handler(&mut self) -> HandlerId {
        let id = HandlerId::from_raw(self.next_handler);
        self.next_handler += 1;
        id
    }

    pub(crate) fn timer(&mut self) -> TimerId {
        let id = TimerId::from_raw(self.next_timer);
        self.next_timer += 1;
        id
    }
}

pub struct EventCtx<'a> {
    ids: &'a mut IdAllocator,
    stack: &'a ScreenStack,
    origin: Option<StackEntry>,
    now: Instant,
    seq: u64,
    suppressed: bool,
    effects: Vec<Effect>,
}

impl<'a> EventCtx<'a> {
    pub(crate) fn new(
        ids: &'a mut IdAllocator,
        stack: &'a ScreenStack,
        origin: Option<StackEntry>,
        now: Instant,
        seq: u64,
    ) -> Self {
        Self {
            ids,
            stack,
            origin,
            now,
            seq,
            suppressed: false,
            effects: Vec::new(),
        }
    }

    pub(crate) fn set_origin(&mut self, origin: Option<StackEntry>) {
        self.origin = origin;
    }

    pub(crate) fn into_effects(self) -> Vec<Effect> {
        self.effects
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Sequence number of the keystroke being dispatched (the last issued one inside timers and
    /// mount hooks).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The stack as it was when the dispatch started. Requested navigation is not visible here.
    pub fn stack(&self) -> &ScreenStack {
        self.stack
    }

    pub fn current_screen(&self) -> &ScreenId {
        self.stack.current()
    }

    /// Screen the running handler, hook or timer belongs to; `None` for global handlers.
    pub fn origin(&self) -> Option<&ScreenId> {
        self.origin.as_ref().map(|entry| &entry.screen)
    }

    /// Marks the keystroke as handled. Later handlers still run and may check
    /// [`is_suppressed`](Self::is_suppressed).
    pub fn suppress(&mut self) {
        self.suppressed = true;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn push(&mut self, screen: impl Into<ScreenId>) {
        self.effects.push(Effect::Push(screen.into()));
    }

    pub fn pop(&mut self) {
        self.effects.push(Effect::Pop);
    }

    pub fn reset(&mut self) {
        self.effects.push(Effect::Reset);
    }

    pub fn request_exit(&mut self) {
        self.effects.push(Effect::Exit);
    }

    pub fn register(&mut self, spec: HandlerSpec) -> HandlerId {
        let id = self.ids.handler();
        self.effects.push(Effect::Register(id, spec));
        id
    }

    pub fn unregister(&mut self, id: HandlerId) {
        self.effects.push(Effect::Unregister(id));
    }

    pub fn set_enabled(&mut self, id: HandlerId, enabled: bool) {
        self.effects.push(Effect::SetEnabled(id, enabled));
    }

    /// Schedules `callback` after `delay`, owned by [`origin`](Self::origin).
    pub fn schedule(
        &mut self,
        delay: Duration,
        callback: impl FnOnce(&mut EventCtx<'_>) + 'static,
    ) -> TimerHandle {
        let owner = self.origin.clone();
        self.schedule_timer(delay, owner, None, Box::new(callback))
    }

    /// Like [`schedule`](Self::schedule), replacing any pending timer with the same key.
    pub fn schedule_debounced(
        &mut self,
        key: impl Into<String>,
        delay: Duration,
        callback: impl FnOnce(&mut EventCtx<'_>) + 'static,
    ) -> TimerHandle {
        let owner = self.origin.clone();
        self.schedule_timer(delay, owner, Some(key.into()), Box::new(callback))
    }

    /// Schedules a timer that no screen owns; it survives navigation.
    pub fn schedule_global(
        &mut self,
        delay: Duration,
        callback: impl FnOnce(&mut EventCtx<'_>) + 'static,
    ) -> TimerHandle {
        self.schedule_timer(delay, None, None, Box::new(callback))
    }

    pub fn cancel_timer(&mut self, id: TimerId) {
        self.effects.push(Effect::CancelTimer(id));
    }

    fn schedule_timer(
        &mut self,
        delay: Duration,
        owner: Option<StackEntry>,
        debounce_key: Option<String>,
        callback: TimerCallback,
    ) -> TimerHandle {
        let id = self.ids.timer();
        let (timer, handle) =
            PendingTimer::new(id, self.now + delay, owner, debounce_key, callback);
        self.effects.push(Effect::Schedule(timer));
        handle
    }
}
