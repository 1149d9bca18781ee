//! Session: the single-threaded composition root.
//!
//! Owns the navigation stack, router, transition guard, timers and the input pipeline. The host
//! loop feeds raw bytes (or already-normalized keys) with the current instant, calls
//! [`Session::tick`] when [`Session::next_deadline`] passes, and renders
//! [`Session::current`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::context::{Effect, EventCtx, IdAllocator};
use super::guard::{GuardPolicy, TransitionGuard, DEFAULT_SETTLE};
use super::navigation::{ScreenId, ScreenStack, StackEntry};
use super::router::{DispatchReport, HandlerId, HandlerSpec, Router};
use super::timers::{PendingTimer, TimerHandle, TimerId, TimerQueue};
use crate::config::EnvConfig;
use crate::core::input::{NormalizedKey, Normalizer};
use crate::platform::keystroke_buffer::{InputChunk, KeystrokeBuffer, DEFAULT_ESCAPE_TIMEOUT};

const BRACKETED_PASTE_START: &str = "\x1b[200~";
const BRACKETED_PASTE_END: &str = "\x1b[201~";

pub type MountHook = Box<dyn FnMut(&ScreenId, &mut EventCtx<'_>)>;

/// What to do with Ctrl+C.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CtrlCPolicy {
    /// Intercept before routing and raise [`Session::exit_requested`]. No handler sees it.
    #[default]
    Exit,
    /// Route like any other key.
    Deliver,
}

impl CtrlCPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exit" => Some(Self::Exit),
            "deliver" | "route" => Some(Self::Deliver),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub settle: Duration,
    pub guard_policy: GuardPolicy,
    pub ctrl_c: CtrlCPolicy,
    pub escape_timeout: Duration,
    /// Window applied to the initial screen at start; zero disables it.
    pub startup_settle: Duration,
    pub kitty_protocol: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle: DEFAULT_SETTLE,
            guard_policy: GuardPolicy::default(),
            ctrl_c: CtrlCPolicy::default(),
            escape_timeout: DEFAULT_ESCAPE_TIMEOUT,
            startup_settle: Duration::ZERO,
            kitty_protocol: false,
        }
    }
}

impl From<&EnvConfig> for SessionConfig {
    fn from(env: &EnvConfig) -> Self {
        Self {
            settle: Duration::from_millis(env.settle_ms),
            guard_policy: env.guard_policy,
            ctrl_c: env.ctrl_c,
            escape_timeout: Duration::from_millis(env.escape_timeout_ms),
            startup_settle: Duration::from_millis(env.startup_settle_ms),
            kitty_protocol: env.kitty_protocol,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Keystrokes released by the escape timeout.
    pub dispatched: Vec<DispatchReport>,
    pub timers_fired: usize,
    /// Due timers that were cancelled or whose screen had left the stack.
    pub timers_absorbed: usize,
}

pub struct Session {
    config: SessionConfig,
    stack: ScreenStack,
    router: Router,
    guard: TransitionGuard,
    timers: TimerQueue,
    buffer: KeystrokeBuffer,
    normalizer: Normalizer,
    ids: IdAllocator,
    mount_hooks: HashMap<ScreenId, Vec<MountHook>>,
    last_seq: u64,
    started: bool,
    exit_requested: bool,
}

impl Session {
    pub fn new(initial: impl Into<ScreenId>, config: SessionConfig) -> Self {
        Self {
            stack: ScreenStack::new(initial),
            router: Router::new(),
            guard: TransitionGuard::new(config.guard_policy, config.settle),
            timers: TimerQueue::new(),
            buffer: KeystrokeBuffer::new(config.escape_timeout),
            normalizer: Normalizer::new(config.kitty_protocol),
            ids: IdAllocator::default(),
            mount_hooks: HashMap::new(),
            last_seq: 0,
            started: false,
            exit_requested: false,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn stack(&self) -> &ScreenStack {
        &self.stack
    }

    pub fn current(&self) -> &ScreenId {
        self.stack.current()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Last sequence number handed to a keystroke; `0` before any input.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn clear_exit_request(&mut self) {
        self.exit_requested = false;
    }

    pub fn set_kitty_protocol(&mut self, active: bool) {
        self.normalizer.set_kitty_protocol(active);
    }

    /// Mounts the initial screen. Called implicitly by the first feed, dispatch or tick.
    pub fn start(&mut self, now: Instant) {
        if self.started {
            return;
        }
        self.started = true;
        let initial = self.stack.initial().clone();
        debug!(screen = %initial, "session started");
        if !self.config.startup_settle.is_zero() {
            self.guard
                .open_for(&initial, now, self.last_seq, self.config.startup_settle);
        }
        self.mount(&initial, now);
    }

    /// Registers a hook that runs whenever `screen` is mounted, typically registering its
    /// handlers. Runs immediately if the screen is already mounted.
    pub fn on_mount(
        &mut self,
        screen: impl Into<ScreenId>,
        hook: impl FnMut(&ScreenId, &mut EventCtx<'_>) + 'static,
        now: Instant,
    ) {
        let screen = screen.into();
        let mut hook: MountHook = Box::new(hook);
        if self.started && self.stack.contains(&screen) {
            self.run_hook(&screen, &mut hook, now);
        }
        self.mount_hooks.entry(screen).or_default().push(hook);
    }

    pub fn register(&mut self, spec: HandlerSpec) -> HandlerId {
        let id = self.ids.handler();
        self.router.insert(id, spec);
        id
    }

    pub fn unregister(&mut self, id: HandlerId) -> bool {
        self.router.remove(id)
    }

    pub fn set_enabled(&mut self, id: HandlerId, enabled: bool) -> bool {
        self.router.set_enabled(id, enabled)
    }

    /// Schedules a timer from outside any handler. A timer owned by `owner` belongs to that
    /// screen's topmost entry; one naming a screen that is not on the stack never fires.
    pub fn schedule(
        &mut self,
        owner: Option<ScreenId>,
        delay: Duration,
        now: Instant,
        callback: impl FnOnce(&mut EventCtx<'_>) + 'static,
    ) -> TimerHandle {
        let id = self.ids.timer();
        let entry = owner.as_ref().and_then(|screen| self.stack.entry_of(screen));
        let (timer, handle) = PendingTimer::new(id, now + delay, entry, None, Box::new(callback));
        match owner {
            Some(screen) if timer.owner().is_none() => {
                debug!(timer = id.raw(), owner = %screen, "timer for unmounted screen dropped");
                handle.token.cancel();
            }
            _ => self.insert_timer(timer),
        }
        handle
    }

    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        self.timers.cancel(id)
    }

    /// Feeds raw terminal bytes read at `now`, dispatching every completed keystroke.
    pub fn feed(&mut self, data: &[u8], now: Instant) -> Vec<DispatchReport> {
        self.start(now);
        let mut chunks = self.buffer.flush_due(now);
        chunks.extend(self.buffer.process(data, now));
        chunks
            .into_iter()
            .map(|chunk| {
                let key = self.key_for_chunk(chunk);
                self.dispatch(key, now)
            })
            .collect()
    }

    /// Dispatches a key under a fresh sequence number.
    pub fn dispatch(&mut self, key: NormalizedKey, now: Instant) -> DispatchReport {
        let seq = self.last_seq + 1;
        self.dispatch_numbered(key, seq, now)
    }

    /// Redelivers a keystroke under the sequence number it was first dispatched with.
    ///
    /// Hosts whose event loop re-emits an event to listeners mounted during its own handling
    /// use this; screens pushed by that keystroke refuse it.
    pub fn replay(&mut self, key: NormalizedKey, seq: u64, now: Instant) -> DispatchReport {
        self.dispatch_numbered(key, seq, now)
    }

    /// Flushes timed-out escape prefixes, fires due timers and drops settled windows.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        self.start(now);
        let mut report = TickReport::default();

        for chunk in self.buffer.flush_due(now) {
            let key = self.key_for_chunk(chunk);
            report.dispatched.push(self.dispatch(key, now));
        }

        for timer in self.timers.take_due(now) {
            let PendingTimer {
                id,
                owner,
                token,
                callback,
                ..
            } = timer;
            let orphaned = owner
                .as_ref()
                .is_some_and(|entry| !self.stack.contains_entry(entry.id));
            if token.is_cancelled() || orphaned {
                debug!(timer = id.raw(), owner = ?owner, "stale timer absorbed");
                report.timers_absorbed += 1;
                continue;
            }

            let effects = {
                let mut ctx = EventCtx::new(&mut self.ids, &self.stack, owner, now, self.last_seq);
                callback(&mut ctx);
                ctx.into_effects()
            };
            report.timers_fired += 1;
            self.apply_effects(effects, now);
        }

        self.guard.prune(self.last_seq, now);
        report
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.buffer.next_deadline(),
            self.timers.next_deadline(),
            self.guard.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Whether `screen` is inside its settle period.
    pub fn is_settling(&self, screen: &ScreenId, now: Instant) -> bool {
        self.guard.is_settling(screen, now)
    }

    pub fn push(&mut self, screen: impl Into<ScreenId>, now: Instant) {
        self.start(now);
        self.push_screen(screen.into(), now);
    }

    pub fn pop(&mut self, now: Instant) -> Option<ScreenId> {
        self.start(now);
        self.pop_screen()
    }

    pub fn reset(&mut self, now: Instant) -> Vec<ScreenId> {
        self.start(now);
        self.reset_stack()
    }

    fn key_for_chunk(&self, chunk: InputChunk) -> NormalizedKey {
        match chunk {
            InputChunk::Sequence(raw) => self.normalizer.normalize(&raw),
            InputChunk::Paste(text) => {
                let raw = format!("{BRACKETED_PASTE_START}{text}{BRACKETED_PASTE_END}");
                NormalizedKey::paste(text, raw)
            }
        }
    }

    fn dispatch_numbered(&mut self, key: NormalizedKey, seq: u64, now: Instant) -> DispatchReport {
        self.start(now);
        self.guard.prune(self.last_seq, now);
        self.last_seq = self.last_seq.max(seq);

        let mut report = DispatchReport::new(seq, &key, self.stack.current().clone());
        if self.config.ctrl_c == CtrlCPolicy::Exit && key.is_interrupt() && !key.is_release() {
            debug!(seq, "ctrl+c intercepted");
            report.interrupted = true;
            self.exit_requested = true;
            return report;
        }

        trace!(seq, key = %report.key_id, raw = ?key.raw, screen = %report.screen, "dispatch");
        let effects = {
            let mut ctx = EventCtx::new(&mut self.ids, &self.stack, None, now, seq);
            self.router
                .dispatch(&key, &self.guard, &mut ctx, &mut report);
            ctx.into_effects()
        };
        if report.is_dropped() {
            trace!(seq, "no active handler");
        }
        self.apply_effects(effects, now);
        report
    }

    fn apply_effects(&mut self, effects: Vec<Effect>, now: Instant) {
        for effect in effects {
            match effect {
                Effect::Push(screen) => self.push_screen(screen, now),
                Effect::Pop => {
                    self.pop_screen();
                }
                Effect::Reset => {
                    self.reset_stack();
                }
                Effect::Register(id, spec) => self.router.insert(id, spec),
                Effect::Unregister(id) => {
                    self.router.remove(id);
                }
                Effect::SetEnabled(id, enabled) => {
                    self.router.set_enabled(id, enabled);
                }
                Effect::Schedule(timer) => self.insert_timer(timer),
                Effect::CancelTimer(id) => {
                    self.timers.cancel(id);
                }
                Effect::Exit => self.exit_requested = true,
            }
        }
    }

    fn insert_timer(&mut self, timer: PendingTimer) {
        if let Some(owner) = timer.owner() {
            if !self.stack.contains_entry(owner.id) {
                debug!(timer = timer.id().raw(), owner = %owner, "timer for unmounted screen dropped");
                timer.token.cancel();
                return;
            }
        }
        self.timers.insert(timer);
    }

    fn push_screen(&mut self, screen: ScreenId, now: Instant) {
        let already_mounted = self.stack.contains(&screen);
        self.stack.push(screen.clone());
        debug!(screen = %screen, depth = self.stack.len(), "screen pushed");
        self.guard.open(&screen, now, self.last_seq);
        if !already_mounted {
            self.mount(&screen, now);
        }
    }

    fn pop_screen(&mut self) -> Option<ScreenId> {
        let Some(left) = self.stack.pop_entry() else {
            debug!(screen = %self.stack.current(), "pop ignored at initial screen");
            return None;
        };
        self.guard.close(&left.screen);
        let returned = self.stack.current().clone();
        self.guard.close(&returned);
        self.leave(&left);
        debug!(left = %left, current = %returned, depth = self.stack.len(), "screen popped");
        Some(left.screen)
    }

    fn reset_stack(&mut self) -> Vec<ScreenId> {
        let removed = self.stack.reset_entries();
        for entry in &removed {
            self.guard.close(&entry.screen);
            self.leave(entry);
        }
        let initial = self.stack.initial().clone();
        self.guard.close(&initial);
        debug!(removed = removed.len(), screen = %initial, "stack reset");
        removed.into_iter().map(|entry| entry.screen).collect()
    }

    /// Cancels the timers of an entry that left the stack, and unmounts its screen once no
    /// other entry shows it.
    fn leave(&mut self, entry: &StackEntry) {
        let timers = self.timers.cancel_owned_by(entry.id);
        if timers > 0 {
            debug!(entry = %entry, timers, "entry timers cancelled");
        }
        if !self.stack.contains(&entry.screen) {
            self.unmount(&entry.screen);
        }
    }

    fn mount(&mut self, screen: &ScreenId, now: Instant) {
        let Some(mut hooks) = self.mount_hooks.remove(screen) else {
            return;
        };
        debug!(screen = %screen, hooks = hooks.len(), "screen mounted");
        for hook in hooks.iter_mut() {
            self.run_hook(screen, hook, now);
        }
        if let Some(added) = self.mount_hooks.remove(screen) {
            hooks.extend(added);
        }
        self.mount_hooks.insert(screen.clone(), hooks);
    }

    fn run_hook(&mut self, screen: &ScreenId, hook: &mut MountHook, now: Instant) {
        let effects = {
            let origin = self.stack.entry_of(screen);
            let mut ctx = EventCtx::new(&mut self.ids, &self.stack, origin, now, self.last_seq);
            hook(screen, &mut ctx);
            ctx.into_effects()
        };
        self.apply_effects(effects, now);
    }

    fn unmount(&mut self, screen: &ScreenId) {
        let handlers = self.router.remove_screen(screen);
        debug!(screen = %screen, handlers = handlers.len(), "screen unmounted");
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new("main", SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use super::{CtrlCPolicy, Session, SessionConfig};
    use crate::core::input::normalize;
    use crate::runtime::router::{HandlerSpec, KeyOutcome};

    fn counter_handler(session: &mut Session, screen: &str) -> Rc<Cell<u32>> {
        let hits = Rc::new(Cell::new(0));
        let seen = Rc::clone(&hits);
        session.register(HandlerSpec::screen(screen, move |_, _| {
            seen.set(seen.get() + 1);
            KeyOutcome::Ignored
        }));
        hits
    }

    #[test]
    fn ctrl_c_exit_policy_intercepts_before_handlers() {
        let mut session = Session::default();
        let hits = counter_handler(&mut session, "main");

        let report = session.dispatch(normalize("\x03"), Instant::now());
        assert!(report.interrupted);
        assert!(session.exit_requested());
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn ctrl_c_deliver_policy_routes_normally() {
        let config = SessionConfig {
            ctrl_c: CtrlCPolicy::Deliver,
            ..SessionConfig::default()
        };
        let mut session = Session::new("main", config);
        let hits = counter_handler(&mut session, "main");

        let report = session.dispatch(normalize("\x03"), Instant::now());
        assert!(!report.interrupted);
        assert!(!session.exit_requested());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn startup_settle_absorbs_launch_keystrokes() {
        let config = SessionConfig {
            startup_settle: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let mut session = Session::new("main", config);
        let hits = counter_handler(&mut session, "main");
        let start = Instant::now();
        session.start(start);

        let report = session.feed(b"\r", start + Duration::from_millis(5));
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].guarded.len(), 1);
        assert_eq!(hits.get(), 0);

        session.feed(b"\r", start + Duration::from_millis(60));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn sequence_numbers_increase_per_keystroke() {
        let mut session = Session::default();
        let reports = session.feed(b"ab\x1b[A", Instant::now());
        let seqs: Vec<u64> = reports.iter().map(|report| report.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(session.last_seq(), 3);
    }

    #[test]
    fn lone_escape_is_dispatched_by_tick() {
        let mut session = Session::default();
        let start = Instant::now();
        assert!(session.feed(b"\x1b", start).is_empty());
        let deadline = session.next_deadline();
        assert_eq!(deadline, Some(start + Duration::from_millis(10)));

        let report = session.tick(start + Duration::from_millis(10));
        assert_eq!(report.dispatched.len(), 1);
        assert_eq!(report.dispatched[0].key_id, "escape");
    }

    #[test]
    fn paste_is_one_keystroke() {
        let mut session = Session::default();
        let reports = session.feed(b"\x1b[200~hello world\x1b[201~", Instant::now());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].key_id, "paste");
    }
}
