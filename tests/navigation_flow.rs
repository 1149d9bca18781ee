use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tape_nav::{
    normalize, CtrlCPolicy, GuardPolicy, HandlerSpec, KeyOutcome, ScreenId, Session,
    SessionConfig, TimerHandle,
};

type Log = Rc<RefCell<Vec<String>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("tape_nav=trace")
        .try_init();
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn screens(session: &Session) -> Vec<&str> {
    session
        .stack()
        .screens()
        .iter()
        .map(ScreenId::as_str)
        .collect()
}

/// "main" pushes "detail" on Enter; "detail" pops on Escape. Every delivery is logged.
fn main_detail_app(config: SessionConfig, start: Instant) -> (Session, Log) {
    init_tracing();
    let mut session = Session::new("main", config);
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    let main_log = Rc::clone(&log);
    session.on_mount(
        "main",
        move |screen, ctx| {
            let log = Rc::clone(&main_log);
            ctx.register(HandlerSpec::screen(screen.clone(), move |key, ctx| {
                log.borrow_mut().push(format!("main:{}", key.key_id()));
                if key.matches("enter") {
                    ctx.suppress();
                    ctx.push("detail");
                    return KeyOutcome::Consumed;
                }
                KeyOutcome::Ignored
            }));
        },
        start,
    );

    let detail_log = Rc::clone(&log);
    session.on_mount(
        "detail",
        move |screen, ctx| {
            let log = Rc::clone(&detail_log);
            ctx.register(HandlerSpec::screen(screen.clone(), move |key, ctx| {
                log.borrow_mut().push(format!("detail:{}", key.key_id()));
                if key.matches("escape") {
                    ctx.pop();
                    return KeyOutcome::Consumed;
                }
                KeyOutcome::Ignored
            }));
        },
        start,
    );

    session.start(start);
    (session, log)
}

#[test]
fn main_detail_round_trip() {
    let t0 = Instant::now();
    let (mut session, log) = main_detail_app(SessionConfig::default(), t0);
    assert_eq!(screens(&session), vec!["main"]);

    let reports = session.feed(b"\r", t0);
    assert_eq!(reports.len(), 1);
    let enter = &reports[0];
    assert_eq!(enter.delivered.len(), 1);
    assert!(enter.consumed);
    assert!(enter.suppressed);
    assert_eq!(screens(&session), vec!["main", "detail"]);
    assert!(session.is_settling(&ScreenId::from("detail"), t0 + ms(1)));

    // The triggering keystroke re-emitted to the freshly mounted screen is refused.
    let replayed = session.replay(normalize("\r"), enter.seq, t0 + ms(1));
    assert!(replayed.delivered.is_empty());
    assert_eq!(replayed.guarded.len(), 1);

    // A different key inside the settle window is absorbed as well.
    let early = session.dispatch(normalize("x"), t0 + ms(50));
    assert!(early.is_dropped());

    let escape = session.dispatch(normalize("\x1b"), t0 + ms(150));
    assert_eq!(escape.delivered.len(), 1);
    assert_eq!(screens(&session), vec!["main"]);

    // No settle window after pop: "main" answers immediately.
    assert!(!session.is_settling(&ScreenId::from("main"), t0 + ms(150)));
    let back = session.dispatch(normalize("j"), t0 + ms(150));
    assert_eq!(back.delivered.len(), 1);

    assert_eq!(
        *log.borrow(),
        vec![
            "main:return".to_string(),
            "detail:escape".to_string(),
            "main:j".to_string(),
        ]
    );
}

#[test]
fn co_mounted_handlers_all_fire() {
    let t0 = Instant::now();
    let mut session = Session::default();
    let hits = Rc::new(Cell::new(0));

    for _ in 0..2 {
        let hits = Rc::clone(&hits);
        session.register(HandlerSpec::screen("main", move |_, _| {
            hits.set(hits.get() + 1);
            KeyOutcome::Consumed
        }));
    }

    let report = session.dispatch(normalize("k"), t0);
    assert_eq!(report.delivered.len(), 2);
    assert_eq!(hits.get(), 2);
}

#[test]
fn handlers_see_the_stack_as_it_was_before_navigation() {
    let t0 = Instant::now();
    let (mut session, _log) = main_detail_app(SessionConfig::default(), t0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let observed = Rc::clone(&seen);
    // Lower priority runs after the "main" handler that requests the push.
    session.register(
        HandlerSpec::global(move |_, ctx| {
            observed
                .borrow_mut()
                .push(ctx.current_screen().as_str().to_string());
            KeyOutcome::Ignored
        })
        .priority(-1),
    );

    session.dispatch(normalize("\r"), t0);
    assert_eq!(*seen.borrow(), vec!["main".to_string()]);
    assert_eq!(session.current().as_str(), "detail");
}

#[test]
fn pop_on_single_screen_stack_changes_nothing() {
    let t0 = Instant::now();
    let (mut session, _log) = main_detail_app(SessionConfig::default(), t0);
    let before = session.router().len();

    assert_eq!(session.pop(t0), None);
    assert_eq!(screens(&session), vec!["main"]);
    assert_eq!(session.router().len(), before);

    // Escape on "main" has no handler that pops; the stack stays put.
    session.dispatch(normalize("\x1b"), t0);
    assert_eq!(session.stack().len(), 1);
}

#[test]
fn pop_unmounts_handlers_and_push_remounts_them() {
    let t0 = Instant::now();
    let (mut session, _log) = main_detail_app(SessionConfig::default(), t0);
    assert_eq!(session.router().len(), 1);

    session.push("detail", t0);
    assert_eq!(session.router().len(), 2);
    session.pop(t0 + ms(10));
    assert_eq!(session.router().len(), 1);

    session.push("detail", t0 + ms(20));
    assert_eq!(session.router().len(), 2);
    session.reset(t0 + ms(30));
    assert_eq!(screens(&session), vec!["main"]);
    assert_eq!(session.router().len(), 1);
}

#[test]
fn stale_timer_from_popped_screen_has_no_effect() {
    init_tracing();
    let t0 = Instant::now();
    let mut session = Session::default();
    let spy = Rc::new(Cell::new(0));
    let handle: Rc<RefCell<Option<TimerHandle>>> = Rc::new(RefCell::new(None));

    let timer_spy = Rc::clone(&spy);
    let timer_handle = Rc::clone(&handle);
    session.on_mount(
        "detail",
        move |_, ctx| {
            let spy = Rc::clone(&timer_spy);
            let scheduled = ctx.schedule(ms(200), move |_| spy.set(spy.get() + 1));
            *timer_handle.borrow_mut() = Some(scheduled);
        },
        t0,
    );

    session.push("detail", t0);
    assert_eq!(session.pending_timers(), 1);
    session.pop(t0 + ms(50));
    assert_eq!(session.pending_timers(), 0);

    let tick = session.tick(t0 + ms(300));
    assert_eq!(tick.timers_fired, 0);
    assert_eq!(spy.get(), 0);
    let token = handle.borrow().as_ref().map(|handle| handle.token.is_cancelled());
    assert_eq!(token, Some(true));
}

#[test]
fn popping_a_repeated_screen_cancels_only_that_entrys_timers() {
    init_tracing();
    let t0 = Instant::now();
    let mut session = Session::default();
    let spy = Rc::new(Cell::new(0));

    let hook_spy = Rc::clone(&spy);
    session.on_mount(
        "x",
        move |screen, ctx| {
            let spy = Rc::clone(&hook_spy);
            ctx.register(HandlerSpec::screen(screen.clone(), move |key, ctx| {
                if key.matches("t") {
                    let spy = Rc::clone(&spy);
                    ctx.schedule(ms(500), move |_| spy.set(spy.get() + 1));
                    return KeyOutcome::Consumed;
                }
                KeyOutcome::Ignored
            }));
        },
        t0,
    );

    session.push("x", t0);
    session.feed(b"t", t0 + ms(150));
    session.push("y", t0 + ms(160));
    session.push("x", t0 + ms(160));
    assert_eq!(screens(&session), vec!["main", "x", "y", "x"]);

    let report = session.feed(b"t", t0 + ms(300));
    assert_eq!(report[0].delivered.len(), 1);
    assert_eq!(session.pending_timers(), 2);

    session.pop(t0 + ms(350));
    assert_eq!(screens(&session), vec!["main", "x", "y"]);
    assert_eq!(session.pending_timers(), 1);

    let tick = session.tick(t0 + ms(900));
    assert_eq!(tick.timers_fired, 1);
    assert_eq!(spy.get(), 1);
    assert_eq!(session.pending_timers(), 0);
}

#[test]
fn timer_owned_by_live_screen_fires_once() {
    let t0 = Instant::now();
    let mut session = Session::default();
    let spy = Rc::new(Cell::new(0));
    let timer_spy = Rc::clone(&spy);
    session.schedule(Some(ScreenId::from("main")), ms(30), t0, move |_| {
        timer_spy.set(timer_spy.get() + 1)
    });

    assert_eq!(session.next_deadline(), Some(t0 + ms(30)));
    assert_eq!(session.tick(t0 + ms(10)).timers_fired, 0);
    assert_eq!(session.tick(t0 + ms(30)).timers_fired, 1);
    assert_eq!(session.tick(t0 + ms(60)).timers_fired, 0);
    assert_eq!(spy.get(), 1);
}

#[test]
fn debounced_search_runs_once_after_typing_stops() {
    let t0 = Instant::now();
    let mut session = Session::default();
    let runs = Rc::new(RefCell::new(Vec::new()));

    let search_runs = Rc::clone(&runs);
    session.register(HandlerSpec::screen("main", move |key, ctx| {
        let Some(text) = key.text.clone() else {
            return KeyOutcome::Ignored;
        };
        let runs = Rc::clone(&search_runs);
        ctx.schedule_debounced("search", ms(100), move |_| runs.borrow_mut().push(text));
        KeyOutcome::Consumed
    }));

    session.feed(b"a", t0);
    session.feed(b"b", t0 + ms(40));
    session.feed(b"c", t0 + ms(80));
    assert_eq!(session.tick(t0 + ms(150)).timers_fired, 0);
    let tick = session.tick(t0 + ms(180));
    assert_eq!(tick.timers_fired, 1);
    assert_eq!(*runs.borrow(), vec!["c".to_string()]);
}

#[test]
fn timer_can_navigate() {
    let t0 = Instant::now();
    let (mut session, _log) = main_detail_app(SessionConfig::default(), t0);
    session.schedule(None, ms(20), t0, |ctx| ctx.push("detail"));

    session.tick(t0 + ms(20));
    assert_eq!(screens(&session), vec!["main", "detail"]);
    assert!(session.is_settling(&ScreenId::from("detail"), t0 + ms(21)));
}

#[test]
fn ctrl_c_is_never_handled_twice() {
    let t0 = Instant::now();
    let mut session = Session::default();
    let interrupts = Rc::new(Cell::new(0));
    let seen = Rc::clone(&interrupts);
    session.register(HandlerSpec::global(move |key, ctx| {
        if key.is_interrupt() {
            seen.set(seen.get() + 1);
            ctx.request_exit();
        }
        KeyOutcome::Ignored
    }));

    let report = session.feed(b"\x03", t0);
    assert!(report[0].interrupted);
    assert!(session.exit_requested());
    assert_eq!(interrupts.get(), 0);

    let config = SessionConfig {
        ctrl_c: CtrlCPolicy::Deliver,
        ..SessionConfig::default()
    };
    let mut delivering = Session::new("main", config);
    let seen = Rc::clone(&interrupts);
    delivering.register(HandlerSpec::global(move |key, ctx| {
        if key.is_interrupt() {
            seen.set(seen.get() + 1);
            ctx.request_exit();
        }
        KeyOutcome::Ignored
    }));
    delivering.feed(b"\x03", t0);
    assert_eq!(interrupts.get(), 1);
    assert!(delivering.exit_requested());
}

#[test]
fn sequence_policy_admits_the_next_key_immediately() {
    let t0 = Instant::now();
    let config = SessionConfig {
        guard_policy: GuardPolicy::Sequence,
        ..SessionConfig::default()
    };
    let (mut session, log) = main_detail_app(config, t0);

    let enter = session.dispatch(normalize("\r"), t0);
    let replayed = session.replay(normalize("\r"), enter.seq, t0 + ms(1));
    assert_eq!(replayed.guarded.len(), 1);

    let next = session.dispatch(normalize("x"), t0 + ms(2));
    assert_eq!(next.delivered.len(), 1);
    assert_eq!(log.borrow().last().map(String::as_str), Some("detail:x"));
}

#[test]
fn settle_policy_ignores_sequence_numbers() {
    let t0 = Instant::now();
    let config = SessionConfig {
        guard_policy: GuardPolicy::SettleWindow,
        settle: ms(80),
        ..SessionConfig::default()
    };
    let (mut session, _log) = main_detail_app(config, t0);

    let enter = session.dispatch(normalize("\r"), t0);
    assert!(session.replay(normalize("\r"), enter.seq, t0 + ms(10)).is_dropped());
    let late = session.replay(normalize("\r"), enter.seq, t0 + ms(80));
    assert_eq!(late.delivered.len(), 1);
}

#[test]
fn disabled_handler_stays_silent_until_enabled() {
    let t0 = Instant::now();
    let mut session = Session::default();
    let hits = Rc::new(Cell::new(0));
    let seen = Rc::clone(&hits);
    let id = session.register(
        HandlerSpec::screen("main", move |_, _| {
            seen.set(seen.get() + 1);
            KeyOutcome::Ignored
        })
        .disabled(),
    );

    let report = session.dispatch(normalize("q"), t0);
    assert_eq!(report.inactive, vec![id]);
    assert!(session.set_enabled(id, true));
    session.dispatch(normalize("q"), t0);
    assert_eq!(hits.get(), 1);
    assert!(session.unregister(id));
    assert!(session.dispatch(normalize("q"), t0).is_dropped());
}
