//! Stateful orchestration: routing, navigation, transition guarding and timers.

pub mod context;
pub mod guard;
pub mod navigation;
pub mod router;
pub mod session;
pub mod timers;

pub use context::EventCtx;
pub use guard::{GuardPolicy, TransitionGuard, TransitionWindow};
pub use navigation::{EntryId, ScreenId, ScreenStack, StackEntry};
pub use router::{DispatchReport, HandlerId, HandlerSpec, KeyOutcome, Router, Scope};
pub use session::{CtrlCPolicy, Session, SessionConfig, TickReport};
pub use timers::{CancellationToken, TimerHandle, TimerId};
