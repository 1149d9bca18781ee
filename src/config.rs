//! Environment configuration.

use std::env;
use std::path::PathBuf;

use crate::runtime::guard::GuardPolicy;
use crate::runtime::session::CtrlCPolicy;

pub const DEFAULT_LOG_FILTER: &str = "tape_nav=debug";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub settle_ms: u64,
    pub guard_policy: GuardPolicy,
    pub ctrl_c: CtrlCPolicy,
    pub escape_timeout_ms: u64,
    pub startup_settle_ms: u64,
    pub kitty_protocol: bool,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            settle_ms: 100,
            guard_policy: GuardPolicy::default(),
            ctrl_c: CtrlCPolicy::default(),
            escape_timeout_ms: 10,
            startup_settle_ms: 0,
            kitty_protocol: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
        }
    }
}

impl EnvConfig {
    /// Reads `TAPE_NAV_*` variables. Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            settle_ms: env_u64("TAPE_NAV_SETTLE_MS").unwrap_or(defaults.settle_ms),
            guard_policy: env_string_opt("TAPE_NAV_GUARD")
                .and_then(|value| GuardPolicy::parse(&value))
                .unwrap_or(defaults.guard_policy),
            ctrl_c: env_string_opt("TAPE_NAV_CTRL_C")
                .and_then(|value| CtrlCPolicy::parse(&value))
                .unwrap_or(defaults.ctrl_c),
            escape_timeout_ms: env_u64("TAPE_NAV_ESC_TIMEOUT_MS")
                .unwrap_or(defaults.escape_timeout_ms),
            startup_settle_ms: env_u64("TAPE_NAV_STARTUP_SETTLE_MS")
                .unwrap_or(defaults.startup_settle_ms),
            kitty_protocol: env_flag("TAPE_NAV_KITTY"),
            log_filter: env_string_opt("TAPE_NAV_LOG").unwrap_or(defaults.log_filter),
            log_file: env_string_opt("TAPE_NAV_LOG_FILE").map(PathBuf::from),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_u64(key: &str) -> Option<u64> {
    env_string_opt(key).and_then(|value| value.trim().parse().ok())
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
