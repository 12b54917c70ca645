use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::ThrottleConfig;
use crate::errors::ServerError;

pub const SCOPE_DRONES: &str = "drones";
pub const SCOPE_PILOTS: &str = "pilots";

/// Scoped fixed-window request limiter. Each (scope, caller) pair gets its
/// own window; a caller is the authenticated user id or `anon`.
#[derive(Clone)]
pub struct Throttle {
    inner: Arc<ThrottleInner>,
}

struct ThrottleInner {
    enabled: bool,
    window: Duration,
    drones_limit: u32,
    pilots_limit: u32,
    windows: Mutex<HashMap<(&'static str, String), WindowState>>,
}

struct WindowState {
    started: Instant,
    count: u32,
}

impl Throttle {
    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self::new(
            config.enabled,
            Duration::from_secs(config.window_seconds),
            config.drones,
            config.pilots,
        )
    }

    pub fn new(enabled: bool, window: Duration, drones_limit: u32, pilots_limit: u32) -> Self {
        Self {
            inner: Arc::new(ThrottleInner {
                enabled,
                window,
                drones_limit,
                pilots_limit,
                windows: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn check(&self, scope: &'static str, caller: &str) -> Result<(), ServerError> {
        if !self.inner.enabled {
            return Ok(());
        }
        let limit = match scope {
            SCOPE_DRONES => self.inner.drones_limit,
            SCOPE_PILOTS => self.inner.pilots_limit,
            _ => return Ok(()),
        };

        let now = Instant::now();
        let mut windows = self.inner.windows.lock();
        let state = windows
            .entry((scope, caller.to_string()))
            .or_insert(WindowState {
                started: now,
                count: 0,
            });
        if now.duration_since(state.started) >= self.inner.window {
            state.started = now;
            state.count = 0;
        }
        if state.count >= limit {
            return Err(ServerError::throttled(format!(
                "request limit reached for scope '{scope}'"
            )));
        }
        state.count += 1;
        Ok(())
    }
}

pub fn caller_key(user_id: Option<i64>) -> String {
    match user_id {
        Some(id) => format!("user:{id}"),
        None => "anon".to_string(),
    }
}
