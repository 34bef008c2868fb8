//! Per-address request rate limiting
//!
//! Fixed-window counter keyed by client address. A request over the limit
//! is rejected outright; nothing is queued.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Windows older than this many periods are dropped when the table grows
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid rate limit {0:?}: expected <count>/<second|minute|hour|day>")]
pub struct RateLimitParseError(pub String);

/// `<count>/<period>`, e.g. `100/minute`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub requests: u32,
    pub period: Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Second,
    Minute,
    Hour,
    Day,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Second => "second",
            Period::Minute => "minute",
            Period::Hour => "hour",
            Period::Day => "day",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Period::Second => Duration::from_secs(1),
            Period::Minute => Duration::from_secs(60),
            Period::Hour => Duration::from_secs(60 * 60),
            Period::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests: 100,
            period: Period::Minute,
        }
    }
}

impl RateLimit {
    /// Config file form, e.g. `100/minute`
    pub fn to_config_string(&self) -> String {
        format!("{}/{}", self.requests, self.period.as_str())
    }
}

impl FromStr for RateLimit {
    type Err = RateLimitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RateLimitParseError(s.to_string());
        let (count, period) = s.split_once('/').ok_or_else(err)?;

        let requests: u32 = count.trim().parse().map_err(|_| err())?;
        if requests == 0 {
            return Err(err());
        }
        let period = match period.trim().trim_end_matches('s').to_lowercase().as_str() {
            "second" | "sec" => Period::Second,
            "minute" | "min" => Period::Minute,
            "hour" => Period::Hour,
            "day" => Period::Day,
            _ => return Err(err()),
        };

        Ok(Self { requests, period })
    }
}

/// Human form used in the 429 message, e.g. `100 per 1 minute`
impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per 1 {}", self.requests, self.period.as_str())
    }
}

/// Outcome of one check, carrying what the response headers need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes
    pub reset_after: Duration,
}

struct Window {
    started: Instant,
    count: u32,
}

struct Windows {
    by_key: HashMap<String, Window>,
    last_prune: Instant,
}

pub struct RateLimiter {
    limit: RateLimit,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            windows: Mutex::new(Windows {
                by_key: HashMap::new(),
                last_prune: Instant::now(),
            }),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Count one request from `key`
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Keys currently holding a window
    pub fn tracked_keys(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_key
            .len()
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let period = self.limit.period.duration();
        let max = self.limit.requests;

        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        // At most one sweep per period
        if windows.by_key.len() > PRUNE_THRESHOLD
            && now.saturating_duration_since(windows.last_prune) >= period
        {
            windows
                .by_key
                .retain(|_, w| now.saturating_duration_since(w.started) < period);
            windows.last_prune = now;
        }

        let window = windows.by_key.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(window.started) >= period {
            window.started = now;
            window.count = 0;
        }

        let reset_after = period.saturating_sub(now.saturating_duration_since(window.started));
        if window.count >= max {
            return Decision {
                allowed: false,
                limit: max,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        Decision {
            allowed: true,
            limit: max,
            remaining: max - window.count,
            reset_after,
        }
    }
}
