/// Per-action attempt budgets.
///
/// Each guarded request action (reactivation, password reset, email change)
/// carries a counter and a last-attempt timestamp on the account record.
/// The budget refills only once the whole window has elapsed since the
/// *last* attempt, not since the first; retrying inside the window keeps the
/// budget closed, and one quiet window refills it entirely.
use chrono::{DateTime, Duration, Utc};

/// Attempt budget policy for one action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl AttemptPolicy {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
        }
    }
}

/// Outcome of recording an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt is allowed; write these values back to the account
    Proceed {
        count: i32,
        at: DateTime<Utc>,
    },
    /// Budget exhausted and the window has not elapsed yet
    RateLimited { retry_after: Duration },
}

/// Record an attempt against the budget.
///
/// Callers pass the account's current counter and last-attempt timestamp and
/// persist the returned values on `Proceed`. The function itself mutates
/// nothing.
pub fn record(
    count: i32,
    last_attempt_at: Option<DateTime<Utc>>,
    policy: &AttemptPolicy,
    now: DateTime<Utc>,
) -> AttemptOutcome {
    let mut count = count;

    if count >= policy.max_attempts as i32 {
        if let Some(last) = last_attempt_at {
            let elapsed = now - last;
            if elapsed < policy.window {
                return AttemptOutcome::RateLimited {
                    retry_after: policy.window - elapsed,
                };
            }
        }
        // Window fully elapsed since the last attempt: the budget refills
        count = 0;
    }

    AttemptOutcome::Proceed {
        count: count + 1,
        at: now,
    }
}
