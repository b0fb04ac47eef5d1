/// Failed-login tracking and temporary lockout.
///
/// Independent of the token system: consecutive failed logins accumulate on
/// the account and convert into a time-boxed block. Counters clear only when
/// a block window has elapsed, not on a successful login.
use crate::account::model::Account;
use chrono::{DateTime, Duration, Utc};

/// What `before_login` decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginGate {
    /// No block in effect
    Clear,
    /// A block just expired and its counters were cleared; the account must
    /// be persisted before credentials are evaluated
    ClearedAfterBlock,
}

/// Outcome of recording a failed login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    /// This failure tripped the block; a login-blocked notice should go out
    Blocked { until: DateTime<Utc> },
    /// Failure counted, account not blocked yet
    Counted { attempts: i32 },
}

/// Gate a login attempt on the block state.
///
/// Returns the remaining block time (in whole hours, rounded up) while the
/// block is in effect. Once `now` has passed the block deadline the counters
/// are cleared in place and the attempt may proceed.
pub fn before_login(account: &mut Account, now: DateTime<Utc>) -> Result<LoginGate, i64> {
    if account.login_attempts_blocked {
        if let Some(until) = account.login_attempts_blocked_until {
            if now < until {
                let remaining = until - now;
                let hours = (remaining.num_seconds() + 3599) / 3600;
                return Err(hours.max(1));
            }
        }

        account.login_attempts = 0;
        account.login_attempts_blocked = false;
        account.login_attempts_blocked_until = None;
        return Ok(LoginGate::ClearedAfterBlock);
    }

    Ok(LoginGate::Clear)
}

/// Record a failed login attempt.
///
/// The attempt that reaches the limit sets the block instead of incrementing
/// the counter.
pub fn on_failure(
    account: &mut Account,
    max_attempts: u32,
    block_for: Duration,
    now: DateTime<Utc>,
) -> LoginFailure {
    if account.login_attempts + 1 >= max_attempts as i32 {
        let until = now + block_for;
        account.login_attempts_blocked = true;
        account.login_attempts_blocked_until = Some(until);
        LoginFailure::Blocked { until }
    } else {
        account.login_attempts += 1;
        account.last_login_attempt_at = Some(now);
        LoginFailure::Counted {
            attempts: account.login_attempts,
        }
    }
}

/// Record a successful login. Stamps login metadata only; failure counters
/// are left alone and clear when a block window elapses.
pub fn on_success(account: &mut Account, now: DateTime<Utc>, ip: Option<&str>) {
    account.last_login_at = Some(now);
    account.last_login_ip = ip.map(str::to_owned);
}
