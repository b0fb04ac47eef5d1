/// Account restriction guard chain.
///
/// Evaluated on every authenticated request before the operation itself.
/// Order is fixed: pending-deletion, then lock, then ban, then inactive;
/// the first failing guard wins and the rest are not consulted. A ban only
/// restricts write actions, never login.
use crate::account::model::Account;
use crate::error::RestrictionReason;

/// What the caller wants to do with the account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Login,
    Write,
}

/// Run the guard chain for an intent.
pub fn check_restrictions(
    account: &Account,
    intent: AccessIntent,
) -> Result<(), RestrictionReason> {
    if account.to_be_deleted {
        return Err(RestrictionReason::PendingDeletion);
    }

    if account.is_locked {
        return Err(RestrictionReason::Locked);
    }

    if account.is_banned && intent == AccessIntent::Write {
        return Err(RestrictionReason::Banned);
    }

    if !account.is_active {
        return Err(RestrictionReason::Inactive);
    }

    Ok(())
}
