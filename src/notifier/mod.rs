/// Outbound notification boundary.
///
/// The lifecycle emits notification intents after a confirmed save and never
/// waits on delivery; a failed send is logged by the caller and swallowed.

pub mod smtp;

pub use smtp::SmtpNotifier;

use crate::account::model::Account;
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Every notification the lifecycle can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    VerificationLink,
    EmailVerified,
    PasswordResetLink,
    PasswordChanged,
    DeactivationLink,
    AccountDeactivated,
    ReactivationLink,
    AccountReactivated,
    EmailChangeConfirmLink,
    NewEmailVerificationLink,
    EmailChanged,
    AccountLocked,
    AccountUnlocked,
    AccountBanned,
    AccountUnbanned,
    DeletionConfirmLink,
    DeletionScheduled,
    LoginBlocked,
    ReadingReminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::VerificationLink => "verification_link",
            NotificationKind::EmailVerified => "email_verified",
            NotificationKind::PasswordResetLink => "password_reset_link",
            NotificationKind::PasswordChanged => "password_changed",
            NotificationKind::DeactivationLink => "deactivation_link",
            NotificationKind::AccountDeactivated => "account_deactivated",
            NotificationKind::ReactivationLink => "reactivation_link",
            NotificationKind::AccountReactivated => "account_reactivated",
            NotificationKind::EmailChangeConfirmLink => "email_change_confirm_link",
            NotificationKind::NewEmailVerificationLink => "new_email_verification_link",
            NotificationKind::EmailChanged => "email_changed",
            NotificationKind::AccountLocked => "account_locked",
            NotificationKind::AccountUnlocked => "account_unlocked",
            NotificationKind::AccountBanned => "account_banned",
            NotificationKind::AccountUnbanned => "account_unbanned",
            NotificationKind::DeletionConfirmLink => "deletion_confirm_link",
            NotificationKind::DeletionScheduled => "deletion_scheduled",
            NotificationKind::LoginBlocked => "login_blocked",
            NotificationKind::ReadingReminder => "reading_reminder",
        }
    }
}

/// Extra data a notification may carry
#[derive(Debug, Clone, Default)]
pub struct NotificationContext {
    /// Sensitive-action token to embed in a confirmation link
    pub token: Option<String>,
    /// Recipient override; defaults to the account's current address
    pub target_email: Option<String>,
    /// Previous address for email-change notices (sent to both)
    pub old_email: Option<String>,
    /// Human-readable reason for administrative actions
    pub reason: Option<String>,
    /// Deadline for time-boxed restrictions (login block, ban end)
    pub until: Option<DateTime<Utc>>,
}

impl NotificationContext {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification. Fire-and-forget from the caller's
    /// perspective; the error only feeds a warning log.
    async fn notify(
        &self,
        kind: NotificationKind,
        account: &Account,
        context: &NotificationContext,
    ) -> AppResult<()>;
}
