/// Account record and associated value types
use crate::account::token::{SensitiveToken, TokenPurpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles an account may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountRole {
    User,
    Admin,
    BlogAdmin,
}

/// One entry in the append-only log of past email addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailChangeRecord {
    pub email: String,
    pub changed_at: DateTime<Utc>,
}

/// Account record.
///
/// The aggregate root for everything the lifecycle state machine touches.
/// Restriction states (pending deletion, locked, banned, inactive) are
/// independent booleans, not an enum: more than one can be true at a time
/// and the guard chain decides which one wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    // Identity
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<AccountRole>,
    pub created_at: DateTime<Utc>,

    // Activation
    pub is_active: bool,
    pub email_verified: bool,
    pub email_verification_token: Option<String>,
    pub email_verification_expires_at: Option<DateTime<Utc>>,
    pub resend_verification_count: i32,
    pub last_verification_sent_at: Option<DateTime<Utc>>,

    // Deactivation / reactivation
    pub deactivation_token: Option<String>,
    pub deactivation_expires_at: Option<DateTime<Utc>>,
    pub reactivation_token: Option<String>,
    pub reactivation_expires_at: Option<DateTime<Utc>>,
    pub reactivation_request_count: i32,
    pub last_reactivation_request_at: Option<DateTime<Utc>>,

    // Deletion
    pub delete_request_token: Option<String>,
    pub delete_request_expires_at: Option<DateTime<Utc>>,
    pub delete_request_count: i32,
    pub last_delete_request_at: Option<DateTime<Utc>>,
    /// Grace-period flag; while set, the account counts as pending deletion
    pub to_be_deleted: bool,
    pub account_deleted_at: Option<DateTime<Utc>>,

    // Password
    pub password_changed_at: Option<DateTime<Utc>>,
    pub password_reset_token: Option<String>,
    pub password_reset_expires_at: Option<DateTime<Utc>>,
    pub password_reset_request_count: i32,
    pub last_password_reset_request_at: Option<DateTime<Utc>>,

    // Email change
    pub email_change_token: Option<String>,
    pub email_change_expires_at: Option<DateTime<Utc>>,
    pub email_change_request_count: i32,
    pub last_email_change_request_at: Option<DateTime<Utc>>,
    /// Address the user wants to move to; owns the pending-email tokens below
    pub pending_email: Option<String>,
    pub pending_email_token: Option<String>,
    pub pending_email_expires_at: Option<DateTime<Utc>>,
    pub pending_email_verification_count: i32,
    pub email_change_locked_until: Option<DateTime<Utc>>,
    pub previous_emails: Vec<EmailChangeRecord>,

    // Login security
    pub login_attempts: i32,
    pub last_login_attempt_at: Option<DateTime<Utc>>,
    pub login_attempts_blocked: bool,
    /// Only meaningful while `login_attempts_blocked` is true
    pub login_attempts_blocked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,

    // Administrative restriction
    pub is_locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_reason: Option<String>,
    pub locked_by: Option<String>,
    pub unlocked_at: Option<DateTime<Utc>>,
    pub unlocked_by: Option<String>,
    pub unlock_comment: Option<String>,
    pub is_banned: bool,
    pub banned_at: Option<DateTime<Utc>>,
    pub banned_reason: Option<String>,
    pub banned_by: Option<String>,
    pub ban_period_days: Option<i64>,
    pub unbanned_at: Option<DateTime<Utc>>,
    pub unbanned_by: Option<String>,
    pub unban_comment: Option<String>,
}

impl Account {
    /// New account as created by registration: active, email not yet verified
    pub fn new(email: String, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            roles: vec![AccountRole::User],
            created_at: now,
            is_active: true,
            email_verified: false,
            email_verification_token: None,
            email_verification_expires_at: None,
            resend_verification_count: 0,
            last_verification_sent_at: None,
            deactivation_token: None,
            deactivation_expires_at: None,
            reactivation_token: None,
            reactivation_expires_at: None,
            reactivation_request_count: 0,
            last_reactivation_request_at: None,
            delete_request_token: None,
            delete_request_expires_at: None,
            delete_request_count: 0,
            last_delete_request_at: None,
            to_be_deleted: false,
            account_deleted_at: None,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires_at: None,
            password_reset_request_count: 0,
            last_password_reset_request_at: None,
            email_change_token: None,
            email_change_expires_at: None,
            email_change_request_count: 0,
            last_email_change_request_at: None,
            pending_email: None,
            pending_email_token: None,
            pending_email_expires_at: None,
            pending_email_verification_count: 0,
            email_change_locked_until: None,
            previous_emails: Vec::new(),
            login_attempts: 0,
            last_login_attempt_at: None,
            login_attempts_blocked: false,
            login_attempts_blocked_until: None,
            last_login_at: None,
            last_login_ip: None,
            is_locked: false,
            locked_at: None,
            locked_reason: None,
            locked_by: None,
            unlocked_at: None,
            unlocked_by: None,
            unlock_comment: None,
            is_banned: false,
            banned_at: None,
            banned_reason: None,
            banned_by: None,
            ban_period_days: None,
            unbanned_at: None,
            unbanned_by: None,
            unban_comment: None,
        }
    }

    pub fn has_role(&self, role: AccountRole) -> bool {
        self.roles.contains(&role)
    }

    /// Stored token state for a purpose: (secret, expiry)
    pub fn stored_token(&self, purpose: TokenPurpose) -> (Option<&str>, Option<DateTime<Utc>>) {
        match purpose {
            TokenPurpose::EmailVerification => (
                self.email_verification_token.as_deref(),
                self.email_verification_expires_at,
            ),
            TokenPurpose::PasswordReset => (
                self.password_reset_token.as_deref(),
                self.password_reset_expires_at,
            ),
            TokenPurpose::Deactivation => (
                self.deactivation_token.as_deref(),
                self.deactivation_expires_at,
            ),
            TokenPurpose::Reactivation => (
                self.reactivation_token.as_deref(),
                self.reactivation_expires_at,
            ),
            TokenPurpose::Deletion => (
                self.delete_request_token.as_deref(),
                self.delete_request_expires_at,
            ),
            TokenPurpose::EmailChange => (
                self.email_change_token.as_deref(),
                self.email_change_expires_at,
            ),
            TokenPurpose::NewEmailOwnership => (
                self.pending_email_token.as_deref(),
                self.pending_email_expires_at,
            ),
        }
    }

    /// Store a freshly issued token, replacing any previous one of the
    /// same purpose
    pub fn set_token(&mut self, purpose: TokenPurpose, token: &SensitiveToken) {
        let (slot, expiry) = self.token_slot(purpose);
        *slot = Some(token.secret.clone());
        *expiry = Some(token.expires_at);
    }

    /// Clear the token slot for a purpose (single-use consumption)
    pub fn clear_token(&mut self, purpose: TokenPurpose) {
        let (slot, expiry) = self.token_slot(purpose);
        *slot = None;
        *expiry = None;
    }

    fn token_slot(
        &mut self,
        purpose: TokenPurpose,
    ) -> (&mut Option<String>, &mut Option<DateTime<Utc>>) {
        match purpose {
            TokenPurpose::EmailVerification => (
                &mut self.email_verification_token,
                &mut self.email_verification_expires_at,
            ),
            TokenPurpose::PasswordReset => (
                &mut self.password_reset_token,
                &mut self.password_reset_expires_at,
            ),
            TokenPurpose::Deactivation => (
                &mut self.deactivation_token,
                &mut self.deactivation_expires_at,
            ),
            TokenPurpose::Reactivation => (
                &mut self.reactivation_token,
                &mut self.reactivation_expires_at,
            ),
            TokenPurpose::Deletion => (
                &mut self.delete_request_token,
                &mut self.delete_request_expires_at,
            ),
            TokenPurpose::EmailChange => (
                &mut self.email_change_token,
                &mut self.email_change_expires_at,
            ),
            TokenPurpose::NewEmailOwnership => (
                &mut self.pending_email_token,
                &mut self.pending_email_expires_at,
            ),
        }
    }
}
