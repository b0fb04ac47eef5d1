/// Account lifecycle state machine.
///
/// One public operation per lifecycle transition. Every operation follows
/// the same discipline: acquire the per-account lock, load the record, check
/// guards, token validity, and attempt budgets, apply the transition in
/// memory, persist, and only then emit notification and scheduling intents.
/// A failure before the save emits nothing.
use crate::{
    account::{
        attempts::{self, AttemptOutcome, AttemptPolicy},
        guards::{self, AccessIntent},
        login_guard::{self, LoginFailure, LoginGate},
        model::{Account, AccountRole, EmailChangeRecord},
        password,
        token::{self, SensitiveToken, TokenCheck, TokenPurpose},
    },
    clock::Clock,
    config::SecurityPolicyConfig,
    error::{AppError, AppResult, RestrictionReason},
    metrics,
    notifier::{NotificationContext, NotificationKind, Notifier},
    repo::AccountRepository,
    scheduler::{DelayedAction, DelayedActionScheduler, JobKey},
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Who is performing an administrative action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationActor {
    /// A logged-in administrator
    Admin(Uuid),
    /// The background scheduler (auto-unban)
    System,
}

/// Per-account mutual exclusion.
///
/// Guard-check-then-mutate sequences on the same account are serialized
/// here; persistence itself stays last-write-wins.
#[derive(Default)]
struct AccountLocks {
    inner: StdMutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let cell = {
            let mut map = self.inner.lock().unwrap();
            Arc::clone(
                map.entry(id)
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        cell.lock_owned().await
    }
}

/// The orchestrator for all account state transitions
pub struct AccountLifecycle {
    repo: Arc<dyn AccountRepository>,
    notifier: Arc<dyn Notifier>,
    scheduler: Arc<dyn DelayedActionScheduler>,
    clock: Arc<dyn Clock>,
    policy: SecurityPolicyConfig,
    locks: AccountLocks,
}

impl AccountLifecycle {
    pub fn new(
        repo: Arc<dyn AccountRepository>,
        notifier: Arc<dyn Notifier>,
        scheduler: Arc<dyn DelayedActionScheduler>,
        clock: Arc<dyn Clock>,
        policy: SecurityPolicyConfig,
    ) -> Self {
        Self {
            repo,
            notifier,
            scheduler,
            clock,
            policy,
            locks: AccountLocks::default(),
        }
    }

    // ==================== Registration & login ====================

    /// Create a new account: active, email not yet verified, verification
    /// link sent
    pub async fn register(&self, email: &str, password_plain: &str) -> AppResult<Account> {
        validate_email(email)?;
        validate_password(password_plain)?;

        if self.repo.email_exists(email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let now = self.clock.now();
        let password_hash = password::hash(password_plain)?;
        let mut account = Account::new(email.to_string(), password_hash, now);

        let verification = self.issue_token(&mut account, TokenPurpose::EmailVerification, now);
        account.last_verification_sent_at = Some(now);

        self.repo.save(&account).await?;
        metrics::track_operation("register", true);
        tracing::info!("Registered account {} ({})", account.id, account.email);

        self.notify(
            NotificationKind::VerificationLink,
            &account,
            NotificationContext::with_token(&verification.secret),
        )
        .await;

        Ok(account)
    }

    /// Authenticate an account.
    ///
    /// Guard order: pending-deletion, admin lock, login throttle, then
    /// credentials, then the inactive/reactivation branch. A ban does not
    /// restrict login.
    pub async fn login(
        &self,
        email: &str,
        password_plain: &str,
        ip: Option<&str>,
    ) -> AppResult<Account> {
        let found = self.repo.load_by_email(email).await.map_err(|e| match e {
            // Unknown email and wrong password must be indistinguishable
            AppError::NotFound(_) => AppError::InvalidCredentials,
            other => other,
        })?;

        let _guard = self.locks.acquire(found.id).await;
        let mut account = self.repo.load(found.id).await?;
        let now = self.clock.now();

        if account.to_be_deleted {
            return Err(AppError::restricted(RestrictionReason::PendingDeletion));
        }
        if account.is_locked {
            return Err(AppError::restricted(RestrictionReason::Locked));
        }

        match login_guard::before_login(&mut account, now) {
            Err(hours_remaining) => {
                return Err(AppError::restricted(RestrictionReason::LoginLocked {
                    hours_remaining,
                }));
            }
            Ok(LoginGate::ClearedAfterBlock) => {
                // Counters must be persisted before credentials are evaluated
                self.repo.save(&account).await?;
            }
            Ok(LoginGate::Clear) => {}
        }

        if !password::verify(password_plain, &account.password_hash)? {
            let failure = login_guard::on_failure(
                &mut account,
                self.policy.login_max_attempts,
                self.policy.login_block(),
                now,
            );
            self.repo.save(&account).await?;
            metrics::track_operation("login", false);

            if let LoginFailure::Blocked { until } = failure {
                metrics::LOGIN_LOCKOUTS_TOTAL.inc();
                tracing::warn!("Login blocked for account {} until {}", account.id, until);
                self.notify(
                    NotificationKind::LoginBlocked,
                    &account,
                    NotificationContext {
                        until: Some(until),
                        ..Default::default()
                    },
                )
                .await;
            }

            return Err(AppError::InvalidCredentials);
        }

        if !account.is_active {
            // Credentials are valid, so the owner is asking: route into the
            // reactivation flow and reject the login itself
            return Err(self.handle_inactive_login(&mut account, now).await);
        }

        login_guard::on_success(&mut account, now, ip);
        self.repo.save(&account).await?;
        metrics::track_operation("login", true);
        tracing::debug!("Login for account {}", account.id);

        Ok(account)
    }

    /// Inactive account attempted a credentialed login: issue a reactivation
    /// token inside the reactivation attempt budget and reject the login.
    async fn handle_inactive_login(
        &self,
        account: &mut Account,
        now: DateTime<Utc>,
    ) -> AppError {
        let outcome = attempts::record(
            account.reactivation_request_count,
            account.last_reactivation_request_at,
            &self.reactivation_policy(),
            now,
        );

        match outcome {
            AttemptOutcome::RateLimited { retry_after } => AppError::RateLimitExceeded {
                retry_after: retry_after.to_std().unwrap_or_default(),
            },
            AttemptOutcome::Proceed { count, at } => {
                account.reactivation_request_count = count;
                account.last_reactivation_request_at = Some(at);
                let reactivation = self.issue_token(account, TokenPurpose::Reactivation, now);

                if let Err(e) = self.repo.save(account).await {
                    return e;
                }

                self.notify(
                    NotificationKind::ReactivationLink,
                    account,
                    NotificationContext::with_token(&reactivation.secret),
                )
                .await;

                AppError::restricted(RestrictionReason::Inactive)
            }
        }
    }

    // ==================== Email verification ====================

    /// Mark the email address verified using the emailed token
    pub async fn verify_email(&self, supplied: &str) -> AppResult<Account> {
        let (_guard, mut account) = self
            .locked_account_for_token(TokenPurpose::EmailVerification, supplied)
            .await?;

        account.email_verified = true;
        account.clear_token(TokenPurpose::EmailVerification);
        account.resend_verification_count = 0;

        self.repo.save(&account).await?;
        tracing::info!("Email verified for account {}", account.id);

        self.notify(
            NotificationKind::EmailVerified,
            &account,
            NotificationContext::default(),
        )
        .await;

        Ok(account)
    }

    /// Send a fresh verification link to a not-yet-verified account
    pub async fn resend_verification(&self, email: &str) -> AppResult<Account> {
        let found = self.repo.load_by_email(email).await?;
        let _guard = self.locks.acquire(found.id).await;
        let mut account = self.repo.load(found.id).await?;

        if account.email_verified {
            return Err(AppError::Validation(
                "Email address is already verified".to_string(),
            ));
        }

        let now = self.clock.now();
        let verification = self.issue_token(&mut account, TokenPurpose::EmailVerification, now);
        account.resend_verification_count += 1;
        account.last_verification_sent_at = Some(now);

        self.repo.save(&account).await?;

        self.notify(
            NotificationKind::VerificationLink,
            &account,
            NotificationContext::with_token(&verification.secret),
        )
        .await;

        Ok(account)
    }

    // ==================== Password reset ====================

    /// Request a password reset link, inside the reset attempt budget
    pub async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        let found = self.repo.load_by_email(email).await?;
        let _guard = self.locks.acquire(found.id).await;
        let mut account = self.repo.load(found.id).await?;
        let now = self.clock.now();

        let outcome = attempts::record(
            account.password_reset_request_count,
            account.last_password_reset_request_at,
            &self.password_reset_policy(),
            now,
        );
        let (count, at) = match outcome {
            AttemptOutcome::RateLimited { retry_after } => {
                return Err(AppError::RateLimitExceeded {
                    retry_after: retry_after.to_std().unwrap_or_default(),
                });
            }
            AttemptOutcome::Proceed { count, at } => (count, at),
        };

        account.password_reset_request_count = count;
        account.last_password_reset_request_at = Some(at);
        let reset = self.issue_token(&mut account, TokenPurpose::PasswordReset, now);

        self.repo.save(&account).await?;

        self.notify(
            NotificationKind::PasswordResetLink,
            &account,
            NotificationContext::with_token(&reset.secret),
        )
        .await;

        Ok(())
    }

    /// Set a new password using the emailed reset token
    pub async fn reset_password(&self, supplied: &str, new_password: &str) -> AppResult<Account> {
        validate_password(new_password)?;

        let (_guard, mut account) = self
            .locked_account_for_token(TokenPurpose::PasswordReset, supplied)
            .await?;
        let now = self.clock.now();

        account.password_hash = password::hash(new_password)?;
        account.password_changed_at = Some(now);
        account.clear_token(TokenPurpose::PasswordReset);
        account.password_reset_request_count = 0;
        account.last_password_reset_request_at = None;

        self.repo.save(&account).await?;
        tracing::info!("Password reset for account {}", account.id);

        self.notify(
            NotificationKind::PasswordChanged,
            &account,
            NotificationContext::default(),
        )
        .await;

        Ok(account)
    }

    // ==================== Deactivation & reactivation ====================

    /// Start deactivation: send a confirmation link to the account's email
    pub async fn request_deactivation(&self, account_id: Uuid) -> AppResult<()> {
        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.authorize_write(account_id).await?;
        let now = self.clock.now();

        let deactivation = self.issue_token(&mut account, TokenPurpose::Deactivation, now);
        self.repo.save(&account).await?;

        self.notify(
            NotificationKind::DeactivationLink,
            &account,
            NotificationContext::with_token(&deactivation.secret),
        )
        .await;

        Ok(())
    }

    /// Complete deactivation using the emailed token
    pub async fn confirm_deactivation(&self, supplied: &str) -> AppResult<Account> {
        let (_guard, mut account) = self
            .locked_account_for_token(TokenPurpose::Deactivation, supplied)
            .await?;

        account.is_active = false;
        account.clear_token(TokenPurpose::Deactivation);

        self.repo.save(&account).await?;
        tracing::info!("Account {} deactivated", account.id);

        self.notify(
            NotificationKind::AccountDeactivated,
            &account,
            NotificationContext::default(),
        )
        .await;

        Ok(account)
    }

    /// Reactivate a deactivated account using the emailed token
    pub async fn activate_account(&self, supplied: &str) -> AppResult<Account> {
        let (_guard, mut account) = self
            .locked_account_for_token(TokenPurpose::Reactivation, supplied)
            .await?;

        account.is_active = true;
        account.clear_token(TokenPurpose::Reactivation);
        account.reactivation_request_count = 0;
        account.last_reactivation_request_at = None;

        self.repo.save(&account).await?;
        tracing::info!("Account {} reactivated", account.id);

        self.notify(
            NotificationKind::AccountReactivated,
            &account,
            NotificationContext::default(),
        )
        .await;

        Ok(account)
    }

    // ==================== Email change ====================

    /// Start an email change: confirmation link goes to the *current*
    /// address, inside the email-change budget and re-change cool-down
    pub async fn request_email_change(
        &self,
        account_id: Uuid,
        new_email: &str,
    ) -> AppResult<()> {
        validate_email(new_email)?;

        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.authorize_write(account_id).await?;
        let now = self.clock.now();

        if new_email == account.email {
            return Err(AppError::Validation(
                "New email matches the current address".to_string(),
            ));
        }
        if self.repo.email_exists(new_email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        if let Some(until) = account.email_change_locked_until {
            if now < until {
                return Err(AppError::RateLimitExceeded {
                    retry_after: (until - now).to_std().unwrap_or_default(),
                });
            }
        }

        let outcome = attempts::record(
            account.email_change_request_count,
            account.last_email_change_request_at,
            &self.email_change_policy(),
            now,
        );
        let (count, at) = match outcome {
            AttemptOutcome::RateLimited { retry_after } => {
                return Err(AppError::RateLimitExceeded {
                    retry_after: retry_after.to_std().unwrap_or_default(),
                });
            }
            AttemptOutcome::Proceed { count, at } => (count, at),
        };

        account.email_change_request_count = count;
        account.last_email_change_request_at = Some(at);
        account.pending_email = Some(new_email.to_string());
        // An ownership token from an earlier in-flight change was issued for
        // a different pending address; it dies with that request
        account.clear_token(TokenPurpose::NewEmailOwnership);
        let change = self.issue_token(&mut account, TokenPurpose::EmailChange, now);

        self.repo.save(&account).await?;

        self.notify(
            NotificationKind::EmailChangeConfirmLink,
            &account,
            NotificationContext::with_token(&change.secret),
        )
        .await;

        Ok(())
    }

    /// Current address confirmed the change: prove ownership of the new
    /// address next. The ownership token is bound to the pending address
    /// stored alongside it; a newer change request replaces both together.
    pub async fn confirm_email_change(&self, supplied: &str) -> AppResult<()> {
        let (_guard, mut account) = self
            .locked_account_for_token(TokenPurpose::EmailChange, supplied)
            .await?;

        let Some(pending_email) = account.pending_email.clone() else {
            return Err(AppError::InvalidOrExpiredToken);
        };

        let now = self.clock.now();
        let ownership = self.issue_token(&mut account, TokenPurpose::NewEmailOwnership, now);
        account.pending_email_verification_count += 1;
        account.clear_token(TokenPurpose::EmailChange);

        self.repo.save(&account).await?;

        self.notify(
            NotificationKind::NewEmailVerificationLink,
            &account,
            NotificationContext {
                token: Some(ownership.secret),
                target_email: Some(pending_email),
                ..Default::default()
            },
        )
        .await;

        Ok(())
    }

    /// New address proved ownership: swap it in, log the old address, and
    /// start the re-change cool-down. Both old and new addresses are told.
    pub async fn verify_new_email(&self, supplied: &str) -> AppResult<Account> {
        let (_guard, mut account) = self
            .locked_account_for_token(TokenPurpose::NewEmailOwnership, supplied)
            .await?;

        let Some(new_email) = account.pending_email.clone() else {
            return Err(AppError::InvalidOrExpiredToken);
        };

        let now = self.clock.now();
        let old_email = account.email.clone();

        account.previous_emails.push(EmailChangeRecord {
            email: old_email.clone(),
            changed_at: now,
        });
        account.email = new_email;
        account.email_verified = true;
        account.email_change_locked_until = Some(now + self.policy.email_change_cooldown());
        account.pending_email = None;
        account.clear_token(TokenPurpose::NewEmailOwnership);
        account.email_change_request_count = 0;
        account.last_email_change_request_at = None;
        account.pending_email_verification_count = 0;

        self.repo.save(&account).await?;
        tracing::info!(
            "Email changed for account {} ({} -> {})",
            account.id,
            old_email,
            account.email
        );

        self.notify(
            NotificationKind::EmailChanged,
            &account,
            NotificationContext {
                old_email: Some(old_email),
                ..Default::default()
            },
        )
        .await;

        Ok(account)
    }

    // ==================== Administrative restriction ====================

    /// Lock an account (admin)
    pub async fn lock_account(
        &self,
        actor: ModerationActor,
        account_id: Uuid,
        reason: &str,
    ) -> AppResult<Account> {
        let actor_label = self.require_admin(&actor).await?;

        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.repo.load(account_id).await?;

        if account.is_locked {
            return Err(AppError::Conflict("Account is already locked".to_string()));
        }

        let now = self.clock.now();
        account.is_locked = true;
        account.locked_at = Some(now);
        account.locked_reason = Some(reason.to_string());
        account.locked_by = Some(actor_label);

        self.repo.save(&account).await?;
        tracing::info!("Account {} locked: {}", account.id, reason);

        self.notify(
            NotificationKind::AccountLocked,
            &account,
            NotificationContext {
                reason: Some(reason.to_string()),
                ..Default::default()
            },
        )
        .await;

        Ok(account)
    }

    /// Unlock a locked account (admin)
    pub async fn unlock_account(
        &self,
        actor: ModerationActor,
        account_id: Uuid,
        comment: Option<String>,
    ) -> AppResult<Account> {
        let actor_label = self.require_admin(&actor).await?;

        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.repo.load(account_id).await?;

        if !account.is_locked {
            return Err(AppError::Validation("Account is not locked".to_string()));
        }

        let now = self.clock.now();
        account.is_locked = false;
        account.unlocked_at = Some(now);
        account.unlocked_by = Some(actor_label);
        account.unlock_comment = comment;

        self.repo.save(&account).await?;
        tracing::info!("Account {} unlocked", account.id);

        self.notify(
            NotificationKind::AccountUnlocked,
            &account,
            NotificationContext::default(),
        )
        .await;

        Ok(account)
    }

    /// Ban an account (admin). With a period, an auto-unban job is queued
    /// under a stable key; without one the ban stands until lifted manually.
    pub async fn ban_account(
        &self,
        actor: ModerationActor,
        account_id: Uuid,
        reason: &str,
        period_days: Option<i64>,
    ) -> AppResult<Account> {
        if matches!(period_days, Some(days) if days <= 0) {
            return Err(AppError::Validation(
                "Ban period must be at least one day".to_string(),
            ));
        }

        let actor_label = self.require_admin(&actor).await?;

        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.repo.load(account_id).await?;

        if account.is_banned {
            return Err(AppError::Conflict("Account is already banned".to_string()));
        }

        let now = self.clock.now();
        account.is_banned = true;
        account.banned_at = Some(now);
        account.banned_reason = Some(reason.to_string());
        account.banned_by = Some(actor_label);
        account.ban_period_days = period_days;

        self.repo.save(&account).await?;
        tracing::info!(
            "Account {} banned: {} (period: {:?} days)",
            account.id,
            reason,
            period_days
        );

        self.notify(
            NotificationKind::AccountBanned,
            &account,
            NotificationContext {
                reason: Some(reason.to_string()),
                until: period_days.map(|days| now + Duration::days(days)),
                ..Default::default()
            },
        )
        .await;

        if let Some(days) = period_days {
            let delay = std::time::Duration::from_secs((days as u64) * 24 * 3600);
            if let Err(e) = self
                .scheduler
                .schedule(
                    JobKey::unban(account_id),
                    DelayedAction::Unban { account_id },
                    delay,
                )
                .await
            {
                tracing::error!(
                    "Failed to schedule auto-unban for account {}: {}",
                    account_id,
                    e
                );
            }
        }

        Ok(account)
    }

    /// Lift a ban (admin or the auto-unban job). Idempotent: unbanning an
    /// account that is not banned is a no-op, so a redundant scheduled unban
    /// is harmless.
    pub async fn unban_account(
        &self,
        actor: ModerationActor,
        account_id: Uuid,
        comment: Option<String>,
    ) -> AppResult<Account> {
        let actor_label = self.require_admin(&actor).await?;

        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.repo.load(account_id).await?;

        if !account.is_banned {
            tracing::debug!("Account {} is not banned, unban is a no-op", account.id);
            return Ok(account);
        }

        let now = self.clock.now();
        account.is_banned = false;
        account.unbanned_at = Some(now);
        account.unbanned_by = Some(actor_label);
        account.unban_comment = comment;

        self.repo.save(&account).await?;
        tracing::info!("Account {} unbanned", account.id);

        self.notify(
            NotificationKind::AccountUnbanned,
            &account,
            NotificationContext::default(),
        )
        .await;

        // Drop the pending auto-unban if it is still queued; a job that
        // already fired (or never existed) leaves nothing to cancel
        match self.scheduler.cancel(&JobKey::unban(account_id)).await {
            Ok(()) | Err(AppError::NotFound(_)) => {}
            Err(e) => tracing::warn!(
                "Failed to cancel auto-unban for account {}: {}",
                account_id,
                e
            ),
        }

        Ok(account)
    }

    // ==================== Deletion ====================

    /// Start account deletion: send a confirmation link
    pub async fn request_deletion(&self, account_id: Uuid) -> AppResult<()> {
        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.authorize_write(account_id).await?;
        let now = self.clock.now();

        account.delete_request_count += 1;
        account.last_delete_request_at = Some(now);
        let deletion = self.issue_token(&mut account, TokenPurpose::Deletion, now);

        self.repo.save(&account).await?;

        self.notify(
            NotificationKind::DeletionConfirmLink,
            &account,
            NotificationContext::with_token(&deletion.secret),
        )
        .await;

        Ok(())
    }

    /// Confirm deletion: enter the grace period and queue the hard delete.
    /// An account already pending deletion rejects the confirmation before
    /// any token check, so the purge job can never be queued twice.
    pub async fn confirm_deletion(&self, supplied: &str) -> AppResult<Account> {
        let found = self
            .repo
            .find_by_token(TokenPurpose::Deletion, supplied)
            .await
            .map_err(not_found_to_invalid_token)?;

        let _guard = self.locks.acquire(found.id).await;
        let mut account = self.repo.load(found.id).await?;

        if account.to_be_deleted {
            return Err(AppError::restricted(RestrictionReason::PendingDeletion));
        }

        let now = self.clock.now();
        let (stored, expiry) = account.stored_token(TokenPurpose::Deletion);
        if token::validate(stored, expiry, supplied, now) != TokenCheck::Valid {
            return Err(AppError::InvalidOrExpiredToken);
        }

        account.to_be_deleted = true;
        account.account_deleted_at = Some(now);
        account.clear_token(TokenPurpose::Deletion);

        self.repo.save(&account).await?;
        metrics::track_operation("confirm_deletion", true);
        tracing::info!(
            "Account {} scheduled for deletion after {} day grace period",
            account.id,
            self.policy.deletion_grace_days
        );

        self.notify(
            NotificationKind::DeletionScheduled,
            &account,
            NotificationContext::default(),
        )
        .await;

        let delay =
            std::time::Duration::from_secs((self.policy.deletion_grace_days as u64) * 24 * 3600);
        if let Err(e) = self
            .scheduler
            .schedule(
                JobKey::purge(account.id),
                DelayedAction::PurgeAccount {
                    account_id: account.id,
                },
                delay,
            )
            .await
        {
            tracing::error!("Failed to schedule purge for account {}: {}", account.id, e);
        }

        Ok(account)
    }

    /// Abort a pending deletion during the grace period
    pub async fn cancel_deletion(&self, account_id: Uuid) -> AppResult<Account> {
        let _guard = self.locks.acquire(account_id).await;
        let mut account = self.repo.load(account_id).await?;

        if !account.to_be_deleted {
            return Err(AppError::Validation(
                "No deletion is pending for this account".to_string(),
            ));
        }

        account.to_be_deleted = false;
        account.account_deleted_at = None;

        self.repo.save(&account).await?;
        tracing::info!("Deletion cancelled for account {}", account.id);

        match self.scheduler.cancel(&JobKey::purge(account_id)).await {
            Ok(()) | Err(AppError::NotFound(_)) => {}
            Err(e) => tracing::warn!(
                "Failed to cancel purge job for account {}: {}",
                account_id,
                e
            ),
        }

        Ok(account)
    }

    /// Hard-delete an account whose grace period has elapsed (purge job).
    /// Skips accounts whose deletion was cancelled in the meantime.
    pub async fn purge_account(&self, account_id: Uuid) -> AppResult<()> {
        let _guard = self.locks.acquire(account_id).await;

        let account = match self.repo.load(account_id).await {
            Ok(account) => account,
            Err(AppError::NotFound(_)) => {
                tracing::debug!("Account {} already gone, nothing to purge", account_id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if !account.to_be_deleted {
            tracing::info!(
                "Deletion for account {} was cancelled, skipping purge",
                account_id
            );
            return Ok(());
        }

        let now = self.clock.now();
        if let Some(confirmed_at) = account.account_deleted_at {
            if now < confirmed_at + self.policy.deletion_grace() {
                tracing::warn!(
                    "Purge for account {} fired before the grace period elapsed, skipping",
                    account_id
                );
                return Ok(());
            }
        }

        self.repo.delete(account_id).await?;
        metrics::track_operation("purge_account", true);
        tracing::info!("Purged account {} after grace period", account_id);

        Ok(())
    }

    // ==================== Reading reminders ====================

    /// Queue a reading reminder; rejects if one is already queued
    pub async fn schedule_reading_reminder(
        &self,
        account_id: Uuid,
        delay: std::time::Duration,
    ) -> AppResult<()> {
        self.repo.load(account_id).await?;

        self.scheduler
            .schedule(
                JobKey::reading_reminder(account_id),
                DelayedAction::ReadingReminder { account_id },
                delay,
            )
            .await?;

        Ok(())
    }

    /// Move an already-queued reading reminder; rejects if none is queued
    pub async fn reschedule_reading_reminder(
        &self,
        account_id: Uuid,
        delay: std::time::Duration,
    ) -> AppResult<()> {
        self.scheduler
            .reschedule(&JobKey::reading_reminder(account_id), delay)
            .await?;

        Ok(())
    }

    /// Drop a queued reading reminder; rejects if none is queued
    pub async fn cancel_reading_reminder(&self, account_id: Uuid) -> AppResult<()> {
        self.scheduler
            .cancel(&JobKey::reading_reminder(account_id))
            .await
    }

    /// Deliver a due reading reminder (dispatcher entry point)
    pub async fn deliver_reading_reminder(&self, account_id: Uuid) -> AppResult<()> {
        let account = match self.repo.load(account_id).await {
            Ok(account) => account,
            Err(AppError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        if !account.is_active || account.to_be_deleted {
            tracing::debug!(
                "Skipping reading reminder for restricted account {}",
                account_id
            );
            return Ok(());
        }

        self.notify(
            NotificationKind::ReadingReminder,
            &account,
            NotificationContext::default(),
        )
        .await;

        Ok(())
    }

    // ==================== Shared guards & helpers ====================

    /// Load an account by id (read-only)
    pub async fn account(&self, account_id: Uuid) -> AppResult<Account> {
        self.repo.load(account_id).await
    }

    /// Load an account and run the write-intent guard chain
    pub async fn authorize_write(&self, account_id: Uuid) -> AppResult<Account> {
        let account = self.repo.load(account_id).await?;
        guards::check_restrictions(&account, AccessIntent::Write)
            .map_err(AppError::restricted)?;
        Ok(account)
    }

    fn reactivation_policy(&self) -> AttemptPolicy {
        AttemptPolicy::new(
            self.policy.reactivation_max_attempts,
            Duration::hours(self.policy.reactivation_window_hours),
        )
    }

    fn password_reset_policy(&self) -> AttemptPolicy {
        AttemptPolicy::new(
            self.policy.password_reset_max_attempts,
            Duration::hours(self.policy.password_reset_window_hours),
        )
    }

    fn email_change_policy(&self) -> AttemptPolicy {
        AttemptPolicy::new(
            self.policy.email_change_max_attempts,
            Duration::hours(self.policy.email_change_window_hours),
        )
    }

    fn issue_token(
        &self,
        account: &mut Account,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> SensitiveToken {
        let issued = token::issue(self.policy.token_ttl(), now);
        account.set_token(purpose, &issued);
        issued
    }

    /// Locate the account holding a token, lock it, reload it, and validate
    /// the token against the stored state under the lock.
    async fn locked_account_for_token(
        &self,
        purpose: TokenPurpose,
        supplied: &str,
    ) -> AppResult<(OwnedMutexGuard<()>, Account)> {
        let found = self
            .repo
            .find_by_token(purpose, supplied)
            .await
            .map_err(not_found_to_invalid_token)?;

        let guard = self.locks.acquire(found.id).await;
        let account = self.repo.load(found.id).await?;

        let (stored, expiry) = account.stored_token(purpose);
        if token::validate(stored, expiry, supplied, self.clock.now()) != TokenCheck::Valid {
            return Err(AppError::InvalidOrExpiredToken);
        }

        Ok((guard, account))
    }

    async fn require_admin(&self, actor: &ModerationActor) -> AppResult<String> {
        match actor {
            ModerationActor::System => Ok("system".to_string()),
            ModerationActor::Admin(id) => {
                let account = self.repo.load(*id).await?;
                if !account.has_role(AccountRole::Admin) {
                    return Err(AppError::Authorization("Admin role required".to_string()));
                }
                Ok(account.email)
            }
        }
    }

    /// Hand a notification to the notifier; delivery failures are logged
    /// and swallowed
    async fn notify(
        &self,
        kind: NotificationKind,
        account: &Account,
        context: NotificationContext,
    ) {
        match self.notifier.notify(kind, account, &context).await {
            Ok(()) => {
                metrics::NOTIFICATIONS_TOTAL
                    .with_label_values(&[kind.as_str(), "ok"])
                    .inc();
            }
            Err(e) => {
                metrics::NOTIFICATIONS_TOTAL
                    .with_label_values(&[kind.as_str(), "error"])
                    .inc();
                tracing::warn!(
                    "Failed to send {} notification for account {}: {}",
                    kind.as_str(),
                    account.id,
                    e
                );
            }
        }
    }
}

fn not_found_to_invalid_token(e: AppError) -> AppError {
    match e {
        AppError::NotFound(_) => AppError::InvalidOrExpiredToken,
        other => other,
    }
}

fn validate_email(email: &str) -> AppResult<()> {
    if !email.contains('@') || email.len() < 3 {
        return Err(AppError::Validation("Invalid email format".to_string()));
    }
    if email.len() > 254 {
        return Err(AppError::Validation("Email too long".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if password.len() > 512 {
        return Err(AppError::Validation("Password too long".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repo::InMemoryAccountRepository;
    use crate::scheduler::JobHandle;
    use std::sync::Mutex;

    const PASSWORD: &str = "correct horse battery";

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(NotificationKind, String)>>,
    }

    impl RecordingNotifier {
        fn kinds(&self) -> Vec<NotificationKind> {
            self.sent.lock().unwrap().iter().map(|(k, _)| *k).collect()
        }

        fn count(&self, kind: NotificationKind) -> usize {
            self.kinds().iter().filter(|k| **k == kind).count()
        }

        fn last_target(&self) -> Option<String> {
            self.sent.lock().unwrap().last().map(|(_, t)| t.clone())
        }

        fn is_empty(&self) -> bool {
            self.sent.lock().unwrap().is_empty()
        }
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            kind: NotificationKind,
            account: &Account,
            context: &NotificationContext,
        ) -> AppResult<()> {
            let target = context
                .target_email
                .clone()
                .unwrap_or_else(|| account.email.clone());
            self.sent.lock().unwrap().push((kind, target));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingScheduler {
        jobs: Mutex<HashMap<JobKey, DelayedAction>>,
        // Every schedule that was ever accepted, in order
        accepted: Mutex<Vec<JobKey>>,
    }

    impl RecordingScheduler {
        fn accepted_count(&self, key: &JobKey) -> usize {
            self.accepted
                .lock()
                .unwrap()
                .iter()
                .filter(|k| *k == key)
                .count()
        }
    }

    #[async_trait::async_trait]
    impl DelayedActionScheduler for RecordingScheduler {
        async fn schedule(
            &self,
            key: JobKey,
            action: DelayedAction,
            delay: std::time::Duration,
        ) -> AppResult<JobHandle> {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(&key) {
                return Err(AppError::Conflict(format!(
                    "Job {} is already scheduled",
                    key.as_str()
                )));
            }
            jobs.insert(key.clone(), action.clone());
            self.accepted.lock().unwrap().push(key.clone());

            Ok(JobHandle {
                key,
                action,
                run_at: Utc::now() + Duration::from_std(delay).unwrap(),
            })
        }

        async fn find(&self, key: &JobKey) -> Option<JobHandle> {
            self.jobs.lock().unwrap().get(key).map(|action| JobHandle {
                key: key.clone(),
                action: action.clone(),
                run_at: Utc::now(),
            })
        }

        async fn reschedule(
            &self,
            key: &JobKey,
            _delay: std::time::Duration,
        ) -> AppResult<JobHandle> {
            let jobs = self.jobs.lock().unwrap();
            let action = jobs.get(key).ok_or_else(|| {
                AppError::NotFound(format!("Job {} is not scheduled", key.as_str()))
            })?;

            Ok(JobHandle {
                key: key.clone(),
                action: action.clone(),
                run_at: Utc::now(),
            })
        }

        async fn cancel(&self, key: &JobKey) -> AppResult<()> {
            self.jobs
                .lock()
                .unwrap()
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| {
                    AppError::NotFound(format!("Job {} is not scheduled", key.as_str()))
                })
        }
    }

    /// Repository whose saves always fail; reads delegate to the inner store
    struct SaveFailRepo {
        inner: InMemoryAccountRepository,
    }

    #[async_trait::async_trait]
    impl AccountRepository for SaveFailRepo {
        async fn load(&self, id: Uuid) -> AppResult<Account> {
            self.inner.load(id).await
        }
        async fn load_by_email(&self, email: &str) -> AppResult<Account> {
            self.inner.load_by_email(email).await
        }
        async fn find_by_token(&self, purpose: TokenPurpose, secret: &str) -> AppResult<Account> {
            self.inner.find_by_token(purpose, secret).await
        }
        async fn email_exists(&self, email: &str) -> AppResult<bool> {
            self.inner.email_exists(email).await
        }
        async fn save(&self, _account: &Account) -> AppResult<()> {
            Err(AppError::Internal("storage unavailable".to_string()))
        }
        async fn delete(&self, id: Uuid) -> AppResult<()> {
            self.inner.delete(id).await
        }
    }

    struct Harness {
        lifecycle: AccountLifecycle,
        repo: Arc<InMemoryAccountRepository>,
        notifier: Arc<RecordingNotifier>,
        scheduler: Arc<RecordingScheduler>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let repo = Arc::new(InMemoryAccountRepository::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = Arc::new(RecordingScheduler::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let lifecycle = AccountLifecycle::new(
            Arc::clone(&repo) as Arc<dyn AccountRepository>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::clone(&scheduler) as Arc<dyn DelayedActionScheduler>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            SecurityPolicyConfig::default(),
        );

        Harness {
            lifecycle,
            repo,
            notifier,
            scheduler,
            clock,
        }
    }

    async fn register(h: &Harness, email: &str) -> Account {
        h.lifecycle.register(email, PASSWORD).await.unwrap()
    }

    async fn seed_admin(h: &Harness, email: &str) -> Account {
        let mut admin = register(h, email).await;
        admin.roles.push(AccountRole::Admin);
        h.repo.save(&admin).await.unwrap();
        admin
    }

    // ==================== Registration & verification ====================

    #[tokio::test]
    async fn register_issues_verification_token_and_sends_link() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        let (stored, expiry) = account.stored_token(TokenPurpose::EmailVerification);
        assert!(stored.is_some());
        assert_eq!(expiry, Some(h.clock.now() + Duration::hours(1)));
        assert!(!account.email_verified);
        assert_eq!(h.notifier.count(NotificationKind::VerificationLink), 1);
    }

    #[tokio::test]
    async fn duplicate_email_registration_conflicts() {
        let h = harness();
        register(&h, "reader@example.com").await;

        let result = h.lifecycle.register("reader@example.com", PASSWORD).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn verify_email_consumes_the_token() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;
        let token = account.email_verification_token.clone().unwrap();

        let verified = h.lifecycle.verify_email(&token).await.unwrap();
        assert!(verified.email_verified);
        assert_eq!(
            verified.stored_token(TokenPurpose::EmailVerification),
            (None, None)
        );
        assert_eq!(h.notifier.count(NotificationKind::EmailVerified), 1);

        // Single use
        let reuse = h.lifecycle.verify_email(&token).await;
        assert!(matches!(reuse, Err(AppError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn expired_verification_token_is_rejected() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;
        let token = account.email_verification_token.clone().unwrap();

        h.clock.advance(Duration::minutes(61));

        let result = h.lifecycle.verify_email(&token).await;
        assert!(matches!(result, Err(AppError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn resend_verification_counts_and_replaces_the_token() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;
        let first = account.email_verification_token.clone().unwrap();

        let resent = h
            .lifecycle
            .resend_verification("reader@example.com")
            .await
            .unwrap();
        assert_eq!(resent.resend_verification_count, 1);
        assert_ne!(resent.email_verification_token.as_deref(), Some(first.as_str()));

        // The replaced token no longer verifies
        let stale = h.lifecycle.verify_email(&first).await;
        assert!(matches!(stale, Err(AppError::InvalidOrExpiredToken)));
    }

    // ==================== Login guard ====================

    #[tokio::test]
    async fn login_lock_applies_on_the_fifth_failure_and_clears_after_the_window() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        for _ in 0..4 {
            let result = h
                .lifecycle
                .login("reader@example.com", "wrong password", None)
                .await;
            assert!(matches!(result, Err(AppError::InvalidCredentials)));
        }
        let stored = h.repo.load(account.id).await.unwrap();
        assert_eq!(stored.login_attempts, 4);
        assert!(!stored.login_attempts_blocked);

        // Fifth failure trips the block and fires the notice
        let fifth = h
            .lifecycle
            .login("reader@example.com", "wrong password", None)
            .await;
        assert!(matches!(fifth, Err(AppError::InvalidCredentials)));
        let blocked = h.repo.load(account.id).await.unwrap();
        assert!(blocked.login_attempts_blocked);
        assert_eq!(
            blocked.login_attempts_blocked_until,
            Some(h.clock.now() + Duration::minutes(30))
        );
        assert_eq!(h.notifier.count(NotificationKind::LoginBlocked), 1);

        // Correct password just before the deadline: still rejected
        h.clock.advance(Duration::minutes(30) - Duration::seconds(1));
        let early = h.lifecycle.login("reader@example.com", PASSWORD, None).await;
        assert!(matches!(
            early,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::LoginLocked { .. }
            })
        ));

        // Just past the deadline: counters clear, then credentials pass
        h.clock.advance(Duration::seconds(2));
        let late = h
            .lifecycle
            .login("reader@example.com", PASSWORD, Some("203.0.113.7"))
            .await
            .unwrap();
        assert_eq!(late.login_attempts, 0);
        assert!(!late.login_attempts_blocked);
        assert_eq!(late.last_login_ip.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let h = harness();
        register(&h, "reader@example.com").await;

        let unknown = h
            .lifecycle
            .login("nobody@example.com", PASSWORD, None)
            .await;
        let wrong = h
            .lifecycle
            .login("reader@example.com", "wrong password", None)
            .await;

        assert!(matches!(unknown, Err(AppError::InvalidCredentials)));
        assert!(matches!(wrong, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn login_guard_order_deletion_then_lock() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        let mut stored = h.repo.load(account.id).await.unwrap();
        stored.to_be_deleted = true;
        stored.is_locked = true;
        h.repo.save(&stored).await.unwrap();

        let result = h.lifecycle.login("reader@example.com", PASSWORD, None).await;
        assert!(matches!(
            result,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::PendingDeletion
            })
        ));

        stored.to_be_deleted = false;
        h.repo.save(&stored).await.unwrap();

        let result = h.lifecycle.login("reader@example.com", PASSWORD, None).await;
        assert!(matches!(
            result,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::Locked
            })
        ));
    }

    // ==================== Reactivation ====================

    #[tokio::test]
    async fn inactive_login_issues_reactivation_token_and_rejects() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        let mut stored = h.repo.load(account.id).await.unwrap();
        stored.is_active = false;
        h.repo.save(&stored).await.unwrap();

        let result = h.lifecycle.login("reader@example.com", PASSWORD, None).await;
        assert!(matches!(
            result,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::Inactive
            })
        ));

        let after = h.repo.load(account.id).await.unwrap();
        assert_eq!(after.reactivation_request_count, 1);
        assert!(after.reactivation_token.is_some());
        assert_eq!(h.notifier.count(NotificationKind::ReactivationLink), 1);

        // Wrong password on an inactive account leaks no reactivation mail
        let wrong = h
            .lifecycle
            .login("reader@example.com", "wrong password", None)
            .await;
        assert!(matches!(wrong, Err(AppError::InvalidCredentials)));
        assert_eq!(h.notifier.count(NotificationKind::ReactivationLink), 1);
    }

    #[tokio::test]
    async fn reactivation_budget_refills_after_the_window() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        let mut stored = h.repo.load(account.id).await.unwrap();
        stored.is_active = false;
        stored.reactivation_request_count = 4;
        stored.last_reactivation_request_at = Some(h.clock.now() - Duration::hours(49));
        h.repo.save(&stored).await.unwrap();

        // Window elapsed since the last attempt: budget refills and this
        // request counts as the first of the new window
        let result = h.lifecycle.login("reader@example.com", PASSWORD, None).await;
        assert!(matches!(
            result,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::Inactive
            })
        ));

        let after = h.repo.load(account.id).await.unwrap();
        assert_eq!(after.reactivation_request_count, 1);
    }

    #[tokio::test]
    async fn reactivation_budget_blocks_inside_the_window() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        let mut stored = h.repo.load(account.id).await.unwrap();
        stored.is_active = false;
        stored.reactivation_request_count = 4;
        stored.last_reactivation_request_at = Some(h.clock.now() - Duration::hours(1));
        h.repo.save(&stored).await.unwrap();

        let result = h.lifecycle.login("reader@example.com", PASSWORD, None).await;
        assert!(matches!(result, Err(AppError::RateLimitExceeded { .. })));
        // No token was issued on the limited attempt
        assert_eq!(h.notifier.count(NotificationKind::ReactivationLink), 0);
    }

    #[tokio::test]
    async fn activate_account_round_trip() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle.request_deactivation(account.id).await.unwrap();
        let token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .deactivation_token
            .unwrap();
        let deactivated = h.lifecycle.confirm_deactivation(&token).await.unwrap();
        assert!(!deactivated.is_active);
        assert_eq!(h.notifier.count(NotificationKind::AccountDeactivated), 1);

        // Login now routes into the reactivation flow
        let result = h.lifecycle.login("reader@example.com", PASSWORD, None).await;
        assert!(matches!(
            result,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::Inactive
            })
        ));

        let reactivation = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .reactivation_token
            .unwrap();
        let active = h.lifecycle.activate_account(&reactivation).await.unwrap();
        assert!(active.is_active);
        assert_eq!(active.reactivation_request_count, 0);
        assert_eq!(active.last_reactivation_request_at, None);

        h.lifecycle
            .login("reader@example.com", PASSWORD, None)
            .await
            .unwrap();
    }

    // ==================== Password reset ====================

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle
            .request_password_reset("reader@example.com")
            .await
            .unwrap();
        let token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .password_reset_token
            .unwrap();

        h.lifecycle
            .reset_password(&token, "a brand new password")
            .await
            .unwrap();
        assert_eq!(h.notifier.count(NotificationKind::PasswordChanged), 1);

        let reuse = h.lifecycle.reset_password(&token, "another password").await;
        assert!(matches!(reuse, Err(AppError::InvalidOrExpiredToken)));

        // The new password logs in
        h.lifecycle
            .login("reader@example.com", "a brand new password", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn password_reset_budget_reports_remaining_wait() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        let mut stored = h.repo.load(account.id).await.unwrap();
        stored.password_reset_request_count = 2;
        stored.last_password_reset_request_at = Some(h.clock.now() - Duration::hours(23));
        h.repo.save(&stored).await.unwrap();

        let limited = h
            .lifecycle
            .request_password_reset("reader@example.com")
            .await;
        match limited {
            Err(AppError::RateLimitExceeded { retry_after }) => {
                assert_eq!(retry_after.as_secs(), 3600);
            }
            other => panic!("expected RateLimitExceeded, got {:?}", other),
        }

        // Past the window the same request succeeds and restarts the counter
        stored.last_password_reset_request_at = Some(h.clock.now() - Duration::hours(25));
        h.repo.save(&stored).await.unwrap();

        h.lifecycle
            .request_password_reset("reader@example.com")
            .await
            .unwrap();
        let after = h.repo.load(account.id).await.unwrap();
        assert_eq!(after.password_reset_request_count, 1);
    }

    #[tokio::test]
    async fn reset_clears_the_attempt_counters() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle
            .request_password_reset("reader@example.com")
            .await
            .unwrap();
        let token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .password_reset_token
            .unwrap();
        h.lifecycle
            .reset_password(&token, "a brand new password")
            .await
            .unwrap();

        let after = h.repo.load(account.id).await.unwrap();
        assert_eq!(after.password_reset_request_count, 0);
        assert_eq!(after.last_password_reset_request_at, None);
        assert_eq!(after.password_changed_at, Some(h.clock.now()));
    }

    // ==================== Email change ====================

    #[tokio::test]
    async fn stale_email_change_token_is_rejected() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle
            .request_email_change(account.id, "first@example.com")
            .await
            .unwrap();
        let first_token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .email_change_token
            .unwrap();

        // A second request replaces the pending address and its token
        h.lifecycle
            .request_email_change(account.id, "second@example.com")
            .await
            .unwrap();

        let stale = h.lifecycle.confirm_email_change(&first_token).await;
        assert!(matches!(stale, Err(AppError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn ownership_token_is_bound_to_the_pending_address() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle
            .request_email_change(account.id, "first@example.com")
            .await
            .unwrap();
        let change_token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .email_change_token
            .unwrap();
        h.lifecycle.confirm_email_change(&change_token).await.unwrap();

        let ownership_for_first = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .pending_email_token
            .unwrap();

        // The user changes their mind before proving ownership
        h.lifecycle
            .request_email_change(account.id, "second@example.com")
            .await
            .unwrap();

        // The ownership token issued for the first address is dead
        let stale = h.lifecycle.verify_new_email(&ownership_for_first).await;
        assert!(matches!(stale, Err(AppError::InvalidOrExpiredToken)));
        let stored = h.repo.load(account.id).await.unwrap();
        assert_eq!(stored.email, "reader@example.com");
        assert_eq!(stored.pending_email.as_deref(), Some("second@example.com"));
    }

    #[tokio::test]
    async fn full_email_change_swaps_address_and_starts_cooldown() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle
            .request_email_change(account.id, "writer@example.com")
            .await
            .unwrap();
        let change_token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .email_change_token
            .unwrap();

        h.lifecycle.confirm_email_change(&change_token).await.unwrap();
        // The verify link goes to the new address
        assert_eq!(
            h.notifier.last_target().as_deref(),
            Some("writer@example.com")
        );

        let ownership = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .pending_email_token
            .unwrap();
        let changed = h.lifecycle.verify_new_email(&ownership).await.unwrap();

        assert_eq!(changed.email, "writer@example.com");
        assert_eq!(changed.previous_emails.len(), 1);
        assert_eq!(changed.previous_emails[0].email, "reader@example.com");
        assert_eq!(
            changed.email_change_locked_until,
            Some(h.clock.now() + Duration::days(100))
        );
        assert_eq!(changed.pending_email, None);
        assert_eq!(changed.email_change_request_count, 0);
        assert_eq!(h.notifier.count(NotificationKind::EmailChanged), 1);

        // Another change during the cool-down is refused with the wait time
        let again = h
            .lifecycle
            .request_email_change(account.id, "third@example.com")
            .await;
        assert!(matches!(again, Err(AppError::RateLimitExceeded { .. })));
    }

    // ==================== Ban & lock ====================

    #[tokio::test]
    async fn banned_account_can_login_but_not_write() {
        let h = harness();
        let admin = seed_admin(&h, "admin@example.com").await;
        let user = register(&h, "reader@example.com").await;

        h.lifecycle
            .ban_account(ModerationActor::Admin(admin.id), user.id, "spam", None)
            .await
            .unwrap();

        // Login is still possible while banned
        let login = h
            .lifecycle
            .login("reader@example.com", PASSWORD, None)
            .await
            .unwrap();
        assert!(login.is_banned);

        // Write-guarded operations are not
        let write = h
            .lifecycle
            .request_email_change(user.id, "new@example.com")
            .await;
        assert!(matches!(
            write,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::Banned
            })
        ));
    }

    #[tokio::test]
    async fn ban_with_period_schedules_auto_unban_and_manual_unban_cancels_it() {
        let h = harness();
        let admin = seed_admin(&h, "admin@example.com").await;
        let user = register(&h, "reader@example.com").await;
        let key = JobKey::unban(user.id);

        h.lifecycle
            .ban_account(ModerationActor::Admin(admin.id), user.id, "spam", Some(7))
            .await
            .unwrap();
        assert!(h.scheduler.find(&key).await.is_some());

        let unbanned = h
            .lifecycle
            .unban_account(
                ModerationActor::Admin(admin.id),
                user.id,
                Some("appeal accepted".to_string()),
            )
            .await
            .unwrap();
        assert!(!unbanned.is_banned);
        assert!(h.scheduler.find(&key).await.is_none());
        assert_eq!(h.notifier.count(NotificationKind::AccountUnbanned), 1);

        // Unban is idempotent: the redundant call changes nothing and sends
        // nothing
        h.lifecycle
            .unban_account(ModerationActor::System, user.id, None)
            .await
            .unwrap();
        assert_eq!(h.notifier.count(NotificationKind::AccountUnbanned), 1);
    }

    #[tokio::test]
    async fn non_admin_actors_cannot_moderate() {
        let h = harness();
        let user = register(&h, "reader@example.com").await;
        let other = register(&h, "other@example.com").await;

        let result = h
            .lifecycle
            .ban_account(ModerationActor::Admin(other.id), user.id, "grudge", None)
            .await;
        assert!(matches!(result, Err(AppError::Authorization(_))));
        assert!(h.notifier.count(NotificationKind::AccountBanned) == 0);
    }

    #[tokio::test]
    async fn lock_and_unlock_round_trip() {
        let h = harness();
        let admin = seed_admin(&h, "admin@example.com").await;
        let user = register(&h, "reader@example.com").await;

        let locked = h
            .lifecycle
            .lock_account(ModerationActor::Admin(admin.id), user.id, "ToS review")
            .await
            .unwrap();
        assert!(locked.is_locked);
        assert_eq!(locked.locked_by.as_deref(), Some("admin@example.com"));

        let login = h.lifecycle.login("reader@example.com", PASSWORD, None).await;
        assert!(matches!(
            login,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::Locked
            })
        ));

        let unlocked = h
            .lifecycle
            .unlock_account(
                ModerationActor::Admin(admin.id),
                user.id,
                Some("resolved".to_string()),
            )
            .await
            .unwrap();
        assert!(!unlocked.is_locked);

        h.lifecycle
            .login("reader@example.com", PASSWORD, None)
            .await
            .unwrap();
    }

    // ==================== Deletion ====================

    #[tokio::test]
    async fn confirmed_deletion_schedules_exactly_one_purge() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;
        let purge_key = JobKey::purge(account.id);

        h.lifecycle.request_deletion(account.id).await.unwrap();
        let token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .delete_request_token
            .unwrap();

        let pending = h.lifecycle.confirm_deletion(&token).await.unwrap();
        assert!(pending.to_be_deleted);
        assert_eq!(pending.account_deleted_at, Some(h.clock.now()));
        assert_eq!(h.scheduler.accepted_count(&purge_key), 1);
        assert_eq!(h.notifier.count(NotificationKind::DeletionScheduled), 1);

        // Even a second, freshly issued and unexpired token cannot confirm
        // again while the account is pending deletion
        let mut stored = h.repo.load(account.id).await.unwrap();
        let second = token::issue(Duration::hours(1), h.clock.now());
        stored.set_token(TokenPurpose::Deletion, &second);
        h.repo.save(&stored).await.unwrap();

        let again = h.lifecycle.confirm_deletion(&second.secret).await;
        assert!(matches!(
            again,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::PendingDeletion
            })
        ));
        assert_eq!(h.scheduler.accepted_count(&purge_key), 1);

        // And a fresh request is blocked by the write guard
        let request = h.lifecycle.request_deletion(account.id).await;
        assert!(matches!(
            request,
            Err(AppError::AccountRestricted {
                reason: RestrictionReason::PendingDeletion
            })
        ));
    }

    #[tokio::test]
    async fn cancel_deletion_recovers_the_account_and_drops_the_purge() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle.request_deletion(account.id).await.unwrap();
        let token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .delete_request_token
            .unwrap();
        h.lifecycle.confirm_deletion(&token).await.unwrap();

        let recovered = h.lifecycle.cancel_deletion(account.id).await.unwrap();
        assert!(!recovered.to_be_deleted);
        assert_eq!(recovered.account_deleted_at, None);
        assert!(h.scheduler.find(&JobKey::purge(account.id)).await.is_none());

        h.lifecycle
            .login("reader@example.com", PASSWORD, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn purge_deletes_only_after_the_grace_period() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle.request_deletion(account.id).await.unwrap();
        let token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .delete_request_token
            .unwrap();
        h.lifecycle.confirm_deletion(&token).await.unwrap();

        // Too early: the record stays
        h.lifecycle.purge_account(account.id).await.unwrap();
        assert!(h.repo.load(account.id).await.is_ok());

        h.clock.advance(Duration::days(30));
        h.lifecycle.purge_account(account.id).await.unwrap();
        assert!(matches!(
            h.repo.load(account.id).await,
            Err(AppError::NotFound(_))
        ));

        // Purging again is harmless
        h.lifecycle.purge_account(account.id).await.unwrap();
    }

    #[tokio::test]
    async fn purge_skips_cancelled_deletions() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle.request_deletion(account.id).await.unwrap();
        let token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .delete_request_token
            .unwrap();
        h.lifecycle.confirm_deletion(&token).await.unwrap();
        h.lifecycle.cancel_deletion(account.id).await.unwrap();

        h.clock.advance(Duration::days(31));
        h.lifecycle.purge_account(account.id).await.unwrap();
        assert!(h.repo.load(account.id).await.is_ok());
    }

    // ==================== Reading reminders ====================

    #[tokio::test]
    async fn reading_reminder_scheduling_semantics() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;
        let delay = std::time::Duration::from_secs(3600);

        // Reschedule before schedule: nothing to move
        let missing = h
            .lifecycle
            .reschedule_reading_reminder(account.id, delay)
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        h.lifecycle
            .schedule_reading_reminder(account.id, delay)
            .await
            .unwrap();

        // Create-style scheduling rejects a duplicate
        let duplicate = h
            .lifecycle
            .schedule_reading_reminder(account.id, delay)
            .await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        h.lifecycle
            .reschedule_reading_reminder(account.id, delay)
            .await
            .unwrap();
        h.lifecycle.cancel_reading_reminder(account.id).await.unwrap();

        let gone = h.lifecycle.cancel_reading_reminder(account.id).await;
        assert!(matches!(gone, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn due_reminders_skip_restricted_accounts() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;

        h.lifecycle
            .deliver_reading_reminder(account.id)
            .await
            .unwrap();
        assert_eq!(h.notifier.count(NotificationKind::ReadingReminder), 1);

        let mut stored = h.repo.load(account.id).await.unwrap();
        stored.to_be_deleted = true;
        h.repo.save(&stored).await.unwrap();

        h.lifecycle
            .deliver_reading_reminder(account.id)
            .await
            .unwrap();
        assert_eq!(h.notifier.count(NotificationKind::ReadingReminder), 1);
    }

    // ==================== Intent suppression ====================

    #[tokio::test]
    async fn failed_saves_emit_no_intents() {
        let h = harness();
        let account = register(&h, "reader@example.com").await;
        h.lifecycle.request_deletion(account.id).await.unwrap();
        let token = h
            .repo
            .load(account.id)
            .await
            .unwrap()
            .delete_request_token
            .unwrap();

        // Same store, but saves now fail
        let inner = InMemoryAccountRepository::new();
        inner.insert(h.repo.load(account.id).await.unwrap()).await;
        let failing = Arc::new(SaveFailRepo { inner });

        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = Arc::new(RecordingScheduler::default());
        let lifecycle = AccountLifecycle::new(
            failing,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::clone(&scheduler) as Arc<dyn DelayedActionScheduler>,
            Arc::new(ManualClock::new(h.clock.now())) as Arc<dyn Clock>,
            SecurityPolicyConfig::default(),
        );

        let result = lifecycle.confirm_deletion(&token).await;
        assert!(matches!(result, Err(AppError::Internal(_))));

        // No notification, no purge job: intents fire only after a
        // confirmed save
        assert!(notifier.is_empty());
        assert_eq!(scheduler.accepted_count(&JobKey::purge(account.id)), 0);
    }
}
