/// SQLite account repository using runtime sqlx queries
use crate::account::model::{Account, AccountRole, EmailChangeRecord};
use crate::account::token::TokenPurpose;
use crate::error::{AppError, AppResult};
use crate::repo::AccountRepository;
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

pub struct SqliteAccountRepository {
    db: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    fn token_column(purpose: TokenPurpose) -> &'static str {
        match purpose {
            TokenPurpose::EmailVerification => "email_verification_token",
            TokenPurpose::PasswordReset => "password_reset_token",
            TokenPurpose::Deactivation => "deactivation_token",
            TokenPurpose::Reactivation => "reactivation_token",
            TokenPurpose::Deletion => "delete_request_token",
            TokenPurpose::EmailChange => "email_change_token",
            TokenPurpose::NewEmailOwnership => "pending_email_token",
        }
    }

    fn row_to_account(row: &SqliteRow) -> AppResult<Account> {
        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| AppError::Internal(format!("Invalid account id in database: {}", e)))?;

        let roles: String = row.try_get("roles")?;
        let roles: Vec<AccountRole> = serde_json::from_str(&roles)
            .map_err(|e| AppError::Internal(format!("Invalid roles column: {}", e)))?;

        let previous_emails: String = row.try_get("previous_emails")?;
        let previous_emails: Vec<EmailChangeRecord> = serde_json::from_str(&previous_emails)
            .map_err(|e| AppError::Internal(format!("Invalid previous_emails column: {}", e)))?;

        Ok(Account {
            id,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            roles,
            created_at: row.try_get("created_at")?,
            is_active: row.try_get("is_active")?,
            email_verified: row.try_get("email_verified")?,
            email_verification_token: row.try_get("email_verification_token")?,
            email_verification_expires_at: row.try_get("email_verification_expires_at")?,
            resend_verification_count: row.try_get("resend_verification_count")?,
            last_verification_sent_at: row.try_get("last_verification_sent_at")?,
            deactivation_token: row.try_get("deactivation_token")?,
            deactivation_expires_at: row.try_get("deactivation_expires_at")?,
            reactivation_token: row.try_get("reactivation_token")?,
            reactivation_expires_at: row.try_get("reactivation_expires_at")?,
            reactivation_request_count: row.try_get("reactivation_request_count")?,
            last_reactivation_request_at: row.try_get("last_reactivation_request_at")?,
            delete_request_token: row.try_get("delete_request_token")?,
            delete_request_expires_at: row.try_get("delete_request_expires_at")?,
            delete_request_count: row.try_get("delete_request_count")?,
            last_delete_request_at: row.try_get("last_delete_request_at")?,
            to_be_deleted: row.try_get("to_be_deleted")?,
            account_deleted_at: row.try_get("account_deleted_at")?,
            password_changed_at: row.try_get("password_changed_at")?,
            password_reset_token: row.try_get("password_reset_token")?,
            password_reset_expires_at: row.try_get("password_reset_expires_at")?,
            password_reset_request_count: row.try_get("password_reset_request_count")?,
            last_password_reset_request_at: row.try_get("last_password_reset_request_at")?,
            email_change_token: row.try_get("email_change_token")?,
            email_change_expires_at: row.try_get("email_change_expires_at")?,
            email_change_request_count: row.try_get("email_change_request_count")?,
            last_email_change_request_at: row.try_get("last_email_change_request_at")?,
            pending_email: row.try_get("pending_email")?,
            pending_email_token: row.try_get("pending_email_token")?,
            pending_email_expires_at: row.try_get("pending_email_expires_at")?,
            pending_email_verification_count: row.try_get("pending_email_verification_count")?,
            email_change_locked_until: row.try_get("email_change_locked_until")?,
            previous_emails,
            login_attempts: row.try_get("login_attempts")?,
            last_login_attempt_at: row.try_get("last_login_attempt_at")?,
            login_attempts_blocked: row.try_get("login_attempts_blocked")?,
            login_attempts_blocked_until: row.try_get("login_attempts_blocked_until")?,
            last_login_at: row.try_get("last_login_at")?,
            last_login_ip: row.try_get("last_login_ip")?,
            is_locked: row.try_get("is_locked")?,
            locked_at: row.try_get("locked_at")?,
            locked_reason: row.try_get("locked_reason")?,
            locked_by: row.try_get("locked_by")?,
            unlocked_at: row.try_get("unlocked_at")?,
            unlocked_by: row.try_get("unlocked_by")?,
            unlock_comment: row.try_get("unlock_comment")?,
            is_banned: row.try_get("is_banned")?,
            banned_at: row.try_get("banned_at")?,
            banned_reason: row.try_get("banned_reason")?,
            banned_by: row.try_get("banned_by")?,
            ban_period_days: row.try_get("ban_period_days")?,
            unbanned_at: row.try_get("unbanned_at")?,
            unbanned_by: row.try_get("unbanned_by")?,
            unban_comment: row.try_get("unban_comment")?,
        })
    }

    async fn fetch_one(&self, sql: &str, bind: &str) -> AppResult<Account> {
        let row = sqlx::query(sql)
            .bind(bind)
            .fetch_optional(&self.db)
            .await
            .map_err(AppError::Database)?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

        Self::row_to_account(&row)
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn load(&self, id: Uuid) -> AppResult<Account> {
        self.fetch_one("SELECT * FROM accounts WHERE id = ?", &id.to_string())
            .await
    }

    async fn load_by_email(&self, email: &str) -> AppResult<Account> {
        self.fetch_one("SELECT * FROM accounts WHERE email = ?", email)
            .await
    }

    async fn find_by_token(&self, purpose: TokenPurpose, secret: &str) -> AppResult<Account> {
        let sql = format!(
            "SELECT * FROM accounts WHERE {} = ?",
            Self::token_column(purpose)
        );
        self.fetch_one(&sql, secret).await
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE email = ?")
            .bind(email)
            .fetch_one(&self.db)
            .await
            .map_err(AppError::Database)?;

        Ok(count > 0)
    }

    async fn save(&self, account: &Account) -> AppResult<()> {
        let roles = serde_json::to_string(&account.roles)
            .map_err(|e| AppError::Internal(format!("Failed to encode roles: {}", e)))?;
        let previous_emails = serde_json::to_string(&account.previous_emails)
            .map_err(|e| AppError::Internal(format!("Failed to encode previous emails: {}", e)))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO accounts (
                id, email, password_hash, roles, created_at,
                is_active, email_verified, email_verification_token,
                email_verification_expires_at, resend_verification_count,
                last_verification_sent_at,
                deactivation_token, deactivation_expires_at,
                reactivation_token, reactivation_expires_at,
                reactivation_request_count, last_reactivation_request_at,
                delete_request_token, delete_request_expires_at,
                delete_request_count, last_delete_request_at,
                to_be_deleted, account_deleted_at,
                password_changed_at, password_reset_token,
                password_reset_expires_at, password_reset_request_count,
                last_password_reset_request_at,
                email_change_token, email_change_expires_at,
                email_change_request_count, last_email_change_request_at,
                pending_email, pending_email_token, pending_email_expires_at,
                pending_email_verification_count, email_change_locked_until,
                previous_emails,
                login_attempts, last_login_attempt_at, login_attempts_blocked,
                login_attempts_blocked_until, last_login_at, last_login_ip,
                is_locked, locked_at, locked_reason, locked_by,
                unlocked_at, unlocked_by, unlock_comment,
                is_banned, banned_at, banned_reason, banned_by,
                ban_period_days, unbanned_at, unbanned_by, unban_comment
            ) VALUES (
                ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?, ?, ?
            )
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(roles)
        .bind(account.created_at)
        .bind(account.is_active)
        .bind(account.email_verified)
        .bind(&account.email_verification_token)
        .bind(account.email_verification_expires_at)
        .bind(account.resend_verification_count)
        .bind(account.last_verification_sent_at)
        .bind(&account.deactivation_token)
        .bind(account.deactivation_expires_at)
        .bind(&account.reactivation_token)
        .bind(account.reactivation_expires_at)
        .bind(account.reactivation_request_count)
        .bind(account.last_reactivation_request_at)
        .bind(&account.delete_request_token)
        .bind(account.delete_request_expires_at)
        .bind(account.delete_request_count)
        .bind(account.last_delete_request_at)
        .bind(account.to_be_deleted)
        .bind(account.account_deleted_at)
        .bind(account.password_changed_at)
        .bind(&account.password_reset_token)
        .bind(account.password_reset_expires_at)
        .bind(account.password_reset_request_count)
        .bind(account.last_password_reset_request_at)
        .bind(&account.email_change_token)
        .bind(account.email_change_expires_at)
        .bind(account.email_change_request_count)
        .bind(account.last_email_change_request_at)
        .bind(&account.pending_email)
        .bind(&account.pending_email_token)
        .bind(account.pending_email_expires_at)
        .bind(account.pending_email_verification_count)
        .bind(account.email_change_locked_until)
        .bind(previous_emails)
        .bind(account.login_attempts)
        .bind(account.last_login_attempt_at)
        .bind(account.login_attempts_blocked)
        .bind(account.login_attempts_blocked_until)
        .bind(account.last_login_at)
        .bind(&account.last_login_ip)
        .bind(account.is_locked)
        .bind(account.locked_at)
        .bind(&account.locked_reason)
        .bind(&account.locked_by)
        .bind(account.unlocked_at)
        .bind(&account.unlocked_by)
        .bind(&account.unlock_comment)
        .bind(account.is_banned)
        .bind(account.banned_at)
        .bind(&account.banned_reason)
        .bind(&account.banned_by)
        .bind(account.ban_period_days)
        .bind(account.unbanned_at)
        .bind(&account.unbanned_by)
        .bind(&account.unban_comment)
        .execute(&self.db)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.db)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }

        Ok(())
    }
}
