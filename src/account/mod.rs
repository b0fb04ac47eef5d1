/// Account security and lifecycle system
///
/// Everything that governs how an account moves between its operational
/// states and how the sensitive operations on it are gated: single-use
/// tokens, attempt budgets, the login guard, the restriction guard chain,
/// and the lifecycle state machine that orchestrates them.

pub mod attempts;
pub mod guards;
pub mod lifecycle;
pub mod login_guard;
pub mod model;
pub mod password;
pub mod token;

pub use lifecycle::{AccountLifecycle, ModerationActor};
pub use model::{Account, AccountRole, EmailChangeRecord};

use serde::{Deserialize, Serialize};

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Session response returned by login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub account_id: uuid::Uuid,
    pub email: String,
    pub email_verified: bool,
    pub access_token: String,
}

/// Public view of an account, stripped of secrets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: uuid::Uuid,
    pub email: String,
    pub email_verified: bool,
    pub is_active: bool,
    pub roles: Vec<AccountRole>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            email_verified: account.email_verified,
            is_active: account.is_active,
            roles: account.roles.clone(),
            created_at: account.created_at,
        }
    }
}
