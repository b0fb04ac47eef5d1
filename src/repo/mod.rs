/// Account persistence boundary.
///
/// The lifecycle state machine only talks to this trait; the SQLite adapter
/// is what production wires in, the in-memory adapter backs tests and local
/// experiments. Persistence is last-write-wins; same-account races are
/// serialized above this layer by the lifecycle's per-account lock.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryAccountRepository;
pub use sqlite::SqliteAccountRepository;

use crate::account::model::Account;
use crate::account::token::TokenPurpose;
use crate::error::AppResult;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Load an account by id; `NotFound` if absent
    async fn load(&self, id: Uuid) -> AppResult<Account>;

    /// Load an account by its current email address; `NotFound` if absent
    async fn load_by_email(&self, email: &str) -> AppResult<Account>;

    /// Find the account holding a given sensitive-action token.
    /// Only locates the record; the caller still validates the token
    /// against expiry under the account lock.
    async fn find_by_token(&self, purpose: TokenPurpose, secret: &str) -> AppResult<Account>;

    /// Whether an account with this email already exists
    async fn email_exists(&self, email: &str) -> AppResult<bool>;

    /// Persist the full account record (last-write-wins)
    async fn save(&self, account: &Account) -> AppResult<()>;

    /// Hard-delete an account record; used by the purge job only
    async fn delete(&self, id: Uuid) -> AppResult<()>;
}
