/// In-memory account repository for tests and local development
use crate::account::model::Account;
use crate::account::token::TokenPurpose;
use crate::error::{AppError, AppResult};
use crate::repo::AccountRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account directly, bypassing the lifecycle (tests only)
    pub async fn insert(&self, account: Account) {
        self.accounts.write().await.insert(account.id, account);
    }

    pub async fn count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn load(&self, id: Uuid) -> AppResult<Account> {
        self.accounts
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    async fn load_by_email(&self, email: &str) -> AppResult<Account> {
        self.accounts
            .read()
            .await
            .values()
            .find(|a| a.email == email)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    async fn find_by_token(&self, purpose: TokenPurpose, secret: &str) -> AppResult<Account> {
        self.accounts
            .read()
            .await
            .values()
            .find(|a| a.stored_token(purpose).0 == Some(secret))
            .cloned()
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    async fn email_exists(&self, email: &str) -> AppResult<bool> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .any(|a| a.email == email))
    }

    async fn save(&self, account: &Account) -> AppResult<()> {
        self.accounts
            .write()
            .await
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.accounts
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }
}
