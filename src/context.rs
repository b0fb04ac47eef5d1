/// Application context and explicit composition.
///
/// One place constructs every concrete adapter and hands it to the
/// lifecycle; nothing is wired through globals or instantiated at import
/// time, so tests substitute fakes by calling `AccountLifecycle::new`
/// directly.
use crate::{
    account::AccountLifecycle,
    clock::SystemClock,
    config::AppConfig,
    db,
    error::AppResult,
    notifier::SmtpNotifier,
    rate_limit::RateLimiter,
    repo::SqliteAccountRepository,
    scheduler::{DueAction, TokioScheduler},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: SqlitePool,
    pub lifecycle: Arc<AccountLifecycle>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration.
    ///
    /// Returns the context together with the due-action channel that
    /// `jobs::run_dispatcher` must drain.
    pub async fn new(config: AppConfig) -> AppResult<(Self, UnboundedReceiver<DueAction>)> {
        config.validate()?;

        // Initialize database
        let pool = db::create_pool(
            &config.storage.account_db,
            db::DatabaseOptions::default(),
        )
        .await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        // Concrete adapters
        let repo = Arc::new(SqliteAccountRepository::new(pool.clone()));
        let clock = Arc::new(SystemClock);
        let notifier = Arc::new(SmtpNotifier::new(
            config.email.clone(),
            config.service.public_url.clone(),
        )?);
        let (scheduler, due_actions) = TokioScheduler::new(clock.clone());

        let lifecycle = Arc::new(AccountLifecycle::new(
            repo,
            notifier,
            Arc::new(scheduler),
            clock,
            config.security.clone(),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok((
            Self {
                config: Arc::new(config),
                db: pool,
                lifecycle,
                rate_limiter,
            },
            due_actions,
        ))
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
