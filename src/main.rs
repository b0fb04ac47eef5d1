/// Inkstream - blog platform backend
///
/// Server binary: explicit composition of configuration, storage,
/// collaborators, the account lifecycle, the background dispatcher, and the
/// HTTP server.
use inkstream::{config::AppConfig, context::AppContext, error::AppResult, jobs, server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkstream=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create application context
    let (ctx, due_actions) = AppContext::new(config).await?;

    // Start the delayed-action dispatcher
    tokio::spawn(jobs::run_dispatcher(
        Arc::clone(&ctx.lifecycle),
        due_actions,
    ));

    // Start server
    server::serve(ctx).await?;

    Ok(())
}
