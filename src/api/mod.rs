/// API routes and handlers
pub mod account;
pub mod admin;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new().merge(account::routes()).merge(admin::routes())
}
