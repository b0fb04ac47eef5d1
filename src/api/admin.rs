/// Administrative account restriction endpoints
use crate::{
    account::{AccountView, ModerationActor},
    auth::AdminAccount,
    context::AppContext,
    error::AppResult,
};
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/admin/accounts/:id/lock", post(lock_account))
        .route("/api/admin/accounts/:id/unlock", post(unlock_account))
        .route("/api/admin/accounts/:id/ban", post(ban_account))
        .route("/api/admin/accounts/:id/unban", post(unban_account))
}

#[derive(Deserialize)]
struct LockRequest {
    reason: String,
}

#[derive(Deserialize)]
struct CommentRequest {
    comment: Option<String>,
}

#[derive(Deserialize)]
struct BanRequest {
    reason: String,
    /// Days until the automatic unban; omit for an indefinite ban
    period_days: Option<i64>,
}

/// Lock an account
async fn lock_account(
    State(ctx): State<AppContext>,
    admin: AdminAccount,
    Path(id): Path<Uuid>,
    Json(req): Json<LockRequest>,
) -> AppResult<Json<AccountView>> {
    let account = ctx
        .lifecycle
        .lock_account(ModerationActor::Admin(admin.account.id), id, &req.reason)
        .await?;

    Ok(Json(AccountView::from(&account)))
}

/// Unlock a locked account
async fn unlock_account(
    State(ctx): State<AppContext>,
    admin: AdminAccount,
    Path(id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<AccountView>> {
    let account = ctx
        .lifecycle
        .unlock_account(ModerationActor::Admin(admin.account.id), id, req.comment)
        .await?;

    Ok(Json(AccountView::from(&account)))
}

/// Ban an account; with a period an automatic unban is scheduled
async fn ban_account(
    State(ctx): State<AppContext>,
    admin: AdminAccount,
    Path(id): Path<Uuid>,
    Json(req): Json<BanRequest>,
) -> AppResult<Json<AccountView>> {
    let account = ctx
        .lifecycle
        .ban_account(
            ModerationActor::Admin(admin.account.id),
            id,
            &req.reason,
            req.period_days,
        )
        .await?;

    Ok(Json(AccountView::from(&account)))
}

/// Lift a ban ahead of schedule
async fn unban_account(
    State(ctx): State<AppContext>,
    admin: AdminAccount,
    Path(id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<AccountView>> {
    let account = ctx
        .lifecycle
        .unban_account(ModerationActor::Admin(admin.account.id), id, req.comment)
        .await?;

    Ok(Json(AccountView::from(&account)))
}
