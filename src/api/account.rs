/// Account lifecycle endpoints.
///
/// Thin shells: deserialize, call one lifecycle operation, serialize. All
/// state checks live in the lifecycle itself.
use crate::{
    account::{AccountView, LoginRequest, RegisterRequest, SessionResponse},
    auth::{self, AuthAccount},
    context::AppContext,
    error::AppResult,
};
use axum::{
    extract::{ConnectInfo, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/accounts", post(register))
        .route("/api/session", post(login))
        .route("/api/accounts/verify-email", post(verify_email))
        .route("/api/accounts/resend-verification", post(resend_verification))
        .route("/api/accounts/password-reset", post(request_password_reset))
        .route("/api/accounts/password-reset/confirm", post(reset_password))
        .route("/api/accounts/deactivate", post(request_deactivation))
        .route("/api/accounts/deactivate/confirm", post(confirm_deactivation))
        .route("/api/accounts/activate", post(activate_account))
        .route("/api/accounts/email-change", post(request_email_change))
        .route("/api/accounts/email-change/confirm", post(confirm_email_change))
        .route("/api/accounts/email-change/verify", post(verify_new_email))
        .route("/api/accounts/delete", post(request_deletion))
        .route("/api/accounts/delete/confirm", post(confirm_deletion))
        .route("/api/accounts/delete/cancel", post(cancel_deletion))
}

#[derive(Deserialize)]
struct TokenRequest {
    token: String,
}

#[derive(Deserialize)]
struct EmailRequest {
    email: String,
}

/// Register a new account
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<AccountView>> {
    let account = ctx.lifecycle.register(&req.email, &req.password).await?;

    Ok(Json(AccountView::from(&account)))
}

/// Login endpoint; issues a session token on success
async fn login(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    let ip = addr.ip().to_string();
    let account = ctx
        .lifecycle
        .login(&req.email, &req.password, Some(&ip))
        .await?;

    let access_token = auth::issue_access_token(
        account.id,
        &ctx.config.auth.jwt_secret,
        ctx.config.auth.access_token_minutes,
    )?;

    Ok(Json(SessionResponse {
        account_id: account.id,
        email: account.email,
        email_verified: account.email_verified,
        access_token,
    }))
}

/// Verify an email address with the emailed token
async fn verify_email(
    State(ctx): State<AppContext>,
    Json(req): Json<TokenRequest>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.lifecycle.verify_email(&req.token).await?;

    Ok(Json(serde_json::json!({})))
}

/// Request a fresh verification link
async fn resend_verification(
    State(ctx): State<AppContext>,
    Json(req): Json<EmailRequest>,
) -> AppResult<Json<serde_json::Value>> {
    // Always report success for unknown addresses (no enumeration)
    match ctx.lifecycle.resend_verification(&req.email).await {
        Ok(_) => {}
        Err(crate::error::AppError::NotFound(_)) => {
            tracing::debug!("Verification resend for unknown email");
        }
        Err(e) => return Err(e),
    }

    Ok(Json(serde_json::json!({})))
}

/// Request a password reset link (public endpoint, no auth required)
async fn request_password_reset(
    State(ctx): State<AppContext>,
    Json(req): Json<EmailRequest>,
) -> AppResult<Json<serde_json::Value>> {
    // Always report success for unknown addresses (no enumeration)
    match ctx.lifecycle.request_password_reset(&req.email).await {
        Ok(()) => {}
        Err(crate::error::AppError::NotFound(_)) => {
            tracing::debug!("Password reset request for unknown email");
        }
        Err(e) => return Err(e),
    }

    Ok(Json(serde_json::json!({})))
}

#[derive(Deserialize)]
struct ResetPasswordRequest {
    token: String,
    password: String,
}

/// Set a new password with the emailed reset token
async fn reset_password(
    State(ctx): State<AppContext>,
    Json(req): Json<ResetPasswordRequest>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.lifecycle.reset_password(&req.token, &req.password).await?;

    Ok(Json(serde_json::json!({})))
}

/// Request account deactivation (sends a confirmation link)
async fn request_deactivation(
    State(ctx): State<AppContext>,
    auth: AuthAccount,
) -> AppResult<Json<serde_json::Value>> {
    ctx.lifecycle.request_deactivation(auth.account.id).await?;

    Ok(Json(serde_json::json!({})))
}

/// Confirm deactivation with the emailed token
async fn confirm_deactivation(
    State(ctx): State<AppContext>,
    Json(req): Json<TokenRequest>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.lifecycle.confirm_deactivation(&req.token).await?;

    Ok(Json(serde_json::json!({})))
}

/// Reactivate a deactivated account with the emailed token
async fn activate_account(
    State(ctx): State<AppContext>,
    Json(req): Json<TokenRequest>,
) -> AppResult<Json<AccountView>> {
    let account = ctx.lifecycle.activate_account(&req.token).await?;

    Ok(Json(AccountView::from(&account)))
}

#[derive(Deserialize)]
struct EmailChangeRequest {
    new_email: String,
}

/// Request an email change (confirmation link goes to the current address)
async fn request_email_change(
    State(ctx): State<AppContext>,
    auth: AuthAccount,
    Json(req): Json<EmailChangeRequest>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.lifecycle
        .request_email_change(auth.account.id, &req.new_email)
        .await?;

    Ok(Json(serde_json::json!({})))
}

/// Confirm the email change from the current address
async fn confirm_email_change(
    State(ctx): State<AppContext>,
    Json(req): Json<TokenRequest>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.lifecycle.confirm_email_change(&req.token).await?;

    Ok(Json(serde_json::json!({})))
}

/// Prove ownership of the new address and complete the change
async fn verify_new_email(
    State(ctx): State<AppContext>,
    Json(req): Json<TokenRequest>,
) -> AppResult<Json<AccountView>> {
    let account = ctx.lifecycle.verify_new_email(&req.token).await?;

    Ok(Json(AccountView::from(&account)))
}

/// Request account deletion (sends a confirmation link)
async fn request_deletion(
    State(ctx): State<AppContext>,
    auth: AuthAccount,
) -> AppResult<Json<serde_json::Value>> {
    ctx.lifecycle.request_deletion(auth.account.id).await?;

    Ok(Json(serde_json::json!({})))
}

/// Confirm deletion: the 30-day grace period starts now
async fn confirm_deletion(
    State(ctx): State<AppContext>,
    Json(req): Json<TokenRequest>,
) -> AppResult<Json<serde_json::Value>> {
    ctx.lifecycle.confirm_deletion(&req.token).await?;

    Ok(Json(serde_json::json!({
        "message": "Account scheduled for deletion. Contact support within the grace period to recover it."
    })))
}

/// Abort a pending deletion during the grace period
async fn cancel_deletion(
    State(ctx): State<AppContext>,
    auth: AuthAccount,
) -> AppResult<Json<AccountView>> {
    let account = ctx.lifecycle.cancel_deletion(auth.account.id).await?;

    Ok(Json(AccountView::from(&account)))
}
