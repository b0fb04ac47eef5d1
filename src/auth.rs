/// Session tokens and authentication extractors.
///
/// Login success issues a short-lived HS256 JWT; these extractors validate
/// it and load the calling account. Session issuance is a thin wrapper over
/// the lifecycle, not part of the state machine itself.
use crate::{
    account::model::{Account, AccountRole},
    context::AppContext,
    error::AppError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Issue an access token for a logged-in account
pub fn issue_access_token(
    account_id: Uuid,
    jwt_secret: &str,
    ttl_minutes: i64,
) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: account_id.to_string(),
        iat: now,
        exp: now + ttl_minutes * 60,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Jwt(format!("Failed to generate token: {}", e)))
}

/// Verify an access token and return the account id it was issued for
pub fn verify_access_token(token: &str, jwt_secret: &str) -> Result<Uuid, AppError> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (5 minutes)
    validation.leeway = 300;

    let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!("JWT verification failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::Jwt("Token has expired".to_string())
            }
            _ => AppError::Jwt("Invalid token".to_string()),
        }
    })?;

    Uuid::parse_str(&data.claims.sub)
        .map_err(|_| AppError::Jwt("Invalid token subject".to_string()))
}

/// Extract the bearer token from an Authorization header
pub fn extract_bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
}

/// Authenticated account extractor
#[derive(Debug, Clone)]
pub struct AuthAccount {
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Jwt("Missing authorization header".to_string()))?;

        let account_id = verify_access_token(&token, &state.config.auth.jwt_secret)?;

        let account = state
            .lifecycle
            .account(account_id)
            .await
            .map_err(|_| AppError::Jwt("Account no longer exists".to_string()))?;

        Ok(AuthAccount { account })
    }
}

/// Admin account extractor; requires the admin role
#[derive(Debug, Clone)]
pub struct AdminAccount {
    pub account: Account,
}

#[async_trait]
impl FromRequestParts<AppContext> for AdminAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let AuthAccount { account } = AuthAccount::from_request_parts(parts, state).await?;

        if !account.has_role(AccountRole::Admin) {
            tracing::warn!("Account {} attempted an admin operation", account.id);
            return Err(AppError::Authorization("Admin role required".to_string()));
        }

        Ok(AdminAccount { account })
    }
}
