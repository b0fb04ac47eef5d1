/// Single-use sensitive-action tokens.
///
/// Every irreversible or abusable account operation is gated behind one of
/// these: an opaque random secret paired with an expiry, stored on the
/// account record and compared by equality. Issuing a token for a purpose
/// always replaces the previous one, so at most one token per purpose is
/// live at any time.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;

/// What a token authorizes. One slot per purpose on the account record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
    Deactivation,
    Reactivation,
    Deletion,
    EmailChange,
    NewEmailOwnership,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
            TokenPurpose::Deactivation => "deactivation",
            TokenPurpose::Reactivation => "reactivation",
            TokenPurpose::Deletion => "deletion",
            TokenPurpose::EmailChange => "email_change",
            TokenPurpose::NewEmailOwnership => "new_email_ownership",
        }
    }
}

/// A freshly issued token with its expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveToken {
    pub secret: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of checking a supplied token against the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    Valid,
    Expired,
    Mismatch,
}

/// Number of random bytes in a token secret
const SECRET_BYTES: usize = 32;

/// Generate a new token valid for `ttl` from `now`.
pub fn issue(ttl: Duration, now: DateTime<Utc>) -> SensitiveToken {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    SensitiveToken {
        secret: URL_SAFE_NO_PAD.encode(bytes),
        expires_at: now + ttl,
    }
}

/// Check a supplied secret against the stored token state.
///
/// A token with no stored secret or no stored expiry is never accepted.
/// The expiry boundary is exclusive: a token whose expiry equals `now`
/// is already expired.
pub fn validate(
    stored: Option<&str>,
    stored_expiry: Option<DateTime<Utc>>,
    supplied: &str,
    now: DateTime<Utc>,
) -> TokenCheck {
    let (Some(stored), Some(expiry)) = (stored, stored_expiry) else {
        return TokenCheck::Mismatch;
    };

    if stored != supplied {
        return TokenCheck::Mismatch;
    }

    if now >= expiry {
        return TokenCheck::Expired;
    }

    TokenCheck::Valid
}
