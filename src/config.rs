/// Configuration management for the Inkstream backend
use crate::error::{AppError, AppResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub email: Option<EmailConfig>,
    pub security: SecurityPolicyConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Public base URL used to build confirmation links in outgoing email
    pub public_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub account_db: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret for the HS256 session tokens issued on login
    pub jwt_secret: String,
    /// Session token lifetime in minutes
    pub access_token_minutes: i64,
}

/// Email (SMTP) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Time-windowed security policy constants.
///
/// Defaults reflect the production policy; every value can be overridden
/// through the environment for staging and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityPolicyConfig {
    /// Lifetime of every confirmation token, in minutes
    pub token_ttl_minutes: i64,
    /// Consecutive failed logins before the account is temporarily blocked
    pub login_max_attempts: u32,
    /// How long a login block lasts, in minutes
    pub login_block_minutes: i64,
    pub reactivation_max_attempts: u32,
    pub reactivation_window_hours: i64,
    pub password_reset_max_attempts: u32,
    pub password_reset_window_hours: i64,
    pub email_change_max_attempts: u32,
    pub email_change_window_hours: i64,
    /// Cool-down before the email address may be changed again, in days
    pub email_change_cooldown_days: i64,
    /// Grace period between deletion confirmation and the hard delete, in days
    pub deletion_grace_days: i64,
}

impl Default for SecurityPolicyConfig {
    fn default() -> Self {
        Self {
            token_ttl_minutes: 60,
            login_max_attempts: 5,
            login_block_minutes: 30,
            reactivation_max_attempts: 4,
            reactivation_window_hours: 48,
            password_reset_max_attempts: 2,
            password_reset_window_hours: 24,
            email_change_max_attempts: 5,
            email_change_window_hours: 24,
            email_change_cooldown_days: 100,
            deletion_grace_days: 30,
        }
    }
}

impl SecurityPolicyConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::minutes(self.token_ttl_minutes)
    }

    pub fn login_block(&self) -> Duration {
        Duration::minutes(self.login_block_minutes)
    }

    pub fn email_change_cooldown(&self) -> Duration {
        Duration::days(self.email_change_cooldown_days)
    }

    pub fn deletion_grace(&self) -> Duration {
        Duration::days(self.deletion_grace_days)
    }
}

/// HTTP-layer rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub public_rps: u32,
    pub authenticated_rps: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            public_rps: 10,
            authenticated_rps: 100,
            burst_size: 50,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("INK_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("INK_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("INK_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let version = env::var("INK_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("INK_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let account_db = env::var("INK_ACCOUNT_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("accounts.sqlite"));

        let jwt_secret = env::var("INK_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;
        let access_token_minutes = parse_env("INK_ACCESS_TOKEN_MINUTES", 60);

        let email = if let Ok(smtp_url) = env::var("INK_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("INK_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let defaults = SecurityPolicyConfig::default();
        let security = SecurityPolicyConfig {
            token_ttl_minutes: parse_env("INK_TOKEN_TTL_MINUTES", defaults.token_ttl_minutes),
            login_max_attempts: parse_env("INK_LOGIN_MAX_ATTEMPTS", defaults.login_max_attempts),
            login_block_minutes: parse_env(
                "INK_LOGIN_BLOCK_MINUTES",
                defaults.login_block_minutes,
            ),
            reactivation_max_attempts: parse_env(
                "INK_REACTIVATION_MAX_ATTEMPTS",
                defaults.reactivation_max_attempts,
            ),
            reactivation_window_hours: parse_env(
                "INK_REACTIVATION_WINDOW_HOURS",
                defaults.reactivation_window_hours,
            ),
            password_reset_max_attempts: parse_env(
                "INK_PASSWORD_RESET_MAX_ATTEMPTS",
                defaults.password_reset_max_attempts,
            ),
            password_reset_window_hours: parse_env(
                "INK_PASSWORD_RESET_WINDOW_HOURS",
                defaults.password_reset_window_hours,
            ),
            email_change_max_attempts: parse_env(
                "INK_EMAIL_CHANGE_MAX_ATTEMPTS",
                defaults.email_change_max_attempts,
            ),
            email_change_window_hours: parse_env(
                "INK_EMAIL_CHANGE_WINDOW_HOURS",
                defaults.email_change_window_hours,
            ),
            email_change_cooldown_days: parse_env(
                "INK_EMAIL_CHANGE_COOLDOWN_DAYS",
                defaults.email_change_cooldown_days,
            ),
            deletion_grace_days: parse_env(
                "INK_DELETION_GRACE_DAYS",
                defaults.deletion_grace_days,
            ),
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: parse_env("INK_RATE_LIMITS_ENABLED", rate_defaults.enabled),
            public_rps: parse_env("INK_RATE_LIMIT_PUBLIC_RPS", rate_defaults.public_rps),
            authenticated_rps: parse_env(
                "INK_RATE_LIMIT_AUTHENTICATED_RPS",
                rate_defaults.authenticated_rps,
            ),
            burst_size: parse_env("INK_RATE_LIMIT_BURST", rate_defaults.burst_size),
        };

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(AppConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                version,
            },
            storage: StorageConfig {
                data_directory,
                account_db,
            },
            auth: AuthConfig {
                jwt_secret,
                access_token_minutes,
            },
            email,
            security,
            rate_limit,
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.auth.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.security.login_max_attempts == 0 {
            return Err(AppError::Validation(
                "Login attempt limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
