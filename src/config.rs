use crate::error::{AuthError, Result};
use std::time::Duration;

const DEV_SESSION_SECRET: &str = "dev-session-secret-change-in-production";

/// Outbound mail transport selection.
#[derive(Debug, Clone)]
pub enum MailConfig {
    /// Log emails instead of sending. Default outside production.
    Console,
    SendGrid {
        api_key: String,
        from_email: String,
        from_name: String,
    },
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub bind_address: String,
    pub database_url: String,
    pub session_secret: String,
    /// Set the Secure flag on session cookies. On in production.
    pub cookie_secure: bool,
    /// Public base URL used in verification links.
    pub base_url: String,
    pub mail: MailConfig,
    pub google_tokeninfo_url: String,
    pub facebook_tokeninfo_url: String,
    pub identity_timeout: Duration,
    pub mail_timeout: Duration,
}

impl AuthConfig {
    /// Load configuration from the environment.
    ///
    /// Production (APP_ENV=production) refuses to start without an explicit
    /// SESSION_SECRET; elsewhere a development default is substituted with a
    /// warning.
    pub fn from_env() -> Result<Self> {
        let production = std::env::var("APP_ENV")
            .map(|v| v == "production")
            .unwrap_or(false);

        let session_secret = match std::env::var("SESSION_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if production => {
                return Err(AuthError::Config(
                    "SESSION_SECRET must be set in production".to_string(),
                ));
            }
            _ => {
                tracing::warn!("SESSION_SECRET not set, using development default");
                DEV_SESSION_SECRET.to_string()
            }
        };

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AuthError::Config("DATABASE_URL must be set".to_string()))?;

        let mail = match std::env::var("SENDGRID_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => MailConfig::SendGrid {
                api_key,
                from_email: std::env::var("MAIL_FROM_EMAIL")
                    .unwrap_or_else(|_| "noreply@learnhub.example".to_string()),
                from_name: std::env::var("MAIL_FROM_NAME")
                    .unwrap_or_else(|_| "LearnHub".to_string()),
            },
            _ => MailConfig::Console,
        };

        Ok(Self {
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url,
            session_secret,
            cookie_secure: production,
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            mail,
            google_tokeninfo_url: std::env::var("GOOGLE_TOKENINFO_URL")
                .unwrap_or_else(|_| "https://oauth2.googleapis.com/tokeninfo".to_string()),
            facebook_tokeninfo_url: std::env::var("FACEBOOK_TOKENINFO_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com/debug_token".to_string()),
            identity_timeout: Duration::from_secs(
                env_u64("IDENTITY_TIMEOUT_SECONDS").unwrap_or(10),
            ),
            mail_timeout: Duration::from_secs(env_u64("MAIL_TIMEOUT_SECONDS").unwrap_or(10)),
        })
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
