use actix_web::{HttpResponse, ResponseError};

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("An account with this email already exists")]
    DuplicateAccount,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Provider email does not match account email")]
    EmailMismatch,

    #[error("This provider identity is already linked to another account")]
    ProviderAlreadyLinked,

    #[error("Cannot disconnect the last remaining login method")]
    LastLoginMethod,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("User not found")]
    NotFound,

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl ResponseError for AuthError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AuthError::InvalidInput(msg) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid_input",
                "error_description": msg
            })),
            AuthError::DuplicateAccount => HttpResponse::Conflict().json(serde_json::json!({
                "error": "duplicate_account",
                "error_description": self.to_string()
            })),
            AuthError::InvalidCredentials => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "invalid_credentials",
                "error_description": "Invalid email or password"
            })),
            AuthError::InvalidOrExpiredToken => {
                HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "invalid_token",
                    "error_description": self.to_string()
                }))
            }
            AuthError::EmailMismatch => HttpResponse::Conflict().json(serde_json::json!({
                "error": "email_mismatch",
                "error_description": self.to_string()
            })),
            AuthError::ProviderAlreadyLinked => HttpResponse::Conflict().json(serde_json::json!({
                "error": "provider_already_linked",
                "error_description": self.to_string()
            })),
            AuthError::LastLoginMethod => HttpResponse::Conflict().json(serde_json::json!({
                "error": "last_login_method",
                "error_description": self.to_string()
            })),
            AuthError::Forbidden => HttpResponse::Forbidden().json(serde_json::json!({
                "error": "insufficient_permissions",
                "error_description": self.to_string()
            })),
            AuthError::NotFound => HttpResponse::NotFound().json(serde_json::json!({
                "error": "not_found",
                "error_description": self.to_string()
            })),
            AuthError::Upstream(_) => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "upstream_error",
                "error_description": "An upstream service failed"
            })),
            AuthError::Database(_) => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "database_error",
                "error_description": "Database operation failed"
            })),
            AuthError::Config(_) | AuthError::Internal(_) => HttpResponse::InternalServerError()
                .json(serde_json::json!({
                    "error": "internal_error",
                    "error_description": "Internal server error"
                })),
        }
    }
}
