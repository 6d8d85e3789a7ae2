pub mod bearer_auth;
pub mod session_auth;

pub use bearer_auth::BearerAuth;
pub use session_auth::SessionAuth;

use crate::error::{AuthError, Result};
use crate::store::User;
use actix_web::{HttpMessage, HttpRequest};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "sessionToken";

/// Authenticated caller, inserted into request extensions by the auth
/// middleware and read back by handlers.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
}

impl Principal {
    /// True when the caller's role grants every permission in `required`.
    pub fn has_permissions(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|p| self.user.role.permissions.contains(*p))
    }

    pub fn require_permissions(&self, required: &[&str]) -> Result<()> {
        if self.has_permissions(required) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// Fetch the principal the auth middleware attached to this request.
/// Reaching a protected handler without one is a wiring bug.
pub fn extract_principal(req: &HttpRequest) -> Result<Principal> {
    req.extensions()
        .get::<Principal>()
        .cloned()
        .ok_or_else(|| AuthError::Internal("No principal on authenticated request".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use chrono::Utc;
    use uuid::Uuid;

    fn principal_with(permissions: &[&str]) -> Principal {
        Principal {
            user: User {
                id: Uuid::new_v4(),
                email: "user@example.com".to_string(),
                name: None,
                password_hash: None,
                email_verified: true,
                google_id: None,
                google_email: None,
                facebook_id: None,
                facebook_email: None,
                role: Role {
                    name: "tester".to_string(),
                    permissions: permissions.iter().map(|p| p.to_string()).collect(),
                },
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_permission_containment() {
        let principal = principal_with(&["read", "write"]);
        assert!(principal.has_permissions(&["read"]));
        assert!(principal.has_permissions(&["read", "write"]));
        assert!(!principal.has_permissions(&["read", "delete"]));
        assert!(principal.has_permissions(&[]));
    }

    #[test]
    fn test_require_permissions_maps_to_forbidden() {
        let principal = principal_with(&["read"]);
        assert!(principal.require_permissions(&["read"]).is_ok());
        assert!(matches!(
            principal.require_permissions(&["delete"]),
            Err(AuthError::Forbidden)
        ));
    }
}
