use crate::error::Result;
use crate::store::{CredentialStore, SessionRecord};
use crate::token::TokenIssuer;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session lifetime.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Token and expiry handed back to the HTTP layer after a session is created.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
}

/// Issues, validates, and revokes sessions.
///
/// Sessions are hybrid: the token is a signed JWT, and a matching row is
/// persisted server-side. Validation requires both. Revocation deletes the
/// row, which invalidates the token immediately regardless of its signature.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, issuer: TokenIssuer) -> Self {
        Self::with_ttl(store, issuer, Duration::days(SESSION_TTL_DAYS))
    }

    /// Same as `new` but with an explicit TTL. Tests use this to create
    /// sessions that are already expired.
    pub fn with_ttl(store: Arc<dyn CredentialStore>, issuer: TokenIssuer, ttl: Duration) -> Self {
        Self { store, issuer, ttl }
    }

    /// Create and persist a new session for `user_id`.
    pub async fn create_session(&self, user_id: Uuid) -> Result<SessionHandle> {
        let expires_at = Utc::now() + self.ttl;
        let token = self.issuer.sign_session(user_id, expires_at)?;

        self.store
            .create_session(&SessionRecord {
                token: token.clone(),
                user_id,
                expires_at,
            })
            .await?;

        tracing::debug!(user_id = %user_id, expires_at = %expires_at, "Session created");

        Ok(SessionHandle { token, expires_at })
    }

    /// Look up the session backing `token`.
    ///
    /// Returns `None` for a bad signature, a revoked session, a token whose
    /// subject does not match the persisted row, or an expired session.
    /// Expired sessions are deleted on the way out, so expiry doubles as
    /// cleanup and a later lookup short-circuits at the missing row.
    pub async fn get_session(&self, token: &str) -> Result<Option<SessionRecord>> {
        let claims = match self.issuer.verify_session(token) {
            Some(claims) => claims,
            None => return Ok(None),
        };

        let session = match self.store.find_session_by_token(token).await? {
            Some(session) => session,
            None => return Ok(None),
        };

        if session.user_id != claims.sub {
            tracing::warn!(token_sub = %claims.sub, "Session subject mismatch");
            return Ok(None);
        }

        if session.expires_at <= Utc::now() {
            self.store.delete_session(token).await?;
            tracing::debug!(user_id = %session.user_id, "Expired session deleted");
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Revoke the session backing `token`. Idempotent, and tolerant of tokens
    /// that never named a session.
    pub async fn revoke_session(&self, token: &str) -> Result<()> {
        self.store.delete_session(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;

    fn manager_with_ttl(ttl: Duration) -> SessionManager {
        let store = Arc::new(MemoryCredentialStore::new());
        SessionManager::with_ttl(store, TokenIssuer::new("test-secret"), ttl)
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let manager = manager_with_ttl(Duration::days(SESSION_TTL_DAYS));
        let user_id = Uuid::new_v4();

        let handle = manager.create_session(user_id).await.unwrap();
        let session = manager.get_session(&handle.token).await.unwrap().unwrap();

        assert_eq!(session.user_id, user_id);
        assert_eq!(session.expires_at, handle.expires_at);
    }

    #[tokio::test]
    async fn test_expired_session_rejected_and_deleted() {
        let store = Arc::new(MemoryCredentialStore::new());
        let manager = SessionManager::with_ttl(
            store.clone(),
            TokenIssuer::new("test-secret"),
            Duration::seconds(-60),
        );

        let handle = manager.create_session(Uuid::new_v4()).await.unwrap();
        assert!(manager.get_session(&handle.token).await.unwrap().is_none());

        // The failed lookup must have removed the row.
        let row = store.find_session_by_token(&handle.token).await.unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_revoked_session_rejected() {
        let manager = manager_with_ttl(Duration::days(SESSION_TTL_DAYS));
        let handle = manager.create_session(Uuid::new_v4()).await.unwrap();

        manager.revoke_session(&handle.token).await.unwrap();
        assert!(manager.get_session(&handle.token).await.unwrap().is_none());

        // Revoking again is fine.
        manager.revoke_session(&handle.token).await.unwrap();
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let manager = manager_with_ttl(Duration::days(SESSION_TTL_DAYS));
        let handle = manager.create_session(Uuid::new_v4()).await.unwrap();

        let mut tampered = handle.token.clone();
        tampered.pop();
        tampered.push('A');
        assert!(manager.get_session(&tampered).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_signed_elsewhere_rejected() {
        let store = Arc::new(MemoryCredentialStore::new());
        let manager = SessionManager::new(store.clone(), TokenIssuer::new("test-secret"));
        let handle = manager.create_session(Uuid::new_v4()).await.unwrap();

        let other = SessionManager::new(store, TokenIssuer::new("other-secret"));
        assert!(other.get_session(&handle.token).await.unwrap().is_none());
    }
}
