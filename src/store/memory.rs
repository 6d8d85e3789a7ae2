use crate::error::{AuthError, Result};
use crate::provider::Provider;
use crate::store::{
    CredentialStore, NewUser, Role, SessionRecord, User, VerificationTokenRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory credential store for tests and local development.
///
/// Enforces the same unique constraints as the Postgres store (email and
/// provider ids) so the race-safety semantics are identical for callers.
pub struct MemoryCredentialStore {
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<String, SessionRecord>>,
    verification_tokens: RwLock<HashMap<Uuid, VerificationTokenRecord>>,
    roles: HashMap<String, Role>,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCredentialStore {
    /// Create a store seeded with the deployment's reference roles.
    pub fn new() -> Self {
        let mut roles = HashMap::new();
        roles.insert("student".to_string(), role("student", &["read"]));
        roles.insert(
            "teacher".to_string(),
            role("teacher", &["read", "write", "manage_content"]),
        );
        roles.insert(
            "admin".to_string(),
            role("admin", &["read", "write", "delete", "manage_content"]),
        );

        Self {
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            verification_tokens: RwLock::new(HashMap::new()),
            roles,
        }
    }
}

fn role(name: &str, permissions: &[&str]) -> Role {
    Role {
        name: name.to_string(),
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

fn check_unique(users: &HashMap<Uuid, User>, candidate: &User) -> Result<()> {
    for user in users.values() {
        if user.id == candidate.id {
            continue;
        }
        if user.email == candidate.email {
            return Err(AuthError::DuplicateAccount);
        }
        for provider in Provider::ALL {
            if let (Some(a), Some(b)) = (user.provider_id(provider), candidate.provider_id(provider))
            {
                if a == b {
                    return Err(AuthError::ProviderAlreadyLinked);
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }

    async fn find_user_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.provider_id(provider) == Some(provider_id))
            .cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let role = self
            .roles
            .get(&new_user.role_name)
            .cloned()
            .ok_or_else(|| {
                AuthError::Config(format!("Role not seeded: {}", new_user.role_name))
            })?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            name: new_user.name,
            password_hash: new_user.password_hash,
            email_verified: new_user.email_verified,
            google_id: new_user.google_id,
            google_email: new_user.google_email,
            facebook_id: new_user.facebook_id,
            facebook_email: new_user.facebook_email,
            role,
            created_at: now,
            updated_at: now,
        };

        let mut users = self.users.write().await;
        check_unique(&users, &user)?;
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> Result<User> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(AuthError::NotFound);
        }
        let mut updated = user.clone();
        updated.updated_at = Utc::now();
        check_unique(&users, &updated)?;
        users.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn create_session(&self, session: &SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find_session_by_token(&self, token: &str) -> Result<Option<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(token).cloned())
    }

    async fn delete_session(&self, token: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(token);
        Ok(())
    }

    async fn create_verification_token(&self, token: &VerificationTokenRecord) -> Result<()> {
        let mut tokens = self.verification_tokens.write().await;
        tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn find_verification_token(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<VerificationTokenRecord>> {
        let tokens = self.verification_tokens.read().await;
        Ok(tokens
            .values()
            .find(|t| t.email == email && t.token_hash == token_hash)
            .cloned())
    }

    async fn delete_verification_token(&self, id: Uuid) -> Result<()> {
        let mut tokens = self.verification_tokens.write().await;
        tokens.remove(&id);
        Ok(())
    }

    async fn delete_expired_verification_tokens(&self, user_id: Uuid) -> Result<u64> {
        let now = Utc::now();
        let mut tokens = self.verification_tokens.write().await;
        let expired: Vec<Uuid> = tokens
            .values()
            .filter(|t| t.user_id == user_id && t.expires_at < now)
            .map(|t| t.id)
            .collect();
        for id in &expired {
            tokens.remove(id);
        }
        Ok(expired.len() as u64)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.roles.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser::credentials(email.to_string(), Some("Test".to_string()), "hash".to_string())
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = MemoryCredentialStore::new();
        store.create_user(new_user("a@example.com")).await.unwrap();

        let err = store
            .create_user(new_user("a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DuplicateAccount));
    }

    #[tokio::test]
    async fn test_provider_id_unique_across_users() {
        let store = MemoryCredentialStore::new();
        let mut alice = store.create_user(new_user("a@example.com")).await.unwrap();
        let mut bob = store.create_user(new_user("b@example.com")).await.unwrap();

        alice.set_provider(
            Provider::Google,
            "g-1".to_string(),
            "a@example.com".to_string(),
        );
        store.update_user(&alice).await.unwrap();

        bob.set_provider(
            Provider::Google,
            "g-1".to_string(),
            "b@example.com".to_string(),
        );
        let err = store.update_user(&bob).await.unwrap_err();
        assert!(matches!(err, AuthError::ProviderAlreadyLinked));
    }

    #[tokio::test]
    async fn test_default_roles_seeded() {
        let store = MemoryCredentialStore::new();
        let student = store.find_role_by_name("student").await.unwrap().unwrap();
        assert!(student.permissions.contains("read"));
        assert!(!student.permissions.contains("write"));

        let admin = store.find_role_by_name("admin").await.unwrap().unwrap();
        assert!(admin.permissions.contains("delete"));
    }

    #[tokio::test]
    async fn test_delete_session_is_idempotent() {
        let store = MemoryCredentialStore::new();
        store.delete_session("missing").await.unwrap();
        store.delete_session("missing").await.unwrap();
    }
}
