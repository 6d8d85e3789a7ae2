pub mod memory;
pub mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PostgresCredentialStore;

use crate::error::Result;
use crate::provider::Provider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Role reference data seeded at deployment. Users reference a role; the
/// permission set drives the access-control checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: HashSet<String>,
}

/// Name of the role assigned to newly created accounts.
pub const DEFAULT_ROLE: &str = "student";

/// Canonical form of an email address: trimmed and lowercased.
///
/// Emails compare case-insensitively throughout. Every entry path
/// (registration, login, federated claims, provider linking) canonicalizes
/// before storing or matching, so one mailbox maps to one account no matter
/// how a client or identity provider cases it.
pub fn canonical_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    /// None for OAuth-only accounts.
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub google_id: Option<String>,
    pub google_email: Option<String>,
    pub facebook_id: Option<String>,
    pub facebook_email: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn provider_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.google_id.as_deref(),
            Provider::Facebook => self.facebook_id.as_deref(),
        }
    }

    pub fn set_provider(&mut self, provider: Provider, id: String, email: String) {
        match provider {
            Provider::Google => {
                self.google_id = Some(id);
                self.google_email = Some(email);
            }
            Provider::Facebook => {
                self.facebook_id = Some(id);
                self.facebook_email = Some(email);
            }
        }
    }

    pub fn clear_provider(&mut self, provider: Provider) {
        match provider {
            Provider::Google => {
                self.google_id = None;
                self.google_email = None;
            }
            Provider::Facebook => {
                self.facebook_id = None;
                self.facebook_email = None;
            }
        }
    }

    /// A user must always keep at least one usable login method.
    pub fn has_login_method(&self) -> bool {
        self.password_hash.is_some()
            || Provider::ALL.iter().any(|p| self.provider_id(*p).is_some())
    }
}

/// Public-safe projection of a user record. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub email_verified: bool,
    pub google_id: Option<String>,
    pub facebook_id: Option<String>,
    pub role: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            email_verified: user.email_verified,
            google_id: user.google_id.clone(),
            facebook_id: user.facebook_id.clone(),
            role: user.role.name.clone(),
        }
    }
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        (&user).into()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub role_name: String,
    pub google_id: Option<String>,
    pub google_email: Option<String>,
    pub facebook_id: Option<String>,
    pub facebook_email: Option<String>,
}

impl NewUser {
    /// A credential (email/password) account with the default role.
    pub fn credentials(email: String, name: Option<String>, password_hash: String) -> Self {
        Self {
            email,
            name,
            password_hash: Some(password_hash),
            email_verified: false,
            role_name: DEFAULT_ROLE.to_string(),
            google_id: None,
            google_email: None,
            facebook_id: None,
            facebook_email: None,
        }
    }

    /// A federated account provisioned on first sight of a verified
    /// identity-provider token. The linked provider pair is its login method.
    pub fn federated(
        provider: Provider,
        provider_id: String,
        email: String,
        name: Option<String>,
    ) -> Self {
        let mut new_user = Self {
            email: email.clone(),
            name,
            password_hash: None,
            email_verified: false,
            role_name: DEFAULT_ROLE.to_string(),
            google_id: None,
            google_email: None,
            facebook_id: None,
            facebook_email: None,
        };
        match provider {
            Provider::Google => {
                new_user.google_id = Some(provider_id);
                new_user.google_email = Some(email);
            }
            Provider::Facebook => {
                new_user.facebook_id = Some(provider_id);
                new_user.facebook_email = Some(email);
            }
        }
        new_user
    }
}

/// Server-side session row. Owned by the `SessionManager`; the store merely
/// persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Persisted email-verification token. Only the SHA-256 digest of the raw
/// token is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Persistence boundary for user records, sessions, and verification tokens.
///
/// "Not found" is always `Ok(None)`, never an error, so callers apply their
/// own business-level semantics. Unique-constraint violations surface as
/// `AuthError::DuplicateAccount` (email) or `AuthError::ProviderAlreadyLinked`
/// (provider id); the store-level constraints are the authoritative
/// concurrency control.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_provider_id(
        &self,
        provider: Provider,
        provider_id: &str,
    ) -> Result<Option<User>>;
    async fn create_user(&self, new_user: NewUser) -> Result<User>;
    /// Single-row update keyed by primary key.
    async fn update_user(&self, user: &User) -> Result<User>;

    async fn create_session(&self, session: &SessionRecord) -> Result<()>;
    async fn find_session_by_token(&self, token: &str) -> Result<Option<SessionRecord>>;
    /// Idempotent: deleting an absent session is not an error.
    async fn delete_session(&self, token: &str) -> Result<()>;

    async fn create_verification_token(&self, token: &VerificationTokenRecord) -> Result<()>;
    async fn find_verification_token(
        &self,
        email: &str,
        token_hash: &str,
    ) -> Result<Option<VerificationTokenRecord>>;
    async fn delete_verification_token(&self, id: Uuid) -> Result<()>;
    /// Housekeeping: drop a user's expired tokens. Returns the count removed.
    async fn delete_expired_verification_tokens(&self, user_id: Uuid) -> Result<u64>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>>;
}
