use crate::error::{AuthError, Result};
use crate::provider::Provider;
use crate::store::{canonical_email, CredentialStore, NewUser, User};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Identity asserted by a verified provider-issued token.
#[derive(Debug, Clone)]
pub struct IdentityClaims {
    pub provider: Provider,
    pub subject_id: String,
    pub email: String,
    pub name: Option<String>,
}

/// Verifies bearer identity tokens against the issuing provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_identity_token(&self, token: &str) -> Result<IdentityClaims>;
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    sub: String,
    email: String,
    name: Option<String>,
}

/// Verifies tokens by calling the provider's tokeninfo endpoint.
///
/// A rejected token (4xx) means the caller presented bad credentials; a
/// transport failure or 5xx means the provider itself is unreachable, and
/// the two are kept distinct.
pub struct TokenInfoIdentityProvider {
    client: reqwest::Client,
    endpoint: String,
    provider: Provider,
}

impl TokenInfoIdentityProvider {
    pub fn new(provider: Provider, endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            provider,
        })
    }
}

#[async_trait]
impl IdentityProvider for TokenInfoIdentityProvider {
    async fn verify_identity_token(&self, token: &str) -> Result<IdentityClaims> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| AuthError::Upstream(format!("Token verification failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        if !status.is_success() {
            return Err(AuthError::Upstream(format!(
                "Token verification returned {}",
                status
            )));
        }

        let info: TokenInfoResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Upstream(format!("Malformed tokeninfo response: {}", e)))?;

        Ok(IdentityClaims {
            provider: self.provider,
            subject_id: info.sub,
            email: info.email,
            name: info.name,
        })
    }
}

/// Per-provider lookup of identity-token verifiers.
#[derive(Clone, Default)]
pub struct IdentityVerifiers {
    providers: std::collections::HashMap<Provider, Arc<dyn IdentityProvider>>,
}

impl IdentityVerifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, provider: Provider, verifier: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider, verifier);
        self
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(&provider).cloned()
    }

    /// Verify `token` with the verifier registered for `provider`.
    pub async fn verify(&self, provider: Provider, token: &str) -> Result<IdentityClaims> {
        let verifier = self.providers.get(&provider).ok_or_else(|| {
            AuthError::Config(format!("No identity verifier for provider {}", provider))
        })?;

        let claims = verifier.verify_identity_token(token).await?;
        if claims.provider != provider {
            return Err(AuthError::Internal(
                "Identity verifier returned claims for a different provider".to_string(),
            ));
        }
        Ok(claims)
    }
}

/// Provisions local accounts from verified federated identities.
#[derive(Clone)]
pub struct FederatedAccounts {
    store: Arc<dyn CredentialStore>,
}

impl FederatedAccounts {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Resolve a verified identity to a local user, creating or linking as
    /// needed.
    ///
    /// Resolution order: an account already linked to this provider identity
    /// wins; otherwise an existing account with the same email gets the
    /// identity linked; otherwise a fresh account is provisioned with the
    /// default role. Provisioned accounts start unverified, the provider's
    /// word on the email is not taken over our own verification flow.
    pub async fn create_or_update_user(&self, claims: &IdentityClaims) -> Result<User> {
        // Providers report emails with arbitrary casing; match and store the
        // canonical form so one mailbox never splits into two accounts.
        let email = canonical_email(&claims.email);

        if let Some(mut user) = self
            .store
            .find_user_by_provider_id(claims.provider, &claims.subject_id)
            .await?
        {
            if user.name.is_none() && claims.name.is_some() {
                user.name = claims.name.clone();
                return self.store.update_user(&user).await;
            }
            return Ok(user);
        }

        if let Some(mut user) = self.store.find_user_by_email(&email).await? {
            user.set_provider(claims.provider, claims.subject_id.clone(), email.clone());
            let updated = self.store.update_user(&user).await?;
            tracing::info!(
                user_id = %updated.id,
                provider = %claims.provider,
                "Linked federated identity to existing account"
            );
            return Ok(updated);
        }

        let user = self
            .store
            .create_user(NewUser::federated(
                claims.provider,
                claims.subject_id.clone(),
                email,
                claims.name.clone(),
            ))
            .await?;

        tracing::info!(
            user_id = %user.id,
            provider = %claims.provider,
            "Provisioned account from federated identity"
        );

        Ok(user)
    }
}
