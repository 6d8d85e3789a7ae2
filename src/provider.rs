use crate::error::{AuthError, Result};
use crate::store::{canonical_email, CredentialStore, User};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Third-party identity providers a local account can be linked to.
///
/// A tagged variant rather than a provider-name string: each variant maps to
/// its own id/email field pair on the user record through exhaustive
/// matches, so adding a provider is a compile-time-checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
        }
    }

    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Facebook];
}

impl FromStr for Provider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "facebook" => Ok(Provider::Facebook),
            other => Err(AuthError::InvalidInput(format!(
                "Unsupported provider: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connects and disconnects provider identities on existing accounts,
/// enforcing the email-match, uniqueness, and last-login-method invariants.
#[derive(Clone)]
pub struct ProviderLinkService {
    store: Arc<dyn CredentialStore>,
}

impl ProviderLinkService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Link a provider identity to the user's account.
    ///
    /// The early uniqueness lookup is advisory; the store's unique index on
    /// the provider-id column is the authoritative race guard and surfaces
    /// concurrent double-links as `ProviderAlreadyLinked`.
    pub async fn connect_provider(
        &self,
        user_id: Uuid,
        provider: Provider,
        provider_id: &str,
        provider_email: &str,
    ) -> Result<User> {
        let mut user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        // Linking an identity with a different email would let an attacker
        // attach their own OAuth identity to a victim account. Stored emails
        // are canonical, so compare against the canonical provider email.
        let provider_email = canonical_email(provider_email);
        if provider_email != user.email {
            return Err(AuthError::EmailMismatch);
        }

        if let Some(existing) = self
            .store
            .find_user_by_provider_id(provider, provider_id)
            .await?
        {
            if existing.id != user.id {
                return Err(AuthError::ProviderAlreadyLinked);
            }
        }

        user.set_provider(provider, provider_id.to_string(), provider_email);
        let updated = self.store.update_user(&user).await?;

        tracing::info!(
            user_id = %updated.id,
            provider = %provider,
            "Provider identity connected"
        );

        Ok(updated)
    }

    /// Unlink a provider identity from the user's account.
    ///
    /// Rejected with `LastLoginMethod` when the account would be left with
    /// neither a password nor any linked provider. Disconnecting a provider
    /// that was never linked is a no-op.
    pub async fn disconnect_provider(&self, user_id: Uuid, provider: Provider) -> Result<User> {
        let mut user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if user.provider_id(provider).is_none() {
            return Ok(user);
        }

        let other_provider_linked = Provider::ALL
            .iter()
            .any(|p| *p != provider && user.provider_id(*p).is_some());

        if user.password_hash.is_none() && !other_provider_linked {
            return Err(AuthError::LastLoginMethod);
        }

        user.clear_provider(provider);
        let updated = self.store.update_user(&user).await?;

        tracing::info!(
            user_id = %updated.id,
            provider = %provider,
            "Provider identity disconnected"
        );

        Ok(updated)
    }
}
