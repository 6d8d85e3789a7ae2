use crate::error::{AuthError, Result};
use crate::mail::{DispatchStatus, MailOutbox};
use crate::password::{validate_password, PasswordHasher};
use crate::session::{SessionHandle, SessionManager};
use crate::store::{CredentialStore, NewUser, UserProfile, VerificationTokenRecord};
use crate::token::TokenIssuer;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Verification tokens expire after this many hours.
pub const VERIFICATION_TTL_HOURS: i64 = 24;

/// What a successful registration hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub user: UserProfile,
    pub session: SessionHandle,
    pub email_dispatch: DispatchStatus,
}

/// What a successful login hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserProfile,
    pub session: SessionHandle,
}

/// Registration, login, and email verification over credential accounts.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<PasswordHasher>,
    sessions: SessionManager,
    outbox: MailOutbox,
    base_url: String,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<PasswordHasher>,
        sessions: SessionManager,
        outbox: MailOutbox,
        base_url: String,
    ) -> Self {
        Self {
            store,
            hasher,
            sessions,
            outbox,
            base_url,
        }
    }

    /// Register a new credential account.
    ///
    /// The account is usable immediately: a session is opened and the
    /// verification email goes out on the side. A failed or slow email
    /// provider downgrades `email_dispatch`, it never rolls the account back.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<RegisterOutcome> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        // Advisory pre-check for a friendly error; the unique index on email
        // is the real race guard.
        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateAccount);
        }

        let password_hash = self.hasher.hash_password(password)?;
        let user = self
            .store
            .create_user(NewUser::credentials(email.clone(), name, password_hash))
            .await?;

        let email_dispatch = self.issue_verification_email(user.id, &email).await?;
        let session = self.sessions.create_session(user.id).await?;

        tracing::info!(user_id = %user.id, "User registered");

        Ok(RegisterOutcome {
            user: user.into(),
            session,
            email_dispatch,
        })
    }

    /// Authenticate with email and password and open a session.
    ///
    /// Every failure mode collapses into `InvalidCredentials`: unknown email,
    /// wrong password, and accounts that have no password (OAuth-only) all
    /// produce the same error, so responses cannot be used to probe which
    /// emails are registered.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let email = normalize_email(email)?;

        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.hasher.verify_password(password, hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.sessions.create_session(user.id).await?;

        tracing::info!(user_id = %user.id, "User logged in");

        Ok(LoginOutcome {
            user: user.into(),
            session,
        })
    }

    /// Generate a fresh verification token for `user_id`, persist its digest,
    /// and dispatch the email carrying the raw token.
    pub async fn issue_verification_email(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<DispatchStatus> {
        let raw = TokenIssuer::generate_verification_token();

        self.store
            .create_verification_token(&VerificationTokenRecord {
                id: Uuid::new_v4(),
                user_id,
                email: email.to_string(),
                token_hash: TokenIssuer::hash_verification_token(&raw),
                expires_at: Utc::now() + Duration::hours(VERIFICATION_TTL_HOURS),
            })
            .await?;

        Ok(self
            .outbox
            .deliver_verification(&self.base_url, email, &raw)
            .await)
    }

    /// Consume a verification token and mark the account's email verified.
    ///
    /// Returns `Ok(None)` when the token is unknown, already consumed, or
    /// expired; the caller cannot tell which. An expired token is deleted on
    /// the spot, and consuming a token sweeps the user's other expired
    /// tokens as housekeeping.
    pub async fn verify_email_token(
        &self,
        raw_token: &str,
        email: &str,
    ) -> Result<Option<UserProfile>> {
        let token_hash = TokenIssuer::hash_verification_token(raw_token);

        let record = match self.store.find_verification_token(email, &token_hash).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        if record.expires_at <= Utc::now() {
            self.store.delete_verification_token(record.id).await?;
            return Ok(None);
        }

        let mut user = self
            .store
            .find_user_by_id(record.user_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        user.email_verified = true;
        let user = self.store.update_user(&user).await?;

        self.store.delete_verification_token(record.id).await?;
        self.store
            .delete_expired_verification_tokens(record.user_id)
            .await?;

        tracing::info!(user_id = %user.id, "Email verified");

        Ok(Some(user.into()))
    }
}

/// Canonicalize an email address, rejecting obviously malformed input.
fn normalize_email(email: &str) -> Result<String> {
    let email = crate::store::canonical_email(email);
    if email.is_empty() || !email.contains('@') || email.contains(char::is_whitespace) {
        return Err(AuthError::InvalidInput("Invalid email address".to_string()));
    }
    Ok(email)
}
