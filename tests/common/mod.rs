#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration;
use learnhub_auth::{
    account::AccountService,
    error::{AuthError, Result},
    identity::{FederatedAccounts, IdentityClaims, IdentityProvider, IdentityVerifiers},
    mail::{MailError, MailOutbox, MailSender},
    password::PasswordHasher,
    provider::{Provider, ProviderLinkService},
    server::AppState,
    session::SessionManager,
    store::{CredentialStore, MemoryCredentialStore},
    token::TokenIssuer,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Captures outbound email for assertions instead of sending it.
pub struct RecordingMailer {
    pub sent: Mutex<Vec<SentMail>>,
    pub fail: Mutex<bool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn last(&self) -> Option<SentMail> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MailSender for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> std::result::Result<(), MailError> {
        if *self.fail.lock().unwrap() {
            return Err(MailError::Provider("simulated outage".to_string()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

/// Identity provider double: tokens granted up front verify, everything else
/// is rejected.
pub struct MockIdentityProvider {
    provider: Provider,
    tokens: Mutex<HashMap<String, IdentityClaims>>,
}

impl MockIdentityProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn grant(&self, token: &str, subject_id: &str, email: &str, name: Option<&str>) {
        self.tokens.lock().unwrap().insert(
            token.to_string(),
            IdentityClaims {
                provider: self.provider,
                subject_id: subject_id.to_string(),
                email: email.to_string(),
                name: name.map(str::to_string),
            },
        );
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn verify_identity_token(&self, token: &str) -> Result<IdentityClaims> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidOrExpiredToken)
    }
}

/// Fully wired application over in-memory storage and test doubles.
pub struct TestHarness {
    pub store: Arc<MemoryCredentialStore>,
    pub mailer: Arc<RecordingMailer>,
    pub google: Arc<MockIdentityProvider>,
    pub facebook: Arc<MockIdentityProvider>,
    pub state: AppState,
}

pub fn harness() -> TestHarness {
    harness_with_session_ttl(Duration::days(7))
}

pub fn harness_with_session_ttl(ttl: Duration) -> TestHarness {
    let store = Arc::new(MemoryCredentialStore::new());
    let dyn_store: Arc<dyn CredentialStore> = store.clone();

    let issuer = TokenIssuer::new("test-secret");
    let sessions = SessionManager::with_ttl(dyn_store.clone(), issuer, ttl);

    let mailer = Arc::new(RecordingMailer::new());
    let outbox = MailOutbox::new(mailer.clone(), std::time::Duration::from_secs(1));

    let accounts = AccountService::new(
        dyn_store.clone(),
        Arc::new(PasswordHasher::new()),
        sessions.clone(),
        outbox,
        "http://localhost:3000".to_string(),
    );

    let google = Arc::new(MockIdentityProvider::new(Provider::Google));
    let facebook = Arc::new(MockIdentityProvider::new(Provider::Facebook));

    let verifiers = IdentityVerifiers::new()
        .register(Provider::Google, google.clone())
        .register(Provider::Facebook, facebook.clone());

    let state = AppState {
        accounts,
        sessions,
        links: ProviderLinkService::new(dyn_store.clone()),
        federated: FederatedAccounts::new(dyn_store.clone()),
        verifiers,
        bearer_identity: google.clone(),
        store: dyn_store,
        cookie_secure: false,
    };

    TestHarness {
        store,
        mailer,
        google,
        facebook,
        state,
    }
}

/// Pull the raw verification token out of a captured email body.
pub fn token_from_email(body: &str) -> String {
    let start = body
        .find("token=")
        .expect("email body contains verification link")
        + "token=".len();
    let rest = &body[start..];
    let end = rest.find('&').unwrap_or(rest.len());
    rest[..end].to_string()
}
