use learnhub_auth::{
    account::AccountService,
    config::{AuthConfig, MailConfig},
    identity::{FederatedAccounts, IdentityVerifiers, TokenInfoIdentityProvider},
    mail::{ConsoleMailer, HttpApiMailer, MailOutbox, MailSender},
    password::PasswordHasher,
    provider::{Provider, ProviderLinkService},
    server::{start_server, AppState},
    session::SessionManager,
    store::{CredentialStore, PostgresCredentialStore},
    token::TokenIssuer,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting LearnHub auth service");

    let config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            std::io::Error::other(e.to_string())
        })?;

    let store: Arc<dyn CredentialStore> = Arc::new(PostgresCredentialStore::new(db_pool));
    let issuer = TokenIssuer::new(&config.session_secret);
    let sessions = SessionManager::new(store.clone(), issuer);

    let mailer: Arc<dyn MailSender> = match &config.mail {
        MailConfig::Console => {
            tracing::info!("Mail transport: console");
            Arc::new(ConsoleMailer)
        }
        MailConfig::SendGrid {
            api_key,
            from_email,
            from_name,
        } => {
            tracing::info!("Mail transport: SendGrid");
            Arc::new(HttpApiMailer::new(
                "https://api.sendgrid.com/v3/mail/send".to_string(),
                api_key.clone(),
                from_email.clone(),
                from_name.clone(),
            ))
        }
    };
    let outbox = MailOutbox::new(mailer, config.mail_timeout);

    let accounts = AccountService::new(
        store.clone(),
        Arc::new(PasswordHasher::new()),
        sessions.clone(),
        outbox,
        config.base_url.clone(),
    );

    let google_identity = Arc::new(
        TokenInfoIdentityProvider::new(
            Provider::Google,
            config.google_tokeninfo_url.clone(),
            config.identity_timeout,
        )
        .map_err(|e| std::io::Error::other(e.to_string()))?,
    );
    let facebook_identity = Arc::new(
        TokenInfoIdentityProvider::new(
            Provider::Facebook,
            config.facebook_tokeninfo_url.clone(),
            config.identity_timeout,
        )
        .map_err(|e| std::io::Error::other(e.to_string()))?,
    );

    let verifiers = IdentityVerifiers::new()
        .register(Provider::Google, google_identity.clone())
        .register(Provider::Facebook, facebook_identity);

    let state = AppState {
        accounts,
        sessions,
        links: ProviderLinkService::new(store.clone()),
        federated: FederatedAccounts::new(store.clone()),
        verifiers,
        bearer_identity: google_identity,
        store,
        cookie_secure: config.cookie_secure,
    };

    start_server(&config.bind_address, state).await
}
