use crate::{
    account::AccountService,
    handlers::{
        bearer_profile, connect_provider, current_session, disconnect_provider,
        federated_session, login, logout, register, verify_email,
    },
    identity::{FederatedAccounts, IdentityProvider, IdentityVerifiers},
    middleware::{BearerAuth, SessionAuth},
    provider::ProviderLinkService,
    session::SessionManager,
    store::CredentialStore,
};
use actix_web::{
    get,
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder,
};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub sessions: SessionManager,
    pub links: ProviderLinkService,
    pub federated: FederatedAccounts,
    pub verifiers: IdentityVerifiers,
    pub bearer_identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn CredentialStore>,
    pub cookie_secure: bool,
}

#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "learnhub-auth",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Mount every route and middleware onto a service config. Shared between the
/// production server and the HTTP-level tests.
pub fn configure_app(cfg: &mut web::ServiceConfig, state: AppState) {
    let session_scope = web::scope("/api/auth")
        .wrap(SessionAuth::new(state.sessions.clone(), state.store.clone()))
        .route("/session", web::get().to(current_session))
        .route("/logout", web::post().to(logout))
        .route("/connect-provider", web::post().to(connect_provider))
        .route("/disconnect-provider", web::post().to(disconnect_provider));

    let bearer_scope = web::scope("/api/identity")
        .wrap(BearerAuth::new(
            state.bearer_identity.clone(),
            state.federated.clone(),
        ))
        .route("/profile", web::get().to(bearer_profile));

    // Public services are registered before the scopes so the /api/auth
    // prefix match does not swallow them.
    cfg.app_data(Data::new(state))
        .service(health_check)
        .service(register)
        .service(login)
        .service(verify_email)
        .service(federated_session)
        .service(session_scope)
        .service(bearer_scope);
}

pub async fn start_server(bind_address: &str, state: AppState) -> std::io::Result<()> {
    tracing::info!("Starting auth service on {}", bind_address);

    HttpServer::new(move || {
        let state = state.clone();
        App::new().configure(|cfg| configure_app(cfg, state))
    })
    .bind(bind_address)?
    .run()
    .await
}
