use crate::{
    error::{AuthError, Result},
    middleware::{extract_principal, SESSION_COOKIE},
    provider::Provider,
    server::AppState,
    store::UserProfile,
};
use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    post, web, HttpRequest, HttpResponse, Responder,
};
use serde::{Deserialize, Serialize};

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(CookieDuration::days(crate::session::SESSION_TTL_DAYS))
        .finish()
}

fn removal_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(CookieDuration::ZERO)
        .finish()
}

// ============================================================================
// Registration and login
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserProfile,
    pub verification_email_sent: bool,
}

#[post("/api/auth/register")]
pub async fn register(
    state: web::Data<AppState>,
    req: web::Json<RegisterRequest>,
) -> Result<impl Responder> {
    let outcome = state
        .accounts
        .register(&req.email, &req.password, req.name.clone())
        .await?;

    Ok(HttpResponse::Created()
        .cookie(session_cookie(outcome.session.token, state.cookie_secure))
        .json(RegisterResponse {
            user: outcome.user,
            verification_email_sent: outcome.email_dispatch.is_sent(),
        }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: UserProfile,
}

#[post("/api/auth/login")]
pub async fn login(
    state: web::Data<AppState>,
    req: web::Json<LoginRequest>,
) -> Result<impl Responder> {
    let outcome = state.accounts.login(&req.email, &req.password).await?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(outcome.session.token, state.cookie_secure))
        .json(SessionResponse { user: outcome.user }))
}

// ============================================================================
// Email verification
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyEmailResponse {
    pub user: UserProfile,
    pub message: String,
}

#[post("/api/auth/verify-email")]
pub async fn verify_email(
    state: web::Data<AppState>,
    req: web::Json<VerifyEmailRequest>,
) -> Result<impl Responder> {
    let user = state
        .accounts
        .verify_email_token(&req.token, &req.email)
        .await?
        .ok_or(AuthError::InvalidOrExpiredToken)?;

    Ok(HttpResponse::Ok().json(VerifyEmailResponse {
        user,
        message: "Email verified".to_string(),
    }))
}

// ============================================================================
// Federated sign-in
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FederatedSessionRequest {
    pub provider: Provider,
    pub token: String,
}

/// Exchange a provider-issued identity token for a first-party session.
#[post("/api/auth/federated-session")]
pub async fn federated_session(
    state: web::Data<AppState>,
    req: web::Json<FederatedSessionRequest>,
) -> Result<impl Responder> {
    let claims = state.verifiers.verify(req.provider, &req.token).await?;
    let user = state.federated.create_or_update_user(&claims).await?;
    let session = state.sessions.create_session(user.id).await?;

    Ok(HttpResponse::Ok()
        .cookie(session_cookie(session.token, state.cookie_secure))
        .json(SessionResponse { user: user.into() }))
}

// ============================================================================
// Session-protected handlers (mounted behind SessionAuth)
// ============================================================================

pub async fn current_session(req: HttpRequest) -> Result<impl Responder> {
    let principal = extract_principal(&req)?;
    Ok(HttpResponse::Ok().json(SessionResponse {
        user: principal.user.into(),
    }))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

pub async fn logout(state: web::Data<AppState>, req: HttpRequest) -> Result<impl Responder> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        state.sessions.revoke_session(cookie.value()).await?;
    }

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(state.cookie_secure))
        .json(LogoutResponse {
            message: "Logged out".to_string(),
        }))
}

#[derive(Debug, Deserialize)]
pub struct ConnectProviderRequest {
    pub provider: Provider,
    pub token: String,
}

pub async fn connect_provider(
    state: web::Data<AppState>,
    http_req: HttpRequest,
    req: web::Json<ConnectProviderRequest>,
) -> Result<impl Responder> {
    let principal = extract_principal(&http_req)?;

    let claims = state.verifiers.verify(req.provider, &req.token).await?;
    let user = state
        .links
        .connect_provider(
            principal.user.id,
            req.provider,
            &claims.subject_id,
            &claims.email,
        )
        .await?;

    Ok(HttpResponse::Ok().json(SessionResponse { user: user.into() }))
}

#[derive(Debug, Deserialize)]
pub struct DisconnectProviderRequest {
    pub provider: Provider,
}

pub async fn disconnect_provider(
    state: web::Data<AppState>,
    http_req: HttpRequest,
    req: web::Json<DisconnectProviderRequest>,
) -> Result<impl Responder> {
    let principal = extract_principal(&http_req)?;

    let user = state
        .links
        .disconnect_provider(principal.user.id, req.provider)
        .await?;

    Ok(HttpResponse::Ok().json(SessionResponse { user: user.into() }))
}

// ============================================================================
// Bearer-protected handlers (mounted behind BearerAuth)
// ============================================================================

pub async fn bearer_profile(req: HttpRequest) -> Result<impl Responder> {
    let principal = extract_principal(&req)?;
    Ok(HttpResponse::Ok().json(SessionResponse {
        user: principal.user.into(),
    }))
}
