use crate::error::AuthError;
use crate::middleware::{Principal, SESSION_COOKIE};
use crate::session::SessionManager;
use crate::store::CredentialStore;
use actix_web::{
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, ResponseError,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
    sync::Arc,
    task::{Context, Poll},
};

/// Session-cookie access control.
///
/// Reads the session token from the `sessionToken` cookie, validates it
/// against the session store, loads the user, checks any required
/// permissions, and attaches a [`Principal`] to the request.
pub struct SessionAuth {
    sessions: SessionManager,
    store: Arc<dyn CredentialStore>,
    required_permissions: Vec<&'static str>,
}

impl SessionAuth {
    pub fn new(sessions: SessionManager, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            sessions,
            store,
            required_permissions: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = &'static str>) -> Self {
        self.required_permissions = permissions.into_iter().collect();
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = SessionAuthService<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionAuthService {
            service: Rc::new(service),
            sessions: self.sessions.clone(),
            store: self.store.clone(),
            required_permissions: self.required_permissions.clone(),
        }))
    }
}

pub struct SessionAuthService<S> {
    service: Rc<S>,
    sessions: SessionManager,
    store: Arc<dyn CredentialStore>,
    required_permissions: Vec<&'static str>,
}

impl<S, B> Service<ServiceRequest> for SessionAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let sessions = self.sessions.clone();
        let store = self.store.clone();
        let required_permissions = self.required_permissions.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let auth: std::result::Result<Principal, AuthError> = async {
                let token = req
                    .cookie(SESSION_COOKIE)
                    .map(|c| c.value().to_string())
                    .ok_or(AuthError::InvalidOrExpiredToken)?;

                let session = sessions
                    .get_session(&token)
                    .await?
                    .ok_or(AuthError::InvalidOrExpiredToken)?;

                let user = store
                    .find_user_by_id(session.user_id)
                    .await?
                    .ok_or(AuthError::InvalidOrExpiredToken)?;

                let principal = Principal { user };
                principal.require_permissions(&required_permissions)?;
                Ok(principal)
            }
            .await;

            match auth {
                Ok(principal) => {
                    req.extensions_mut().insert(principal);
                    service
                        .call(req)
                        .await
                        .map(ServiceResponse::map_into_left_body)
                }
                // Render the rejection here so it reaches clients (and the
                // test service) as a response rather than a service error.
                Err(err) => {
                    let response = err.error_response().map_into_right_body();
                    Ok(req.into_response(response))
                }
            }
        })
    }
}
