use crate::error::AuthError;
use crate::identity::{FederatedAccounts, IdentityProvider};
use crate::middleware::Principal;
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

/// Bearer identity-token access control.
///
/// Verifies an `Authorization: Bearer <token>` header against the identity
/// provider, resolves (or provisions) the local account for the asserted
/// identity, and attaches a [`Principal`] to the request. This is the entry
/// path for clients that authenticate with a provider-issued token instead of
/// a session cookie.
pub struct BearerAuth {
    identity: Arc<dyn IdentityProvider>,
    accounts: FederatedAccounts,
    required_permissions: Vec<&'static str>,
}

impl BearerAuth {
    pub fn new(identity: Arc<dyn IdentityProvider>, accounts: FederatedAccounts) -> Self {
        Self {
            identity,
            accounts,
            required_permissions: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = &'static str>) -> Self {
        self.required_permissions = permissions.into_iter().collect();
        self
    }
}

/// Strip the `Bearer ` scheme off an Authorization header value.
pub fn extract_bearer_token(header: &str) -> Result<&str, AuthError> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidOrExpiredToken)
}

impl<S, B> Transform<S, ServiceRequest> for BearerAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = BearerAuthService<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BearerAuthService {
            service: Rc::new(service),
            identity: self.identity.clone(),
            accounts: self.accounts.clone(),
            required_permissions: self.required_permissions.clone(),
        }))
    }
}

pub struct BearerAuthService<S> {
    service: Rc<S>,
    identity: Arc<dyn IdentityProvider>,
    accounts: FederatedAccounts,
    required_permissions: Vec<&'static str>,
}

impl<S, B> Service<ServiceRequest> for BearerAuthService<S>
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
        let identity = self.identity.clone();
        let accounts = self.accounts.clone();
        let required_permissions = self.required_permissions.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let auth: std::result::Result<Principal, AuthError> = async {
                let header = req
                    .headers()
                    .get("Authorization")
                    .and_then(|h| h.to_str().ok())
                    .ok_or(AuthError::InvalidOrExpiredToken)?;

                let token = extract_bearer_token(header)?;

                let claims = identity.verify_identity_token(token).await?;

                let user = accounts.create_or_update_user(&claims).await?;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123").unwrap(), "abc123");
        assert!(extract_bearer_token("Basic abc123").is_err());
        assert!(extract_bearer_token("Bearer ").is_err());
        assert!(extract_bearer_token("abc123").is_err());
    }
}
