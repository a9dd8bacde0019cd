//! Member token verification.
//!
//! Tokens are issued elsewhere; this module only checks the HS256 signature
//! and expiry and exposes the member to handlers.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberClaims {
    /// Customer id
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

/// Authenticated member attached to the request by [`member_auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMember {
    pub cust_id: i32,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct MemberTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl MemberTokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthMember, ServiceError> {
        let claims = decode::<MemberClaims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::Unauthorized("token expired".to_string())
                }
                _ => ServiceError::Unauthorized("invalid token".to_string()),
            })?
            .claims;

        let cust_id = claims
            .sub
            .parse::<i32>()
            .map_err(|_| ServiceError::Unauthorized("invalid subject".to_string()))?;

        Ok(AuthMember {
            cust_id,
            name: claims.name.filter(|n| !n.trim().is_empty()),
            email: claims.email.filter(|e| !e.trim().is_empty()),
        })
    }
}

/// Attaches [`AuthMember`] when a bearer token is present. Anonymous requests
/// pass through; a present but invalid token is rejected with 401.
pub async fn member_auth_middleware(
    State(verifier): State<Arc<MemberTokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());

    if let Some(token) = bearer {
        match verifier.verify(&token) {
            Ok(member) => {
                debug!(cust_id = member.cust_id, "member authenticated");
                request.extensions_mut().insert(member);
            }
            Err(e) => return e.into_response(),
        }
    }

    next.run(request).await
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthMember
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthMember>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("member login required".to_string()))
    }
}
