use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::AppError;
use crate::services::AppState;

/// Identity token payload. Handlers read it as the verified caller.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct IdentityClaims {
    pub sub: String, // user uid
    pub email: String,
    #[serde(rename = "isAdmin", default)]
    pub is_admin: bool,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    InvalidToken,
    ExpiredToken,
    MissingToken,
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidToken => write!(f, "Invalid token"),
            AuthError::ExpiredToken => write!(f, "Token expired"),
            AuthError::MissingToken => write!(f, "Missing authorization token"),
            AuthError::InvalidSignature => write!(f, "Invalid token signature"),
        }
    }
}

impl std::error::Error for AuthError {}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn generate_token(&self, claims: &IdentityClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    pub fn validate_token(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let validation = Validation::default();

        decode::<IdentityClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Verifies the bearer identity token and stores the claims for handlers
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_token(&headers)
        .and_then(|token| state.identity.verify_token(token))
        .map_err(|e| {
            tracing::warn!("Identity token rejected: {}", e);
            AppError::unauthorized()
        })?;

    tracing::debug!(
        "Authenticated caller: {} (admin: {})",
        claims.email,
        claims.is_admin
    );

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Requires the `isAdmin` claim; must run after `auth_middleware`
pub async fn admin_guard_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    match request.extensions().get::<IdentityClaims>() {
        Some(claims) if claims.is_admin => Ok(next.run(request).await),
        Some(claims) => {
            tracing::warn!("Access denied for {}: admin claim required", claims.email);
            Err(AppError::forbidden("Admin access required"))
        }
        None => Err(AppError::unauthorized()),
    }
}
