use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use super::jwt::{Claims, TokenKeys};
use crate::error::AppError;

/// Extracts and validates the bearer token, yielding its claims.
pub struct AuthUser(pub Claims);

/// Second whitespace-separated part of the header; the scheme word itself is
/// not checked.
fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.split_whitespace().nth(1)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());

        let claims = TokenKeys::from_ref(state).verify(bearer_token(header))?;
        Ok(AuthUser(claims))
    }
}
