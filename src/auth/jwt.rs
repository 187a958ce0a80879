use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{auth::repo_types::User, config::JwtConfig, state::AppState};

/// JWT payload. Carries a few denormalized user fields so protected routes
/// need no store lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: u64,
    pub email: String,
    pub username: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    #[error("no token presented")]
    Missing,
    #[error("token is invalid or expired")]
    InvalidOrExpired,
}

/// Signing and verification keys plus the token lifetime.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            ttl: Duration::minutes(cfg.ttl_minutes),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(user, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(
        &self,
        user: &User,
        now: OffsetDateTime,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = now + self.ttl;
        let claims = Claims {
            user_id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = user.id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: Option<&str>) -> Result<Claims, VerificationFailure> {
        let token = token.ok_or(VerificationFailure::Missing)?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "jwt rejected");
            VerificationFailure::InvalidOrExpired
        })?;
        debug!(user_id = data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}
