use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

/// Work factor for password hashing (Argon2 time cost).
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub users_file: PathBuf,
    pub cors_origin: Option<String>,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
}

/// Parses `key` when present; an unparsable value is an error, not a default.
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value {v:?}")),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let ttl_minutes = parse_or(&lookup, "JWT_TTL_MINUTES", 60 * 24i64)?;
        if ttl_minutes <= 0 {
            anyhow::bail!("JWT_TTL_MINUTES must be positive, got {ttl_minutes}");
        }

        let cost = parse_or(&lookup, "PASSWORD_HASH_COST", 10u32)?;
        argon2::Params::new(
            argon2::Params::DEFAULT_M_COST,
            cost,
            argon2::Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|e| anyhow::anyhow!("PASSWORD_HASH_COST {cost} rejected: {e}"))?;

        Ok(Self {
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "APP_PORT", 3000)?,
            users_file: lookup("USERS_FILE")
                .unwrap_or_else(|| "users.json".into())
                .into(),
            cors_origin: lookup("CORS_ALLOWED_ORIGIN").filter(|v| !v.is_empty()),
            jwt: JwtConfig {
                secret,
                ttl_minutes,
            },
            password: PasswordConfig { cost },
        })
    }
}
