use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::{
    auth::{
        password::{hash_password, verify_password},
        repo_types::User,
    },
    config::PasswordConfig,
    error::{AppError, ConflictField},
    storage::{StorageError, UserStore},
};

/// Verified against on unknown-email logins so both failure paths cost one hash.
const DUMMY_PASSWORD: &str = "no-such-user-placeholder";

/// Registration and login on top of a [`UserStore`].
pub struct CredentialService {
    store: Arc<dyn UserStore>,
    hash_cost: u32,
    // Serializes load -> mutate -> save so concurrent registrations
    // cannot overwrite each other or reuse an id.
    write_lock: Mutex<()>,
    dummy_hash: OnceCell<String>,
}

fn is_present(value: &str) -> bool {
    !value.is_empty()
}

impl CredentialService {
    pub fn new(store: Arc<dyn UserStore>, password: &PasswordConfig) -> Self {
        Self {
            store,
            hash_cost: password.cost,
            write_lock: Mutex::new(()),
            dummy_hash: OnceCell::new(),
        }
    }

    async fn hash(&self, password: &str) -> Result<String, AppError> {
        let cost = self.hash_cost;
        let plain = password.to_owned();
        Ok(tokio::task::spawn_blocking(move || hash_password(&plain, cost)).await??)
    }

    /// Hashed once, with the configured cost, on first use.
    async fn dummy_hash(&self) -> Result<&str, AppError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| self.hash(DUMMY_PASSWORD))
            .await?;
        Ok(hash.as_str())
    }

    /// Creates a user. The returned record still carries the password hash;
    /// callers must not send it to clients.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, AppError> {
        if !(is_present(username) && is_present(email) && is_present(password)) {
            return Err(AppError::Validation(
                "Username, password and email are required".into(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut users = self.store.load_all().await?;

        if users.iter().any(|u| u.username == username) {
            warn!(%username, "username already registered");
            return Err(AppError::Conflict(ConflictField::Username));
        }
        if users.iter().any(|u| u.email == email) {
            warn!(%email, "email already registered");
            return Err(AppError::Conflict(ConflictField::Email));
        }

        let last_id = users.iter().map(|u| u.id).max().unwrap_or(0);
        let id = last_id
            .checked_add(1)
            .ok_or(StorageError::IdOverflow(last_id))?;
        let password_hash = self.hash(password).await?;

        let user = User {
            id,
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        self.store.save_all(&users).await?;

        info!(user_id = user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Returns `None` for both an unknown email and a wrong password.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, AppError> {
        if !(is_present(email) && is_present(password)) {
            return Err(AppError::Validation(
                "Email and password are required".into(),
            ));
        }

        let users = self.store.load_all().await?;
        let found = users.into_iter().find(|u| u.email == email);
        let hash = match &found {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash().await?.to_owned(),
        };

        let plain = password.to_owned();
        let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &hash)).await??;
        match found {
            Some(user) if ok => Ok(Some(user)),
            Some(user) => {
                debug!(user_id = user.id, "login invalid password");
                Ok(None)
            }
            None => {
                debug!(%email, "login unknown email");
                Ok(None)
            }
        }
    }
}
