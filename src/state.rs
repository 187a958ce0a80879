use crate::auth::{jwt::TokenKeys, services::CredentialService};
use crate::config::AppConfig;
use crate::storage::{JsonFileStore, UserStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub credentials: Arc<CredentialService>,
    pub tokens: TokenKeys,
}

impl AppState {
    /// Builds the state over the JSON users file and makes sure the file
    /// exists and parses before the server starts.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let store = Arc::new(JsonFileStore::new(&config.users_file));
        let existing = store.load_all().await?;
        tracing::info!(
            path = %store.path().display(),
            users = existing.len(),
            "users file ready"
        );
        Ok(Self::from_parts(Arc::new(config), store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn UserStore>) -> Self {
        let credentials = Arc::new(CredentialService::new(store, &config.password));
        let tokens = TokenKeys::from_config(&config.jwt);
        Self {
            config,
            credentials,
            tokens,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::{JwtConfig, PasswordConfig};
        use crate::storage::tests::MemoryStore;

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            users_file: "unused.json".into(),
            cors_origin: None,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                ttl_minutes: 60 * 24,
            },
            password: PasswordConfig { cost: 1 },
        });
        Self::from_parts(config, Arc::new(MemoryStore::default()))
    }
}
