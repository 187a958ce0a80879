use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// User record as persisted in the users file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,                      // sequential user ID
    pub username: String,             // unique
    pub email: String,                // unique, login key
    #[serde(rename = "password")]
    pub password_hash: String,        // Argon2 PHC string, never sent to clients
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,   // set once at registration
}
