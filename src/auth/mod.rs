use crate::state::AppState;
use axum::{routing::get, Router};

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::protected_routes())
        .route("/healthcheck", get(handlers::healthcheck))
}
