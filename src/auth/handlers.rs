use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, ProtectedResponse, PublicUser, RegisterRequest,
            RegisterResponse,
        },
        extractors::AuthUser,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/protected", get(protected))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let Json(payload) = payload?;
    let user = state
        .credentials
        .register(
            payload.username.as_deref().unwrap_or_default(),
            payload.email.as_deref().unwrap_or_default(),
            payload.password.as_deref().unwrap_or_default(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully",
            user: PublicUser::from(user),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(payload) = payload?;
    let email = payload.email.as_deref().unwrap_or_default();

    let user = match state
        .credentials
        .authenticate(email, payload.password.as_deref().unwrap_or_default())
        .await?
    {
        Some(u) => u,
        None => {
            warn!(%email, "login rejected");
            return Err(AppError::InvalidCredentials);
        }
    };

    let token = state.tokens.issue(&user)?;

    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok(Json(LoginResponse {
        message: "Login successful",
        user: PublicUser::from(user),
        token,
    }))
}

#[instrument(skip_all)]
pub async fn protected(AuthUser(claims): AuthUser) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        message: "This is a protected route",
        user: claims,
    })
}

pub async fn healthcheck() -> &'static str {
    "ok"
}
