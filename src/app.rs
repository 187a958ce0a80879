use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::config::AppConfig;
use crate::state::AppState;

fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };
    let origin = HeaderValue::from_str(origin)
        .context("CORS_ALLOWED_ORIGIN is not a valid header value")?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ]))
}

pub fn build_app(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(state.config.cors_origin.as_deref())?;
    Ok(Router::new()
        .merge(auth::router())
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        ))
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.expect("infallible");
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_protected(auth: Option<&str>) -> Request<Body> {
        let mut req = Request::get("/protected");
        if let Some(value) = auth {
            req = req.header(header::AUTHORIZATION, value);
        }
        req.body(Body::empty()).unwrap()
    }

    fn app() -> Router {
        build_app(AppState::fake()).expect("app builds")
    }

    #[tokio::test]
    async fn register_login_and_access_protected_route() {
        let app = app();

        let (status, body) = send(
            &app,
            post_json(
                "/auth/register",
                json!({ "username": "alice", "email": "a@x.com", "password": "pw1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "User created successfully");
        assert_eq!(body["user"]["id"], 1);
        assert_eq!(body["user"]["username"], "alice");
        assert!(body["user"].get("password").is_none());

        let (status, body) = send(
            &app,
            post_json(
                "/auth/register",
                json!({ "username": "alice", "email": "other@x.com", "password": "pw2" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username already exists");

        let (status, body) = send(
            &app,
            post_json("/auth/login", json!({ "email": "a@x.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");

        let (status, body) = send(
            &app,
            post_json("/auth/login", json!({ "email": "a@x.com", "password": "pw1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Login successful");
        assert!(body["user"].get("password").is_none());
        let token = body["token"].as_str().expect("token").to_string();

        let (status, body) = send(&app, get_protected(Some(format!("Bearer {token}").as_str()))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "This is a protected route");
        assert_eq!(body["user"]["userId"], 1);
        assert_eq!(body["user"]["email"], "a@x.com");
        assert_eq!(body["user"]["username"], "alice");

        let (status, body) = send(&app, get_protected(None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Authentication token is required");
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_identical() {
        let app = app();
        send(
            &app,
            post_json(
                "/auth/register",
                json!({ "username": "alice", "email": "a@x.com", "password": "pw1" }),
            ),
        )
        .await;

        let wrong = send(
            &app,
            post_json("/auth/login", json!({ "email": "a@x.com", "password": "nope" })),
        )
        .await;
        let unknown = send(
            &app,
            post_json("/auth/login", json!({ "email": "z@x.com", "password": "pw1" })),
        )
        .await;
        assert_eq!(wrong, unknown);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let app = app();
        let first = json!({ "username": "alice", "email": "a@x.com", "password": "pw1" });
        send(&app, post_json("/auth/register", first)).await;

        let (status, body) = send(
            &app,
            post_json(
                "/auth/register",
                json!({ "username": "bob", "email": "a@x.com", "password": "pw2" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already exists");
    }

    #[tokio::test]
    async fn missing_fields_are_bad_requests() {
        let app = app();

        let (status, body) = send(
            &app,
            post_json("/auth/register", json!({ "username": "alice", "password": "pw1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username, password and email are required");

        let (status, body) = send(
            &app,
            post_json(
                "/auth/register",
                json!({ "username": "", "email": "a@x.com", "password": "pw1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username, password and email are required");

        let (status, body) = send(&app, post_json("/auth/login", json!({ "email": "a@x.com" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email and password are required");
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let app = app();
        let req = Request::post("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{ nope"))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid request body");
    }

    #[tokio::test]
    async fn invalid_token_is_forbidden() {
        let app = app();
        let (status, body) = send(&app, get_protected(Some("Bearer not.a.token"))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Invalid or expired token");

        let (status, _) = send(&app, get_protected(Some("Bearer"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_signed_elsewhere_is_forbidden() {
        use crate::auth::{jwt::TokenKeys, repo_types::User};
        use crate::config::JwtConfig;

        let foreign = TokenKeys::from_config(&JwtConfig {
            secret: "someone-else".into(),
            ttl_minutes: 60,
        });
        let token = foreign
            .issue(&User {
                id: 1,
                username: "alice".into(),
                email: "a@x.com".into(),
                password_hash: String::new(),
                created_at: time::OffsetDateTime::now_utc(),
            })
            .unwrap();

        let (status, _) = send(&app(), get_protected(Some(format!("Bearer {token}").as_str()))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn healthcheck_needs_no_auth() {
        let res = app()
            .oneshot(Request::get("/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }

    #[test]
    fn cors_origin_must_be_a_header_value() {
        assert!(cors_layer(Some("http://localhost:4200")).is_ok());
        assert!(cors_layer(Some("bad\norigin")).is_err());
        assert!(cors_layer(None).is_ok());
    }
}
