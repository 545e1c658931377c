use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .route("/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
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
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::jwt::Claims;
    use crate::config::{AppConfig, HashConfig, JwtConfig, StoreBackend};
    use crate::store::MemStore;

    const TEST_SECRET: &str = "test-secret";

    fn test_app() -> Router {
        let config = Arc::new(AppConfig {
            environment: "test".into(),
            database_url: String::new(),
            store: StoreBackend::Memory,
            jwt: JwtConfig {
                secret: TEST_SECRET.into(),
                ttl_hours: 1,
            },
            hash: HashConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        });
        let state = AppState::from_parts(Arc::new(MemStore::default()), config);
        build_app(state)
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read_response(response).await
    }

    async fn get_with_auth(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        read_response(response).await
    }

    async fn read_response(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn register_body(username: &str, email: &str, password: &str) -> Value {
        json!({ "username": username, "email": email, "password": password })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = test_app();
        let (status, body) = get_with_auth(&app, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn register_login_profile_flow() {
        let app = test_app();

        let (status, body) = post_json(
            &app,
            "/auth/register",
            register_body("xavier", "X@Y.com", "Passw0rd"),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(body["user"]["email"], "x@y.com"); // stored lowercased
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = post_json(
            &app,
            "/auth/login",
            json!({ "email": "x@y.com", "password": "Passw0rd" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().expect("login token").to_string();

        let (status, body) = get_with_auth(&app, "/auth/profile", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "x@y.com");
        assert_eq!(body["user"]["username"], "xavier");
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let app = test_app();

        let (status, _) = post_json(
            &app,
            "/auth/register",
            register_body("alice", "a@example.com", "Passw0rd"),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = post_json(
            &app,
            "/auth/register",
            register_body("alice2", "a@example.com", "Passw0rd"),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "email already registered");

        // The first record is intact and usable.
        let (status, _) = post_json(
            &app,
            "/auth/login",
            json!({ "email": "a@example.com", "password": "Passw0rd" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn login_failures_are_uniform() {
        let app = test_app();
        post_json(
            &app,
            "/auth/register",
            register_body("bob", "bob@example.com", "Passw0rd"),
        )
        .await;

        let (status, wrong_password) = post_json(
            &app,
            "/auth/login",
            json!({ "email": "bob@example.com", "password": "Wrong0pass" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, unknown_email) = post_json(
            &app,
            "/auth/login",
            json!({ "email": "nobody@example.com", "password": "Passw0rd" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Neither response reveals which part of the credentials failed.
        assert_eq!(wrong_password["error"], unknown_email["error"]);
        assert_eq!(wrong_password["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn weak_password_enumerates_unmet_rules() {
        let app = test_app();
        let (status, body) = post_json(
            &app,
            "/auth/register",
            register_body("carol", "carol@example.com", "longenough1"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("uppercase"));
        assert!(!message.contains("8 characters"));
    }

    #[tokio::test]
    async fn invalid_register_input_is_rejected() {
        let app = test_app();

        let (status, _) = post_json(
            &app,
            "/auth/register",
            register_body("dave", "not-an-email", "Passw0rd"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &app,
            "/auth/register",
            register_body("d!", "dave@example.com", "Passw0rd"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn profile_requires_a_valid_token() {
        let app = test_app();

        let (status, _) = get_with_auth(&app, "/auth/profile", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = get_with_auth(&app, "/auth/profile", Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let app = test_app();

        let (_, body) = post_json(
            &app,
            "/auth/register",
            register_body("erin", "erin@example.com", "Passw0rd"),
        )
        .await;
        let user_id: Uuid = body["user"]["id"].as_str().unwrap().parse().unwrap();

        let now = time::OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub: user_id,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        let (status, body) = get_with_auth(&app, "/auth/profile", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "token expired");
    }

    #[tokio::test]
    async fn token_for_missing_subject_is_not_found() {
        let app = test_app();
        post_json(
            &app,
            "/auth/register",
            register_body("frank", "frank@example.com", "Passw0rd"),
        )
        .await;

        let now = time::OffsetDateTime::now_utc().unix_timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4(), // never registered
            iat: now,
            exp: now + 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        let (status, _) = get_with_auth(&app, "/auth/profile", Some(&token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
