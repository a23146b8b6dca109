//! Routing of the public API: which paths are gated by which kind, and the
//! checks that answer before any database access.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use uuid::Uuid;
use zeroize::Zeroizing;

use coursegate::api::api_router;
use coursegate::auth::codec::TokenCodec;
use coursegate::auth::kind::{AuthConfig, KindPolicy, PrincipalKind};
use coursegate::config::{Config, RevocationBackend};
use coursegate::middleware::auth_gate::AUTH_HEADER;
use coursegate::revocation::memory::MemoryRevocationStore;
use coursegate::revocation::service::RevocationService;
use coursegate::store::postgres::PgStore;
use coursegate::AppState;

fn auth_config() -> AuthConfig {
    AuthConfig::new(
        KindPolicy::new(Zeroizing::new("routes-user".into()), Duration::from_secs(2_160_000)),
        KindPolicy::new(Zeroizing::new("routes-admin".into()), Duration::from_secs(86_400)),
    )
    .unwrap()
}

/// Postgres is never reached by these requests; the pool stays unconnected.
fn state() -> Arc<AppState> {
    let database_url = "postgres://coursegate@127.0.0.1:1/never_connected";
    let auth = auth_config();
    Arc::new(AppState {
        db: PgStore::connect_lazy(database_url).unwrap(),
        codec: Arc::new(TokenCodec::new(&auth)),
        revocations: RevocationService::new(Arc::new(MemoryRevocationStore::new()), &auth),
        config: Config {
            port: 0,
            database_url: database_url.into(),
            redis_url: "redis://127.0.0.1:1".into(),
            auth,
            revocation_backend: RevocationBackend::Memory,
            cors_origins: vec![],
        },
    })
}

fn app(state: &Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", api_router(state.clone()))
        .with_state(state.clone())
}

fn send(method: &str, uri: &str, token: Option<&str>, body: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTH_HEADER, token);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let state = state();
    for (method, uri) in [
        ("POST", "/api/v1/user/buy-course"),
        ("GET", "/api/v1/user/my-courses"),
        ("GET", "/api/v1/user/courses"),
        ("POST", "/api/v1/user/logout"),
        ("POST", "/api/v1/admin/make-course"),
        ("PUT", "/api/v1/admin/update-price"),
        ("POST", "/api/v1/admin/add-instructor"),
        ("GET", "/api/v1/admin/my-courses"),
        ("GET", "/api/v1/admin/courses"),
        ("POST", "/api/v1/admin/logout"),
    ] {
        let resp = app(&state).oneshot(send(method, uri, None, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
    }
}

#[tokio::test]
async fn test_user_token_cannot_reach_admin_routes() {
    let state = state();
    let token = state.codec.issue(Uuid::new_v4(), PrincipalKind::User).unwrap();

    let resp = app(&state)
        .oneshot(send("GET", "/api/v1/admin/my-courses", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_only_within_its_kind() {
    let state = state();
    let id = Uuid::new_v4();
    let token = state.codec.issue(id, PrincipalKind::Admin).unwrap();

    let resp = app(&state)
        .oneshot(send("POST", "/api/v1/admin/logout", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json(resp).await["msg"], "Logged out successfully.");

    let resp = app(&state)
        .oneshot(send("POST", "/api/v1/admin/logout", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    assert!(state.revocations.is_revoked(&token, id, PrincipalKind::Admin).await);
    assert!(!state.revocations.is_revoked(&token, id, PrincipalKind::User).await);
}

#[tokio::test]
async fn test_signup_rejects_bad_format_before_lookup() {
    let state = state();

    let weak = r#"{"firstName":"Ada","lastName":"Lovelace","email":"ada@example.com","password":"password"}"#;
    let resp = app(&state)
        .oneshot(send("POST", "/api/v1/user/signup", None, Some(weak)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = json(resp).await;
    assert_eq!(body["msg"], "Incorrect Format");
    assert!(body["error"]["password"].is_array());

    let extra = r#"{"firstName":"Ada","lastName":"Lovelace","email":"ada@example.com","password":"Secret(1","role":"admin"}"#;
    let resp = app(&state)
        .oneshot(send("POST", "/api/v1/admin/signup", None, Some(extra)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app(&state)
        .oneshot(send("POST", "/api/v1/user/login", None, Some("{not json")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bad_course_id_is_rejected_before_lookup() {
    let state = state();
    let token = state.codec.issue(Uuid::new_v4(), PrincipalKind::User).unwrap();

    let resp = app(&state)
        .oneshot(send(
            "POST",
            "/api/v1/user/buy-course",
            Some(&token),
            Some(r#"{"courseId":"abc"}"#),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json(resp).await["msg"],
        "Unable to find the course with course ID: abc"
    );

    let resp = app(&state)
        .oneshot(send(
            "POST",
            "/api/v1/user/buy-course",
            Some(&token),
            Some(r#"{"courseId":"ab"}"#),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let state = state();
    let resp = app(&state)
        .oneshot(send("GET", "/api/v1/instructor/courses", None, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
