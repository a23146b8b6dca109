//! Revocation service against the persistent stores.
//!
//! These need live services and are ignored by default:
//!
//! ```text
//! DATABASE_URL=postgres://... REDIS_URL=redis://... cargo test --test revocation_backends -- --ignored
//! ```
//!
//! Every test works on a fresh principal id, so runs never interfere.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;
use zeroize::Zeroizing;

use coursegate::auth::kind::{AuthConfig, KindPolicy, PrincipalKind};
use coursegate::revocation::postgres::PgRevocationStore;
use coursegate::revocation::redis::RedisRevocationStore;
use coursegate::revocation::service::RevocationService;
use coursegate::revocation::RevocationStore;
use coursegate::store::postgres::PgStore;

const ADMIN_TTL_SECS: i64 = 86_400;

fn service(store: Arc<dyn RevocationStore>) -> RevocationService {
    let auth = AuthConfig::new(
        KindPolicy::new(Zeroizing::new("backend-user-secret".into()), Duration::from_secs(2_160_000)),
        KindPolicy::new(
            Zeroizing::new("backend-admin-secret".into()),
            Duration::from_secs(ADMIN_TTL_SECS as u64),
        ),
    )
    .unwrap();
    RevocationService::new(store, &auth)
}

async fn postgres_store() -> Arc<dyn RevocationStore> {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/coursegate_test".to_string());
    let db = PgStore::connect(&url).await.expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");
    Arc::new(PgRevocationStore::new(db.pool().clone()))
}

async fn redis_store() -> Arc<dyn RevocationStore> {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = ::redis::Client::open(url.as_str()).expect("Invalid REDIS_URL");
    let conn = ::redis::aio::ConnectionManager::new(client)
        .await
        .expect("Failed to connect to Redis");
    Arc::new(RedisRevocationStore::new(conn))
}

async fn concurrent_revokes_are_all_kept(store: Arc<dyn RevocationStore>) {
    let svc = service(store.clone());
    let id = Uuid::new_v4();
    let tokens: Vec<String> = (0..64).map(|i| format!("tok-{}", i)).collect();

    let handles: Vec<_> = tokens
        .iter()
        .cloned()
        .map(|token| {
            let svc = svc.clone();
            tokio::spawn(async move { svc.revoke(&token, id, PrincipalKind::User).await })
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        assert!(result.unwrap());
    }

    let record = store.get(id, PrincipalKind::User).await.unwrap().unwrap();
    assert_eq!(record.entries.len(), tokens.len());
    for token in &tokens {
        assert!(svc.is_revoked(token, id, PrincipalKind::User).await, "{} lost", token);
    }
}

async fn double_revoke_keeps_one_entry(store: Arc<dyn RevocationStore>) {
    let svc = service(store.clone());
    let id = Uuid::new_v4();
    let first = Utc::now();
    let second = first + chrono::Duration::seconds(10);

    assert!(svc.revoke_at("tok-1", id, PrincipalKind::User, first).await);
    assert!(svc.revoke_at("tok-2", id, PrincipalKind::User, first).await);
    assert!(svc.revoke_at("tok-1", id, PrincipalKind::User, second).await);

    let record = store.get(id, PrincipalKind::User).await.unwrap().unwrap();
    let tok1: Vec<_> = record.entries.iter().filter(|e| e.token == "tok-1").collect();
    assert_eq!(tok1.len(), 1);
    assert_eq!(record.entries.len(), 2);
    assert!(tok1[0].expires_at > first + chrono::Duration::seconds(2_160_000));
}

async fn revocation_lapses_exactly_at_expiry(store: Arc<dyn RevocationStore>) {
    let svc = service(store.clone());
    let id = Uuid::new_v4();
    let at = Utc::now();
    let ttl = chrono::Duration::seconds(ADMIN_TTL_SECS);
    let just_before = at + ttl - chrono::Duration::milliseconds(1);
    let at_expiry = at + ttl;

    assert!(svc.revoke_at("t", id, PrincipalKind::Admin, at).await);

    assert!(svc.is_revoked_at("t", id, PrincipalKind::Admin, just_before).await);
    assert!(!svc.is_revoked_at("t", id, PrincipalKind::Admin, at_expiry).await);
    // Pruned for good: an earlier clock does not bring it back.
    assert!(!svc.is_revoked_at("t", id, PrincipalKind::Admin, just_before).await);

    let remaining = store
        .get(id, PrincipalKind::Admin)
        .await
        .unwrap()
        .map_or(0, |record| record.entries.len());
    assert_eq!(remaining, 0);
}

async fn prune_does_not_drop_concurrent_appends(store: Arc<dyn RevocationStore>) {
    let svc = service(store.clone());
    let id = Uuid::new_v4();

    // Already expired, so every check below has something to prune.
    let long_ago = Utc::now() - chrono::Duration::seconds(ADMIN_TTL_SECS + 60);
    for i in 0..50 {
        assert!(svc.revoke_at(&format!("old-{}", i), id, PrincipalKind::Admin, long_ago).await);
    }

    let mut handles = Vec::new();
    for i in 0..50 {
        let revoker = svc.clone();
        handles.push(tokio::spawn(async move {
            revoker.revoke(&format!("new-{}", i), id, PrincipalKind::Admin).await
        }));
        let checker = svc.clone();
        handles.push(tokio::spawn(async move {
            !checker.is_revoked(&format!("old-{}", i), id, PrincipalKind::Admin).await
        }));
    }
    for result in futures::future::join_all(handles).await {
        assert!(result.unwrap());
    }

    let record = store
        .prune_expired(id, PrincipalKind::Admin, Utc::now())
        .await
        .unwrap()
        .unwrap();
    let kept = record.entries.iter().filter(|e| e.token.starts_with("new-")).count();
    assert_eq!(kept, 50);
    assert_eq!(record.entries.len(), 50, "stale entries survived a prune");
}

mod pg_backend {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires DATABASE_URL
    async fn test_concurrent_revokes_are_all_kept() {
        concurrent_revokes_are_all_kept(postgres_store().await).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_double_revoke_keeps_one_entry() {
        double_revoke_keeps_one_entry(postgres_store().await).await;
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_revocation_lapses_exactly_at_expiry() {
        revocation_lapses_exactly_at_expiry(postgres_store().await).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires DATABASE_URL
    async fn test_prune_does_not_drop_concurrent_appends() {
        prune_does_not_drop_concurrent_appends(postgres_store().await).await;
    }
}

mod redis_backend {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires REDIS_URL
    async fn test_concurrent_revokes_are_all_kept() {
        concurrent_revokes_are_all_kept(redis_store().await).await;
    }

    #[tokio::test]
    #[ignore] // Requires REDIS_URL
    async fn test_double_revoke_keeps_one_entry() {
        double_revoke_keeps_one_entry(redis_store().await).await;
    }

    #[tokio::test]
    #[ignore] // Requires REDIS_URL
    async fn test_revocation_lapses_exactly_at_expiry() {
        revocation_lapses_exactly_at_expiry(redis_store().await).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore] // Requires REDIS_URL
    async fn test_prune_does_not_drop_concurrent_appends() {
        prune_does_not_drop_concurrent_appends(redis_store().await).await;
    }
}
