use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursegate::api;
use coursegate::auth::codec::{mask_token, TokenCodec};
use coursegate::config::{self, Config, RevocationBackend};
use coursegate::middleware::auth_gate::AUTH_HEADER;
use coursegate::middleware::http::{request_id_middleware, security_headers_middleware};
use coursegate::middleware::metrics;
use coursegate::revocation::memory::MemoryRevocationStore;
use coursegate::revocation::postgres::PgRevocationStore;
use coursegate::revocation::redis::RedisRevocationStore;
use coursegate::revocation::service::RevocationService;
use coursegate::revocation::RevocationStore;
use coursegate::store::postgres::PgStore;
use coursegate::AppState;

mod cli;

/// Request bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    // OTLP export only when a collector is configured.
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "coursegate"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "coursegate=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
        Some(cli::Commands::Migrate) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Some(cli::Commands::Token { command }) => handle_token_command(&cfg, command),
        Some(cli::Commands::Revocation { command }) => {
            let state = build_state(cfg).await?;
            handle_revocation_command(&state.revocations, command).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn build_state(cfg: Config) -> anyhow::Result<Arc<AppState>> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = revocation_store(&cfg, &db).await?;
    let revocations = RevocationService::new(store, &cfg.auth);
    let codec = Arc::new(TokenCodec::new(&cfg.auth));

    Ok(Arc::new(AppState {
        db,
        codec,
        revocations,
        config: cfg,
    }))
}

async fn revocation_store(cfg: &Config, db: &PgStore) -> anyhow::Result<Arc<dyn RevocationStore>> {
    let store: Arc<dyn RevocationStore> = match cfg.revocation_backend {
        RevocationBackend::Postgres => Arc::new(PgRevocationStore::new(db.pool().clone())),
        RevocationBackend::Redis => {
            tracing::info!("Connecting to Redis...");
            let client = redis::Client::open(cfg.redis_url.as_str())?;
            let conn = redis::aio::ConnectionManager::new(client)
                .await
                .context("failed to connect to Redis")?;
            Arc::new(RedisRevocationStore::new(conn))
        }
        RevocationBackend::Memory => {
            tracing::warn!("revocations are held in memory and will not survive a restart");
            Arc::new(MemoryRevocationStore::new())
        }
    };
    tracing::info!(backend = store.backend(), "revocation store ready");
    Ok(store)
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let state = build_state(cfg).await?;

    tracing::info!("Running migrations...");
    state.db.migrate().await?;

    let cors = cors_layer(&state.config.cors_origins)?;

    let app = axum::Router::new()
        // Health and metrics (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .nest("/api/v1", api::api_router(state.clone()))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        backend = state.revocations.backend(),
        "coursegate listening on {}",
        addr
    );
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin '{}'", o)))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(AUTH_HEADER),
            HeaderName::from_static("x-request-id"),
        ]))
}

/// Ready once Postgres answers.
async fn readiness_check(State(state): State<Arc<AppState>>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(state.db.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!("readiness: database unavailable: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}

fn handle_token_command(cfg: &Config, cmd: cli::TokenCommands) -> anyhow::Result<()> {
    let codec = TokenCodec::new(&cfg.auth);
    match cmd {
        cli::TokenCommands::Issue { principal, kind } => {
            let token = codec.issue(principal, kind)?;
            println!(
                "Token issued for {} {} (valid {}s):\n  Use:   {}: {}",
                kind,
                principal,
                codec.ttl(kind).as_secs(),
                AUTH_HEADER,
                token
            );
        }
        cli::TokenCommands::Verify { token } => match codec.verify_any(&token) {
            Ok(verified) => {
                println!("{:<12} {}", "PRINCIPAL", verified.principal_id);
                println!("{:<12} {}", "KIND", verified.kind);
                println!("{:<12} {}", "EXPIRES", verified.expires_at.to_rfc3339());
            }
            Err(e) => anyhow::bail!("token {} rejected: {}", mask_token(&token), e),
        },
    }
    Ok(())
}

async fn handle_revocation_command(
    revocations: &RevocationService,
    cmd: cli::RevocationCommands,
) -> anyhow::Result<()> {
    match cmd {
        cli::RevocationCommands::Show { principal, kind } => {
            let now = chrono::Utc::now();
            let live: Vec<_> = revocations
                .record(principal, kind)
                .await?
                .map(|record| record.entries)
                .unwrap_or_default()
                .into_iter()
                .filter(|entry| entry.expires_at > now)
                .collect();

            if live.is_empty() {
                println!("No revoked tokens.");
            } else {
                println!("{:<20} {:<30}", "TOKEN", "EXPIRES");
                for entry in live {
                    println!(
                        "{:<20} {:<30}",
                        mask_token(&entry.token),
                        entry.expires_at.to_rfc3339()
                    );
                }
            }
        }
        cli::RevocationCommands::Clear { principal, kind } => {
            revocations.clear(principal, kind).await?;
            println!("Revocations cleared for {} {}.", kind, principal);
        }
    }
    Ok(())
}
