use std::time::Duration;

use zeroize::Zeroizing;

use crate::auth::kind::{AuthConfig, KindPolicy};

const PLACEHOLDER_USER_SECRET: &str = "CHANGE_ME_USER_SECRET";
const PLACEHOLDER_ADMIN_SECRET: &str = "CHANGE_ME_ADMIN_SECRET";

/// 25 days, the lifetime of a user session.
pub const DEFAULT_USER_TTL_SECS: u64 = 2_160_000;
/// One day, the lifetime of an admin session.
pub const DEFAULT_ADMIN_TTL_SECS: u64 = 86_400;

pub const DEFAULT_PORT: u16 = 3000;

/// Which backend holds revoked tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationBackend {
    Postgres,
    Redis,
    Memory,
}

impl RevocationBackend {
    fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!(
                "unknown REVOCATION_BACKEND '{}': expected postgres, redis or memory",
                other
            ),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub auth: AuthConfig,
    pub revocation_backend: RevocationBackend,
    /// Origins allowed by CORS. Set via COURSEGATE_CORS_ORIGINS (comma-separated).
    pub cors_origins: Vec<String>,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let production = is_production();
    let user_secret = secret_from_env("JWT_SECRET_USER", PLACEHOLDER_USER_SECRET, production)?;
    let admin_secret = secret_from_env("JWT_SECRET_ADMIN", PLACEHOLDER_ADMIN_SECRET, production)?;

    let user_ttl = ttl_from_env("JWT_EXPIRY_USER", DEFAULT_USER_TTL_SECS)?;
    let admin_ttl = ttl_from_env("JWT_EXPIRY_ADMIN", DEFAULT_ADMIN_TTL_SECS)?;

    let auth = AuthConfig::new(
        KindPolicy::new(user_secret, user_ttl),
        KindPolicy::new(admin_secret, admin_ttl),
    )?;

    Ok(Config {
        port: match std::env::var("COURSEGATE_PORT") {
            Ok(raw) => parse_port(&raw)
                .ok_or_else(|| anyhow::anyhow!("invalid COURSEGATE_PORT '{}': expected 1-65535", raw))?,
            Err(_) => DEFAULT_PORT,
        },
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/coursegate".into()),
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
        auth,
        revocation_backend: match std::env::var("REVOCATION_BACKEND") {
            Ok(v) => RevocationBackend::parse(&v)?,
            Err(_) => RevocationBackend::Postgres,
        },
        cors_origins: split_list(
            &std::env::var("COURSEGATE_CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://localhost:6500".into()),
        ),
    })
}

fn is_production() -> bool {
    std::env::var("COURSEGATE_ENV")
        .or_else(|_| std::env::var("RUST_ENV"))
        .map(|v| v == "production")
        .unwrap_or(false)
}

fn secret_from_env(
    var: &str,
    placeholder: &str,
    production: bool,
) -> anyhow::Result<Zeroizing<String>> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(Zeroizing::new(v)),
        _ if production => anyhow::bail!(
            "{} is not set. Refusing to sign tokens with a placeholder secret in production.",
            var
        ),
        _ => {
            tracing::warn!("{} is not set, using insecure placeholder", var);
            Ok(Zeroizing::new(placeholder.to_string()))
        }
    }
}

fn ttl_from_env(var: &str, default_secs: u64) -> anyhow::Result<Duration> {
    match std::env::var(var) {
        Ok(raw) => parse_ttl(&raw)
            .ok_or_else(|| anyhow::anyhow!("invalid {} '{}': expected e.g. 3600, 60m, 25d", var, raw)),
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}

/// Parses a lifetime: plain seconds, or a number with an `s`/`m`/`h`/`d` suffix.
/// Zero is rejected.
pub fn parse_ttl(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.char_indices().last()? {
        (i, 's') => (&s[..i], 1),
        (i, 'm') => (&s[..i], 60),
        (i, 'h') => (&s[..i], 3600),
        (i, 'd') => (&s[..i], 86_400),
        _ => (s, 1),
    };
    let secs = digits.trim().parse::<u64>().ok()?.checked_mul(unit)?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_port(s: &str) -> Option<u16> {
    s.trim().parse::<u16>().ok().filter(|p| *p != 0)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
