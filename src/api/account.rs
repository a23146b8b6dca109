//! Signup, login and logout. Shared by both principal kinds; the router
//! supplies the kind as an `Extension<PrincipalKind>`, and for logout the
//! gate's [`AuthContext`] carries it.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{validated, MessageResponse};
use crate::auth::kind::PrincipalKind;
use crate::auth::password;
use crate::errors::AppError;
use crate::middleware::auth_gate::AuthContext;
use crate::middleware::metrics;
use crate::revocation::service::RevocationService;
use crate::store::postgres::NewAccount;
use crate::AppState;

const PASSWORD_SPECIALS: &str = "!@#$%^&*()";

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(length(min = 2, max = 100))]
    pub first_name: String,
    #[validate(length(min = 2, max = 100))]
    pub last_name: String,
    #[validate(length(min = 6, max = 80), email)]
    pub email: String,
    #[validate(
        length(min = 6, max = 30),
        custom(function = "password_strength")
    )]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[validate(length(min = 6, max = 80), email)]
    pub email: String,
    #[validate(length(min = 6, max = 30))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// At least one ASCII uppercase, one ASCII lowercase and one of `!@#$%^&*()`.
fn password_strength(password: &str) -> Result<(), ValidationError> {
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let special = password.chars().any(|c| PASSWORD_SPECIALS.contains(c));
    if upper && lower && special {
        Ok(())
    } else {
        let mut err = ValidationError::new("password_strength");
        err.message = Some(
            "Password must contain at least one uppercase letter, one lowercase letter, and one special character (!@#$%^&*())"
                .into(),
        );
        Err(err)
    }
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<PrincipalKind>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let req = validated(payload)?;

    if state.db.find_account_by_email(kind, &req.email).await?.is_some() {
        return Err(AppError::EmailTaken);
    }

    let plain = req.password;
    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| anyhow::anyhow!("password hashing task failed: {}", e))??;

    let account = NewAccount {
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
        password_hash,
    };
    // Lost a race with a concurrent signup for the same email.
    let Some(id) = state.db.create_account(kind, &account).await? else {
        return Err(AppError::EmailTaken);
    };

    let token = state.codec.issue(id, kind).map_err(anyhow::Error::from)?;
    tracing::info!(kind = %kind, principal = %id, "account created");
    Ok(Json(TokenResponse { token }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<PrincipalKind>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let req = validated(payload)?;

    let Some(account) = state.db.find_account_by_email(kind, &req.email).await? else {
        return Err(AppError::Unauthorized);
    };

    let plain = req.password;
    let hash = account.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| anyhow::anyhow!("password verification task failed: {}", e))??;
    if !matches {
        tracing::debug!(kind = %kind, "login: wrong password");
        return Err(AppError::Unauthorized);
    }

    let token = state.codec.issue(account.id, kind).map_err(anyhow::Error::from)?;
    Ok(Json(TokenResponse { token }))
}

/// Revoke the presented token. A revocation that could not be recorded is
/// reported as a failed logout, never as success.
pub async fn logout(
    State(revocations): State<RevocationService>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<MessageResponse>, AppError> {
    let recorded = revocations
        .revoke(&ctx.token, ctx.principal_id, ctx.kind)
        .await;
    metrics::record_logout(ctx.kind, recorded);

    if !recorded {
        return Err(AppError::LogoutFailed);
    }
    tracing::info!(kind = %ctx.kind, principal = %ctx.principal_id, "logged out");
    Ok(MessageResponse::new("Logged out successfully."))
}
