//! Authentication HTTP Handlers
//!
//! Thin adapters between the wire format and [`AuthEngine`]. The refresh
//! token never appears in a JSON body: it travels in an HttpOnly cookie
//! scoped to `/auth`, so browser-held scripts cannot read it.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::engine::{AdminSummary, LoginAttempt};
use super::error::{AuthError, AuthResult};
use super::jwt::TokenPair;
use super::middleware::AuthAdmin;
use super::session::ClientMeta;
use super::AppState;
use crate::store::AdminRole;

/// Refresh-token cookie name.
pub const REFRESH_COOKIE: &str = "wayline_refresh";

/// Maximum stored user-agent length.
const USER_AGENT_MAX: usize = 512;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    /// 6-digit TOTP code (required once MFA is enabled).
    pub totp_code: Option<String>,
    /// Single-use backup code, as an alternative to the TOTP code.
    pub backup_code: Option<String>,
}

/// MFA enrollment confirmation / code-bearing request.
#[derive(Debug, Deserialize, Validate)]
pub struct MfaCodeRequest {
    /// 6-digit TOTP code.
    #[validate(length(min = 6, max = 6))]
    pub code: String,
}

/// MFA disable request. Re-proves both factors.
#[derive(Debug, Deserialize, Validate)]
pub struct MfaDisableRequest {
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 6, max = 6))]
    pub code: String,
}

/// Standard success envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

fn ok<T: Serialize>(message: &str, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: message.to_string(),
        data: Some(data),
    })
}

fn ok_empty(message: &str) -> Json<Envelope<()>> {
    Json(Envelope {
        success: true,
        message: message.to_string(),
        data: None,
    })
}

/// Token response body. The refresh token is deliberately absent; it lives
/// in the [`REFRESH_COOKIE`].
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Access token expiry in seconds.
    pub expires_in: i64,
    /// Always "Bearer".
    pub token_type: String,
    pub admin: AdminSummary,
}

/// MFA setup response.
#[derive(Debug, Serialize)]
pub struct MfaSetupResponse {
    /// TOTP secret (base32-encoded), shown once.
    pub secret: String,
    /// otpauth:// URL for authenticator apps.
    pub otpauth_url: String,
}

/// Backup codes, shown once.
#[derive(Debug, Serialize)]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

// ============================================================================
// Helpers
// ============================================================================

fn client_meta(addr: SocketAddr, headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        ip_address: Some(addr.ip().to_string()),
        user_agent: extract_user_agent(headers),
    }
}

/// Pull and sanitize the User-Agent header: printable characters only,
/// truncated to a storable length.
fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(USER_AGENT)?.to_str().ok()?;
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .take(USER_AGENT_MAX)
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn refresh_cookie(tokens: &TokenPair) -> Cookie<'static> {
    let max_age = tokens.refresh_expires_at - chrono::Utc::now();
    Cookie::build((REFRESH_COOKIE, tokens.refresh_token.clone()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/auth")
        .max_age(time::Duration::seconds(max_age.num_seconds()))
        .build()
}

fn clear_refresh_cookie() -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, ""))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .path("/auth")
        .max_age(time::Duration::ZERO)
        .build()
}

fn validated<T: Validate>(req: T) -> AuthResult<T> {
    req.validate()
        .map_err(|e| AuthError::Validation(e.to_string()))?;
    Ok(req)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
#[tracing::instrument(skip(state, jar, headers, req))]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    let req = validated(req)?;

    let attempt = LoginAttempt {
        email: req.email,
        password: req.password,
        totp_code: req.totp_code,
        backup_code: req.backup_code,
    };
    let (tokens, admin) = state
        .engine
        .login(attempt, client_meta(addr, &headers))
        .await?;

    let jar = jar.add(refresh_cookie(&tokens));
    let body = ok(
        "Login successful",
        TokenResponse {
            access_token: tokens.access_token,
            expires_in: tokens.access_expires_in,
            token_type: "Bearer".to_string(),
            admin,
        },
    );
    Ok((jar, body))
}

/// POST /auth/refresh
#[tracing::instrument(skip(state, jar, headers))]
pub async fn refresh(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    jar: CookieJar,
    headers: HeaderMap,
) -> AuthResult<impl IntoResponse> {
    let refresh_token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AuthError::InvalidToken)?;

    let (tokens, admin) = state
        .engine
        .refresh(&refresh_token, client_meta(addr, &headers))
        .await?;

    let jar = jar.add(refresh_cookie(&tokens));
    let body = ok(
        "Token refreshed",
        TokenResponse {
            access_token: tokens.access_token,
            expires_in: tokens.access_expires_in,
            token_type: "Bearer".to_string(),
            admin,
        },
    );
    Ok((jar, body))
}

/// POST /auth/logout
#[tracing::instrument(skip(state, jar, admin), fields(admin_id = %admin.id))]
pub async fn logout(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthAdmin>,
    jar: CookieJar,
) -> AuthResult<impl IntoResponse> {
    state.engine.logout(admin.id, admin.correlation_id).await?;
    let jar = jar.add(clear_refresh_cookie());
    Ok((jar, ok_empty("Logged out")))
}

/// GET /auth/me
pub async fn me(Extension(admin): Extension<AuthAdmin>) -> impl IntoResponse {
    ok("OK", admin)
}

/// POST /auth/mfa/setup
#[tracing::instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn mfa_setup(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthAdmin>,
) -> AuthResult<impl IntoResponse> {
    let enrollment = state.engine.mfa_setup(admin.id).await?;
    Ok(ok(
        "Scan the secret into an authenticator app, then confirm with a code",
        MfaSetupResponse {
            secret: enrollment.secret,
            otpauth_url: enrollment.otpauth_url,
        },
    ))
}

/// POST /auth/mfa/enable
#[tracing::instrument(skip(state, admin, req), fields(admin_id = %admin.id))]
pub async fn mfa_enable(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthAdmin>,
    Json(req): Json<MfaCodeRequest>,
) -> AuthResult<impl IntoResponse> {
    let req = validated(req)?;
    let backup_codes = state.engine.mfa_enable(admin.id, &req.code).await?;
    Ok(ok(
        "MFA enabled. Store these backup codes now; they will not be shown again",
        BackupCodesResponse { backup_codes },
    ))
}

/// POST /auth/mfa/disable
#[tracing::instrument(skip(state, admin, req), fields(admin_id = %admin.id))]
pub async fn mfa_disable(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthAdmin>,
    Json(req): Json<MfaDisableRequest>,
) -> AuthResult<impl IntoResponse> {
    let req = validated(req)?;
    state
        .engine
        .mfa_disable(admin.id, &req.password, &req.code)
        .await?;
    Ok(ok_empty("MFA disabled"))
}

/// POST /auth/mfa/backup-codes
#[tracing::instrument(skip(state, admin, req), fields(admin_id = %admin.id))]
pub async fn regenerate_backup_codes(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthAdmin>,
    Json(req): Json<MfaCodeRequest>,
) -> AuthResult<impl IntoResponse> {
    let req = validated(req)?;
    let backup_codes = state
        .engine
        .regenerate_backup_codes(admin.id, &req.code)
        .await?;
    Ok(ok(
        "Backup codes regenerated; the previous set is no longer valid",
        BackupCodesResponse { backup_codes },
    ))
}

/// POST /auth/admins/{id}/deactivate
///
/// Super-admin only. Ends every session the target holds; their outstanding
/// access tokens lapse at natural expiry.
#[tracing::instrument(skip(state, admin), fields(actor_id = %admin.id))]
pub async fn deactivate(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthAdmin>,
    Path(target_id): Path<Uuid>,
) -> AuthResult<impl IntoResponse> {
    if admin.role != AdminRole::SuperAdmin {
        return Err(AuthError::Forbidden);
    }
    let sessions_ended = state.engine.deactivate(target_id).await?;
    Ok(ok(
        "Admin deactivated",
        serde_json::json!({ "sessions_ended": sessions_ended }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_user_agent_is_sanitized_and_truncated() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.5\ttail"));
        assert_eq!(
            extract_user_agent(&headers).as_deref(),
            Some("curl/8.5tail")
        );

        let long = "x".repeat(USER_AGENT_MAX * 2);
        headers.insert(USER_AGENT, HeaderValue::from_str(&long).unwrap());
        assert_eq!(
            extract_user_agent(&headers).map(|ua| ua.len()),
            Some(USER_AGENT_MAX)
        );
    }

    #[test]
    fn test_refresh_cookie_is_locked_down() {
        let tokens = TokenPair {
            access_token: "a".into(),
            refresh_token: "r".into(),
            access_expires_in: 900,
            refresh_expires_at: chrono::Utc::now() + chrono::Duration::days(7),
            correlation_id: Uuid::new_v4(),
        };
        let cookie = refresh_cookie(&tokens);
        assert_eq!(cookie.name(), REFRESH_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/auth"));
    }
}
