//! Authentication Middleware

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use uuid::Uuid;

use super::error::AuthError;
use super::AppState;
use crate::store::AdminRole;

/// Authenticated admin injected into request extensions.
///
/// Contains only safe-to-expose fields plus the correlation identifier of the
/// token pair the request authenticated with, so handlers like logout can
/// target the right session.
#[derive(Debug, Clone, Serialize)]
pub struct AuthAdmin {
    pub id: Uuid,
    pub email: String,
    pub role: AdminRole,
    pub totp_enabled: bool,
    /// Correlation identifier from the presented access token.
    #[serde(skip)]
    pub correlation_id: Uuid,
}

/// Middleware to require authentication.
///
/// Extracts the Bearer token from the Authorization header, validates it
/// against the access keypair, confirms the admin is still active, and
/// injects [`AuthAdmin`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    let (admin, correlation_id) = state.engine.authenticate(token).await?;

    request.extensions_mut().insert(AuthAdmin {
        id: admin.id,
        email: admin.email,
        role: admin.role,
        totp_enabled: admin.totp_enabled,
        correlation_id,
    });

    Ok(next.run(request).await)
}
