use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::ApiError;
use super::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ADMIN_EMAIL_HEADER: &str = "x-admin-email";

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Caller identity forwarded by the authenticating gateway.
#[derive(Debug, Clone)]
pub struct UserId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_value(parts, USER_ID_HEADER)
            .map(|id| Self(id.to_string()))
            .ok_or(ApiError::Unauthenticated)
    }
}

/// An operator from the configured administrator allow-list.
#[derive(Debug, Clone)]
pub struct Admin(pub String);

#[async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(email) = header_value(parts, ADMIN_EMAIL_HEADER) else {
            tracing::warn!("Admin route called without identity");
            return Err(ApiError::Forbidden);
        };

        if !state.config.is_admin(email) {
            tracing::warn!(email = %email, "Admin route called by non-admin");
            return Err(ApiError::Forbidden);
        }

        Ok(Self(email.to_string()))
    }
}
