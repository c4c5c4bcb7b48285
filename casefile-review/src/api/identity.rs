//! Caller identity extraction
//!
//! Authentication happens upstream. The identity provider forwards the
//! resolved caller as `X-User-Id` and `X-User-Role`; this extractor only
//! parses them. Guests may omit `X-User-Id`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use casefile_common::{Actor, Role, UserId};
use serde_json::json;
use tracing::debug;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// User id recorded for anonymous guests
pub const ANONYMOUS_USER_ID: UserId = 0;

/// Authenticated caller of a request
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Actor);

#[derive(Debug)]
pub enum IdentityError {
    MissingHeader(&'static str),
    InvalidUserId(String),
    InvalidRole(String),
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            IdentityError::MissingHeader(name) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                format!("Missing identity header: {}", name),
            ),
            IdentityError::InvalidUserId(value) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                format!("Invalid user id: {}", value),
            ),
            IdentityError::InvalidRole(value) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                format!("Invalid role: {}", value),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
                "retryable": false,
                "details": null,
            }
        }));

        (status, body).into_response()
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the caller from identity headers
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, IdentityError> {
    let role_value = header_str(headers, USER_ROLE_HEADER)
        .ok_or(IdentityError::MissingHeader(USER_ROLE_HEADER))?;
    let role: Role = role_value
        .parse()
        .map_err(|_| IdentityError::InvalidRole(role_value.to_string()))?;

    let user_id = match header_str(headers, USER_ID_HEADER) {
        Some(value) => value
            .parse::<UserId>()
            .map_err(|_| IdentityError::InvalidUserId(value.to_string()))?,
        None if role == Role::Guest => ANONYMOUS_USER_ID,
        None => return Err(IdentityError::MissingHeader(USER_ID_HEADER)),
    };

    Ok(Actor::new(user_id, role))
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = IdentityError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = actor_from_headers(&parts.headers)?;
        debug!(user_id = actor.user_id, role = %actor.role, "Caller identified");
        Ok(Caller(actor))
    }
}
