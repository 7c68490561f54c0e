//! Resolving the acting party from request headers.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use civicfeed_core::Actor;
use uuid::Uuid;

use super::AppState;
use crate::error::ServerError;

/// Header set by the upstream auth gateway for signed-in users.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USERNAME_HEADER: &str = "x-username";
/// Shared secret the gateway sends with the identity headers.
pub const GATEWAY_SECRET_HEADER: &str = "x-gateway-secret";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Returns the bearer token of the `Authorization` header, if any.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// The [`Actor`] behind a request.
///
/// A bearer token must be the admin token, and user identity headers must
/// carry the gateway secret. Anything else is rejected rather than
/// downgraded.
#[derive(Debug, Clone)]
pub struct RequestActor(pub Actor);

impl FromRequestParts<AppState> for RequestActor {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(&parts.headers) {
            return if state.moderation.is_admin_token(token) {
                Ok(Self(Actor::Admin))
            } else {
                Err(ServerError::Unauthorized)
            };
        }

        if let Some(raw) = header_str(&parts.headers, USER_ID_HEADER) {
            let from_gateway = header_str(&parts.headers, GATEWAY_SECRET_HEADER)
                .is_some_and(|secret| state.moderation.is_gateway_secret(secret));
            if !from_gateway {
                return Err(ServerError::Unauthorized);
            }
            let id = Uuid::parse_str(raw)
                .map_err(|_| ServerError::invalid_input("malformed user id header"))?;
            let username = header_str(&parts.headers, USERNAME_HEADER).map(str::to_string);
            return Ok(Self(Actor::User { id, username }));
        }

        let client = header_str(&parts.headers, FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            });
        Ok(Self(Actor::Anonymous { client }))
    }
}
