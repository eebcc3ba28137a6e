// Access gate - per-route token verification, role check, ownership check
//
// Runs as a single middleware layer on the API router. The policy table
// below mirrors the route table: a route without an entry is public and the
// gate waves it through untouched.

use axum::extract::{FromRequestParts, MatchedPath, RawPathParams, Request};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::models::{AccessPolicy, AuthedUser, ResourceOwner, ResourceRole};
use super::ownership::check_resource_ownership;
use crate::common::{ApiError, AppState};
use crate::users::UserRole;

/// Access requirements per (method, matched route pattern).
pub fn route_policy(method: &Method, path: &str) -> Option<AccessPolicy> {
    let policy = |role, owner| Some(AccessPolicy { role, owner });
    match (method.as_str(), path) {
        ("GET", "/api/v1/users") => policy(ResourceRole::Admin, ResourceOwner::Everyone),
        ("GET", "/api/v1/users/all/search") => policy(ResourceRole::All, ResourceOwner::Everyone),
        ("GET", "/api/v1/users/auth/me") => policy(ResourceRole::Guest, ResourceOwner::Everyone),
        ("GET", "/api/v1/users/auth/social/:service/url") => {
            policy(ResourceRole::Guest, ResourceOwner::Everyone)
        }
        ("GET", "/api/v1/users/:id") => policy(ResourceRole::All, ResourceOwner::Everyone),
        ("POST", "/api/v1/users/auth/change-password") => {
            policy(ResourceRole::All, ResourceOwner::Everyone)
        }
        ("PUT", "/api/v1/users/:id") => policy(ResourceRole::All, ResourceOwner::Owner),
        ("DELETE", "/api/v1/users/:id") => policy(ResourceRole::All, ResourceOwner::Owner),
        _ => None,
    }
}

/// Pulls the raw bearer token from `Authorization` or the legacy
/// `x-access-token` header. A `Bearer ` prefix is optional on both.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers
        .get(header::AUTHORIZATION)
        .or_else(|| headers.get("x-access-token"))?
        .to_str()
        .ok()?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// The gate itself. Order per request: find the policy, verify the token
/// (always, even on guest routes when one is presented), check the role,
/// then check ownership for owner-scoped writes. Admin callers skip the role
/// and ownership checks.
pub async fn check_access(req: Request, next: Next) -> Result<Response, ApiError> {
    let (mut parts, body) = req.into_parts();

    let matched = parts
        .extensions
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string());
    let Some(policy) = matched
        .as_deref()
        .and_then(|path| route_policy(&parts.method, path))
    else {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    };

    let state = parts
        .extensions
        .get::<AppState>()
        .cloned()
        .ok_or_else(|| ApiError::Technical("Application state missing from request".to_string()))?;

    let authed = match bearer_token(&parts.headers) {
        Some(token) => {
            let claims = state.token_service.verify(&token)?;
            Some(AuthedUser {
                id: claims.sub,
                role: claims.role,
            })
        }
        None if policy.role == ResourceRole::Guest => None,
        None => return Err(ApiError::MissingToken),
    };

    if let Some(user) = &authed {
        if user.role != UserRole::Admin {
            if !policy.role.allows(user.role) {
                debug!(user_id = %user.id, "Gate: role check failed");
                return Err(ApiError::Forbidden);
            }
            // Reads are exempt from ownership: they only ever return
            // sanitized projections.
            if policy.owner == ResourceOwner::Owner && parts.method != Method::GET {
                let raw_params = RawPathParams::from_request_parts(&mut parts, &())
                    .await
                    .map_err(|e| {
                        ApiError::Technical(format!("Path params unavailable: {}", e))
                    })?;
                let params: Vec<(String, String)> = raw_params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                check_resource_ownership(
                    state.store.as_ref(),
                    matched.as_deref().unwrap_or_default(),
                    &params,
                    &user.id,
                )
                .await?;
            }
        }
        debug!(user_id = %user.id, role = ?user.role, "Gate: access granted");
    }

    if let Some(user) = authed {
        parts.extensions.insert(user);
    }
    Ok(next.run(Request::from_parts(parts, body)).await)
}
