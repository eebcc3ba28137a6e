// Extractors for authenticated request handling

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::models::AuthedUser;
use crate::common::ApiError;

/// Reads the caller the gate stored in request extensions. Handlers taking
/// `AuthedUser` must sit behind a gated route; `Option<AuthedUser>` works on
/// guest routes where anonymous callers are legitimate.
#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthedUser>()
            .cloned()
            .ok_or(ApiError::MissingToken)
    }
}
