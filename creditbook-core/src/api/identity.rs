// File: src/api/identity.rs
//
// The session layer in front of this service authenticates the caller and
// forwards the user id in `x-user-id`. Nothing here checks credentials.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;
use creditbook_common::error::Error;

use super::error::ApiError;
use super::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Uuid);

/// Authenticated caller who is also in the configured admin set.
#[derive(Debug, Clone, Copy)]
pub struct AdminCaller(pub Uuid);

fn caller_from_parts(parts: &Parts) -> Result<Uuid, Error> {
    let raw = parts
        .headers
        .get(USER_ID_HEADER)
        .ok_or(Error::Unauthenticated)?
        .to_str()
        .map_err(|_| Error::Unauthenticated)?;
    Uuid::parse_str(raw.trim()).map_err(|_| Error::Unauthenticated)
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(caller_from_parts(parts)?))
    }
}

impl FromRequestParts<AppState> for AdminCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = caller_from_parts(parts)?;
        if !state.admin_ids.contains(&user_id) {
            return Err(Error::Unauthorized(format!("user {} is not an admin", user_id)).into());
        }
        Ok(AdminCaller(user_id))
    }
}
