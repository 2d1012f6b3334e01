use axum::{
    extract::{FromRequestParts, Query},
    http::{HeaderMap, request::Parts},
};
use serde::Deserialize;

use crate::{error::AppError, state::party::Member};

/// Headers carrying the caller's identity.
pub const MEMBER_ID_HEADER: &str = "x-member-id";
pub const MEMBER_NAME_HEADER: &str = "x-member-name";
pub const MEMBER_PHOTO_HEADER: &str = "x-member-photo";

/// Caller identity as forwarded by the identity provider.
///
/// Read from the `X-Member-*` headers. Browser `EventSource` and WebSocket clients cannot
/// set headers, so `member_id`, `member_name` and `member_photo` query parameters are
/// accepted as a fallback.
#[derive(Debug, Clone)]
pub struct Identity(pub Member);

#[derive(Debug, Default, Deserialize)]
struct IdentityQuery {
    member_id: Option<String>,
    member_name: Option<String>,
    member_photo: Option<String>,
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = Query::<IdentityQuery>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();

        let id = header(&parts.headers, MEMBER_ID_HEADER)?
            .or(query.member_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing member identity".into()))?;
        let name = header(&parts.headers, MEMBER_NAME_HEADER)?
            .or(query.member_name)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| id.clone());
        let photo = header(&parts.headers, MEMBER_PHOTO_HEADER)?
            .or(query.member_photo)
            .filter(|photo| !photo.is_empty());

        Ok(Identity(Member { id, name, photo }))
    }
}

fn header(headers: &HeaderMap, name: &str) -> Result<Option<String>, AppError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::to_owned)
                .map_err(|_| AppError::BadRequest(format!("header `{name}` is not valid text")))
        })
        .transpose()
}
