//! Caller identity from request headers.
//!
//! Authentication happens in front of this service; it forwards the result
//! as `x-actor-id` and `x-actor-role`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Actor, ActorRole, UserId};

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestActor(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for RequestActor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| invalid(format!("missing {ACTOR_ID_HEADER} header")))?;
        let id: UserId = id
            .parse()
            .map_err(|_| invalid(format!("{ACTOR_ID_HEADER} must be a UUID")))?;

        let role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| invalid(format!("missing {ACTOR_ROLE_HEADER} header")))?;
        let role: ActorRole = role.parse().map_err(|e| invalid(format!("{e}")))?;

        Ok(RequestActor(Actor::new(id, role)))
    }
}

fn invalid(message: String) -> ApiError {
    ApiError::bad_request("INVALID_ACTOR", message)
}
