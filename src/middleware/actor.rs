//! Acting-user extraction
//!
//! Authentication happens upstream. The gateway in front of this service
//! forwards the authenticated user id and the role they act in for this
//! request as headers, and every handler receives them as an [`Actor`].

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::LendingError;
use crate::models::{Actor, UserRole};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const ACTING_ROLE_HEADER: &str = "x-acting-role";

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, LendingError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| LendingError::Unauthorized(format!("Missing {} header", name)))
}

/// Extractor for the acting user
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(actor: Actor) -> impl IntoResponse {
///     format!("{} acting as {}", actor.user_id, actor.role.as_str())
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = LendingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = Uuid::parse_str(header(parts, USER_ID_HEADER)?)
            .map_err(|_| LendingError::Unauthorized("Invalid user id".to_string()))?;

        let role_value = header(parts, ACTING_ROLE_HEADER)?;
        let role = UserRole::parse(role_value).ok_or_else(|| {
            LendingError::validation(format!("Unknown acting role '{}'", role_value))
        })?;

        Ok(Actor::new(user_id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(builder: axum::http::request::Builder) -> Result<Actor, LendingError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_extracts_actor() {
        let id = Uuid::new_v4();
        let actor = extract(
            Request::builder()
                .header(USER_ID_HEADER, id.to_string())
                .header(ACTING_ROLE_HEADER, "LENDER"),
        )
        .await
        .unwrap();
        assert_eq!(actor, Actor::lender(id));
    }

    #[tokio::test]
    async fn test_missing_headers_are_unauthorized() {
        let err = extract(Request::builder()).await.unwrap_err();
        assert!(matches!(err, LendingError::Unauthorized(_)));

        let err = extract(Request::builder().header(USER_ID_HEADER, "not-a-uuid"))
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let err = extract(
            Request::builder()
                .header(USER_ID_HEADER, Uuid::new_v4().to_string())
                .header(ACTING_ROLE_HEADER, "ADMIN"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)));
    }
}
