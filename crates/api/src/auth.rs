//! Request authentication
//!
//! The API trusts an upstream identity layer (the storefront session
//! proxy) which forwards the caller's user id in the `x-user-id` header.
//! Handlers take [`AuthUser`] as an extractor; requests without a valid
//! header are rejected with 401 before the handler runs.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

/// Authenticated caller, resolved from the `x-user-id` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing x-user-id header".to_string()))?;

        let user_id = Uuid::parse_str(raw)
            .map_err(|_| ApiError::Unauthorized("Invalid x-user-id header".to_string()))?;

        Ok(AuthUser { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(req: Request<()>) -> Result<AuthUser, ApiError> {
        let (mut parts, _) = req.into_parts();
        AuthUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let req = Request::builder().uri("/downloads/quota").body(()).unwrap();
        let err = extract(req).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn malformed_uuid_is_unauthorized() {
        let req = Request::builder()
            .uri("/downloads/quota")
            .header("x-user-id", "not-a-uuid")
            .body(())
            .unwrap();
        let err = extract(req).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn valid_uuid_passes() {
        let id = Uuid::new_v4();
        let req = Request::builder()
            .uri("/downloads/quota")
            .header("x-user-id", id.to_string())
            .body(())
            .unwrap();
        let user = extract(req).await.unwrap();
        assert_eq!(user.user_id, id);
    }
}
