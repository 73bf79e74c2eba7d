//! Identity Extractor - 请求身份
//!
//! 身份由前置的认证协作方注入请求头：`X-User-Id` 为用户标识，
//! `X-User-Admin: true` 为管理员声明。本服务不做认证，只消费结论。

use axum::{extract::FromRequestParts, http::request::Parts};

use super::error::ApiError;

/// 请求身份
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub is_admin: bool,
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))?
            .to_string();

        let is_admin = parts
            .headers
            .get("x-user-admin")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Identity { user_id, is_admin })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Identity, ApiError> {
        let (mut parts, _) = request.into_parts();
        Identity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_user_id_header_is_required() {
        let request = Request::builder().body(()).unwrap();
        assert!(matches!(
            extract(request).await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_identity_with_admin_claim() {
        let request = Request::builder()
            .header("X-User-Id", "alice")
            .header("X-User-Admin", "TRUE")
            .body(())
            .unwrap();

        let identity = extract(request).await.unwrap();
        assert_eq!(identity.user_id, "alice");
        assert!(identity.is_admin);
    }

    #[tokio::test]
    async fn test_admin_defaults_to_false() {
        let request = Request::builder()
            .header("X-User-Id", "bob")
            .body(())
            .unwrap();

        let identity = extract(request).await.unwrap();
        assert!(!identity.is_admin);
    }

    #[tokio::test]
    async fn test_blank_user_id_is_rejected() {
        let request = Request::builder()
            .header("X-User-Id", "   ")
            .body(())
            .unwrap();
        assert!(extract(request).await.is_err());
    }
}
