//! Identity provider client — resolves bearer tokens to a user id/email.
//!
//! The provider is an external collaborator; tokens are opaque here and the
//! resolved email is trusted as a mail destination without re-verification.

use async_trait::async_trait;

use studybell_core::config::IdentityConfig;
use studybell_core::error::{Result, StudybellError};

/// The authenticated caller, as resolved by the identity provider.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// Token → user resolution. A trait so request handling can be exercised
/// without a live identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<AuthUser>;
}

/// HTTP identity provider (Supabase-style `GET /auth/v1/user`).
pub struct HttpIdentityProvider {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(serde::Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve(&self, token: &str) -> Result<AuthUser> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| StudybellError::Unauthenticated(format!("identity lookup: {e}")))?;

        if !response.status().is_success() {
            return Err(StudybellError::Unauthenticated(
                "identity provider rejected the token".into(),
            ));
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| StudybellError::Unauthenticated(format!("identity response: {e}")))?;

        let email = user.email.filter(|e| !e.is_empty()).ok_or_else(|| {
            StudybellError::Unauthenticated("token resolved to a user without an email".into())
        })?;

        Ok(AuthUser { id: user.id, email })
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue, header};

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
