//! OAuth-style token endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{AuthError, AuthResult, Credential, TokenIssuer};
use crate::util::{is_http_url, normalize_text_option};

/// Password and refresh-token grants against a single token endpoint.
#[derive(Clone)]
pub struct HttpTokenIssuer {
    token_url: String,
    client_id: String,
    client: Client,
}

impl HttpTokenIssuer {
    pub fn new(
        token_url: impl AsRef<str>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> AuthResult<Self> {
        let token_url = normalize_token_url(token_url.as_ref())?;
        let client_id = client_id.into().trim().to_string();
        if client_id.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "client id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            token_url,
            client_id,
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Interactive sign-in with a username and password.
    pub async fn sign_in(&self, username: &str, password: &str) -> AuthResult<Credential> {
        if username.trim().is_empty() {
            return Err(AuthError::Api("Username is required".to_string()));
        }
        if password.trim().is_empty() {
            return Err(AuthError::Api("Password is required".to_string()));
        }

        let payload = serde_json::json!({
            "client_id": self.client_id,
            "username": username.trim(),
            "password": password,
        });
        let request = self
            .client
            .post(&self.token_url)
            .query(&[("grant_type", "password")])
            .json(&payload);

        let response = send_token_request(request).await?;
        response.into_credential(None)
    }

    async fn refresh_grant(&self, refresh_token: &str) -> AuthResult<Credential> {
        let payload = serde_json::json!({
            "client_id": self.client_id,
            "refresh_token": refresh_token,
        });
        let request = self
            .client
            .post(&self.token_url)
            .query(&[("grant_type", "refresh_token")])
            .json(&payload);

        let response = send_token_request(request).await?;
        response.into_credential(Some(refresh_token))
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn refresh(&self, credential: &Credential) -> AuthResult<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::Rejected("stored credential has no refresh token".to_string())
            })?;
        self.refresh_grant(refresh_token).await
    }
}

async fn send_token_request(request: RequestBuilder) -> AuthResult<TokenResponse> {
    let response = request.header("Accept", "application/json").send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<TokenResponse>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let message = parse_api_error(status, &body);
    if matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    ) {
        Err(AuthError::Rejected(message))
    } else {
        Err(AuthError::Api(message))
    }
}

fn normalize_token_url(url: &str) -> AuthResult<String> {
    let url = normalize_text_option(Some(url.to_string())).ok_or_else(|| {
        AuthError::InvalidConfiguration("token URL must not be empty".to_string())
    })?;
    if is_http_url(&url) {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(AuthError::InvalidConfiguration(
            "token URL must include http:// or https://".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Refresh responses may omit the refresh token; the previous one stays valid.
    fn into_credential(self, previous_refresh_token: Option<&str>) -> AuthResult<Credential> {
        let access_token = self
            .access_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AuthError::Api("token response did not include access_token".to_string())
            })?;
        let refresh_token = normalize_text_option(self.refresh_token)
            .or_else(|| previous_refresh_token.map(str::to_string));
        let expires_at = self
            .expires_in
            .map(|expires_in| Utc::now() + chrono::Duration::seconds(expires_in));

        Ok(Credential {
            access_token,
            refresh_token,
            expires_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<TokenErrorResponse>(body) {
        if let Some(message) = payload
            .error_description
            .or(payload.message)
            .or(payload.error)
        {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
