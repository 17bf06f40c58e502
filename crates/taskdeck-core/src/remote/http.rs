//! HTTP provider: one blob URL addressed with GET/PUT/DELETE/HEAD.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use super::{classify_http_status, RemoteBackupClient, RemoteError, RemoteResult};
use crate::backup::RemoteBackupBlob;
use crate::util::{compact_text, is_http_url, normalize_text_option};

#[derive(Clone)]
pub struct HttpBackupClient {
    blob_url: String,
    client: Client,
}

impl HttpBackupClient {
    pub fn new(blob_url: impl AsRef<str>, timeout: Duration) -> crate::Result<Self> {
        let blob_url = normalize_text_option(Some(blob_url.as_ref().to_string()))
            .filter(|url| is_http_url(url))
            .ok_or_else(|| {
                crate::Error::InvalidInput(
                    "backup URL must include http:// or https://".to_string(),
                )
            })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| crate::Error::InvalidInput(error.to_string()))?;

        Ok(Self { blob_url, client })
    }

    #[must_use]
    pub fn blob_url(&self) -> &str {
        &self.blob_url
    }

    async fn send(&self, request: RequestBuilder, token: &str) -> RemoteResult<Response> {
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_transport_error)
    }
}

#[async_trait]
impl RemoteBackupClient for HttpBackupClient {
    async fn last_modified(&self, token: &str) -> RemoteResult<Option<DateTime<Utc>>> {
        let response = self.send(self.client.head(&self.blob_url), token).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;

        let header = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| RemoteError::Api("response has no Last-Modified header".to_string()))?;
        let parsed = DateTime::parse_from_rfc2822(header)
            .map_err(|error| RemoteError::Decode(format!("Last-Modified `{header}`: {error}")))?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    async fn download(&self, token: &str) -> RemoteResult<Option<RemoteBackupBlob>> {
        let response = self
            .send(
                self.client
                    .get(&self.blob_url)
                    .header("Accept", "application/json"),
                token,
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        let blob = serde_json::from_slice::<RemoteBackupBlob>(&bytes)
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        Ok(Some(blob))
    }

    async fn upload(&self, token: &str, blob: &RemoteBackupBlob) -> RemoteResult<()> {
        let body = blob
            .to_json()
            .map_err(|error| RemoteError::Decode(error.to_string()))?;
        let response = self
            .send(
                self.client
                    .put(&self.blob_url)
                    .header(CONTENT_TYPE, "application/json")
                    .body(body),
                token,
            )
            .await?;
        ensure_success(response).await?;
        tracing::debug!("Uploaded backup blob with {} tasks", blob.tasks.len());
        Ok(())
    }

    async fn delete(&self, token: &str) -> RemoteResult<()> {
        let response = self.send(self.client.delete(&self.blob_url), token).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await?;
        Ok(())
    }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_connect() || error.is_timeout() || error.is_request() {
        RemoteError::Network(error.to_string())
    } else {
        RemoteError::Api(error.to_string())
    }
}

async fn ensure_success(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_http_status(
        status.as_u16(),
        parse_api_error(status, &body),
    ))
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<ProviderErrorDetail>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProviderErrorDetail {
    Text(String),
    Object { message: Option<String> },
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ProviderErrorBody>(body) {
        let detail = payload.error.and_then(|detail| match detail {
            ProviderErrorDetail::Text(message) => Some(message),
            ProviderErrorDetail::Object { message } => message,
        });
        if let Some(message) = payload.message.or(detail) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn new_rejects_non_http_urls() {
        assert!(HttpBackupClient::new("ftp://example.com/blob", Duration::from_secs(5)).is_err());
        assert!(HttpBackupClient::new("   ", Duration::from_secs(5)).is_err());
        let client =
            HttpBackupClient::new(" https://files.example.com/taskdeck.json ", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.blob_url(), "https://files.example.com/taskdeck.json");
    }

    #[test]
    fn parse_api_error_reads_nested_message() {
        assert_eq!(
            parse_api_error(
                StatusCode::UNAUTHORIZED,
                r#"{"error":{"code":"InvalidAuthenticationToken","message":"Access token has expired"}}"#,
            ),
            "Access token has expired (401)"
        );
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#),
            "boom (500)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, " "), "HTTP 502");
    }
}
