use std::sync::Arc;
use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::auth::CredentialManager;
use crate::error::SyncError;

use super::types::api_error_message;

const API_BASE: &str = "https://www.googleapis.com/drive/v2";

/// Authenticated HTTP client for the Drive API.
///
/// Rate-limit (429) backoff lives here; retries are the transport
/// layer's responsibility, never the sync engine's.
pub struct DriveClient {
    http: reqwest::Client,
    credentials: Arc<CredentialManager>,
    base_url: String,
    page_size: u32,
    include_trashed: bool,
}

impl DriveClient {
    pub fn new(credentials: Arc<CredentialManager>, page_size: u32, include_trashed: bool) -> Self {
        Self::with_base_url(credentials, API_BASE, page_size, include_trashed)
    }

    /// Construct against a custom base URL (tests point this at a mock server).
    pub fn with_base_url(
        credentials: Arc<CredentialManager>,
        base_url: impl Into<String>,
        page_size: u32,
        include_trashed: bool,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            credentials,
            base_url: base_url.into(),
            page_size,
            include_trashed,
        }
    }

    pub(crate) fn page_size(&self) -> u32 {
        self.page_size
    }

    pub(crate) fn include_trashed(&self) -> bool {
        self.include_trashed
    }

    /// Authenticated GET against an API path, with bounded 429 retry.
    /// Non-success statuses map into the error taxonomy: 401/403 to
    /// `Auth`, everything else to `Api`.
    pub(crate) async fn get_api(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Response, SyncError> {
        const MAX_RETRIES: u32 = 5;
        let url = format!("{}{path}", self.base_url);

        for attempt in 0..=MAX_RETRIES {
            let token = self.credentials.access_token().await?;
            let resp = self
                .http
                .get(&url)
                .query(params)
                .bearer_auth(&token)
                .send()
                .await?;

            match resp.status() {
                s if s.is_success() => return Ok(resp),

                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(SyncError::Auth(format!(
                        "HTTP {status}: {}",
                        api_error_message(&body)
                    )));
                }

                StatusCode::TOO_MANY_REQUESTS if attempt < MAX_RETRIES => {
                    let retry_after = resp
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(2);
                    let wait = Duration::from_secs(retry_after) + jitter();
                    tracing::warn!(
                        retry_after,
                        attempt = attempt + 1,
                        "rate limited, waiting {wait:?}"
                    );
                    tokio::time::sleep(wait).await;
                }

                StatusCode::TOO_MANY_REQUESTS => {
                    return Err(SyncError::Api {
                        status: 429,
                        message: format!("rate limited, exhausted {MAX_RETRIES} retries"),
                    });
                }

                status => {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(SyncError::Api {
                        status: status.as_u16(),
                        message: api_error_message(&body),
                    });
                }
            }
        }

        unreachable!()
    }

    /// Authenticated GET against an absolute URL (content and export
    /// links carry their own host). Status handling is left to the
    /// caller; transfers report failures as `Download`, not `Api`.
    pub(crate) async fn get_url(&self, url: &str) -> Result<Response, SyncError> {
        let token = self.credentials.access_token().await?;
        let resp = self.http.get(url).bearer_auth(&token).send().await?;
        Ok(resp)
    }
}

fn jitter() -> Duration {
    let ms: u64 = rand::random::<u64>() % 1000;
    Duration::from_millis(ms)
}
