pub mod credential_store;
mod oauth;

pub use oauth::run_login_flow;

use std::path::PathBuf;

use tokio::sync::Mutex;

use crate::config::AuthConfig;
use crate::error::SyncError;

use credential_store::Credential;

pub(crate) const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Holds the cached credential for the configured client and hands out
/// access tokens, refreshing them when they are about to expire.
pub struct CredentialManager {
    client_id: String,
    client_secret: String,
    store_path: PathBuf,
    current: Mutex<Credential>,
    http: reqwest::Client,
}

impl CredentialManager {
    /// Load the cached credential eagerly; a run with no credential
    /// must fail before any listing begins.
    pub fn new(config: &AuthConfig) -> Result<Self, SyncError> {
        let store_path = credential_store::resolve_store_path(config.credentials_path.as_deref())?;
        let credential = match credential_store::load(&store_path, &config.client_id) {
            Ok(c) => c,
            Err(SyncError::CredentialNotFound { .. }) => {
                return Err(SyncError::CredentialNotFound {
                    client_id: config.client_id.clone(),
                })
            }
            Err(e) => return Err(e),
        };
        tracing::debug!(store = %store_path.display(), "loaded cached credential");

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            store_path,
            current: Mutex::new(credential),
            http: reqwest::Client::new(),
        })
    }

    /// A valid access token, refreshed and re-persisted if the cached
    /// one expires within the next minute.
    pub async fn access_token(&self) -> Result<String, SyncError> {
        let mut guard = self.current.lock().await;

        let buffer = chrono::Duration::seconds(60);
        if guard.expires_at <= chrono::Utc::now() + buffer {
            tracing::debug!("access token expired or expiring soon, refreshing");
            let refreshed = self.refresh(&guard).await?;
            *guard = refreshed;
            credential_store::store(&self.store_path, &self.client_id, &guard)?;
        }

        Ok(guard.access_token.clone())
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, SyncError> {
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
            // Google only rotates the refresh token occasionally
            refresh_token: Option<String>,
        }

        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credential.refresh_token.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Auth(format!(
                "token refresh failed ({status}): {body}; \
                 you may need to re-authenticate with `drivemirror login`"
            )));
        }

        let tr: TokenResponse = resp.json().await?;
        Ok(Credential {
            access_token: tr.access_token,
            refresh_token: tr
                .refresh_token
                .unwrap_or_else(|| credential.refresh_token.clone()),
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(tr.expires_in as i64),
        })
    }
}
