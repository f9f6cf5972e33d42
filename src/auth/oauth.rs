use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

use crate::config::AuthConfig;

use super::credential_store::{self, Credential};
use super::TOKEN_URL;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Interactive login: print the authorization URL, read the pasted
/// verification code, exchange it for tokens and cache them.
pub async fn run_login_flow(config: &AuthConfig) -> Result<()> {
    let auth_url = Url::parse_with_params(
        AUTH_URL,
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", REDIRECT_URI),
            ("scope", SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )?;

    println!("\nOpen this URL in your browser to authorize drivemirror:\n");
    println!("  {auth_url}\n");
    println!("Paste the verification code here:");

    let code = read_stdin_line().await?;
    if code.is_empty() {
        anyhow::bail!("no verification code entered");
    }

    println!("\nExchanging verification code for tokens...");
    let credential = exchange_code(config, &code).await?;

    let store_path = credential_store::resolve_store_path(config.credentials_path.as_deref())?;
    credential_store::store(&store_path, &config.client_id, &credential)?;

    println!(
        "Authorization successful! Credential cached in {}",
        store_path.display()
    );
    Ok(())
}

async fn read_stdin_line() -> Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read verification code from stdin")?;
    Ok(line.trim().to_string())
}

async fn exchange_code(config: &AuthConfig, code: &str) -> Result<Credential> {
    #[derive(serde::Deserialize)]
    struct TokenResponse {
        access_token: String,
        refresh_token: String,
        expires_in: u64,
    }

    let resp = reqwest::Client::new()
        .post(TOKEN_URL)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", REDIRECT_URI),
        ])
        .send()
        .await
        .context("Failed to contact token endpoint")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Code exchange failed ({status}): {body}");
    }

    let tr: TokenResponse = resp
        .json()
        .await
        .context("Failed to parse token response")?;

    Ok(Credential {
        access_token: tr.access_token,
        refresh_token: tr.refresh_token,
        expires_at: chrono::Utc::now() + chrono::Duration::seconds(tr.expires_in as i64),
    })
}
