//! Google OAuth plumbing: token refresh, authorization-code exchange,
//! and user-info lookup for labeling credentials.
//!
//! All endpoints are overridable so tests can point them at a mock
//! server.

use reqwest::Url;
use serde::Deserialize;
use tracing::warn;

use crate::error::{UpstreamError, UpstreamResult};

/// Baked-in OAuth client used when the operator supplies none.
pub const DEFAULT_CLIENT_ID: &str =
    "1071006060591-tmhssin2h21lcre235vtolojh4g403ep.apps.googleusercontent.com";
/// Companion secret for [`DEFAULT_CLIENT_ID`].
pub const DEFAULT_CLIENT_SECRET: &str = "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";

const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Scopes requested during authorization.
pub const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/cclog",
    "https://www.googleapis.com/auth/experimentsandconfigs",
];

/// OAuth client configuration.
#[derive(Clone, Debug)]
pub struct OAuthConfig {
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Token endpoint (overridable for tests).
    pub token_url: String,
    /// Userinfo endpoint (overridable for tests).
    pub userinfo_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.into(),
            client_secret: DEFAULT_CLIENT_SECRET.into(),
            token_url: DEFAULT_TOKEN_URL.into(),
            userinfo_url: DEFAULT_USERINFO_URL.into(),
        }
    }
}

/// Token endpoint response.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// Fresh access token.
    pub access_token: String,
    /// Replacement refresh token, when issued.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// Userinfo endpoint response.
#[derive(Clone, Debug, Deserialize)]
pub struct UserInfo {
    /// Account email.
    #[serde(default)]
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

/// Exchange a refresh token for a fresh access token.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh_token: &str,
) -> UpstreamResult<TokenResponse> {
    if refresh_token.is_empty() {
        return Err(UpstreamError::Auth("no refresh token".into()));
    }

    let response = client
        .post(&config.token_url)
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        warn!(status, "token refresh failed");
        return Err(UpstreamError::Auth(format!(
            "token refresh failed: {status} {body}"
        )));
    }

    Ok(response.json().await?)
}

/// Exchange an authorization code for tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
    redirect_uri: &str,
) -> UpstreamResult<TokenResponse> {
    let response = client
        .post(&config.token_url)
        .form(&[
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Auth(format!(
            "token exchange failed: {status} {body}"
        )));
    }

    Ok(response.json().await?)
}

/// Fetch the email/name behind an access token.
pub async fn fetch_user_info(
    client: &reqwest::Client,
    config: &OAuthConfig,
    access_token: &str,
) -> UpstreamResult<UserInfo> {
    let response = client
        .get(&config.userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(UpstreamError::Auth("failed to fetch user info".into()));
    }

    Ok(response.json().await?)
}

/// Build the user-facing authorization URL.
#[must_use]
pub fn build_auth_url(config: &OAuthConfig, redirect_uri: &str, state: &str) -> String {
    let scopes = OAUTH_SCOPES.join(" ");
    let url = Url::parse_with_params(
        DEFAULT_AUTH_URL,
        &[
            ("access_type", "offline"),
            ("client_id", config.client_id.as_str()),
            ("prompt", "consent"),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scopes.as_str()),
            ("state", state),
        ],
    )
    .expect("static auth URL parses");
    url.into()
}

/// Pull `code` and `state` out of a pasted OAuth redirect URL.
pub fn parse_oauth_redirect(raw: &str) -> UpstreamResult<(String, String)> {
    let url = Url::parse(raw).map_err(|e| UpstreamError::Auth(format!("invalid URL: {e}")))?;
    let mut code = String::new();
    let mut state = String::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = value.into_owned(),
            "state" => state = value.into_owned(),
            _ => {}
        }
    }
    if code.is_empty() {
        return Err(UpstreamError::Auth("no code in URL".into()));
    }
    Ok((code, state))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
