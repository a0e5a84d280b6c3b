//! Rotating OAuth credential pool.
//!
//! One async mutex serializes every pool operation, including the
//! refresh HTTP call itself — refreshes are rare, and a request that
//! needs one gains nothing from racing other acquirers onto a stale
//! token.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{UpstreamError, UpstreamResult};
use crate::oauth::{self, OAuthConfig};

/// Expiry margin: a token within 5 minutes of expiry counts as expired.
const EXPIRY_MARGIN_MS: i64 = 300_000;

/// One OAuth credential.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token for upstream requests.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    #[serde(default)]
    pub expires_in: i64,
    /// When the access token was issued, ms since epoch.
    #[serde(rename = "timestamp", default)]
    pub issued_at_ms: i64,
    /// Upstream project this credential is bound to.
    #[serde(rename = "projectId", default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    /// Account email, when known.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Whether the rotation hands this credential out.
    #[serde(rename = "enable")]
    pub enabled: bool,
    /// When the credential was first added.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Conversation-affinity token. Regenerated on every load, never
    /// persisted.
    #[serde(skip)]
    pub session_id: String,
}

impl Credential {
    /// Whether the access token is (about to be) expired.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        if self.issued_at_ms == 0 || self.expires_in == 0 {
            return true;
        }
        let expires_at = self.issued_at_ms + self.expires_in * 1000;
        now_ms >= expires_at - EXPIRY_MARGIN_MS
    }

    fn apply_refresh(&mut self, tokens: &oauth::TokenResponse, now_ms: i64) {
        self.access_token = tokens.access_token.clone();
        self.expires_in = tokens.expires_in;
        self.issued_at_ms = now_ms;
        if let Some(ref rt) = tokens.refresh_token {
            self.refresh_token = rt.clone();
        }
    }
}

/// A credential imported from the admin panel (TOML bulk import).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ImportedCredential {
    /// Bearer token, possibly stale.
    #[serde(default)]
    pub access_token: String,
    /// Refresh token (required).
    #[serde(default)]
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    #[serde(default)]
    pub expires_in: i64,
    /// Issue timestamp, ms since epoch.
    #[serde(default)]
    pub timestamp: i64,
    /// Bound project.
    #[serde(rename = "projectId", default)]
    pub project_id: String,
    /// Account email.
    #[serde(default)]
    pub email: String,
    /// Enabled flag (defaults to true).
    #[serde(default = "default_true")]
    pub enable: bool,
}

fn default_true() -> bool {
    true
}

struct PoolInner {
    credentials: Vec<Credential>,
    cursor: usize,
}

/// The process-wide credential pool.
pub struct CredentialPool {
    inner: Mutex<PoolInner>,
    file_path: Option<PathBuf>,
    http: reqwest::Client,
    oauth: OAuthConfig,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl CredentialPool {
    /// Create a pool, loading persisted credentials when a path is given.
    /// Session IDs are regenerated on every load.
    #[must_use]
    pub fn new(file_path: Option<PathBuf>, oauth: OAuthConfig) -> Self {
        let mut credentials = Vec::new();
        if let Some(ref path) = file_path {
            match std::fs::read(path) {
                Ok(raw) => match serde_json::from_slice::<Vec<Credential>>(&raw) {
                    Ok(loaded) => credentials = loaded,
                    Err(err) => warn!(%err, "credential file unreadable, starting empty"),
                },
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(%err, "credential file unreadable, starting empty"),
            }
        }
        for cred in &mut credentials {
            cred.session_id = skyhook_core::ids::session_id();
        }
        info!(count = credentials.len(), "credentials loaded");

        Self {
            inner: Mutex::new(PoolInner {
                credentials,
                cursor: 0,
            }),
            file_path,
            http: reqwest::Client::new(),
            oauth,
        }
    }

    /// Acquire the next usable credential, refreshing expired ones.
    ///
    /// Advances the round-robin cursor over enabled entries; a full cycle
    /// with no usable credential yields [`UpstreamError::NoCredential`].
    pub async fn acquire(&self) -> UpstreamResult<Credential> {
        let mut inner = self.inner.lock().await;
        if inner.credentials.is_empty() {
            return Err(UpstreamError::NoCredential);
        }

        let count = inner.credentials.len();
        for _ in 0..count {
            let index = inner.cursor;
            inner.cursor = (inner.cursor + 1) % count;

            if !inner.credentials[index].enabled {
                continue;
            }

            if inner.credentials[index].is_expired(now_ms()) {
                if let Err(err) = self.refresh_slot(&mut inner, index).await {
                    warn!(
                        email = %inner.credentials[index].email,
                        %err,
                        "token refresh failed, skipping credential"
                    );
                    continue;
                }
                self.save_locked(&inner);
            }

            return Ok(inner.credentials[index].clone());
        }

        Err(UpstreamError::NoCredential)
    }

    /// Acquire the credential pinned to a project ID.
    pub async fn acquire_by_project(&self, project_id: &str) -> UpstreamResult<Credential> {
        self.acquire_pinned(|c| c.project_id == project_id).await
    }

    /// Acquire the credential pinned to an email.
    pub async fn acquire_by_email(&self, email: &str) -> UpstreamResult<Credential> {
        self.acquire_pinned(|c| c.email == email).await
    }

    async fn acquire_pinned<F>(&self, matches: F) -> UpstreamResult<Credential>
    where
        F: Fn(&Credential) -> bool,
    {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner
            .credentials
            .iter()
            .position(|c| c.enabled && matches(c))
        else {
            return Err(UpstreamError::NoCredential);
        };

        if inner.credentials[index].is_expired(now_ms()) {
            self.refresh_slot(&mut inner, index).await?;
            self.save_locked(&inner);
        }

        Ok(inner.credentials[index].clone())
    }

    async fn refresh_slot(&self, inner: &mut PoolInner, index: usize) -> UpstreamResult<()> {
        let refresh_token = inner.credentials[index].refresh_token.clone();
        let tokens = oauth::refresh_access_token(&self.http, &self.oauth, &refresh_token).await?;
        inner.credentials[index].apply_refresh(&tokens, now_ms());
        info!(email = %inner.credentials[index].email, "token refreshed");
        Ok(())
    }

    /// Add a credential, replacing an existing one with the same email or
    /// refresh token (the original creation time is kept).
    pub async fn add(&self, mut credential: Credential) {
        credential.session_id = skyhook_core::ids::session_id();
        let mut inner = self.inner.lock().await;

        let existing = inner.credentials.iter().position(|c| {
            (!credential.email.is_empty() && c.email == credential.email)
                || (!credential.refresh_token.is_empty()
                    && c.refresh_token == credential.refresh_token)
        });

        match existing {
            Some(i) => {
                credential.created_at = inner.credentials[i].created_at;
                inner.credentials[i] = credential;
            }
            None => inner.credentials.push(credential),
        }
        self.save_locked(&inner);
    }

    /// Bulk import credentials; returns how many were accepted.
    pub async fn import(&self, imported: Vec<ImportedCredential>) -> usize {
        let mut count = 0;
        for item in imported {
            if item.refresh_token.is_empty() {
                continue;
            }
            self.add(Credential {
                access_token: item.access_token,
                refresh_token: item.refresh_token,
                expires_in: item.expires_in,
                issued_at_ms: item.timestamp,
                project_id: item.project_id,
                email: item.email,
                enabled: item.enable,
                created_at: Utc::now(),
                session_id: String::new(),
            })
            .await;
            count += 1;
        }
        count
    }

    /// Remove every credential (clean re-import).
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.credentials.clear();
        inner.cursor = 0;
        self.save_locked(&inner);
    }

    /// Remove the credential at `index`.
    pub async fn delete(&self, index: usize) -> UpstreamResult<()> {
        let mut inner = self.inner.lock().await;
        if index >= inner.credentials.len() {
            return Err(UpstreamError::Auth("index out of range".into()));
        }
        let _ = inner.credentials.remove(index);
        if inner.cursor >= inner.credentials.len() {
            inner.cursor = 0;
        }
        self.save_locked(&inner);
        Ok(())
    }

    /// Enable or disable the credential at `index`.
    pub async fn set_enabled(&self, index: usize, enabled: bool) -> UpstreamResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.credentials.get_mut(index) {
            Some(cred) => cred.enabled = enabled,
            None => return Err(UpstreamError::Auth("index out of range".into())),
        }
        self.save_locked(&inner);
        Ok(())
    }

    /// Disable the credential that issued `session_id` (after an
    /// upstream `UNAUTHENTICATED`).
    pub async fn disable_by_session(&self, session_id: &str) {
        let mut inner = self.inner.lock().await;
        for cred in &mut inner.credentials {
            if cred.session_id == session_id {
                cred.enabled = false;
                warn!(email = %cred.email, "credential disabled after upstream 401");
            }
        }
        self.save_locked(&inner);
    }

    /// Force-refresh the credential at `index`.
    pub async fn refresh_at(&self, index: usize) -> UpstreamResult<()> {
        let mut inner = self.inner.lock().await;
        if index >= inner.credentials.len() {
            return Err(UpstreamError::Auth("index out of range".into()));
        }
        self.refresh_slot(&mut inner, index).await?;
        self.save_locked(&inner);
        Ok(())
    }

    /// Refresh every credential; returns `(succeeded, failed)`.
    pub async fn refresh_all(&self) -> (usize, usize) {
        let mut inner = self.inner.lock().await;
        let mut ok = 0;
        let mut failed = 0;
        for index in 0..inner.credentials.len() {
            match self.refresh_slot(&mut inner, index).await {
                Ok(()) => ok += 1,
                Err(err) => {
                    warn!(index, %err, "refresh failed");
                    failed += 1;
                }
            }
        }
        self.save_locked(&inner);
        (ok, failed)
    }

    /// Copy of every credential, for the admin API.
    pub async fn snapshot(&self) -> Vec<Credential> {
        self.inner.lock().await.credentials.clone()
    }

    /// Number of credentials.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.credentials.len()
    }

    /// Whether the pool is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of enabled credentials.
    pub async fn enabled_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .credentials
            .iter()
            .filter(|c| c.enabled)
            .count()
    }

    fn save_locked(&self, inner: &PoolInner) {
        let Some(ref path) = self.file_path else {
            return;
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match serde_json::to_vec_pretty(&inner.credentials) {
            Ok(data) => {
                if let Err(err) = std::fs::write(path, data) {
                    warn!(%err, "failed to persist credentials");
                }
            }
            Err(err) => warn!(%err, "failed to serialize credentials"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
