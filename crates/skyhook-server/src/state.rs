//! Shared server state.

use std::sync::Arc;

use skyhook_upstream::client::{ClientConfig, UpstreamClient};
use skyhook_upstream::credentials::CredentialPool;
use skyhook_upstream::endpoints::{EndpointMode, EndpointSelector};
use skyhook_upstream::oauth::OAuthConfig;
use skyhook_upstream::retry::RetryPolicy;

use crate::config::Config;
use crate::logs::LogStore;
use crate::sessions::SessionStore;

/// Everything a handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Relay configuration.
    pub config: Arc<Config>,
    /// Rotating credential pool.
    pub pool: Arc<CredentialPool>,
    /// Endpoint selector.
    pub selector: Arc<EndpointSelector>,
    /// Upstream API client.
    pub client: Arc<UpstreamClient>,
    /// Request log.
    pub logs: Arc<LogStore>,
    /// Admin sessions.
    pub sessions: Arc<SessionStore>,
    /// OAuth client config (admin account flows).
    pub oauth: OAuthConfig,
    /// Plain HTTP client for OAuth calls.
    pub http: reqwest::Client,
}

impl AppState {
    /// Wire the full state graph from configuration.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        let mut oauth = OAuthConfig::default();
        if let Some(ref id) = config.google_client_id {
            oauth.client_id = id.clone();
        }
        if let Some(ref secret) = config.google_client_secret {
            oauth.client_secret = secret.clone();
        }

        let initial_mode = EndpointMode::parse(&config.endpoint_mode)
            .unwrap_or(EndpointMode::Direct("daily".into()));
        let selector = Arc::new(EndpointSelector::new(
            initial_mode,
            Some(config.settings_path()),
        ));

        let pool = Arc::new(CredentialPool::new(
            Some(config.credentials_path()),
            oauth.clone(),
        ));

        let client = Arc::new(UpstreamClient::new(
            ClientConfig {
                user_agent: config.user_agent.clone(),
                timeout: config.timeout,
                proxy: config.proxy.clone(),
                base_url_override: None,
            },
            RetryPolicy {
                max_attempts: config.retry_max_attempts,
                retry_status_codes: config.retry_status_codes.clone(),
            },
            Arc::clone(&selector),
        ));

        let logs = Arc::new(LogStore::new(Some(config.logs_path())));

        Self {
            config: Arc::new(config),
            pool,
            selector,
            client,
            logs,
            sessions: Arc::new(SessionStore::new()),
            oauth,
            http: reqwest::Client::new(),
        }
    }
}
