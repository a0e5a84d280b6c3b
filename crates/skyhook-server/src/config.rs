//! Environment-driven configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Relay configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// `User-Agent` sent upstream.
    pub user_agent: String,
    /// Upstream request timeout.
    pub timeout: Duration,
    /// Optional forward proxy.
    pub proxy: Option<String>,
    /// Client API key; empty disables authentication.
    pub api_key: String,
    /// Admin panel user.
    pub panel_user: String,
    /// Admin panel password; required at startup.
    pub panel_password: String,
    /// HTTP statuses worth retrying upstream.
    pub retry_status_codes: Vec<u16>,
    /// Upstream attempt cap.
    pub retry_max_attempts: u32,
    /// Initial endpoint mode.
    pub endpoint_mode: String,
    /// Directory for credentials/logs/settings files.
    pub data_dir: PathBuf,
    /// OAuth client ID override.
    pub google_client_id: Option<String>,
    /// OAuth client secret override.
    pub google_client_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8045,
            user_agent: "antigravity/1.11.3 windows/amd64".into(),
            timeout: Duration::from_millis(180_000),
            proxy: None,
            api_key: String::new(),
            panel_user: "admin".into(),
            panel_password: String::new(),
            retry_status_codes: vec![429, 500],
            retry_max_attempts: 3,
            endpoint_mode: "daily".into(),
            data_dir: PathBuf::from("./data"),
            google_client_id: None,
            google_client_secret: None,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_str(key).and_then(|v| v.parse().ok())
}

impl Config {
    /// Load configuration from the environment, falling back to the
    /// defaults above.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(host) = env_str("HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse("PORT") {
            config.port = port;
        }
        if let Some(ua) = env_str("API_USER_AGENT") {
            config.user_agent = ua;
        }
        if let Some(ms) = env_parse::<u64>("TIMEOUT") {
            config.timeout = Duration::from_millis(ms);
        }
        config.proxy = env_str("PROXY");
        if let Some(key) = env_str("API_KEY") {
            config.api_key = key;
        }
        if let Some(user) = env_str("PANEL_USER") {
            config.panel_user = user;
        }
        if let Some(password) = env_str("PANEL_PASSWORD") {
            config.panel_password = password;
        }
        if let Some(raw) = env_str("RETRY_STATUS_CODES") {
            let codes: Vec<u16> = raw
                .split(',')
                .filter_map(|p| p.trim().parse().ok())
                .collect();
            if !codes.is_empty() {
                config.retry_status_codes = codes;
            }
        }
        if let Some(attempts) = env_parse("RETRY_MAX_ATTEMPTS") {
            config.retry_max_attempts = attempts;
        }
        if let Some(mode) = env_str("ENDPOINT_MODE") {
            config.endpoint_mode = mode;
        }
        if let Some(dir) = env_str("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.google_client_id = env_str("GOOGLE_CLIENT_ID");
        config.google_client_secret = env_str("GOOGLE_CLIENT_SECRET");

        config
    }

    /// Path of the persisted credentials file.
    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join("credentials.json")
    }

    /// Path of the persisted request log.
    #[must_use]
    pub fn logs_path(&self) -> PathBuf {
        self.data_dir.join("logs.json")
    }

    /// Path of the persisted endpoint settings.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.port, 8045);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.retry_status_codes, vec![429, 500]);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.endpoint_mode, "daily");
        assert!(config.api_key.is_empty());
        assert_eq!(config.timeout, Duration::from_millis(180_000));
    }

    #[test]
    fn data_file_paths() {
        let config = Config {
            data_dir: PathBuf::from("/tmp/relay"),
            ..Config::default()
        };
        assert_eq!(
            config.credentials_path(),
            PathBuf::from("/tmp/relay/credentials.json")
        );
        assert_eq!(config.logs_path(), PathBuf::from("/tmp/relay/logs.json"));
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/tmp/relay/settings.json")
        );
    }
}
