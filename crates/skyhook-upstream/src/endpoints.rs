//! Upstream endpoint table and selection modes.
//!
//! Three named deployments are known; the selector either pins one
//! (`direct`) or round-robins across a subset. Mode changes persist to a
//! small settings file so restarts keep the operator's choice.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

/// One upstream deployment.
#[derive(Clone, Debug, Serialize)]
pub struct Endpoint {
    /// Stable key (`daily`, `autopush`, `production`).
    pub key: &'static str,
    /// Display label.
    pub label: &'static str,
    /// Host name.
    pub host: &'static str,
}

impl Endpoint {
    /// URL for streaming generation.
    #[must_use]
    pub fn stream_url(&self) -> String {
        format!(
            "https://{}/v1internal:streamGenerateContent?alt=sse",
            self.host
        )
    }

    /// URL for non-streaming generation.
    #[must_use]
    pub fn generate_url(&self) -> String {
        format!("https://{}/v1internal:generateContent", self.host)
    }
}

/// All known deployments.
pub const ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        key: "daily",
        label: "Daily (Sandbox)",
        host: "daily-cloudcode-pa.sandbox.googleapis.com",
    },
    Endpoint {
        key: "autopush",
        label: "Autopush (Sandbox)",
        host: "autopush-cloudcode-pa.sandbox.googleapis.com",
    },
    Endpoint {
        key: "production",
        label: "Production",
        host: "cloudcode-pa.googleapis.com",
    },
];

fn endpoint_by_key(key: &str) -> Option<&'static Endpoint> {
    ENDPOINTS.iter().find(|e| e.key == key)
}

const ROUND_ROBIN_ALL: &[&str] = &["daily", "autopush", "production"];
const ROUND_ROBIN_DP: &[&str] = &["daily", "production"];

/// Selection mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointMode {
    /// Always the named endpoint.
    Direct(String),
    /// Cycle daily → autopush → production.
    RoundRobin,
    /// Cycle daily → production.
    RoundRobinDp,
}

impl EndpointMode {
    /// Parse a mode string; `None` for unknown values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "round-robin" => Some(Self::RoundRobin),
            "round-robin-dp" => Some(Self::RoundRobinDp),
            key if endpoint_by_key(key).is_some() => Some(Self::Direct(key.into())),
            _ => None,
        }
    }

    /// The canonical mode string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Direct(key) => key,
            Self::RoundRobin => "round-robin",
            Self::RoundRobinDp => "round-robin-dp",
        }
    }
}

/// Persisted selector settings.
#[derive(Serialize, Deserialize)]
struct Settings {
    #[serde(rename = "endpointMode")]
    endpoint_mode: String,
    #[serde(rename = "updatedAt")]
    updated_at: chrono::DateTime<chrono::Utc>,
}

struct SelectorInner {
    mode: EndpointMode,
    rr_index: usize,
    rr_dp_index: usize,
}

/// Mode-aware endpoint selector.
///
/// A single mutex protects the round-robin cursors and mode changes.
pub struct EndpointSelector {
    inner: Mutex<SelectorInner>,
    settings_path: Option<PathBuf>,
}

impl EndpointSelector {
    /// Create a selector, restoring a persisted mode when present.
    #[must_use]
    pub fn new(initial_mode: EndpointMode, settings_path: Option<PathBuf>) -> Self {
        let mut mode = initial_mode;
        if let Some(ref path) = settings_path {
            if let Ok(raw) = std::fs::read(path) {
                if let Ok(settings) = serde_json::from_slice::<Settings>(&raw) {
                    if let Some(saved) = EndpointMode::parse(&settings.endpoint_mode) {
                        mode = saved;
                    }
                }
            }
        }
        Self {
            inner: Mutex::new(SelectorInner {
                mode,
                rr_index: 0,
                rr_dp_index: 0,
            }),
            settings_path,
        }
    }

    /// The endpoint to use for the next request, advancing round-robin
    /// cursors.
    pub async fn next(&self) -> &'static Endpoint {
        let mut inner = self.inner.lock().await;
        let mode = inner.mode.clone();
        let key = match mode {
            EndpointMode::Direct(key) => key,
            EndpointMode::RoundRobin => {
                let key = ROUND_ROBIN_ALL[inner.rr_index % ROUND_ROBIN_ALL.len()];
                inner.rr_index = (inner.rr_index + 1) % ROUND_ROBIN_ALL.len();
                key.to_string()
            }
            EndpointMode::RoundRobinDp => {
                let key = ROUND_ROBIN_DP[inner.rr_dp_index % ROUND_ROBIN_DP.len()];
                inner.rr_dp_index = (inner.rr_dp_index + 1) % ROUND_ROBIN_DP.len();
                key.to_string()
            }
        };
        endpoint_by_key(&key).unwrap_or(&ENDPOINTS[0])
    }

    /// Current mode string.
    pub async fn mode(&self) -> String {
        self.inner.lock().await.mode.as_str().to_string()
    }

    /// Change the mode; unknown mode strings are ignored.
    pub async fn set_mode(&self, raw: &str) {
        let Some(mode) = EndpointMode::parse(raw) else {
            return;
        };
        {
            let mut inner = self.inner.lock().await;
            inner.mode = mode.clone();
        }
        info!(mode = mode.as_str(), "endpoint mode changed");
        self.persist(&mode);
    }

    fn persist(&self, mode: &EndpointMode) {
        let Some(ref path) = self.settings_path else {
            return;
        };
        let settings = Settings {
            endpoint_mode: mode.as_str().to_string(),
            updated_at: chrono::Utc::now(),
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Ok(data) = serde_json::to_vec_pretty(&settings) {
            let _ = std::fs::write(path, data);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_target_v1internal() {
        let daily = endpoint_by_key("daily").unwrap();
        assert_eq!(
            daily.stream_url(),
            "https://daily-cloudcode-pa.sandbox.googleapis.com/v1internal:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            daily.generate_url(),
            "https://daily-cloudcode-pa.sandbox.googleapis.com/v1internal:generateContent"
        );
    }

    #[test]
    fn mode_parsing() {
        assert_eq!(
            EndpointMode::parse("daily"),
            Some(EndpointMode::Direct("daily".into()))
        );
        assert_eq!(EndpointMode::parse("round-robin"), Some(EndpointMode::RoundRobin));
        assert_eq!(
            EndpointMode::parse("round-robin-dp"),
            Some(EndpointMode::RoundRobinDp)
        );
        assert_eq!(EndpointMode::parse("staging"), None);
    }

    #[tokio::test]
    async fn direct_mode_pins() {
        let sel = EndpointSelector::new(EndpointMode::Direct("production".into()), None);
        for _ in 0..3 {
            assert_eq!(sel.next().await.key, "production");
        }
    }

    #[tokio::test]
    async fn round_robin_cycles_all_three() {
        let sel = EndpointSelector::new(EndpointMode::RoundRobin, None);
        let keys: Vec<&str> = [
            sel.next().await.key,
            sel.next().await.key,
            sel.next().await.key,
            sel.next().await.key,
        ]
        .into();
        assert_eq!(keys, vec!["daily", "autopush", "production", "daily"]);
    }

    #[tokio::test]
    async fn round_robin_dp_skips_autopush() {
        let sel = EndpointSelector::new(EndpointMode::RoundRobinDp, None);
        let keys = [
            sel.next().await.key,
            sel.next().await.key,
            sel.next().await.key,
        ];
        assert_eq!(keys, ["daily", "production", "daily"]);
    }

    #[tokio::test]
    async fn set_mode_ignores_unknown() {
        let sel = EndpointSelector::new(EndpointMode::RoundRobin, None);
        sel.set_mode("bogus").await;
        assert_eq!(sel.mode().await, "round-robin");
        sel.set_mode("autopush").await;
        assert_eq!(sel.mode().await, "autopush");
    }

    #[tokio::test]
    async fn mode_persists_and_restores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        {
            let sel =
                EndpointSelector::new(EndpointMode::Direct("daily".into()), Some(path.clone()));
            sel.set_mode("round-robin-dp").await;
        }
        let restored = EndpointSelector::new(EndpointMode::Direct("daily".into()), Some(path));
        assert_eq!(restored.mode().await, "round-robin-dp");
    }
}
