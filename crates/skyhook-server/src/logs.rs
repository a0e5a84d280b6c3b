//! In-memory request log with capped retention.
//!
//! Newest entries sit at the head; the cap keeps memory bounded.
//! Details (request/response snapshots) stay in memory for the admin
//! detail view but are stripped before persistence, which runs on a
//! background task so the request path never waits on disk.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Retained entry cap.
const MAX_LOGS: usize = 1000;

/// One relayed request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    /// Entry ID.
    pub id: String,
    /// Completion time.
    pub timestamp: DateTime<Utc>,
    /// HTTP status returned to the client.
    pub status: u16,
    /// Whether the relay succeeded.
    pub success: bool,
    /// Credential project.
    #[serde(rename = "projectId", default)]
    pub project_id: String,
    /// Credential email.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Client-facing model.
    pub model: String,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Wall time in milliseconds.
    #[serde(rename = "durationMs")]
    pub duration_ms: i64,
    /// Error message, when failed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Whether a detail snapshot exists.
    #[serde(rename = "hasDetail")]
    pub has_detail: bool,
    /// Request/response snapshot (memory only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<LogDetail>,
}

/// Request/response snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogDetail {
    /// Decoded client request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    /// Response summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSnapshot>,
}

/// Response side of a snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    /// Status code.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Concatenated model output.
    #[serde(rename = "modelOutput", default, skip_serializing_if = "String::is_empty")]
    pub model_output: String,
}

/// Per-account usage aggregate.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UsageStats {
    /// Project ID.
    #[serde(rename = "projectId")]
    pub project_id: String,
    /// Email.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Total requests.
    pub count: u64,
    /// Successful requests.
    pub success: u64,
    /// Failed requests.
    pub failed: u64,
    /// Most recent request time.
    #[serde(rename = "lastUsedAt", skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    /// Models seen.
    pub models: Vec<String>,
}

/// The process-wide request log.
pub struct LogStore {
    entries: RwLock<Vec<LogEntry>>,
    file_path: Option<PathBuf>,
}

impl LogStore {
    /// Create a store, loading persisted entries when a path is given.
    #[must_use]
    pub fn new(file_path: Option<PathBuf>) -> Self {
        let mut entries = Vec::new();
        if let Some(ref path) = file_path {
            if let Ok(raw) = std::fs::read(path) {
                match serde_json::from_slice::<Vec<LogEntry>>(&raw) {
                    Ok(loaded) => entries = loaded,
                    Err(err) => warn!(%err, "log file unreadable, starting empty"),
                }
            }
        }
        Self {
            entries: RwLock::new(entries),
            file_path,
        }
    }

    /// Append an entry (newest first) and persist in the background.
    pub fn add(self: &Arc<Self>, mut entry: LogEntry) {
        entry.has_detail = entry.detail.is_some();
        {
            let mut entries = self.entries.write();
            entries.insert(0, entry);
            entries.truncate(MAX_LOGS);
        }

        let store = Arc::clone(self);
        let _ = tokio::task::spawn_blocking(move || store.save());
    }

    /// Persist all entries with details stripped.
    fn save(&self) {
        let Some(ref path) = self.file_path else {
            return;
        };
        let stripped: Vec<LogEntry> = {
            let entries = self.entries.read();
            entries
                .iter()
                .map(|e| LogEntry {
                    detail: None,
                    ..e.clone()
                })
                .collect()
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        match serde_json::to_vec_pretty(&stripped) {
            Ok(data) => {
                if let Err(err) = std::fs::write(path, data) {
                    warn!(%err, "failed to persist logs");
                }
            }
            Err(err) => warn!(%err, "failed to serialize logs"),
        }
    }

    /// Newest `limit` entries, details stripped.
    #[must_use]
    pub fn list(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries.read();
        let limit = if limit == 0 { entries.len() } else { limit };
        entries
            .iter()
            .take(limit)
            .map(|e| LogEntry {
                detail: None,
                ..e.clone()
            })
            .collect()
    }

    /// One entry by ID, detail included.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<LogEntry> {
        self.entries.read().iter().find(|e| e.id == id).cloned()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-account usage within the trailing window.
    #[must_use]
    pub fn usage(&self, window_minutes: i64) -> Vec<UsageStats> {
        let cutoff = Utc::now() - chrono::Duration::minutes(window_minutes);
        let entries = self.entries.read();

        let mut stats: std::collections::HashMap<String, UsageStats> =
            std::collections::HashMap::new();

        for entry in entries.iter().filter(|e| e.timestamp >= cutoff) {
            // Entries with no credential still count, under "unknown".
            let key = if !entry.email.is_empty() {
                entry.email.clone()
            } else if !entry.project_id.is_empty() {
                entry.project_id.clone()
            } else {
                "unknown".to_string()
            };

            let s = stats.entry(key).or_insert_with(|| UsageStats {
                project_id: entry.project_id.clone(),
                email: entry.email.clone(),
                ..UsageStats::default()
            });
            s.count += 1;
            if entry.success {
                s.success += 1;
            } else {
                s.failed += 1;
            }
            if s.last_used_at.is_none_or(|t| entry.timestamp > t) {
                s.last_used_at = Some(entry.timestamp);
            }
            if !entry.model.is_empty() && !s.models.contains(&entry.model) {
                s.models.push(entry.model.clone());
            }
        }

        stats.into_values().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, email: &str, success: bool) -> LogEntry {
        LogEntry {
            id: id.into(),
            timestamp: Utc::now(),
            status: if success { 200 } else { 500 },
            success,
            project_id: "proj".into(),
            email: email.into(),
            model: "gemini-3-pro-low".into(),
            method: "POST".into(),
            path: "/v1/chat/completions".into(),
            duration_ms: 42,
            message: String::new(),
            has_detail: false,
            detail: Some(LogDetail {
                request: Some(serde_json::json!({"model": "gemini-3-pro-low"})),
                response: Some(ResponseSnapshot {
                    status_code: 200,
                    model_output: "hi".into(),
                }),
            }),
        }
    }

    #[tokio::test]
    async fn newest_first_and_capped() {
        let store = Arc::new(LogStore::new(None));
        for i in 0..1010 {
            store.add(entry(&format!("e{i}"), "a@x", true));
        }
        assert_eq!(store.len(), MAX_LOGS);
        let listed = store.list(2);
        assert_eq!(listed[0].id, "e1009");
        assert_eq!(listed[1].id, "e1008");
    }

    #[tokio::test]
    async fn list_strips_detail_but_get_keeps_it() {
        let store = Arc::new(LogStore::new(None));
        store.add(entry("e1", "a@x", true));
        let listed = store.list(0);
        assert!(listed[0].detail.is_none());
        assert!(listed[0].has_detail);
        let fetched = store.get("e1").unwrap();
        assert!(fetched.detail.is_some());
        assert!(store.get("missing").is_none());
    }

    #[tokio::test]
    async fn usage_aggregates_per_account() {
        let store = Arc::new(LogStore::new(None));
        store.add(entry("e1", "a@x", true));
        store.add(entry("e2", "a@x", false));
        store.add(entry("e3", "b@x", true));

        let mut usage = store.usage(60);
        usage.sort_by(|a, b| a.email.cmp(&b.email));
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].email, "a@x");
        assert_eq!(usage[0].count, 2);
        assert_eq!(usage[0].success, 1);
        assert_eq!(usage[0].failed, 1);
        assert_eq!(usage[0].models, vec!["gemini-3-pro-low"]);
        assert!(usage[0].last_used_at.is_some());
    }

    #[tokio::test]
    async fn usage_buckets_credential_less_entries_as_unknown() {
        let store = Arc::new(LogStore::new(None));
        let mut anonymous = entry("e1", "", false);
        anonymous.project_id = String::new();
        store.add(anonymous);
        store.add(entry("e2", "a@x", true));

        let mut usage = store.usage(60);
        usage.sort_by(|a, b| a.email.cmp(&b.email));
        assert_eq!(usage.len(), 2);
        let unknown = usage.iter().find(|s| s.email.is_empty()).unwrap();
        assert_eq!(unknown.count, 1);
        assert_eq!(unknown.failed, 1);
    }

    #[tokio::test]
    async fn usage_window_excludes_old_entries() {
        let store = Arc::new(LogStore::new(None));
        let mut old = entry("old", "a@x", true);
        old.timestamp = Utc::now() - chrono::Duration::hours(3);
        store.add(old);
        assert!(store.usage(60).is_empty());
        assert_eq!(store.usage(60 * 24).len(), 1);
    }

    #[tokio::test]
    async fn persistence_strips_details() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.json");
        {
            let store = Arc::new(LogStore::new(Some(path.clone())));
            store.add(entry("e1", "a@x", true));
            // Synchronous save so the test does not race the spawned task.
            store.save();
        }
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"e1\""));
        assert!(!raw.contains("modelOutput"));

        let reloaded = LogStore::new(Some(path));
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get("e1").unwrap().detail.is_none());
    }
}
