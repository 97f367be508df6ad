//! External collaborators the tracker talks to, plus the file-backed and
//! log-backed implementations used by the agent binary.
//!
//! All three calls are best effort. Callers log failures and continue.

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::CollaboratorError;
use crate::types::{ActivitySource, Phase};

pub const AUDIT_TARGET_TYPE: &str = "user_presence";
pub const AUDIT_MODULE: &str = "presence";
pub const ACTION_USER_ACTIVITY: &str = "user activity";
pub const ACTION_AUTOMATIC_STATUS_CHANGE: &str = "automatic status change";
pub const REASON_INACTIVITY_TIMEOUT: &str = "inactivity_timeout";

/// Shared presence status (the value other users see).
pub trait PresenceStore: Send + Sync {
    fn set_presence(&self, status: Phase) -> Result<(), CollaboratorError>;
    fn presence(&self) -> Result<Option<Phase>, CollaboratorError>;
}

/// Append-only sink for structured audit events.
pub trait AuditSink: Send + Sync {
    fn write(&self, record: &AuditRecord) -> Result<(), CollaboratorError>;
}

/// Surface for short-lived, user-visible messages.
pub trait Notifier: Send + Sync {
    fn show(&self, notice: &Notice) -> Result<(), CollaboratorError>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub status: Arc<dyn PresenceStore>,
    pub audit: Arc<dyn AuditSink>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub recorded_at: DateTime<Utc>,
    pub action: String,
    pub description: String,
    pub target_type: String,
    pub module: String,
    pub details: Value,
}

impl AuditRecord {
    fn new(
        recorded_at: DateTime<Utc>,
        action: &str,
        description: String,
        details: Value,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            recorded_at,
            action: action.to_string(),
            description,
            target_type: AUDIT_TARGET_TYPE.to_string(),
            module: AUDIT_MODULE.to_string(),
            details,
        }
    }

    /// Routine activity entry. Subject to the audit throttle.
    pub fn routine_activity(source: ActivitySource, meta: &Value, at: DateTime<Utc>) -> Self {
        Self::new(
            at,
            ACTION_USER_ACTIVITY,
            format!("User activity detected ({})", source.as_str()),
            json!({
                "source": source.as_str(),
                "at": at.to_rfc3339(),
                "meta": meta,
            }),
        )
    }

    /// Entry for a deadline-driven status change. Never throttled.
    pub fn automatic_status_change(
        new_status: Phase,
        last_activity_at: DateTime<Utc>,
        idle_for: Duration,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            at,
            ACTION_AUTOMATIC_STATUS_CHANGE,
            format!(
                "Status automatically changed to {} after {} minutes of inactivity",
                new_status,
                idle_for.as_secs() / 60
            ),
            json!({
                "reason": REASON_INACTIVITY_TIMEOUT,
                "newStatus": new_status,
                "lastActivityAt": last_activity_at.to_rfc3339(),
                "idleSeconds": idle_for.as_secs(),
            }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
    pub duration: Duration,
    pub dismissible: bool,
}

impl Notice {
    pub fn for_transition(phase: Phase, idle_for: Duration, duration: Duration) -> Self {
        Self {
            title: format!("Status changed to {}", phase),
            message: format!(
                "No activity for {} minutes, so your status was set to {} automatically. \
                 Any activity sets it back to Active.",
                idle_for.as_secs() / 60,
                phase
            ),
            duration,
            dismissible: true,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// File-backed status store
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
struct PresenceSnapshot {
    status: Phase,
    updated_at: DateTime<Utc>,
}

/// Persists the current status as a small JSON document, replaced atomically.
#[derive(Debug, Clone)]
pub struct FilePresenceStore {
    path: PathBuf,
}

impl FilePresenceStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PresenceStore for FilePresenceStore {
    fn set_presence(&self, status: Phase) -> Result<(), CollaboratorError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| CollaboratorError::io("create presence dir", err))?;
        }

        let snapshot = PresenceSnapshot {
            status,
            updated_at: Utc::now(),
        };
        let payload = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| CollaboratorError::json("serialize presence", err))?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, payload)
            .map_err(|err| CollaboratorError::io("write presence", err))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|err| CollaboratorError::io("commit presence", err))?;
        Ok(())
    }

    fn presence(&self) -> Result<Option<Phase>, CollaboratorError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CollaboratorError::io("read presence", err)),
        };
        let snapshot: PresenceSnapshot = serde_json::from_slice(&data)
            .map_err(|err| CollaboratorError::json("parse presence", err))?;
        Ok(Some(snapshot.status))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON-lines audit sink
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn write(&self, record: &AuditRecord) -> Result<(), CollaboratorError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|err| CollaboratorError::json("serialize audit record", err))?;
        line.push(b'\n');

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| CollaboratorError::io("create audit dir", err))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| CollaboratorError::io("open audit log", err))?;
        file.write_all(&line)
            .map_err(|err| CollaboratorError::io("append audit record", err))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Log-backed notifier
// ═══════════════════════════════════════════════════════════════════════════════

/// Emits notices as structured log events. Headless hosts use this.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show(&self, notice: &Notice) -> Result<(), CollaboratorError> {
        tracing::info!(
            title = %notice.title,
            message = %notice.message,
            duration_ms = notice.duration.as_millis() as u64,
            dismissible = notice.dismissible,
            "Presence notice"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_status_and_reports_missing_as_none() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = FilePresenceStore::new(temp_dir.path().join("nested").join("presence.json"));

        assert_eq!(store.presence().expect("read missing"), None);

        store.set_presence(Phase::Break).expect("write break");
        assert_eq!(store.presence().expect("read"), Some(Phase::Break));
        assert!(!store.path().with_extension("tmp").exists());

        store.set_presence(Phase::Active).expect("write active");
        assert_eq!(store.presence().expect("read"), Some(Phase::Active));
    }

    #[test]
    fn file_store_reports_corrupt_snapshot() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("presence.json");
        fs::write(&path, "not json").expect("write");

        let err = FilePresenceStore::new(path).presence().expect_err("corrupt");
        assert!(matches!(err, CollaboratorError::Json { .. }));
    }

    #[test]
    fn jsonl_sink_appends_one_line_per_record() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let sink = JsonlAuditSink::new(temp_dir.path().join("audit.jsonl"));
        let at = Utc::now();

        sink.write(&AuditRecord::routine_activity(
            ActivitySource::Interaction,
            &json!({"kind": "key_down"}),
            at,
        ))
        .expect("first write");
        sink.write(&AuditRecord::automatic_status_change(
            Phase::Break,
            at,
            Duration::from_secs(1200),
            at,
        ))
        .expect("second write");

        let content = fs::read_to_string(sink.path()).expect("read log");
        let records: Vec<AuditRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).expect("parse line"))
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, ACTION_USER_ACTIVITY);
        assert_eq!(records[1].action, ACTION_AUTOMATIC_STATUS_CHANGE);
        assert_ne!(records[0].id, records[1].id);
    }

    #[test]
    fn automatic_status_change_details_carry_reason_and_status() {
        let at = DateTime::parse_from_rfc3339("2026-02-14T10:20:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let last = at - chrono::Duration::minutes(20);
        let record =
            AuditRecord::automatic_status_change(Phase::Offline, last, Duration::from_secs(2400), at);

        assert_eq!(record.target_type, AUDIT_TARGET_TYPE);
        assert_eq!(record.module, AUDIT_MODULE);
        assert_eq!(record.details["reason"], REASON_INACTIVITY_TIMEOUT);
        assert_eq!(record.details["newStatus"], "offline");
        assert_eq!(record.details["lastActivityAt"], last.to_rfc3339());
        assert!(record.description.contains("40 minutes"));
    }

    #[test]
    fn transition_notice_is_dismissible_and_names_phase() {
        let notice =
            Notice::for_transition(Phase::Break, Duration::from_secs(1200), Duration::from_secs(10));
        assert!(notice.dismissible);
        assert_eq!(notice.title, "Status changed to Break");
        assert!(notice.message.contains("20 minutes"));
        assert_eq!(notice.duration, Duration::from_secs(10));
    }
}
