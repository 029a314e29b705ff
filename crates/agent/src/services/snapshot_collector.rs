//! Collector reading monitoring snapshots written by an on-device exporter.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use domain::error::CollectionError;
use domain::models::{DeviceId, MonitoringPayload};
use domain::services::DeviceDataCollector;

/// Snapshot file contents. Any `deviceId` in the file is ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    #[serde(default)]
    messages: Vec<String>,
    #[serde(default)]
    contacts: Vec<String>,
    #[serde(default)]
    app_usage: BTreeMap<String, u64>,
}

/// Reads `<dir>/<device_id>.json` on every cycle.
///
/// The file holds the payload fields in their wire format. A missing or
/// unreadable file is a transient failure; a permission error means the
/// exporter's access was revoked.
#[derive(Debug, Clone)]
pub struct SnapshotFileCollector {
    dir: PathBuf,
}

impl SnapshotFileCollector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, device_id: &DeviceId) -> Result<PathBuf, CollectionError> {
        let id = device_id.as_str();
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(CollectionError::SourceUnavailable(format!(
                "invalid device id for snapshot lookup: {id:?}"
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl DeviceDataCollector for SnapshotFileCollector {
    fn collect(&self, device_id: &DeviceId) -> Result<MonitoringPayload, CollectionError> {
        let path = self.snapshot_path(device_id)?;

        let bytes = std::fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                CollectionError::PermissionRevoked(format!("{}: {}", path.display(), e))
            }
            _ => CollectionError::SourceUnavailable(format!("{}: {}", path.display(), e)),
        })?;

        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
            CollectionError::SourceUnavailable(format!("{}: invalid snapshot: {}", path.display(), e))
        })?;

        debug!(
            device_id = %device_id,
            path = %path.display(),
            "Read monitoring snapshot"
        );

        let payload = MonitoringPayload {
            device_id: device_id.clone(),
            messages: snapshot.messages,
            contacts: snapshot.contacts,
            app_usage: snapshot.app_usage,
        };
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_snapshot(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_collect_reads_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(
            dir.path(),
            "dev-1.json",
            r#"{"messages":["hi"],"contacts":["Mom"],"appUsage":{"com.game":42}}"#,
        );
        let collector = SnapshotFileCollector::new(dir.path());

        let payload = collector.collect(&DeviceId::new("dev-1")).unwrap();

        assert_eq!(payload.messages, vec!["hi".to_string()]);
        assert_eq!(payload.contacts, vec!["Mom".to_string()]);
        assert_eq!(payload.app_usage.get("com.game"), Some(&42));
    }

    #[test]
    fn test_collect_uses_requested_device_id() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), "dev-2.json", r#"{"deviceId":"other"}"#);
        let collector = SnapshotFileCollector::new(dir.path());

        let payload = collector.collect(&DeviceId::new("dev-2")).unwrap();

        assert_eq!(payload.device_id.as_str(), "dev-2");
        assert!(payload.is_empty());
    }

    #[test]
    fn test_missing_snapshot_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let collector = SnapshotFileCollector::new(dir.path());

        let err = collector.collect(&DeviceId::new("absent")).unwrap_err();

        assert!(matches!(err, CollectionError::SourceUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_json_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), "dev-3.json", "{not json");
        let collector = SnapshotFileCollector::new(dir.path());

        let err = collector.collect(&DeviceId::new("dev-3")).unwrap_err();

        assert!(matches!(err, CollectionError::SourceUnavailable(_)));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let collector = SnapshotFileCollector::new("/tmp");

        for id in ["../etc/passwd", "a/b", "a\\b", ""] {
            let err = collector.collect(&DeviceId::new(id)).unwrap_err();
            assert!(matches!(err, CollectionError::SourceUnavailable(_)), "{id}");
        }
    }
}
