//! Filesystem object store for events
//!
//! One JSON document per event at `<root>/<YYYY-MM-DD>/<uuid>.json`,
//! partitioned by load date. Documents are written to a hidden temp file
//! and renamed into place so a reader never sees a partial object.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AnalyticsRow, EventSink, StorageResult};

pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative key for a new object loaded at `loaded_at`
    pub fn object_key(loaded_at: DateTime<Utc>) -> String {
        format!("{}/{}.json", loaded_at.format("%Y-%m-%d"), Uuid::new_v4())
    }

    /// Write `row` under `key`, returning the final path
    pub fn put(&self, key: &str, row: &AnalyticsRow) -> StorageResult<PathBuf> {
        // serde_json's default map is ordered, so keys come out sorted
        let body = serde_json::to_string_pretty(&serde_json::to_value(row)?)?;

        let path = self.root.join(key);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{file_name}.tmp"));

        if let Err(e) = write_then_rename(&tmp, &path, body.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(path)
    }
}

fn write_then_rename(tmp: &Path, path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp)?;
    file.write_all(body)?;
    file.sync_all()?;
    drop(file);
    fs::rename(tmp, path)
}

impl EventSink for ObjectStore {
    fn name(&self) -> &'static str {
        "object"
    }

    fn write_event(&self, row: &AnalyticsRow) -> StorageResult<()> {
        let loaded_at = DateTime::parse_from_rfc3339(&row.event_loaded_at)
            .map(|value| value.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let key = Self::object_key(loaded_at);
        self.put(&key, row)?;
        tracing::debug!(key = %key, "Stored event object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AnalyticsEvent;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn row() -> AnalyticsRow {
        let event = AnalyticsEvent::from_json(json!({
            "client_id": "abc123",
            "event": "cli_command",
            "event_created_at": "2022-02-21T19:56:11Z",
            "os": "darwin",
            "product_name": "fidesctl",
            "production_version": "1.0.0",
            "flags": ["--verbose", "--name=secret"],
            "extra_data": {"b": 1, "a": 2},
        }))
        .unwrap();
        AnalyticsRow::from_event(&event, Utc::now()).unwrap()
    }

    fn json_files(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                found.extend(json_files(&path));
            } else {
                found.push(path);
            }
        }
        found
    }

    #[test]
    fn test_object_key_layout() {
        let at = DateTime::parse_from_rfc3339("2022-10-26T19:07:41Z")
            .unwrap()
            .with_timezone(&Utc);
        let key = ObjectStore::object_key(at);
        let (date, file) = key.split_once('/').unwrap();
        assert_eq!(date, "2022-10-26");
        let id = file.strip_suffix(".json").unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_write_event_creates_one_sorted_document() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::open(dir.path().join("events")).unwrap();
        let row = row();

        store.write_event(&row).unwrap();

        let files = json_files(store.root());
        assert_eq!(files.len(), 1, "temp file left behind: {files:?}");
        let partition = files[0].parent().unwrap().file_name().unwrap();
        assert_eq!(partition.to_string_lossy(), &row.event_loaded_at[..10]);

        let body = fs::read_to_string(&files[0]).unwrap();
        assert!(body.find("\"client_id\"").unwrap() < body.find("\"event\"").unwrap());
        assert!(body.contains('\n'));

        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["flags"], "--verbose, --name");
        assert_eq!(parsed["extra_data"], r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_failed_put_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::open(dir.path().join("events")).unwrap();

        // A directory at the target path makes the rename fail
        let blocked = store.root().join("2022-10-26").join("taken.json");
        fs::create_dir_all(blocked.join("inner")).unwrap();

        assert!(store.put("2022-10-26/taken.json", &row()).is_err());

        let names: Vec<String> = fs::read_dir(store.root().join("2022-10-26"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["taken.json"]);
    }
}
