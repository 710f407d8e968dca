use crate::error::{Result, SorterError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use uuid::Uuid;

/// One append-only record of a relocation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub action: String,
    pub source_bucket: String,
    pub source_key: String,
    pub destination_bucket: String,
    pub destination_key: String,
    pub environment: String,
    pub outcome: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
        environment: &str,
        outcome: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: "PUT".to_string(),
            source_bucket: source_bucket.to_string(),
            source_key: source_key.to_string(),
            destination_bucket: destination_bucket.to_string(),
            destination_key: destination_key.to_string(),
            environment: environment.to_string(),
            outcome: outcome.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only audit sink. Like notifications, appends are best-effort.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<()>;
}

/// Writes one JSON line per entry to a dated file under `dir`.
pub struct JsonlAuditSink {
    dir: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn audit_path(&self) -> PathBuf {
        let filename = format!("sorter_audit_{}.jsonl", Utc::now().format("%Y%m%d"));
        self.dir.join(filename)
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| SorterError::Audit(format!("create audit dir: {e}")))?;

        let line = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.audit_path())
            .map_err(|e| SorterError::Audit(format!("open audit file: {e}")))?;
        writeln!(file, "{line}").map_err(|e| SorterError::Audit(format!("write audit file: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn appends_one_json_line_per_entry() {
        let dir = tempdir().unwrap();
        let sink = JsonlAuditSink::new(dir.path());

        let entry = AuditEntry::new(
            "hermes-spani",
            "hermes_SPANI_l0_2023040-000018_v01.bin",
            "dev-hermes-spani",
            "hermes_SPANI_l0_2023040-000018_v01.bin",
            "DEVELOPMENT",
            "moved",
        );
        sink.append(&entry).await.unwrap();
        sink.append(&entry).await.unwrap();

        let path = sink.audit_path();
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.outcome, "moved");
        assert_eq!(parsed.action, "PUT");
        assert_eq!(parsed.destination_bucket, "dev-hermes-spani");
    }
}
