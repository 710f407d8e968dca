use crate::error::{Result, SorterError};
use crate::sorter::{FileSorter, IncomingObject, RelocationOutcome};
use serde::Deserialize;
use tracing::{error, info, instrument};

/// Inbound trigger payload, shaped like an S3 bucket notification:
/// `{"Records": [{"s3": {"bucket": {"name": ...}, "object": {"key": ...}}}]}`
#[derive(Debug, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "Records")]
    pub records: Option<Vec<TriggerRecord>>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Deserialize)]
pub struct BucketRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ObjectRef {
    pub key: String,
    #[serde(rename = "eTag")]
    pub e_tag: Option<String>,
}

/// HTTP-style result handed back to the trigger adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub status_code: u16,
    pub body: String,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Extract the batch of incoming objects from a trigger payload. A payload
/// with no records is a defined failure, not a crash.
pub fn parse_trigger(event: &serde_json::Value) -> Result<Vec<IncomingObject>> {
    let event: TriggerEvent = serde_json::from_value(event.clone())
        .map_err(|e| SorterError::InvalidTrigger(e.to_string()))?;

    let records = event.records.unwrap_or_default();
    if records.is_empty() {
        return Err(SorterError::InvalidTrigger("no records".to_string()));
    }

    Ok(records
        .into_iter()
        .map(|record| IncomingObject {
            source_bucket: record.s3.bucket.name,
            key: record.s3.object.key,
            fingerprint: record.s3.object.e_tag,
        })
        .collect())
}

/// Process a full trigger batch sequentially and aggregate per-object
/// outcomes into one status. 200 only when every object relocated.
#[instrument(skip(sorter, event))]
pub async fn handle_trigger(sorter: &FileSorter, event: &serde_json::Value) -> InvocationResult {
    let objects = match parse_trigger(event) {
        Ok(objects) => objects,
        Err(e) => {
            error!("Rejected trigger: {}", e);
            return InvocationResult {
                status_code: 500,
                body: format!("Error Sorting File: {e}"),
            };
        }
    };

    let total = objects.len();
    let mut moved = 0usize;
    let mut held = 0usize;
    let mut failures: Vec<String> = Vec::new();

    for object in &objects {
        info!("Bucket: {}", object.source_bucket);
        info!("File Key: {}", object.key);

        match sorter.sort(object).await {
            Ok(RelocationOutcome::Moved(_)) => moved += 1,
            Ok(RelocationOutcome::MovedToHolding { .. }) => held += 1,
            Err(e) => {
                error!(kind = e.kind(), "Failed to sort {}: {}", object.key, e);
                failures.push(format!("{}: {}", object.key, e));
            }
        }
    }

    if failures.is_empty() {
        InvocationResult {
            status_code: 200,
            body: format!("File Sorted Successfully ({moved} moved, {held} to holding of {total})"),
        }
    } else {
        InvocationResult {
            status_code: 500,
            body: format!(
                "Error Sorting File ({moved} moved, {held} to holding, {} failed of {total}): {}",
                failures.len(),
                failures.join("; ")
            ),
        }
    }
}
