use crate::audit::{AuditEntry, AuditSink};
use crate::error::{Result, SorterError};
use crate::notify::Notifier;
use crate::parser::{self, basename};
use crate::routing::{self, Environment};
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One object named by an inbound trigger record.
#[derive(Debug, Clone)]
pub struct IncomingObject {
    pub source_bucket: String,
    pub key: String,
    /// Content fingerprint from the trigger (etag), when the event carries one
    pub fingerprint: Option<String>,
}

/// Where a file is moving from and to. Computed once per object.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelocationPlan {
    pub source_bucket: String,
    pub source_key: String,
    pub destination_bucket: String,
    pub destination_key: String,
}

/// Terminal success outcomes of one relocation. Failures are the
/// corresponding `SorterError` variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationOutcome {
    Moved(RelocationPlan),
    MovedToHolding {
        plan: RelocationPlan,
        /// The destination key that was already taken
        original_key: String,
    },
}

impl RelocationOutcome {
    pub fn plan(&self) -> &RelocationPlan {
        match self {
            RelocationOutcome::Moved(plan) => plan,
            RelocationOutcome::MovedToHolding { plan, .. } => plan,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelocationOutcome::Moved(_) => "moved",
            RelocationOutcome::MovedToHolding { .. } => "moved_to_holding",
        }
    }
}

/// Disambiguated key for a destination collision: the original key with a
/// minute-resolution UTC timestamp appended.
pub fn collision_key(key: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", key, now.format("%Y-%m-%d-%H%MZ"))
}

/// Moves incoming science files from a staging bucket into per-instrument
/// buckets, never deleting a source before the copy is confirmed at the
/// destination. Collisions are diverted to a holding bucket under a
/// timestamp-suffixed key.
pub struct FileSorter {
    store: Arc<dyn ObjectStore>,
    notifier: Option<Arc<dyn Notifier>>,
    audit: Option<Arc<dyn AuditSink>>,
    environment: Environment,
    dry_run: bool,
}

impl FileSorter {
    pub fn new(store: Arc<dyn ObjectStore>, environment: Environment) -> Self {
        Self {
            store,
            notifier: None,
            audit: None,
            environment,
            dry_run: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        if dry_run {
            warn!("Performing dry run - files will not be copied/removed");
        }
        self.dry_run = dry_run;
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Relocate one incoming object. Exactly one outcome per object: a
    /// `RelocationOutcome` on success, or the terminal error for the step
    /// that failed. Reporting failures never change the outcome.
    #[instrument(skip(self, incoming), fields(key = %incoming.key, source = %incoming.source_bucket))]
    pub async fn sort(&self, incoming: &IncomingObject) -> Result<RelocationOutcome> {
        // Step 1: verify the source object is really there
        let source_present = self
            .store
            .exists(
                &incoming.source_bucket,
                &incoming.key,
                incoming.fingerprint.as_deref(),
            )
            .await?;
        if !source_present {
            if self.dry_run {
                warn!("Source object missing; dry run proceeds optimistically");
            } else {
                return Err(SorterError::SourceMissing {
                    bucket: incoming.source_bucket.clone(),
                    key: incoming.key.clone(),
                });
            }
        }

        // Fingerprint for the confirm step: the trigger's etag when present,
        // otherwise read from the source before it can be deleted.
        let fingerprint = match &incoming.fingerprint {
            Some(fp) => Some(fp.clone()),
            None => match self
                .store
                .fingerprint(&incoming.source_bucket, &incoming.key)
                .await
            {
                Ok(fp) => fp,
                Err(e) => {
                    warn!(
                        "Could not read source fingerprint; confirming by existence only: {}",
                        e
                    );
                    None
                }
            },
        };

        // Step 2: classify and plan the move
        let file = parser::parse_science_filename(&incoming.key)?;
        let mut plan = RelocationPlan {
            source_bucket: incoming.source_bucket.clone(),
            source_key: incoming.key.clone(),
            destination_bucket: routing::destination_bucket(&file, self.environment)?,
            destination_key: basename(&incoming.key).to_string(),
        };

        // Step 3: destination collision check. A taken key diverts the file
        // to the holding bucket under a timestamp-suffixed key.
        let taken_key = plan.destination_key.clone();
        let collided = self
            .store
            .exists(&plan.destination_bucket, &plan.destination_key, None)
            .await?;
        if collided {
            plan.destination_key = collision_key(&taken_key, Utc::now());
            plan.destination_bucket = routing::holding_bucket(self.environment);
            info!(
                "Destination key taken; diverting to {}/{}",
                plan.destination_bucket, plan.destination_key
            );
        }

        info!(
            "Copying {} from {} to {}/{}",
            plan.source_key, plan.source_bucket, plan.destination_bucket, plan.destination_key
        );

        if !self.dry_run {
            // Step 4: server-side copy
            self.store
                .copy(
                    &plan.source_bucket,
                    &plan.source_key,
                    &plan.destination_bucket,
                    &plan.destination_key,
                )
                .await
                .map_err(|e| SorterError::CopyFailed {
                    bucket: plan.destination_bucket.clone(),
                    key: plan.destination_key.clone(),
                    cause: e.to_string(),
                })?;

            // Step 5: never delete the source until the copy is confirmed
            let confirmed = self
                .store
                .exists(
                    &plan.destination_bucket,
                    &plan.destination_key,
                    fingerprint.as_deref(),
                )
                .await
                .unwrap_or(false);
            if !confirmed {
                counter!("sorter_copies_unconfirmed_total").increment(1);
                return Err(SorterError::CopyUnconfirmed {
                    bucket: plan.destination_bucket.clone(),
                    key: plan.destination_key.clone(),
                });
            }

            // Step 6: remove the original source key. The copy already
            // succeeded, so a failure here leaves the file in two places
            // and is surfaced rather than swallowed.
            if let Err(e) = self
                .store
                .delete(&plan.source_bucket, &plan.source_key)
                .await
            {
                counter!("sorter_cleanup_failures_total").increment(1);
                return Err(SorterError::PartialCleanupFailure {
                    bucket: plan.source_bucket.clone(),
                    key: plan.source_key.clone(),
                    cause: e.to_string(),
                });
            }
        }

        let outcome = if collided {
            RelocationOutcome::MovedToHolding {
                plan,
                original_key: taken_key,
            }
        } else {
            RelocationOutcome::Moved(plan)
        };

        counter!("sorter_files_moved_total", "outcome" => outcome.label()).increment(1);
        info!(
            "File {} successfully moved to {}",
            outcome.plan().source_key,
            outcome.plan().destination_bucket
        );

        // Step 7: best-effort reporting, isolated from the transfer result
        self.report(&outcome).await;

        Ok(outcome)
    }

    async fn report(&self, outcome: &RelocationOutcome) {
        let plan = outcome.plan();

        if let Some(notifier) = &self.notifier {
            let message = match outcome {
                RelocationOutcome::Moved(_) => format!(
                    "File ({}) Successfully Sorted to {}",
                    plan.source_key, plan.destination_bucket
                ),
                RelocationOutcome::MovedToHolding { original_key, .. } => format!(
                    "File ({}) collided with existing {} and was moved to {}/{}",
                    plan.source_key, original_key, plan.destination_bucket, plan.destination_key
                ),
            };
            if let Err(e) = notifier.send(&message).await {
                warn!("Notification delivery failed: {}", e);
            }
        }

        if let Some(audit) = &self.audit {
            let entry = AuditEntry::new(
                &plan.source_bucket,
                &plan.source_key,
                &plan.destination_bucket,
                &plan.destination_key,
                self.environment.as_str(),
                outcome.label(),
            );
            if let Err(e) = audit.append(&entry).await {
                warn!("Audit append failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    const L0_KEY: &str = "hermes_SPANI_l0_2023040-000018_v01.bin";

    fn sorter(store: Arc<InMemoryStore>) -> FileSorter {
        FileSorter::new(store, Environment::Production)
    }

    fn incoming(bucket: &str, key: &str) -> IncomingObject {
        IncomingObject {
            source_bucket: bucket.to_string(),
            key: key.to_string(),
            fingerprint: None,
        }
    }

    #[test]
    fn collision_key_appends_minute_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 33).unwrap();
        assert_eq!(
            collision_key(L0_KEY, at),
            "hermes_SPANI_l0_2023040-000018_v01.bin_2024-01-01-1200Z"
        );
    }

    #[tokio::test]
    async fn moves_a_file_to_its_instrument_bucket() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");

        let outcome = sorter(store.clone()).sort(&incoming("staging", L0_KEY)).await.unwrap();

        assert!(matches!(outcome, RelocationOutcome::Moved(_)));
        assert_eq!(outcome.plan().destination_bucket, "hermes-spani");
        assert_eq!(outcome.plan().destination_key, L0_KEY);
        assert!(store.contains("hermes-spani", L0_KEY));
        assert!(!store.contains("staging", L0_KEY));
    }

    #[tokio::test]
    async fn strips_staging_prefix_from_destination_key() {
        let store = Arc::new(InMemoryStore::new());
        let key = format!("staging/{L0_KEY}");
        store.put("incoming", &key, b"payload");

        let outcome = sorter(store.clone()).sort(&incoming("incoming", &key)).await.unwrap();

        assert_eq!(outcome.plan().destination_key, L0_KEY);
        assert!(store.contains("hermes-spani", L0_KEY));
        assert!(!store.contains("incoming", &key));
    }

    #[tokio::test]
    async fn collision_diverts_to_holding_with_suffixed_key() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"new payload");
        store.put("hermes-spani", L0_KEY, b"old payload");

        let outcome = sorter(store.clone()).sort(&incoming("staging", L0_KEY)).await.unwrap();

        let RelocationOutcome::MovedToHolding { plan, original_key } = &outcome else {
            panic!("expected MovedToHolding, got {outcome:?}");
        };
        assert_eq!(original_key, L0_KEY);
        assert_eq!(plan.destination_bucket, "swsoc-unsorted");
        assert!(plan.destination_key.starts_with(&format!("{L0_KEY}_")));
        assert!(plan.destination_key.ends_with('Z'));

        // the pre-existing destination object is untouched
        assert!(store.contains("hermes-spani", L0_KEY));
        // the ORIGINAL source key was removed, not the suffixed one
        assert!(!store.contains("staging", L0_KEY));
        assert!(store.contains("swsoc-unsorted", &plan.destination_key));
    }

    #[tokio::test]
    async fn missing_source_fails_without_any_mutation() {
        let store = Arc::new(InMemoryStore::new());

        let err = sorter(store.clone()).sort(&incoming("staging", L0_KEY)).await.unwrap_err();

        assert!(matches!(err, SorterError::SourceMissing { .. }));
        assert_eq!(store.copy_call_count(), 0);
        assert_eq!(store.delete_call_count(), 0);
    }

    #[tokio::test]
    async fn fingerprint_mismatch_counts_as_missing_source() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");

        let mut obj = incoming("staging", L0_KEY);
        obj.fingerprint = Some("deadbeef".to_string());
        let err = sorter(store.clone()).sort(&obj).await.unwrap_err();

        assert!(matches!(err, SorterError::SourceMissing { .. }));
        assert_eq!(store.copy_call_count(), 0);
    }

    #[tokio::test]
    async fn unparsable_key_fails_before_any_copy() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", "test-file-key.txt", b"payload");

        let err = sorter(store.clone())
            .sort(&incoming("staging", "test-file-key.txt"))
            .await
            .unwrap_err();

        assert!(matches!(err, SorterError::UnparsableKey { .. }));
        assert_eq!(store.copy_call_count(), 0);
        assert_eq!(store.delete_call_count(), 0);
        assert!(store.contains("staging", "test-file-key.txt"));
    }

    #[tokio::test]
    async fn fingerprint_read_failure_degrades_to_existence_confirm() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");
        store.set_fail_fingerprint(true);

        let outcome = sorter(store.clone()).sort(&incoming("staging", L0_KEY)).await.unwrap();

        assert!(matches!(outcome, RelocationOutcome::Moved(_)));
        assert!(store.contains("hermes-spani", L0_KEY));
        assert!(!store.contains("staging", L0_KEY));
    }

    #[tokio::test]
    async fn copy_failure_leaves_source_untouched() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");
        store.set_fail_copy(true);

        let err = sorter(store.clone()).sort(&incoming("staging", L0_KEY)).await.unwrap_err();

        assert!(matches!(err, SorterError::CopyFailed { .. }));
        assert!(store.contains("staging", L0_KEY));
        assert_eq!(store.delete_call_count(), 0);
    }

    #[tokio::test]
    async fn unconfirmed_copy_retains_the_source() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");
        store.set_drop_copies(true);

        let err = sorter(store.clone()).sort(&incoming("staging", L0_KEY)).await.unwrap_err();

        assert!(matches!(err, SorterError::CopyUnconfirmed { .. }));
        assert!(store.contains("staging", L0_KEY));
        assert_eq!(store.delete_call_count(), 0);
    }

    #[tokio::test]
    async fn delete_failure_after_confirmed_copy_is_partial_cleanup() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");
        store.set_fail_delete(true);

        let err = sorter(store.clone()).sort(&incoming("staging", L0_KEY)).await.unwrap_err();

        assert!(matches!(err, SorterError::PartialCleanupFailure { .. }));
        // the file now exists in both places, surfaced rather than swallowed
        assert!(store.contains("staging", L0_KEY));
        assert!(store.contains("hermes-spani", L0_KEY));
    }

    #[tokio::test]
    async fn dry_run_issues_no_mutations_but_reports_moved() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");

        let outcome = sorter(store.clone())
            .with_dry_run(true)
            .sort(&incoming("staging", L0_KEY))
            .await
            .unwrap();

        assert!(matches!(outcome, RelocationOutcome::Moved(_)));
        assert_eq!(store.copy_call_count(), 0);
        assert_eq!(store.delete_call_count(), 0);
        assert!(store.contains("staging", L0_KEY));
    }

    #[tokio::test]
    async fn dry_run_proceeds_past_a_missing_source() {
        let store = Arc::new(InMemoryStore::new());

        let outcome = sorter(store.clone())
            .with_dry_run(true)
            .sort(&incoming("staging", L0_KEY))
            .await
            .unwrap();

        assert!(matches!(outcome, RelocationOutcome::Moved(_)));
        assert_eq!(store.copy_call_count(), 0);
        assert_eq!(store.delete_call_count(), 0);
    }

    #[tokio::test]
    async fn development_environment_prefixes_destination() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");

        let outcome = FileSorter::new(store.clone(), Environment::Development)
            .sort(&incoming("staging", L0_KEY))
            .await
            .unwrap();

        assert_eq!(outcome.plan().destination_bucket, "dev-hermes-spani");
        assert!(store.contains("dev-hermes-spani", L0_KEY));
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _message: &str) -> crate::error::Result<()> {
            Err(SorterError::Notification("channel unreachable".to_string()))
        }
    }

    struct FailingAudit;

    #[async_trait]
    impl AuditSink for FailingAudit {
        async fn append(&self, _entry: &AuditEntry) -> crate::error::Result<()> {
            Err(SorterError::Audit("sink unavailable".to_string()))
        }
    }

    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &str) -> crate::error::Result<()> {
            self.messages.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn reporter_failures_do_not_change_the_outcome() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");

        let outcome = sorter(store.clone())
            .with_notifier(Arc::new(FailingNotifier))
            .with_audit(Arc::new(FailingAudit))
            .sort(&incoming("staging", L0_KEY))
            .await
            .unwrap();

        assert!(matches!(outcome, RelocationOutcome::Moved(_)));
        assert!(store.contains("hermes-spani", L0_KEY));
        assert!(!store.contains("staging", L0_KEY));
    }

    #[tokio::test]
    async fn successful_move_sends_a_notification() {
        let store = Arc::new(InMemoryStore::new());
        store.put("staging", L0_KEY, b"payload");
        let notifier = Arc::new(RecordingNotifier {
            messages: Mutex::new(Vec::new()),
        });

        sorter(store)
            .with_notifier(notifier.clone())
            .sort(&incoming("staging", L0_KEY))
            .await
            .unwrap();

        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains(L0_KEY));
        assert!(messages[0].contains("hermes-spani"));
    }
}
