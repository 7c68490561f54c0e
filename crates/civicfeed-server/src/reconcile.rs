//! Upsert reconciler.
//!
//! Writes a feed's admitted entries into the store keyed by
//! `(source_key, external_id)` and, once per run, retires imports the feeds
//! stopped confirming.

use chrono::{DateTime, Duration, Utc};
use civicfeed_core::NormalizedEntry;
use civicfeed_feeds::FeedSource;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{EventStore, StoreError, UpsertOutcome};

/// A store write failed partway through a feed.
///
/// Writes before the failure are kept; the rest of the feed is not written.
#[derive(Debug, Error)]
#[error("upsert aborted after {written} writes: {source}")]
pub struct ReconcileError {
    pub written: usize,
    #[source]
    pub source: StoreError,
}

/// Counts from reconciling one feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertSummary {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Upserts `entries` for `source`, stamping each with `seen_at`.
///
/// Entries are written in order; the first store error aborts the feed.
pub async fn upsert_feed(
    store: &dyn EventStore,
    source: &FeedSource,
    entries: &[NormalizedEntry],
    seen_at: DateTime<Utc>,
) -> Result<UpsertSummary, ReconcileError> {
    let mut summary = UpsertSummary::default();

    for entry in entries {
        let outcome = store
            .upsert_import(&source.key, &source.name, entry, seen_at)
            .await
            .map_err(|source| ReconcileError {
                written: summary.written(),
                source,
            })?;

        match outcome {
            UpsertOutcome::Inserted(id) => {
                debug!(%id, external_id = %entry.external_id, "Inserted import");
                summary.inserted += 1;
            }
            UpsertOutcome::Updated(_) => summary.updated += 1,
        }
    }

    Ok(summary)
}

/// Marks imports unseen for longer than `grace_period` as inactive.
///
/// A record last seen exactly `grace_period` ago is kept.
pub async fn expire_stale(
    store: &dyn EventStore,
    now: DateTime<Utc>,
    grace_period: Duration,
) -> Result<usize, StoreError> {
    let cutoff = now - grace_period;
    let expired = store.expire_imports(cutoff).await?;
    if expired > 0 {
        info!(expired, cutoff = %cutoff, "Marked stale imports inactive");
    } else {
        debug!(cutoff = %cutoff, "No stale imports");
    }
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use civicfeed_core::{EventRecord, EventStatus, OrganizerSubmission};
    use civicfeed_feeds::BoxFuture;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 5, 0, 0).unwrap()
    }

    fn source() -> FeedSource {
        FeedSource::new("county", "County Clerk", "https://county.example/cal.ics")
    }

    fn entries() -> Vec<NormalizedEntry> {
        vec![
            NormalizedEntry::new("a", "Budget hearing")
                .with_description("Annual budget")
                .with_place("Dayton", "OH"),
            NormalizedEntry::new("b", "School board").with_start(now() + Duration::days(3)),
        ]
    }

    mod upsert {
        use super::*;

        #[tokio::test]
        async fn second_run_changes_only_last_seen() {
            let store = MemoryStore::new();

            let first = upsert_feed(&store, &source(), &entries(), now()).await.unwrap();
            let before = store.list_events().await.unwrap();

            let later = now() + Duration::hours(6);
            let second = upsert_feed(&store, &source(), &entries(), later).await.unwrap();
            let after = store.list_events().await.unwrap();

            assert_eq!(first, UpsertSummary { inserted: 2, updated: 0 });
            assert_eq!(second, UpsertSummary { inserted: 0, updated: 2 });
            assert_eq!(before.len(), after.len());

            for (old, new) in before.iter().zip(&after) {
                assert!(new.last_seen_at > old.last_seen_at);
                let mut new = new.clone();
                new.last_seen_at = old.last_seen_at;
                assert_eq!(&new, old);
            }
        }

        #[tokio::test]
        async fn leaves_organizer_records_alone() {
            let store = MemoryStore::new();
            let organizer = store
                .insert_event(EventRecord::from_submission(
                    OrganizerSubmission {
                        title: "Neighborhood walk".into(),
                        ..Default::default()
                    },
                    Uuid::new_v4(),
                    None,
                    now(),
                ))
                .await
                .unwrap();

            let colliding = vec![NormalizedEntry::new(organizer.id.to_string(), "Overwrite?")];
            upsert_feed(&store, &source(), &colliding, now()).await.unwrap();

            let stored = store.get_event(organizer.id).await.unwrap().unwrap();
            assert_eq!(stored, organizer);
        }

        /// Store that fails after a fixed number of writes.
        struct FailingStore {
            inner: MemoryStore,
            fail_after: usize,
            calls: std::sync::atomic::AtomicUsize,
        }

        impl EventStore for FailingStore {
            fn upsert_import<'a>(
                &'a self,
                source_key: &'a str,
                source_name: &'a str,
                entry: &'a NormalizedEntry,
                seen_at: DateTime<Utc>,
            ) -> BoxFuture<'a, crate::store::StoreResult<UpsertOutcome>> {
                let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n >= self.fail_after {
                    return Box::pin(async { Err(StoreError::backend("write refused")) });
                }
                self.inner.upsert_import(source_key, source_name, entry, seen_at)
            }

            fn expire_imports(
                &self,
                seen_before: DateTime<Utc>,
            ) -> BoxFuture<'_, crate::store::StoreResult<usize>> {
                self.inner.expire_imports(seen_before)
            }

            fn insert_event(
                &self,
                event: EventRecord,
            ) -> BoxFuture<'_, crate::store::StoreResult<EventRecord>> {
                self.inner.insert_event(event)
            }

            fn get_event(
                &self,
                id: Uuid,
            ) -> BoxFuture<'_, crate::store::StoreResult<Option<EventRecord>>> {
                self.inner.get_event(id)
            }

            fn list_events(&self) -> BoxFuture<'_, crate::store::StoreResult<Vec<EventRecord>>> {
                self.inner.list_events()
            }

            fn transition_event(
                &self,
                id: Uuid,
                from: EventStatus,
                to: EventStatus,
            ) -> BoxFuture<'_, crate::store::StoreResult<EventRecord>> {
                self.inner.transition_event(id, from, to)
            }

            fn insert_report(
                &self,
                report: civicfeed_core::Report,
            ) -> BoxFuture<'_, crate::store::StoreResult<EventRecord>> {
                self.inner.insert_report(report)
            }

            fn list_reports(
                &self,
                event_id: Uuid,
            ) -> BoxFuture<'_, crate::store::StoreResult<Vec<civicfeed_core::Report>>> {
                self.inner.list_reports(event_id)
            }

            fn insert_comment(
                &self,
                comment: civicfeed_core::Comment,
            ) -> BoxFuture<'_, crate::store::StoreResult<civicfeed_core::Comment>> {
                self.inner.insert_comment(comment)
            }

            fn get_comment(
                &self,
                id: Uuid,
            ) -> BoxFuture<'_, crate::store::StoreResult<Option<civicfeed_core::Comment>>> {
                self.inner.get_comment(id)
            }

            fn list_comments(
                &self,
                event_id: Uuid,
            ) -> BoxFuture<'_, crate::store::StoreResult<Vec<civicfeed_core::Comment>>> {
                self.inner.list_comments(event_id)
            }

            fn set_comment_status(
                &self,
                id: Uuid,
                status: civicfeed_core::CommentStatus,
            ) -> BoxFuture<'_, crate::store::StoreResult<civicfeed_core::Comment>> {
                self.inner.set_comment_status(id, status)
            }

            fn delete_comment(
                &self,
                id: Uuid,
            ) -> BoxFuture<'_, crate::store::StoreResult<civicfeed_core::Comment>> {
                self.inner.delete_comment(id)
            }
        }

        #[tokio::test]
        async fn store_error_aborts_remaining_writes() {
            let store = FailingStore {
                inner: MemoryStore::new(),
                fail_after: 1,
                calls: Default::default(),
            };

            let err = upsert_feed(&store, &source(), &entries(), now()).await.unwrap_err();

            assert_eq!(err.written, 1);
            assert_eq!(store.inner.list_events().await.unwrap().len(), 1);
        }
    }

    mod expiry {
        use super::*;

        async fn import_seen(store: &MemoryStore, id: &str, days_ago: i64) -> Uuid {
            let seen = now() - Duration::days(days_ago);
            store
                .upsert_import("county", "County Clerk", &NormalizedEntry::new(id, id), seen)
                .await
                .unwrap()
                .id()
        }

        #[tokio::test]
        async fn grace_period_boundary() {
            let store = MemoryStore::new();
            let old = import_seen(&store, "old", 46).await;
            let recent = import_seen(&store, "recent", 44).await;
            let edge = import_seen(&store, "edge", 45).await;

            let expired = expire_stale(&store, now(), Duration::days(45)).await.unwrap();

            assert_eq!(expired, 1);
            let status = |e: Option<EventRecord>| e.unwrap().status;
            assert_eq!(status(store.get_event(old).await.unwrap()), EventStatus::Inactive);
            assert_eq!(status(store.get_event(recent).await.unwrap()), EventStatus::Active);
            assert_eq!(status(store.get_event(edge).await.unwrap()), EventStatus::Active);
        }

        #[tokio::test]
        async fn sweep_is_idempotent() {
            let store = MemoryStore::new();
            import_seen(&store, "old", 90).await;

            assert_eq!(expire_stale(&store, now(), Duration::days(45)).await.unwrap(), 1);
            let snapshot = store.snapshot().await;
            assert_eq!(expire_stale(&store, now(), Duration::days(45)).await.unwrap(), 0);
            assert_eq!(store.snapshot().await, snapshot);
        }

        #[tokio::test]
        async fn reappearing_import_is_revived() {
            let store = MemoryStore::new();
            let id = import_seen(&store, "back", 60).await;
            expire_stale(&store, now(), Duration::days(45)).await.unwrap();

            upsert_feed(&store, &source(), &[NormalizedEntry::new("back", "back")], now())
                .await
                .unwrap();

            let event = store.get_event(id).await.unwrap().unwrap();
            assert_eq!(event.status, EventStatus::Active);
        }
    }
}
