// cache_utils.rs
use crate::encode_utils::{build_context, EncodingContext};
use crate::flatten_utils::{FlatRecord, FlattenReport};
use chrono::{DateTime, Duration, Utc};

/// One immutable snapshot of the reference population together with the encoding
/// context derived from it. The two are constructed in the same step and only ever
/// replaced together, so a stale context can never be paired with fresh records.
#[derive(Debug, Clone)]
pub struct PopulationSnapshot {
    pub records: Vec<FlatRecord>,
    pub context: EncodingContext,
    pub fingerprint: String,
    pub refreshed_at: DateTime<Utc>,
    pub rejected_count: usize,
}

impl PopulationSnapshot {
    /// Builds a snapshot from a flatten report: derives the context from exactly the
    /// accepted records and stamps the pair with the population fingerprint.
    pub fn build(report: FlattenReport, fingerprint: &str) -> Self {
        let context = build_context(&report.records);
        PopulationSnapshot {
            records: report.records,
            context,
            fingerprint: fingerprint.to_string(),
            refreshed_at: Utc::now(),
            rejected_count: report.rejected.len(),
        }
    }
}

/// Fingerprint of a population as observed at the store: document count plus the
/// latest term code. Cheap to recompute on every render pass, and any ingest that
/// changes either invalidates the cached snapshot.
pub fn population_fingerprint(document_count: u64, latest_period: Option<&str>) -> String {
    format!("{}:{}", document_count, latest_period.unwrap_or(""))
}

/// Holds at most one [`PopulationSnapshot`] with a bounded time-to-live. Explicit and
/// caller-owned; replacement is whole-snapshot, never field-by-field.
#[derive(Debug)]
pub struct SnapshotCache {
    ttl_minutes: i64,
    current: Option<PopulationSnapshot>,
}

impl SnapshotCache {
    pub fn new(ttl_minutes: i64) -> Self {
        SnapshotCache {
            ttl_minutes,
            current: None,
        }
    }

    /// Returns the cached snapshot only if it matches the observed fingerprint and
    /// has not outlived its TTL.
    pub fn fresh(&self, fingerprint: &str) -> Option<&PopulationSnapshot> {
        let snapshot = self.current.as_ref()?;
        if snapshot.fingerprint != fingerprint {
            return None;
        }
        let age = Utc::now() - snapshot.refreshed_at;
        if age >= Duration::minutes(self.ttl_minutes) {
            return None;
        }
        Some(snapshot)
    }

    /// The cached snapshot regardless of freshness, for degraded rendering when the
    /// store is unreachable.
    pub fn current(&self) -> Option<&PopulationSnapshot> {
        self.current.as_ref()
    }

    pub fn replace(&mut self, snapshot: PopulationSnapshot) {
        self.current = Some(snapshot);
    }

    pub fn invalidate(&mut self) {
        self.current = None;
    }
}
