use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Cached forecast plus the instant it was computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheEntry {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Whether a lookup was served from the slot or freshly computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
}

#[derive(Debug)]
struct Slot<E> {
    entry: Option<CacheEntry>,
    /// Error of the most recent attempt, tagged with its attempt number.
    last_failure: Option<(u64, E)>,
}

/// Single process-wide forecast slot with a TTL.
///
/// The slot lock is held while the value is computed, so concurrent misses
/// collapse into one computation and the waiters read its result. A caller
/// that queued behind a failed attempt gets that attempt's error instead of
/// running the compute again.
#[derive(Debug)]
pub struct PredictionCache<E> {
    slot: Mutex<Slot<E>>,
    attempts: AtomicU64,
    ttl: Duration,
}

impl<E: Clone> PredictionCache<E> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(Slot {
                entry: None,
                last_failure: None,
            }),
            attempts: AtomicU64::new(0),
            ttl,
        }
    }

    /// Returns the cached value while `now - entry.timestamp < ttl`,
    /// otherwise runs `compute` and stores `{now, value}`.
    /// A failed compute leaves the entry untouched.
    pub async fn get_or_compute<F, Fut>(
        &self,
        now: DateTime<Utc>,
        compute: F,
    ) -> Result<(f64, CacheOutcome), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<f64, E>>,
    {
        let seen = self.attempts.load(Ordering::Acquire);
        let mut slot = self.slot.lock().await;

        if let Some(entry) = slot.entry.as_ref() {
            if now - entry.timestamp < self.ttl {
                return Ok((entry.value, CacheOutcome::Hit));
            }
        }
        if let Some((attempt, error)) = slot.last_failure.as_ref() {
            if *attempt > seen {
                return Err(error.clone());
            }
        }

        let result = compute().await;
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        match result {
            Ok(value) => {
                slot.entry = Some(CacheEntry {
                    timestamp: now,
                    value,
                });
                slot.last_failure = None;
                Ok((value, CacheOutcome::Miss))
            }
            Err(error) => {
                slot.last_failure = Some((attempt, error.clone()));
                Err(error)
            }
        }
    }

    #[cfg(test)]
    pub async fn peek(&self) -> Option<CacheEntry> {
        self.slot.lock().await.entry
    }

    pub async fn invalidate(&self) {
        let mut slot = self.slot.lock().await;
        slot.entry = None;
        slot.last_failure = None;
    }
}

#[cfg(test)]
impl<E: Clone> Default for PredictionCache<E> {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}
