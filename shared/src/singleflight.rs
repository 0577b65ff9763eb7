//! Single-flight memoization of an async producer.
//!
//! Wraps a value that is expensive to produce (a batched secret fetch, a
//! third-party client handshake) and is computed at most once per process
//! lifetime. Concurrent callers share one producer run; a failed run commits
//! nothing, so the next caller retries.

use parking_lot::RwLock;
use tokio::sync::Mutex;

/// Lazily initialized value with at-most-once-concurrent initialization.
///
/// There is no eviction, TTL, or invalidation: once a value is committed it
/// is served (cloned) for the lifetime of the instance.
pub struct SingleFlight<T> {
    value: RwLock<Option<T>>,
    // Serializes producer runs. Held only while producing, never on the
    // cached fast path.
    guard: Mutex<()>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        SingleFlight {
            value: RwLock::new(None),
            guard: Mutex::new(()),
        }
    }

    /// Returns the committed value, running `producer` to create it if no
    /// value has been committed yet.
    ///
    /// Callers that arrive while a producer run is in flight queue on the
    /// internal lock and re-check after acquiring it, so a successful run is
    /// observed by every waiter without a second producer invocation. An
    /// `Err` from the producer commits nothing; it propagates to the caller
    /// that ran the producer, and the next caller starts a fresh run. No
    /// backoff and no retry cap: retries are driven entirely by demand.
    pub async fn get_or_try_init<F, Fut, E>(&self, producer: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let cached = self.value.read().clone();
            if let Some(value) = cached {
                return Ok(value);
            }
        }

        let _guard = self.guard.lock().await;

        // Re-check: another caller may have committed while we waited.
        {
            let cached = self.value.read().clone();
            if let Some(value) = cached {
                return Ok(value);
            }
        }

        let value = producer().await?;
        *self.value.write() = Some(value.clone());
        Ok(value)
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, sleep};

    #[tokio::test]
    async fn test_concurrent_callers_share_one_producer_run() {
        let cache = Arc::new(SingleFlight::<u64>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_init(|| async {
                        runs.fetch_add(1, Ordering::SeqCst);
                        // Keep the producer in flight long enough for every
                        // task to arrive while it runs.
                        sleep(Duration::from_millis(20)).await;
                        Ok::<_, ()>(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_value_skips_producer() {
        let cache = SingleFlight::<String>::new();

        let first: Result<_, ()> = cache.get_or_try_init(|| async { Ok("a".to_string()) }).await;
        assert_eq!(first.unwrap(), "a");

        // A second producer never runs once a value is committed.
        let second: Result<_, ()> = cache
            .get_or_try_init(|| async { panic!("producer re-ran for a committed value") })
            .await;
        assert_eq!(second.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_failure_is_not_committed() {
        let cache = SingleFlight::<u64>::new();
        let runs = AtomicUsize::new(0);

        let first = cache
            .get_or_try_init(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Err::<u64, _>("store unavailable")
            })
            .await;
        assert_eq!(first, Err("store unavailable"));

        // The failed run committed nothing; demand retries the producer.
        let second = cache
            .get_or_try_init(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(7)
            })
            .await;
        assert_eq!(second, Ok(7));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
