//! Inference Engine Pool
//!
//! A fixed set of engine instances guarded by a fair semaphore. Each permit
//! corresponds to one free slot, so a caller holding a permit is guaranteed a
//! slot index from the free list and no slot is ever handed out twice.
//!
//! Waiters are served in FIFO order (tokio's semaphore queue is fair). The
//! engine call itself runs on the blocking thread pool and the slot guard
//! travels with it, so a slot only returns to the pool once the model call
//! has really finished, whatever happens to the awaiting request.

use crate::engine::InferenceEngine;
use crate::error::PoolError;
use crate::metrics::{Timer, INFERENCE_LATENCY, POOL_SLOTS_IN_USE, POOL_WAIT};
use crate::staging::StagedImage;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

struct PoolInner<E> {
    slots: Vec<Arc<Mutex<E>>>,
    free: Mutex<VecDeque<usize>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Option<Duration>,
}

/// Bounded pool of reusable inference engines
pub struct EnginePool<E> {
    inner: Arc<PoolInner<E>>,
}

impl<E> Clone for EnginePool<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: usize,
    pub in_use: usize,
    pub available: usize,
}

impl<E: InferenceEngine> EnginePool<E> {
    /// Build a pool around already constructed engines.
    ///
    /// `acquire_timeout` of `None` makes callers wait for as long as it takes.
    pub fn new(engines: Vec<E>, acquire_timeout: Option<Duration>) -> Result<Self, PoolError> {
        if engines.is_empty() {
            return Err(PoolError::EmptyPool);
        }

        let size = engines.len();
        let slots = engines.into_iter().map(|e| Arc::new(Mutex::new(e))).collect();

        info!(size, timeout = ?acquire_timeout, "🧠 Engine pool ready");
        Ok(Self {
            inner: Arc::new(PoolInner {
                slots,
                free: Mutex::new((0..size).collect()),
                permits: Arc::new(Semaphore::new(size)),
                acquire_timeout,
            }),
        })
    }

    /// Construct `size` engines up front. The first construction failure aborts the pool.
    pub fn from_factory<F>(
        size: usize,
        acquire_timeout: Option<Duration>,
        mut factory: F,
    ) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> anyhow::Result<E>,
    {
        if size == 0 {
            return Err(PoolError::EmptyPool);
        }

        let mut engines = Vec::with_capacity(size);
        for slot in 0..size {
            let engine = factory(slot).map_err(|source| PoolError::Construction { slot, source })?;
            debug!(slot, "Engine constructed");
            engines.push(engine);
        }

        Self::new(engines, acquire_timeout)
    }

    pub fn size(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn stats(&self) -> PoolStats {
        let size = self.size();
        let available = self.inner.permits.available_permits();
        PoolStats {
            size,
            in_use: size.saturating_sub(available),
            available,
        }
    }

    /// Run the model against a staged upload
    pub async fn predict(&self, image: &StagedImage) -> Result<Vec<f32>, PoolError> {
        self.predict_path(image.path()).await
    }

    /// Run the model against an image file on one free slot
    pub async fn predict_path(&self, image_path: &Path) -> Result<Vec<f32>, PoolError> {
        let guard = self.acquire().await?;
        let slot = guard.slot();
        let engine = self.inner.slots[slot].clone();
        let path = image_path.to_path_buf();

        let timer = Timer::new();
        let joined = tokio::task::spawn_blocking(move || {
            // Released when the engine call returns, not when the caller stops waiting
            let _guard = guard;
            let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
            engine.predict(&path)
        })
        .await;
        timer.observe_duration_seconds(&INFERENCE_LATENCY);

        match joined {
            Ok(Ok(scores)) => {
                debug!(slot, elapsed_ms = timer.elapsed_ms() as u64, "Prediction finished");
                Ok(scores)
            }
            Ok(Err(source)) => {
                warn!(slot, error = %source, "Prediction failed");
                Err(PoolError::Inference { slot, source })
            }
            Err(join_err) => {
                error!(slot, error = %join_err, "Engine task aborted");
                Err(PoolError::Inference {
                    slot,
                    source: anyhow::anyhow!("engine task aborted: {}", join_err),
                })
            }
        }
    }

    /// Wait for a free slot, honouring the optional acquisition timeout
    pub(crate) async fn acquire(&self) -> Result<SlotGuard<E>, PoolError> {
        let timer = Timer::new();
        let acquire = self.inner.permits.clone().acquire_owned();

        let permit = match self.inner.acquire_timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire).await.map_err(|_| {
                PoolError::Exhausted {
                    timeout_ms: timeout.as_millis() as u64,
                }
            })?,
            None => acquire.await,
        }
        .map_err(|_| PoolError::Closed)?;

        let slot = {
            let mut free = self.inner.free.lock().unwrap_or_else(PoisonError::into_inner);
            free.pop_front()
        };
        let Some(slot) = slot else {
            // A permit without a free slot means the accounting is broken
            error!("Engine pool granted a permit with no free slot");
            return Err(PoolError::Closed);
        };

        timer.observe_duration_seconds(&POOL_WAIT);
        POOL_SLOTS_IN_USE.inc();
        debug!(slot, waited_ms = timer.elapsed_ms() as u64, "Engine slot acquired");

        Ok(SlotGuard {
            pool: self.inner.clone(),
            slot,
            _permit: permit,
        })
    }
}

/// RAII guard that returns the slot to the free list on drop
pub(crate) struct SlotGuard<E> {
    pool: Arc<PoolInner<E>>,
    slot: usize,
    // Dropped after `drop` below has pushed the slot back
    _permit: OwnedSemaphorePermit,
}

impl<E> SlotGuard<E> {
    pub(crate) fn slot(&self) -> usize {
        self.slot
    }
}

impl<E> Drop for SlotGuard<E> {
    fn drop(&mut self) {
        self.pool
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(self.slot);
        POOL_SLOTS_IN_USE.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records which image each call saw, then sleeps
    struct RecordingEngine {
        calls: Arc<Mutex<Vec<PathBuf>>>,
        delay: Duration,
    }

    impl InferenceEngine for RecordingEngine {
        fn predict(&mut self, image_path: &Path) -> anyhow::Result<Vec<f32>> {
            self.calls.lock().unwrap().push(image_path.to_path_buf());
            std::thread::sleep(self.delay);
            Ok(vec![1.0, 0.0])
        }
    }

    fn recording_pool(size: usize, delay: Duration) -> (EnginePool<RecordingEngine>, Arc<Mutex<Vec<PathBuf>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let engines = (0..size)
            .map(|_| RecordingEngine {
                calls: calls.clone(),
                delay,
            })
            .collect();
        (EnginePool::new(engines, None).unwrap(), calls)
    }

    #[test]
    fn test_empty_pool_rejected() {
        let engines: Vec<RecordingEngine> = Vec::new();
        assert!(matches!(EnginePool::new(engines, None), Err(PoolError::EmptyPool)));
    }

    #[test]
    fn test_factory_failure_is_fatal() {
        let built = AtomicUsize::new(0);
        let result = EnginePool::<RecordingEngine>::from_factory(3, None, |slot| {
            if slot == 1 {
                anyhow::bail!("model file missing");
            }
            built.fetch_add(1, Ordering::SeqCst);
            Ok(RecordingEngine {
                calls: Arc::new(Mutex::new(Vec::new())),
                delay: Duration::ZERO,
            })
        });

        assert!(matches!(result, Err(PoolError::Construction { slot: 1, .. })));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guards_hand_out_distinct_slots() {
        let (pool, _) = recording_pool(3, Duration::ZERO);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let c = pool.acquire().await.unwrap();
        let mut slots = vec![a.slot(), b.slot(), c.slot()];
        slots.sort();
        assert_eq!(slots, vec![0, 1, 2]);
        assert_eq!(pool.stats().in_use, 3);

        drop(b);
        assert_eq!(pool.stats().available, 1);
        let d = pool.acquire().await.unwrap();
        assert!(d.slot() < 3);
        assert_ne!(d.slot(), a.slot());
        assert_ne!(d.slot(), c.slot());
    }

    #[tokio::test]
    async fn test_acquire_timeout_reports_exhausted() {
        let engines = vec![RecordingEngine {
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }];
        let pool = EnginePool::new(engines, Some(Duration::from_millis(20))).unwrap();

        let held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, PoolError::Exhausted { timeout_ms: 20 }));

        drop(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_are_served_in_fifo_order() {
        let (pool, calls) = recording_pool(1, Duration::from_millis(30));

        let mut handles = Vec::new();
        for i in 0..5 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.predict_path(Path::new(&format!("img-{}", i))).await
            }));
            // Give each task time to enqueue before the next one
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let order: Vec<String> = calls
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        assert_eq!(order, vec!["img-0", "img-1", "img-2", "img-3", "img-4"]);
        assert_eq!(pool.stats().available, 1);
    }
}
