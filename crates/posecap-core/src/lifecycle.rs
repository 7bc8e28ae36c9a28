//! Idempotent model-load lifecycle.
//!
//! The detector's models load once per process. Concurrent first uses must
//! share a single in-flight load, success is memoized for the process
//! lifetime, and a failed load leaves the lifecycle retryable. This replaces
//! the usual mutable "models loaded" flag with an explicit object that tests
//! can create and drop freely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::OnceCell;

use crate::config::DetectorConfig;
use crate::detector::{DetectorError, LandmarkDetector};

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    /// The last load attempt failed; the next call retries.
    Failed,
}

/// Memoized, single-flight loader for a shared resource.
///
/// Generic over the loaded value so tests can drive it with counters instead
/// of real models.
pub struct ModelLifecycle<T> {
    cell: OnceCell<T>,
    loading: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl<T> Default for ModelLifecycle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ModelLifecycle<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            loading: AtomicBool::new(false),
            last_error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LoadState {
        if self.cell.initialized() {
            LoadState::Loaded
        } else if self.loading.load(Ordering::Acquire) {
            LoadState::Loading
        } else if self
            .last_error
            .lock()
            .expect("lifecycle state lock poisoned")
            .is_some()
        {
            LoadState::Failed
        } else {
            LoadState::Unloaded
        }
    }

    /// Message from the most recent failed load, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .expect("lifecycle state lock poisoned")
            .clone()
    }

    /// Return the loaded value, running `load` at most once across all
    /// concurrent callers. A failure is reported to the caller whose load ran
    /// and leaves the cell empty, so a later call retries.
    pub async fn get_or_load<F, Fut, E>(&self, load: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.cell
            .get_or_try_init(|| async {
                self.loading.store(true, Ordering::Release);
                let result = load().await;
                let mut last_error = self
                    .last_error
                    .lock()
                    .expect("lifecycle state lock poisoned");
                *last_error = match &result {
                    Ok(_) => None,
                    Err(e) => Some(e.to_string()),
                };
                drop(last_error);
                self.loading.store(false, Ordering::Release);
                result
            })
            .await
    }
}

/// Shared detector behind an async lock; `detect` needs `&mut`.
pub type SharedDetector = tokio::sync::Mutex<LandmarkDetector>;

/// Lazily-loaded process-wide detector.
///
/// `get` is safe to call from any number of concurrent entry points; the
/// underlying model load runs once.
pub struct DetectorCell {
    config: DetectorConfig,
    lifecycle: ModelLifecycle<SharedDetector>,
}

impl DetectorCell {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            lifecycle: ModelLifecycle::new(),
        }
    }

    pub fn state(&self) -> LoadState {
        self.lifecycle.state()
    }

    pub async fn get(&self) -> Result<&SharedDetector, DetectorError> {
        let config = self.config.clone();
        self.lifecycle
            .get_or_load(|| async move {
                tracing::info!(model_dir = %config.model_dir.display(), "loading detector models");
                LandmarkDetector::load(&config).map(tokio::sync::Mutex::new)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let lifecycle = Arc::new(ModelLifecycle::<u32>::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lifecycle = Arc::clone(&lifecycle);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                lifecycle
                    .get_or_load(|| async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        // Hold the load long enough for every caller to queue.
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok::<u32, DetectorError>(7)
                    })
                    .await
                    .map(|v| *v)
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 7);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), LoadState::Loaded);
    }

    #[tokio::test]
    async fn test_success_is_memoized() {
        let lifecycle = ModelLifecycle::<u32>::new();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = lifecycle
                .get_or_load(|| async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<u32, DetectorError>(42)
                })
                .await
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_retryable_then_sticky_on_success() {
        let lifecycle = ModelLifecycle::<u32>::new();
        assert_eq!(lifecycle.state(), LoadState::Unloaded);

        let err = lifecycle
            .get_or_load(|| async {
                Err::<u32, DetectorError>(DetectorError::ModelNotFound("x.onnx".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
        assert_eq!(lifecycle.state(), LoadState::Failed);
        assert!(lifecycle.last_error().unwrap().contains("x.onnx"));

        let value = lifecycle
            .get_or_load(|| async { Ok::<u32, DetectorError>(9) })
            .await
            .unwrap();
        assert_eq!(*value, 9);
        assert_eq!(lifecycle.state(), LoadState::Loaded);
        assert!(lifecycle.last_error().is_none());
    }

    #[test]
    fn test_fresh_lifecycle_is_unloaded() {
        let lifecycle = ModelLifecycle::<u32>::default();
        assert_eq!(lifecycle.state(), LoadState::Unloaded);
        assert!(lifecycle.last_error().is_none());
    }
}
