//! Initialize-once model holder
//!
//! Each service owns exactly one model instance for the lifetime of the
//! process: created on first use, reused for every subsequent request, never
//! torn down. `OnceCell::get_or_try_init` serializes concurrent first-time
//! initialization so only one underlying load happens, and a failed load is
//! not cached — the next caller retries.

use once_cell::sync::OnceCell;
use std::sync::Mutex;
use tracing::debug;

/// A lazily-initialized, process-lifetime model singleton
///
/// The inner `Mutex` is required because ONNX Runtime sessions take `&mut`
/// for inference; it also gives one-inference-at-a-time semantics per model.
pub struct LazyModel<T> {
    cell: OnceCell<Mutex<T>>,
}

impl<T> LazyModel<T> {
    /// Create an empty holder (no model loaded yet)
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Get the cached model, loading it with `load` on first access
    ///
    /// # Errors
    /// Propagates the loader's error; the holder stays empty on failure.
    pub fn get_or_try_load<E>(
        &self,
        load: impl FnOnce() -> Result<T, E>,
    ) -> Result<&Mutex<T>, E> {
        self.cell.get_or_try_init(|| {
            debug!("Loading model (first access)");
            load().map(Mutex::new)
        })
    }

    /// Whether the model has been loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T> Default for LazyModel<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_loads_once_and_returns_same_instance() {
        let holder: LazyModel<u32> = LazyModel::new();
        let loads = AtomicUsize::new(0);

        let first = holder
            .get_or_try_load(|| -> Result<u32, ()> {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .unwrap();
        let second = holder
            .get_or_try_load(|| -> Result<u32, ()> {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .unwrap();

        assert!(std::ptr::eq(first, second), "both accessors must return the same instance");
        assert_eq!(loads.load(Ordering::SeqCst), 1, "loader must run at most once");
        assert_eq!(*second.lock().unwrap(), 42);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let holder: LazyModel<u32> = LazyModel::new();

        let err = holder.get_or_try_load(|| Err::<u32, &str>("load failed"));
        assert!(err.is_err());
        assert!(!holder.is_loaded());

        // Next access retries and can succeed
        let ok = holder.get_or_try_load(|| Ok::<u32, &str>(9));
        assert!(ok.is_ok());
        assert!(holder.is_loaded());
    }

    #[test]
    fn test_concurrent_first_access_loads_once() {
        use std::sync::Arc;

        let holder: Arc<LazyModel<u32>> = Arc::new(LazyModel::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let holder = Arc::clone(&holder);
                let loads = Arc::clone(&loads);
                std::thread::spawn(move || {
                    let model = holder
                        .get_or_try_load(|| -> Result<u32, ()> {
                            loads.fetch_add(1, Ordering::SeqCst);
                            // Widen the race window a little
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            Ok(1)
                        })
                        .unwrap();
                    *model.lock().unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
