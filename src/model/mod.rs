pub mod checkpoint;
pub mod network;

use std::{path::PathBuf, sync::Arc};

use log::info;
use ndarray::{Array3, Array4};
use parking_lot::Mutex;

use crate::{
    error::{ForensicsError, Result},
    model::network::{ArchitectureConfig, CompactCnn},
};

/// Logit index of the "fake" class.
pub const FAKE_INDEX: usize = 0;
/// Logit index of the "real" class.
pub const REAL_INDEX: usize = 1;

/// Forward pass context needed for a class activation map: the last
/// convolutional stage's activations `[C, H, W]` and the gradient of the
/// target logit with respect to them.
#[derive(Debug, Clone)]
pub struct ActivationTrace {
    pub logits: [f32; 2],
    pub activations: Array3<f32>,
    pub gradients: Array3<f32>,
}

/// A loaded two-class image classifier, shared read-only between requests.
pub trait Classifier: Send + Sync {
    /// Raw scores for a `[1, 3, H, W]` normalized tensor, indexed by
    /// [`FAKE_INDEX`] and [`REAL_INDEX`].
    fn logits(&self, input: &Array4<f32>) -> Result<[f32; 2]>;

    fn trace(&self, input: &Array4<f32>, class: usize) -> Result<ActivationTrace> {
        let _ = (input, class);
        Err(ForensicsError::Inference("activation tracing is not supported by this classifier".into()))
    }
}

/// Runtimes whose inference call needs exclusive access.
pub trait ExclusiveInference: Send {
    fn logits(&mut self, input: &Array4<f32>) -> Result<[f32; 2]>;

    fn trace(&mut self, input: &Array4<f32>, class: usize) -> Result<ActivationTrace> {
        let _ = (input, class);
        Err(ForensicsError::Inference("activation tracing is not supported by this runtime".into()))
    }
}

/// Serializes calls into an [`ExclusiveInference`] runtime so it can be
/// shared like any other [`Classifier`].
pub struct Serialized<I> {
    inner: Mutex<I>,
}

impl<I: ExclusiveInference> Serialized<I> {
    pub fn new(runtime: I) -> Self {
        Self { inner: Mutex::new(runtime) }
    }
}

impl<I: ExclusiveInference> Classifier for Serialized<I> {
    fn logits(&self, input: &Array4<f32>) -> Result<[f32; 2]> {
        self.inner.lock().logits(input)
    }

    fn trace(&self, input: &Array4<f32>, class: usize) -> Result<ActivationTrace> {
        self.inner.lock().trace(input, class)
    }
}

type Loader = Box<dyn Fn() -> Result<Arc<dyn Classifier>> + Send + Sync>;

/// Loads the classifier on first use. Concurrent first callers block on the
/// same load instead of loading twice. A failed load is not cached.
pub struct LazyClassifier {
    loader: Loader,
    slot: Mutex<Option<Arc<dyn Classifier>>>,
}

impl LazyClassifier {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Classifier>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            slot: Mutex::new(None),
        }
    }

    pub fn from_checkpoint(path: impl Into<PathBuf>, arch: ArchitectureConfig) -> Self {
        let path = path.into();
        Self::new(move || {
            let (model, _) = CompactCnn::load(&path, arch.clone())?;
            Ok(Arc::new(model) as Arc<dyn Classifier>)
        })
    }

    pub fn get(&self) -> Result<Arc<dyn Classifier>> {
        let mut slot = self.slot.lock();

        if let Some(classifier) = slot.as_ref() {
            return Ok(Arc::clone(classifier));
        }

        let classifier = (self.loader)()?;
        info!("Classifier initialized");
        *slot = Some(Arc::clone(&classifier));
        Ok(classifier)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: usize,
    }

    impl ExclusiveInference for Counting {
        fn logits(&mut self, _input: &Array4<f32>) -> Result<[f32; 2]> {
            self.calls += 1;
            Ok([0.0, self.calls as f32])
        }
    }

    struct Fixed;

    impl Classifier for Fixed {
        fn logits(&self, _input: &Array4<f32>) -> Result<[f32; 2]> {
            Ok([1.0, 2.0])
        }
    }

    #[test]
    fn test_serialized_runtime_sees_every_call() {
        let shared = Arc::new(Serialized::new(Counting { calls: 0 }));
        let input = Array4::zeros((1, 3, 2, 2));

        std::thread::scope(|s| {
            for _ in 0..8 {
                let shared = Arc::clone(&shared);
                let input = &input;
                s.spawn(move || {
                    for _ in 0..10 {
                        shared.logits(input).unwrap();
                    }
                });
            }
        });

        assert_eq!(shared.logits(&input).unwrap(), [0.0, 81.0]);
    }

    #[test]
    fn test_default_trace_is_unsupported() {
        let input = Array4::zeros((1, 3, 2, 2));
        assert!(Fixed.trace(&input, REAL_INDEX).is_err());
    }

    #[test]
    fn test_lazy_classifier_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let lazy = Arc::new(LazyClassifier::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Fixed) as Arc<dyn Classifier>)
        }));

        assert!(!lazy.is_loaded());

        std::thread::scope(|s| {
            for _ in 0..8 {
                let lazy = Arc::clone(&lazy);
                s.spawn(move || lazy.get().unwrap());
            }
        });

        assert!(lazy.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lazy_classifier_retries_after_failure() {
        let lazy = LazyClassifier::from_checkpoint("/nonexistent/weights.json", ArchitectureConfig::default());

        assert!(lazy.get().is_err());
        assert!(!lazy.is_loaded());
    }
}
