//! sem-array - Interchangeable numeric backends for the vector index
//!
//! The index logic is written against [`ArrayBackend`], a capability set of
//! array operations. The variant is chosen once, at construction:
//!
//! - [`Baseline`]: host memory only, built on ndarray.
//! - `Accelerated` (feature `accelerated`): parallel kernels, and arrays are
//!   placed on a compute device whenever one is available at call time.
//!
//! # Example
//!
//! ```rust
//! use sem_array::{backend, ArrayBackend};
//! use sem_core::BackendKind;
//!
//! let backend = backend(BackendKind::Baseline).unwrap();
//! let x = backend.tensor(vec![1.0, 2.0, 3.0].into()).unwrap();
//! assert!(backend.all(&x));
//! ```

mod baseline;
mod kernels;
mod tensor;

#[cfg(feature = "accelerated")]
mod accelerated;

use std::collections::BTreeMap;

use tracing::info;

use sem_core::{BackendKind, Result};

pub use baseline::{Baseline, NDARRAY_VERSION};
pub use tensor::{ArrayInput, Device, Tensor};

#[cfg(feature = "accelerated")]
pub use accelerated::{
    Accelerated, DeviceDetector, SystemDetector, DISABLE_ACCELERATOR_ENV, RAYON_VERSION,
};

/// Array operations every backend variant provides.
///
/// Numeric results are identical across variants; only placement differs.
pub trait ArrayBackend: Send + Sync {
    /// Convert a native or foreign array into this backend's tensor.
    fn tensor(&self, array: ArrayInput) -> Result<Tensor>;

    /// True when every element is non-zero.
    fn all(&self, x: &Tensor) -> bool;

    /// Concatenate along the leading axis.
    fn cat(&self, xs: &[Tensor]) -> Result<Tensor>;

    /// Matrix product, matrix-vector product or inner product.
    fn dot(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;

    /// Zero-filled tensor.
    fn zeros(&self, shape: &[usize]) -> Tensor;

    /// `{backend-name: version}` for diagnostics.
    fn settings(&self) -> BTreeMap<String, String>;
}

/// Construct the backend variant for `kind`.
///
/// Fails with `DependencyMissing` when the variant was not compiled in.
pub fn backend(kind: BackendKind) -> Result<Box<dyn ArrayBackend>> {
    let backend: Box<dyn ArrayBackend> = match kind {
        BackendKind::Baseline => Box::new(Baseline::new()),
        BackendKind::Accelerated => accelerated_backend()?,
    };

    info!("Array backend ready: {:?}", backend.settings());
    Ok(backend)
}

#[cfg(feature = "accelerated")]
fn accelerated_backend() -> Result<Box<dyn ArrayBackend>> {
    Ok(Box::new(Accelerated::new()))
}

#[cfg(not(feature = "accelerated"))]
fn accelerated_backend() -> Result<Box<dyn ArrayBackend>> {
    Err(sem_core::SemError::dependency_missing("rayon"))
}
