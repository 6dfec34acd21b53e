//! Accelerated backend: parallel kernels with opportunistic device placement.

use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, Zip};
use tracing::debug;

use sem_core::Result;

use crate::kernels::{self, DotOperands};
use crate::tensor::{ArrayInput, Device, Tensor};
use crate::ArrayBackend;

/// Version of the parallel runtime this backend is built on.
pub const RAYON_VERSION: &str = "1.10";

/// Environment variable that turns device placement off.
pub const DISABLE_ACCELERATOR_ENV: &str = "SEM_DISABLE_ACCELERATOR";

/// Reports whether a compute device can take new arrays right now.
pub trait DeviceDetector: Send + Sync {
    /// Ordinal of an available device, or `None` to stay on the host.
    fn available(&self) -> Option<usize>;
}

/// Treats the machine's worker threads as the device when more than one is
/// present and the disable variable is unset.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDetector;

impl DeviceDetector for SystemDetector {
    fn available(&self) -> Option<usize> {
        if std::env::var_os(DISABLE_ACCELERATOR_ENV).is_some() {
            return None;
        }

        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (threads > 1).then_some(0)
    }
}

/// Backend placing arrays on a device whenever the detector reports one.
///
/// Reductions and products over device tensors run on rayon's pool. Host
/// tensors take the same sequential kernels as the baseline backend.
#[derive(Clone)]
pub struct Accelerated {
    detector: Arc<dyn DeviceDetector>,
}

impl Accelerated {
    pub fn new() -> Self {
        Self::with_detector(Arc::new(SystemDetector))
    }

    /// Use a custom device detector.
    pub fn with_detector(detector: Arc<dyn DeviceDetector>) -> Self {
        Self { detector }
    }
}

impl Default for Accelerated {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Accelerated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accelerated").finish_non_exhaustive()
    }
}

impl ArrayBackend for Accelerated {
    fn tensor(&self, array: ArrayInput) -> Result<Tensor> {
        let data = array.into_host()?;

        // Availability can change between calls, so ask every time
        let device = match self.detector.available() {
            Some(ordinal) => Device::Accelerator { ordinal },
            None => Device::Host,
        };
        debug!("Placing tensor {:?} on {:?}", data.shape(), device);

        Ok(Tensor { data, device })
    }

    fn all(&self, x: &Tensor) -> bool {
        if !x.is_accelerated() {
            return kernels::all(x);
        }

        x.data.par_iter().all(|v| *v != 0.0)
    }

    fn cat(&self, xs: &[Tensor]) -> Result<Tensor> {
        let data = kernels::cat(xs)?;
        Ok(Tensor {
            data,
            device: Device::join(xs),
        })
    }

    fn dot(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let device = Device::join([a, b]);
        if device == Device::Host {
            return Ok(Tensor::host(kernels::dot(a, b)?));
        }

        let data = match DotOperands::new(a, b)? {
            DotOperands::MatMat(l, r) => {
                let mut out = Array2::<f32>::zeros((l.nrows(), r.ncols()));
                Zip::from(out.rows_mut())
                    .and(l.rows())
                    .par_for_each(|mut row, lhs| row.assign(&lhs.dot(&r)));
                out.into_dyn()
            }
            DotOperands::MatVec(l, r) => {
                let mut out = Array1::<f32>::zeros(l.nrows());
                Zip::from(&mut out)
                    .and(l.rows())
                    .par_for_each(|value, lhs| *value = lhs.dot(&r));
                out.into_dyn()
            }
            DotOperands::VecMat(l, r) => l.dot(&r).into_dyn(),
            DotOperands::VecVec(l, r) => kernels::scalar(l.dot(&r)),
        };

        Ok(Tensor { data, device })
    }

    fn zeros(&self, shape: &[usize]) -> Tensor {
        Tensor::host(kernels::zeros(shape))
    }

    fn settings(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("rayon".to_string(), RAYON_VERSION.to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Baseline;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Detector whose availability is flipped by the test.
    #[derive(Default)]
    struct SwitchDetector {
        present: AtomicBool,
        calls: AtomicUsize,
    }

    impl DeviceDetector for SwitchDetector {
        fn available(&self) -> Option<usize> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.present.load(Ordering::SeqCst).then_some(0)
        }
    }

    #[test]
    fn test_detector_asked_every_call() {
        let detector = Arc::new(SwitchDetector::default());
        let backend = Accelerated::with_detector(detector.clone());

        let first = backend.tensor(vec![1.0, 2.0, 3.0].into()).unwrap();
        assert_eq!(first.device, Device::Host);

        detector.present.store(true, Ordering::SeqCst);
        let second = backend.tensor(vec![1.0, 2.0, 3.0].into()).unwrap();
        assert_eq!(second.device, Device::Accelerator { ordinal: 0 });
        assert_eq!(second.to_vec(), vec![1.0, 2.0, 3.0]);

        detector.present.store(false, Ordering::SeqCst);
        let third = backend.tensor(second.into()).unwrap();
        assert_eq!(third.device, Device::Host);

        assert_eq!(detector.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_matches_baseline_numerics() {
        let detector = Arc::new(SwitchDetector::default());
        detector.present.store(true, Ordering::SeqCst);
        let accelerated = Accelerated::with_detector(detector);
        let baseline = Baseline::new();

        let rows = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let cols = vec![vec![1.0, 0.5], vec![0.0, 1.0], vec![2.0, -1.0]];
        let vector = vec![1.0, -1.0, 2.0];

        let a = accelerated.tensor(rows.clone().into()).unwrap();
        let b = accelerated.tensor(cols.clone().into()).unwrap();
        let v = accelerated.tensor(vector.clone().into()).unwrap();
        let ha = baseline.tensor(rows.into()).unwrap();
        let hb = baseline.tensor(cols.into()).unwrap();
        let hv = baseline.tensor(vector.into()).unwrap();

        let product = accelerated.dot(&a, &b).unwrap();
        assert!(product.is_accelerated());
        assert_eq!(product.data, baseline.dot(&ha, &hb).unwrap().data);
        assert_eq!(
            accelerated.dot(&a, &v).unwrap().data,
            baseline.dot(&ha, &hv).unwrap().data
        );
        assert_eq!(
            accelerated.cat(&[a.clone(), a.clone()]).unwrap().data,
            baseline.cat(&[ha.clone(), ha]).unwrap().data
        );
        assert!(accelerated.all(&a));
        assert!(!accelerated.all(&accelerated.zeros(&[2])));
    }

    #[test]
    fn test_settings_differ_from_baseline() {
        let accelerated = Accelerated::new().settings();
        let baseline = Baseline::new().settings();

        assert_eq!(accelerated.len(), 1);
        assert!(accelerated.contains_key("rayon"));
        assert_ne!(
            accelerated.keys().next().unwrap(),
            baseline.keys().next().unwrap()
        );
    }

    #[test]
    fn test_host_tensors_use_host_kernels() {
        let backend = Accelerated::with_detector(Arc::new(SwitchDetector::default()));
        let baseline = Baseline::new();

        let rows = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let a = backend.tensor(rows.clone().into()).unwrap();
        let ha = baseline.tensor(rows.into()).unwrap();
        assert!(!a.is_accelerated());

        let product = backend.dot(&a, &a).unwrap();
        assert_eq!(product.device, Device::Host);
        assert_eq!(product.data, baseline.dot(&ha, &ha).unwrap().data);
        assert!(backend.all(&a));
    }

    #[test]
    fn test_mixed_placement_runs_on_device() {
        let detector = Arc::new(SwitchDetector::default());
        let backend = Accelerated::with_detector(detector.clone());

        let host = backend.tensor(vec![1.0, 2.0].into()).unwrap();
        detector.present.store(true, Ordering::SeqCst);
        let device = backend.tensor(vec![3.0, 4.0].into()).unwrap();

        let product = backend.dot(&host, &device).unwrap();
        assert!(product.is_accelerated());
        assert_eq!(product.to_vec(), vec![11.0]);
    }
}
