//! Host-memory backend.

use std::collections::BTreeMap;

use sem_core::Result;

use crate::kernels;
use crate::tensor::{ArrayInput, Tensor};
use crate::ArrayBackend;

/// Version of the array library this backend is built on.
pub const NDARRAY_VERSION: &str = "0.17";

/// Backend keeping every array in host memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct Baseline;

impl Baseline {
    pub fn new() -> Self {
        Self
    }
}

impl ArrayBackend for Baseline {
    fn tensor(&self, array: ArrayInput) -> Result<Tensor> {
        Ok(Tensor::host(array.into_host()?))
    }

    fn all(&self, x: &Tensor) -> bool {
        kernels::all(x)
    }

    fn cat(&self, xs: &[Tensor]) -> Result<Tensor> {
        kernels::cat(xs).map(Tensor::host)
    }

    fn dot(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        kernels::dot(a, b).map(Tensor::host)
    }

    fn zeros(&self, shape: &[usize]) -> Tensor {
        Tensor::host(kernels::zeros(shape))
    }

    fn settings(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("ndarray".to_string(), NDARRAY_VERSION.to_string())])
    }
}
