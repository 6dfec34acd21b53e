//! Native array type, device placement and accepted input formats.

use ndarray::{ArrayD, IxDyn};

use sem_core::{Result, SemError};

/// Where a tensor's memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Host memory.
    Host,
    /// Attached compute device.
    Accelerator { ordinal: usize },
}

impl Device {
    /// Device for the result of an operation over `inputs`.
    ///
    /// Any input on an accelerator keeps the result there.
    pub fn join<'a>(inputs: impl IntoIterator<Item = &'a Tensor>) -> Self {
        inputs
            .into_iter()
            .map(|t| t.device)
            .find(|d| matches!(d, Self::Accelerator { .. }))
            .unwrap_or(Self::Host)
    }
}

/// Backend-native array: f32 values plus their placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    pub data: ArrayD<f32>,
    pub device: Device,
}

impl Tensor {
    /// Host tensor wrapping `data`.
    pub fn host(data: ArrayD<f32>) -> Self {
        Self {
            data,
            device: Device::Host,
        }
    }

    /// Same values, placed on `device`.
    pub fn to_device(self, device: Device) -> Self {
        Self {
            data: self.data,
            device,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    pub fn is_accelerated(&self) -> bool {
        matches!(self.device, Device::Accelerator { .. })
    }

    /// Values in logical (row-major) order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Arrays accepted by [`crate::ArrayBackend::tensor`].
#[derive(Debug, Clone)]
pub enum ArrayInput {
    /// Already a backend-native tensor.
    Tensor(Tensor),
    /// A host ndarray of any rank.
    NdArray(ArrayD<f32>),
    /// A flat vector, read as 1-D.
    Flat(Vec<f32>),
    /// Rows of equal length, read as 2-D.
    Rows(Vec<Vec<f32>>),
}

impl ArrayInput {
    /// Convert into host memory, validating shape.
    pub(crate) fn into_host(self) -> Result<ArrayD<f32>> {
        match self {
            Self::Tensor(tensor) => Ok(tensor.data),
            Self::NdArray(array) => Ok(array),
            Self::Flat(values) => {
                let len = values.len();
                ArrayD::from_shape_vec(IxDyn(&[len]), values)
                    .map_err(|e| SemError::shape(e.to_string()))
            }
            Self::Rows(rows) => {
                let cols = rows.first().map_or(0, Vec::len);
                if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
                    return Err(SemError::shape(format!(
                        "row {} has {} values, expected {}",
                        bad,
                        rows[bad].len(),
                        cols
                    )));
                }

                let count = rows.len();
                let values: Vec<f32> = rows.into_iter().flatten().collect();
                ArrayD::from_shape_vec(IxDyn(&[count, cols]), values)
                    .map_err(|e| SemError::shape(e.to_string()))
            }
        }
    }
}

impl From<Tensor> for ArrayInput {
    fn from(tensor: Tensor) -> Self {
        Self::Tensor(tensor)
    }
}

impl From<ArrayD<f32>> for ArrayInput {
    fn from(array: ArrayD<f32>) -> Self {
        Self::NdArray(array)
    }
}

impl From<Vec<f32>> for ArrayInput {
    fn from(values: Vec<f32>) -> Self {
        Self::Flat(values)
    }
}

impl From<&[f32]> for ArrayInput {
    fn from(values: &[f32]) -> Self {
        Self::Flat(values.to_vec())
    }
}

impl From<Vec<Vec<f32>>> for ArrayInput {
    fn from(rows: Vec<Vec<f32>>) -> Self {
        Self::Rows(rows)
    }
}
