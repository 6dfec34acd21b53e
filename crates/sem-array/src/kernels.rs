//! Host-memory kernels shared by the backend variants.

use ndarray::{concatenate, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix1, Ix2, IxDyn};

use sem_core::{Result, SemError};

use crate::tensor::Tensor;

/// Operand ranks accepted by `dot`, as validated views.
pub(crate) enum DotOperands<'a> {
    MatMat(ArrayView2<'a, f32>, ArrayView2<'a, f32>),
    MatVec(ArrayView2<'a, f32>, ArrayView1<'a, f32>),
    VecMat(ArrayView1<'a, f32>, ArrayView2<'a, f32>),
    VecVec(ArrayView1<'a, f32>, ArrayView1<'a, f32>),
}

impl<'a> DotOperands<'a> {
    /// Validate ranks and inner dimensions. ndarray panics on mismatch, so
    /// every combination is checked here first.
    pub(crate) fn new(a: &'a Tensor, b: &'a Tensor) -> Result<Self> {
        let mismatch = |left: usize, right: usize| {
            SemError::shape(format!(
                "dot inner dimensions differ: {:?} x {:?} ({} != {})",
                a.shape(),
                b.shape(),
                left,
                right
            ))
        };

        match (a.ndim(), b.ndim()) {
            (2, 2) => {
                let (l, r) = (as_matrix(&a.data)?, as_matrix(&b.data)?);
                if l.ncols() != r.nrows() {
                    return Err(mismatch(l.ncols(), r.nrows()));
                }
                Ok(Self::MatMat(l, r))
            }
            (2, 1) => {
                let (l, r) = (as_matrix(&a.data)?, as_vector(&b.data)?);
                if l.ncols() != r.len() {
                    return Err(mismatch(l.ncols(), r.len()));
                }
                Ok(Self::MatVec(l, r))
            }
            (1, 2) => {
                let (l, r) = (as_vector(&a.data)?, as_matrix(&b.data)?);
                if l.len() != r.nrows() {
                    return Err(mismatch(l.len(), r.nrows()));
                }
                Ok(Self::VecMat(l, r))
            }
            (1, 1) => {
                let (l, r) = (as_vector(&a.data)?, as_vector(&b.data)?);
                if l.len() != r.len() {
                    return Err(mismatch(l.len(), r.len()));
                }
                Ok(Self::VecVec(l, r))
            }
            (left, right) => Err(SemError::shape(format!(
                "dot supports 1-D and 2-D operands, got {}-D x {}-D",
                left, right
            ))),
        }
    }
}

fn as_matrix(array: &ArrayD<f32>) -> Result<ArrayView2<'_, f32>> {
    array
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|e| SemError::shape(e.to_string()))
}

fn as_vector(array: &ArrayD<f32>) -> Result<ArrayView1<'_, f32>> {
    array
        .view()
        .into_dimensionality::<Ix1>()
        .map_err(|e| SemError::shape(e.to_string()))
}

/// Scalar result as a 0-d array.
pub(crate) fn scalar(value: f32) -> ArrayD<f32> {
    ArrayD::from_elem(IxDyn(&[]), value)
}

pub(crate) fn all(x: &Tensor) -> bool {
    x.data.iter().all(|v| *v != 0.0)
}

pub(crate) fn cat(xs: &[Tensor]) -> Result<ArrayD<f32>> {
    if xs.is_empty() {
        return Err(SemError::shape("cat requires at least one array"));
    }
    if let Some(x) = xs.iter().find(|x| x.ndim() == 0) {
        return Err(SemError::shape(format!(
            "cat cannot join 0-d arrays along the leading axis: {:?}",
            x.shape()
        )));
    }

    let views: Vec<ArrayViewD<'_, f32>> = xs.iter().map(|x| x.data.view()).collect();
    concatenate(Axis(0), &views).map_err(|e| SemError::shape(format!("cat: {}", e)))
}

pub(crate) fn dot(a: &Tensor, b: &Tensor) -> Result<ArrayD<f32>> {
    Ok(match DotOperands::new(a, b)? {
        DotOperands::MatMat(l, r) => l.dot(&r).into_dyn(),
        DotOperands::MatVec(l, r) => l.dot(&r).into_dyn(),
        DotOperands::VecMat(l, r) => l.dot(&r).into_dyn(),
        DotOperands::VecVec(l, r) => scalar(l.dot(&r)),
    })
}

pub(crate) fn zeros(shape: &[usize]) -> ArrayD<f32> {
    ArrayD::zeros(IxDyn(shape))
}
