//! Reconciliation of a volume onto a target spatial shape.
//!
//! Volumes are reshaped by first cropping every axis that is too large and
//! then padding every axis that is too small, as planned by
//! [`TargetGeometry::plan`]. A trailing time axis is always carried whole.
//!
//! [`TargetGeometry::plan`]: ../geometry/struct.TargetGeometry.html#method.plan
use crate::error::{PrepError, Result};
use crate::geometry::{AxisPlan, TargetGeometry};
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn, Slice};

/// Check that a volume has 3 spatial axes and at most one time axis.
pub(crate) fn check_volume_rank(shape: &[usize]) -> Result<()> {
    match shape.len() {
        3 | 4 => Ok(()),
        n => Err(PrepError::Shape(format!(
            "expected 3D (X, Y, Z) or 4D (X, Y, Z, T) array, got {} axes with shape {:?}",
            n, shape
        ))),
    }
}

/// Symmetrically pad or crop the first three axes of `volume` to match
/// `target`, using `fill` for the padded voxels.
///
/// The volume must have exactly 3 or 4 axes. The output is a new array in
/// standard (row major) memory order.
///
/// # Errors
///
/// - `PrepError::Shape` if the volume does not have 3 or 4 axes.
///
/// # Example
///
/// ```
/// # use ndarray::{Array, IxDyn};
/// # use voxprep::{geometry::TargetGeometry, reshape::pad_crop};
/// let volume = Array::<f32, _>::ones(IxDyn(&[90, 94, 100]));
/// let target = TargetGeometry::new(96, 96, 96)?;
/// let out = pad_crop(&volume, &target, 0.)?;
/// assert_eq!(out.shape(), &[96, 96, 96]);
/// # Ok::<(), voxprep::PrepError>(())
/// ```
pub fn pad_crop<A, S, D>(
    volume: &ArrayBase<S, D>,
    target: &TargetGeometry,
    fill: A,
) -> Result<ArrayD<A>>
where
    A: Clone,
    S: Data<Elem = A>,
    D: Dimension,
{
    check_volume_rank(volume.shape())?;
    let plans = target.plan(volume.shape())?;

    let view = volume.view().into_dyn();
    let cropped = view.slice_each_axis(|ax| {
        let i = ax.axis.index();
        if i < 3 {
            let (left, right) = plans[i].crop_width();
            Slice::from(left..ax.len - right)
        } else {
            Slice::from(..)
        }
    });

    if plans.iter().all(|p| p.pad_width() == (0, 0)) {
        return Ok(cropped.as_standard_layout().into_owned());
    }

    let inner_shape = cropped.shape().to_vec();
    let mut out_shape = inner_shape.clone();
    out_shape[..3].copy_from_slice(target.extents());

    let mut out = ArrayD::from_elem(IxDyn(&out_shape), fill);
    out.slice_each_axis_mut(|ax| {
        let i = ax.axis.index();
        if i < 3 {
            let (left, _) = plans[i].pad_width();
            Slice::from(left..left + inner_shape[i])
        } else {
            Slice::from(..)
        }
    })
    .assign(&cropped);
    Ok(out)
}

/// A reusable reshaping stage holding the target geometry and fill value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reshaper<A> {
    target: TargetGeometry,
    fill: A,
}

impl<A: Clone> Reshaper<A> {
    /// Create a reshaping stage.
    pub fn new(target: TargetGeometry, fill: A) -> Self {
        Reshaper { target, fill }
    }

    /// The geometry produced by this stage.
    pub fn target(&self) -> &TargetGeometry {
        &self.target
    }

    /// The plan that [`apply`](#method.apply) would follow for a volume of
    /// the given shape.
    pub fn plan(&self, shape: &[usize]) -> Result<[AxisPlan; 3]> {
        check_volume_rank(shape)?;
        self.target.plan(shape)
    }

    /// Reshape a volume onto the target geometry.
    pub fn apply<S, D>(&self, volume: &ArrayBase<S, D>) -> Result<ArrayD<A>>
    where
        S: Data<Elem = A>,
        D: Dimension,
    {
        pad_crop(volume, &self.target, self.fill.clone())
    }
}
