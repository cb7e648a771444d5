//! Alignment and application of binary masks.
//!
//! A mask is any 3-axis volume whose nonzero voxels select the region of
//! interest. Before use it is reconciled onto the spatial shape of the
//! volume it applies to, with the region outside its original bounds being
//! excluded. Applying a mask sets every excluded voxel to exactly zero,
//! which downstream normalization relies upon to tell background from
//! signal.
use crate::error::{PrepError, Result};
use crate::geometry::TargetGeometry;
use crate::reshape::{check_volume_rank, pad_crop};
use half::f16;
use ndarray::{Array3, ArrayBase, ArrayD, Axis, Data, DataMut, Dimension, Ix3, Zip};
use num_traits::Zero;

/// Interface for the element types accepted as mask voxels.
pub trait MaskElement {
    /// Whether this voxel belongs to the mask.
    fn is_selected(&self) -> bool;
}

impl MaskElement for bool {
    fn is_selected(&self) -> bool {
        *self
    }
}

macro_rules! impl_mask_element {
    ($($t:ty),*) => {
        $(
            impl MaskElement for $t {
                fn is_selected(&self) -> bool {
                    !self.is_zero()
                }
            }
        )*
    };
}

impl_mask_element!(u8, i8, u16, i16, u32, i32, u64, i64, f16, f32, f64);

/// Convert a mask volume into booleans and reconcile it onto the given
/// spatial shape. Voxels introduced by padding are excluded.
///
/// # Errors
///
/// - `PrepError::Shape` if the mask does not have exactly 3 axes or
///   `spatial_shape` has fewer than 3 extents.
/// - `PrepError::GeometryMismatch` if the reconciled mask still differs
///   from `spatial_shape`.
pub fn align_mask<A, S, D>(mask: &ArrayBase<S, D>, spatial_shape: &[usize]) -> Result<Array3<bool>>
where
    A: MaskElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    if mask.ndim() != 3 {
        return Err(PrepError::Shape(format!(
            "expected 3D mask (X, Y, Z), got shape {:?}",
            mask.shape()
        )));
    }
    let target = TargetGeometry::from_shape(spatial_shape)?;
    let selected = mask.map(|v| v.is_selected());
    let aligned = pad_crop(&selected, &target, false)?;
    if aligned.shape() != &spatial_shape[..3] {
        return Err(PrepError::GeometryMismatch(
            aligned.shape().to_vec(),
            spatial_shape[..3].to_vec(),
        ));
    }
    aligned
        .into_dimensionality::<Ix3>()
        .map_err(|e| PrepError::Shape(e.to_string()))
}

/// Zero out every voxel of `volume` outside `mask`, in place. A mask is
/// broadcast over the time axis of a 4D volume.
///
/// # Errors
///
/// - `PrepError::Shape` if the volume does not have 3 or 4 axes.
/// - `PrepError::GeometryMismatch` if the mask does not have the volume's
///   spatial shape.
pub fn apply_mask_inplace<A, S>(volume: &mut ArrayBase<S, ndarray::IxDyn>, mask: &Array3<bool>) -> Result<()>
where
    A: Zero,
    S: DataMut<Elem = A>,
{
    check_volume_rank(volume.shape())?;
    if mask.shape() != &volume.shape()[..3] {
        return Err(PrepError::GeometryMismatch(
            mask.shape().to_vec(),
            volume.shape()[..3].to_vec(),
        ));
    }

    let mut mask = mask.view().into_dyn();
    if volume.ndim() == 4 {
        mask = mask.insert_axis(Axis(3));
    }
    let mask = mask.broadcast(volume.raw_dim()).ok_or_else(|| {
        PrepError::GeometryMismatch(mask.shape().to_vec(), volume.shape().to_vec())
    })?;
    Zip::from(volume).and(&mask).for_each(|v, &keep| {
        if !keep {
            *v = A::zero();
        }
    });
    Ok(())
}

/// Align `mask` onto the spatial shape of `volume` and apply it, consuming
/// the volume.
pub fn mask_volume<A, M, S, D>(mut volume: ArrayD<A>, mask: &ArrayBase<S, D>) -> Result<ArrayD<A>>
where
    A: Zero,
    M: MaskElement,
    S: Data<Elem = M>,
    D: Dimension,
{
    check_volume_rank(volume.shape())?;
    let aligned = align_mask(mask, volume.shape())?;
    log::debug!(
        "Mask selects {} of {} voxels",
        aligned.iter().filter(|&&m| m).count(),
        aligned.len()
    );
    apply_mask_inplace(&mut volume, &aligned)?;
    Ok(volume)
}
