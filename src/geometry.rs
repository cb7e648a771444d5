//! Geometry planning for symmetric padding and cropping.
//!
//! Every spatial axis of a volume is reconciled with the target extent
//! independently. The difference between both extents is split in two
//! halves, with the right side taking the odd remainder. Whether those
//! amounts are to be added (padding) or removed (cropping) is recorded in
//! the [`AxisMode`] of each [`AxisPlan`].
//!
//! [`AxisMode`]: ./enum.AxisMode.html
//! [`AxisPlan`]: ./struct.AxisPlan.html
use crate::error::{PrepError, Result};
use std::fmt;

/// The default extent of each spatial axis: 96×96×96 voxels.
pub const DEFAULT_EXTENT: usize = 96;

/// The operation applied to one spatial axis.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum AxisMode {
    /// The axis is extended with a constant fill value.
    Pad,
    /// The axis is shortened by removing voxels from both ends.
    Crop,
    /// The axis already has the target extent.
    Same,
}

/// The reconciliation plan of a single axis.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AxisPlan {
    /// Voxels added to (or removed from) the start of the axis.
    pub left: usize,
    /// Voxels added to (or removed from) the end of the axis.
    pub right: usize,
    /// Whether the amounts above are padded or cropped.
    pub mode: AxisMode,
}

impl AxisPlan {
    /// The `(left, right)` amounts to pad, zero unless this axis is padded.
    pub fn pad_width(&self) -> (usize, usize) {
        match self.mode {
            AxisMode::Pad => (self.left, self.right),
            AxisMode::Crop | AxisMode::Same => (0, 0),
        }
    }

    /// The `(left, right)` amounts to crop, zero unless this axis is cropped.
    pub fn crop_width(&self) -> (usize, usize) {
        match self.mode {
            AxisMode::Crop => (self.left, self.right),
            AxisMode::Pad | AxisMode::Same => (0, 0),
        }
    }
}

/// Plan the reconciliation of an axis of extent `old` onto extent `new`.
///
/// # Example
///
/// ```
/// # use voxprep::geometry::{plan_axis, AxisMode};
/// let plan = plan_axis(91, 96);
/// assert_eq!((plan.left, plan.right, plan.mode), (2, 3, AxisMode::Pad));
/// ```
pub fn plan_axis(old: usize, new: usize) -> AxisPlan {
    let (total, mode) = if old == new {
        (0, AxisMode::Same)
    } else if old < new {
        (new - old, AxisMode::Pad)
    } else {
        (old - new, AxisMode::Crop)
    };
    let left = total / 2;
    AxisPlan {
        left,
        right: total - left,
        mode,
    }
}

/// The desired extent of the three spatial axes.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub struct TargetGeometry([usize; 3]);

impl TargetGeometry {
    /// Validate and create a new target geometry.
    ///
    /// # Errors
    ///
    /// - `PrepError::Shape` if any of the extents is zero.
    pub fn new(x: usize, y: usize, z: usize) -> Result<Self> {
        if x == 0 || y == 0 || z == 0 {
            return Err(PrepError::Shape(format!(
                "target extents must be positive, got ({}, {}, {})",
                x, y, z
            )));
        }
        Ok(TargetGeometry([x, y, z]))
    }

    /// Create a target geometry from the first three axes of a shape.
    pub fn from_shape(shape: &[usize]) -> Result<Self> {
        if shape.len() < 3 {
            return Err(PrepError::Shape(format!(
                "expected at least 3 axes, got shape {:?}",
                shape
            )));
        }
        Self::new(shape[0], shape[1], shape[2])
    }

    /// The spatial extents as a slice.
    pub fn extents(&self) -> &[usize; 3] {
        &self.0
    }

    /// Number of voxels in one spatial frame.
    pub fn voxel_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Plan each spatial axis of `shape` against this geometry. Axes beyond
    /// the third are not planned.
    pub fn plan(&self, shape: &[usize]) -> Result<[AxisPlan; 3]> {
        if shape.len() < 3 {
            return Err(PrepError::Shape(format!(
                "expected at least 3 axes, got shape {:?}",
                shape
            )));
        }
        Ok([
            plan_axis(shape[0], self.0[0]),
            plan_axis(shape[1], self.0[1]),
            plan_axis(shape[2], self.0[2]),
        ])
    }
}

/// Plan each spatial axis of `shape` against `target`.
///
/// Equivalent to [`TargetGeometry::plan`](struct.TargetGeometry.html#method.plan).
pub fn plan_geometry(shape: &[usize], target: &TargetGeometry) -> Result<[AxisPlan; 3]> {
    target.plan(shape)
}

impl Default for TargetGeometry {
    fn default() -> Self {
        TargetGeometry([DEFAULT_EXTENT; 3])
    }
}

impl AsRef<[usize]> for TargetGeometry {
    fn as_ref(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for TargetGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.0[0], self.0[1], self.0[2])
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_axis, AxisMode, AxisPlan, TargetGeometry};

    #[test]
    fn test_plan_axis() {
        assert_eq!(
            plan_axis(96, 96),
            AxisPlan { left: 0, right: 0, mode: AxisMode::Same }
        );
        assert_eq!(
            plan_axis(90, 96),
            AxisPlan { left: 3, right: 3, mode: AxisMode::Pad }
        );
        assert_eq!(
            plan_axis(100, 96),
            AxisPlan { left: 2, right: 2, mode: AxisMode::Crop }
        );
        assert_eq!(
            plan_axis(91, 96),
            AxisPlan { left: 2, right: 3, mode: AxisMode::Pad }
        );
        assert_eq!(
            plan_axis(97, 96),
            AxisPlan { left: 0, right: 1, mode: AxisMode::Crop }
        );
    }

    #[test]
    fn test_plan_widths() {
        let pad = plan_axis(1, 4);
        assert_eq!(pad.pad_width(), (1, 2));
        assert_eq!(pad.crop_width(), (0, 0));
        let crop = plan_axis(4, 1);
        assert_eq!(crop.pad_width(), (0, 0));
        assert_eq!(crop.crop_width(), (1, 2));
    }

    #[test]
    fn test_target_geometry() {
        assert!(TargetGeometry::new(96, 0, 96).is_err());
        let target = TargetGeometry::default();
        assert_eq!(target.extents(), &[96, 96, 96]);
        assert_eq!(target.to_string(), "96x96x96");
        let plans = target.plan(&[90, 94, 100, 7]).unwrap();
        assert_eq!(plans[0].mode, AxisMode::Pad);
        assert_eq!(plans[1].pad_width(), (1, 1));
        assert_eq!(plans[2].crop_width(), (2, 2));
        assert!(target.plan(&[90, 94]).is_err());
    }
}
