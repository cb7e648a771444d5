//! Loading of source scans.
//!
//! Parsing of the NIfTI-1 format itself is left to the `nifti` crate; this
//! module only retrieves the voxel data as a double precision array in the
//! conventional (X, Y, Z[, T]) axis order, together with the voxel to world
//! affine of the scan.
use crate::error::{PrepError, Result};
use nalgebra::Matrix4;
use ndarray::ArrayD;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

const QUATERNION_THRESHOLD: f64 = -::std::f32::EPSILON as f64 * 3.0;

/// A loaded scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    /// The voxel intensities, with the spatial axes first.
    pub data: ArrayD<f64>,
    /// The voxel to world transform, unless the header does not describe a
    /// usable one.
    pub affine: Option<Matrix4<f64>>,
}

impl Scan {
    /// Whether both scans map voxels to the same world coordinates, within
    /// `1e-3 + 1e-5 * |b|`. `None` if either affine is unknown.
    pub fn same_space(&self, affine: Option<&Matrix4<f64>>) -> Option<bool> {
        let (a, b) = (self.affine.as_ref()?, affine?);
        Some(
            a.iter()
                .zip(b.iter())
                .all(|(x, y)| (x - y).abs() <= 1e-3 + 1e-5 * y.abs()),
        )
    }
}

/// The voxel to world transform of a header, following the sform, qform and
/// shape/zoom precedence of `NiftiHeader::affine`.
///
/// Headers whose qform fields cannot describe a rotation (negative spacing,
/// a non unit quaternion) and headers of fewer than 3 dimensions give
/// `None`. A qfac of zero is read as 1.
pub fn scan_affine(header: &NiftiHeader) -> Option<Matrix4<f64>> {
    if header.sform_code != 0 {
        return Some(header.affine());
    }
    if header.qform_code != 0 {
        if header.pixdim[1..4].iter().any(|&p| p < 0.) {
            log::warn!("Negative voxel spacing {:?}, ignoring qform", &header.pixdim[1..4]);
            return None;
        }
        let b = f64::from(header.quatern_b);
        let c = f64::from(header.quatern_c);
        let d = f64::from(header.quatern_d);
        if 1. - (b * b + c * c + d * d) < QUATERNION_THRESHOLD {
            log::warn!("qform quaternion ({}, {}, {}) is not normalized", b, c, d);
            return None;
        }
        let mut header = header.clone();
        if header.pixdim[0] == 0. {
            header.pixdim[0] = 1.;
        }
        if (header.pixdim[0].abs() - 1.).abs() >= 1e-11 {
            log::warn!("Invalid qfac {}, ignoring qform", header.pixdim[0]);
            return None;
        }
        return Some(header.affine());
    }
    if header.dim[0] < 3 {
        return None;
    }
    Some(header.affine())
}

/// Load a NIfTI scan (`.nii` or `.nii.gz`) from the file system.
///
/// # Errors
///
/// - `PrepError::InputNotFound` if `path` is not an existing regular file.
/// - `PrepError::Nifti` if the file cannot be read as a NIfTI volume.
pub fn load_scan<P: AsRef<Path>>(path: P) -> Result<Scan> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PrepError::InputNotFound(path.to_path_buf()));
    }
    let object = ReaderOptions::new().read_file(path)?;
    let affine = scan_affine(object.header());
    let data = object.into_volume().into_ndarray::<f64>()?;
    log::info!("Loaded {} with shape {:?}", path.display(), data.shape());
    Ok(Scan { data, affine })
}
