use ndarray::{Array, ArrayD, Dimension, IxDyn};
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use std::path::Path;

/// A volume of the given shape whose voxels count up from 1 in memory order.
#[allow(dead_code)]
pub fn ramp(shape: &[usize]) -> ArrayD<f64> {
    let n: usize = shape.iter().product();
    ArrayD::from_shape_vec(IxDyn(shape), (1..=n).map(|v| v as f64).collect()).unwrap()
}

/// Population mean and standard deviation of a sequence.
#[allow(dead_code)]
pub fn mean_std<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    let values: Vec<f64> = values.into_iter().collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Header of the test scans, in 2mm MNI space.
#[allow(dead_code)]
pub fn mni_header() -> NiftiHeader {
    NiftiHeader {
        sform_code: 4,
        srow_x: [-2., 0., 0., 90.],
        srow_y: [0., 2., 0., -126.],
        srow_z: [0., 0., 2., -72.],
        pixdim: [1., 2., 2., 2., 0.72, 0., 0., 0.],
        ..NiftiHeader::default()
    }
}

/// Write a single precision NIfTI scan with the test header.
#[allow(dead_code)]
pub fn write_scan<D: Dimension + ndarray::RemoveAxis>(path: &Path, data: &Array<f32, D>) {
    write_scan_with(path, data, &mni_header());
}

/// Write a single precision NIfTI scan with the given header.
#[allow(dead_code)]
pub fn write_scan_with<D: Dimension + ndarray::RemoveAxis>(
    path: &Path,
    data: &Array<f32, D>,
    header: &NiftiHeader,
) {
    WriterOptions::new(path)
        .reference_header(header)
        .write_nifti(data)
        .unwrap();
}
