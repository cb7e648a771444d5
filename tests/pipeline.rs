#[macro_use]
extern crate approx;
#[macro_use]
extern crate pretty_assertions;

use half::f16;
use ndarray::{s, Array3, Array4, ArrayD};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;
use voxprep::pipeline::{read_scaling, STATS_BUNDLE_SUFFIX};
use voxprep::writer::read_payload;
use voxprep::{
    Codec, CodecOptions, ConvertOptions, DType, PrepError, ProcessingType, Scaling, SegmentOptions,
    StructuralOptions, TargetGeometry,
};

mod util;

use util::{mni_header, write_scan, write_scan_with};

fn functional(shape: (usize, usize, usize, usize)) -> Array4<f32> {
    Array4::from_shape_fn(shape, |(x, y, z, t)| {
        (1 + x + 2 * y + 3 * z) as f32 * 10. + t as f32
    })
}

fn half_volume(path: &Path) -> ArrayD<f16> {
    read_payload(path, &Codec::default())
        .unwrap()
        .into_array()
        .unwrap()
        .into_array::<f16>()
        .unwrap()
}

#[test]
fn four_d_conversion_pads_and_crops() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bold.nii");
    let output = dir.path().join("bold.npy.zst");
    let scan = functional((6, 10, 8, 3));
    write_scan(&input, &scan);

    let done = ConvertOptions::new(&input, &output, ProcessingType::FourD)
        .target(TargetGeometry::new(8, 8, 8).unwrap())
        .fill_value(-1.)
        .convert()
        .unwrap();
    assert_eq!(done.shape, vec![8, 8, 8, 3]);
    assert!(done.stats.is_none());
    assert_eq!(done.outputs, vec![output.clone()]);

    let stored = half_volume(&output);
    assert_eq!(stored.shape(), &[8, 8, 8, 3]);
    // X padded by one voxel on each side, Y cropped by one on each side
    assert_eq!(stored[[0, 4, 4, 0]].to_f32(), -1.);
    assert_eq!(stored[[7, 4, 4, 2]].to_f32(), -1.);
    for t in 0..3 {
        assert_eq!(stored[[1, 0, 0, t]].to_f32(), scan[[0, 1, 0, t]]);
        assert_eq!(stored[[6, 7, 7, t]].to_f32(), scan[[5, 8, 7, t]]);
    }
}

#[test]
fn two_d_conversion_stores_volume_as_loaded() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("anat.nii");
    let output = dir.path().join("anat.npy");
    let scan = Array3::from_shape_fn((5, 4, 3), |(x, y, z)| (x * 12 + y * 3 + z) as f32);
    write_scan(&input, &scan);

    let done = ConvertOptions::new(&input, &output, ProcessingType::TwoD)
        .convert()
        .unwrap();
    assert_eq!(done.shape, vec![5, 4, 3]);
    let stored = read_payload(&output, &Codec::default()).unwrap().into_array().unwrap();
    assert_eq!(stored.dtype(), DType::Float16);
    let stored = stored.into_array::<f16>().unwrap();
    assert_eq!(stored.mapv(f16::to_f32), scan.into_dyn());
}

#[test]
fn four_d_conversion_requires_time_axis() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("anat.nii");
    write_scan(&input, &Array3::<f32>::ones((4, 4, 4)));
    let output = dir.path().join("anat.npy.zst");
    let result = ConvertOptions::new(&input, &output, ProcessingType::FourD).convert();
    assert!(matches!(result, Err(PrepError::Shape(_))));
    assert!(!output.exists());
}

#[test]
fn existing_output_is_left_untouched() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bold.nii");
    write_scan(&input, &functional((4, 4, 4, 2)));
    let output = dir.path().join("bold.npy.zst");
    fs::write(&output, b"previous run").unwrap();

    let options = ConvertOptions::new(&input, &output, ProcessingType::FourD)
        .target(TargetGeometry::new(4, 4, 4).unwrap());
    match options.convert() {
        Err(PrepError::OutputExists(path)) => assert_eq!(path, output),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(fs::read(&output).unwrap(), b"previous run");

    let _ = options.force(true).convert().unwrap();
    assert_eq!(half_volume(&output).shape(), &[4, 4, 4, 2]);
}

#[test]
fn validation_happens_before_loading() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.nii");
    let bad_output = dir.path().join("out.nii");
    assert!(matches!(
        ConvertOptions::new(&missing, &bad_output, ProcessingType::FourD).convert(),
        Err(PrepError::InputNotFound(_))
    ));

    // an unreadable input is never opened when the extension is wrong
    let input = dir.path().join("garbage.nii");
    fs::write(&input, b"not a nifti file").unwrap();
    assert!(matches!(
        ConvertOptions::new(&input, &bad_output, ProcessingType::FourD).convert(),
        Err(PrepError::UnsupportedExtension(_))
    ));
    assert!(!bad_output.exists());

    let bundle_output = dir.path().join("out.npz");
    assert!(matches!(
        ConvertOptions::new(&input, &bundle_output, ProcessingType::TwoD).convert(),
        Err(PrepError::UnsupportedExtension(_))
    ));
}

#[test]
fn masked_conversion_writes_statistics() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bold.nii");
    let mask_path = dir.path().join("mask.nii");
    let output = dir.path().join("sub-01.npy.zst");
    let scan = functional((6, 6, 6, 2));
    write_scan(&input, &scan);
    let mask = Array3::from_shape_fn((6, 6, 6), |(x, _, _)| if x < 3 { 1f32 } else { 0. });
    write_scan(&mask_path, &mask);

    let done = ConvertOptions::new(&input, &output, ProcessingType::FourD)
        .target(TargetGeometry::new(6, 6, 6).unwrap())
        .mask(&mask_path)
        .convert()
        .unwrap();
    let stats = done.stats.unwrap();
    let stats_path = dir.path().join(format!("sub-01{}", STATS_BUNDLE_SUFFIX));
    assert_eq!(done.outputs, vec![output.clone(), stats_path.clone()]);

    let selected: Vec<f64> = scan
        .slice(s![..3, .., .., ..])
        .iter()
        .map(|&v| f64::from(v))
        .collect();
    let (mean, std) = util::mean_std(selected);
    assert_abs_diff_eq!(stats.mean, mean, epsilon = 1e-6);
    assert_abs_diff_eq!(stats.std, std, epsilon = 1e-6);

    match read_scaling(&stats_path, &Codec::default()).unwrap() {
        Scaling::Supplied { mean, std } => {
            assert_eq!(mean, stats.mean);
            assert_eq!(std, stats.std);
        }
        Scaling::Estimate => panic!("statistics bundle without values"),
    }

    let stored = half_volume(&output);
    assert!(stored
        .slice(s![3.., .., .., ..])
        .iter()
        .all(|v| v.to_f32() == 0.));
    let expected = (f64::from(scan[[1, 2, 3, 1]]) - stats.mean) / stats.std;
    assert_abs_diff_eq!(stored[[1, 2, 3, 1]].to_f64(), expected, epsilon = 1e-2);
}

#[test]
fn replayed_statistics_are_applied_as_given() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bold.nii");
    let mask_path = dir.path().join("mask.nii");
    write_scan(&input, &functional((4, 4, 4, 2)));
    write_scan(&mask_path, &Array3::<f32>::ones((4, 4, 4)));
    let output = dir.path().join("replay.npy");

    let done = ConvertOptions::new(&input, &output, ProcessingType::FourD)
        .target(TargetGeometry::new(4, 4, 4).unwrap())
        .mask(&mask_path)
        .scaling(Scaling::Supplied {
            mean: 100.,
            std: 50.,
        })
        .convert()
        .unwrap();
    let stats = done.stats.unwrap();
    assert_eq!((stats.mean, stats.std), (100., 50.));
    let stored = half_volume(&output);
    // voxel (0, 0, 0, 0) holds 10
    assert_abs_diff_eq!(stored[[0, 0, 0, 0]].to_f64(), -1.8, epsilon = 1e-3);
}

#[test]
fn segments_share_leading_statistics() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bold.nii");
    let mask_path = dir.path().join("mask.nii");
    let scan = functional((4, 4, 4, 10));
    write_scan(&input, &scan);
    let mask = Array3::from_shape_fn((4, 4, 4), |(_, y, _)| if y > 0 { 1f32 } else { 0. });
    write_scan(&mask_path, &mask);

    // a functional scan first stored as a container, as done for the
    // unmasked conversion
    let stored = dir.path().join("bold.npy.zst");
    let _ = ConvertOptions::new(&input, &stored, ProcessingType::FourD)
        .target(TargetGeometry::new(4, 4, 4).unwrap())
        .convert()
        .unwrap();

    let prefix = dir.path().join("sub-01");
    let done = SegmentOptions::new(&stored, &mask_path, &prefix)
        .frames(4)
        .target(TargetGeometry::new(4, 4, 4).unwrap())
        .convert()
        .unwrap();
    assert_eq!(done.frames, 4);
    assert_eq!(done.pre, dir.path().join("sub-01_pre4_masked.npy.zst"));
    assert_eq!(done.post, dir.path().join("sub-01_post4_masked.npy.zst"));

    let selected: Vec<f64> = scan
        .slice(s![.., 1.., .., ..4])
        .iter()
        .map(|&v| f64::from(v))
        .collect();
    let (mean, std) = util::mean_std(selected);
    assert_abs_diff_eq!(done.stats.mean, mean, epsilon = 1e-6);
    assert_abs_diff_eq!(done.stats.std, std, epsilon = 1e-6);

    match read_scaling(&done.stats_path, &Codec::default()).unwrap() {
        Scaling::Supplied { mean, std } => {
            assert_eq!(mean, done.stats.mean);
            assert_eq!(std, done.stats.std);
        }
        Scaling::Estimate => panic!("statistics bundle without values"),
    }

    let pre = half_volume(&done.pre);
    let post = half_volume(&done.post);
    assert_eq!(pre.shape(), &[4, 4, 4, 4]);
    assert_eq!(post.shape(), &[4, 4, 4, 4]);
    assert!(post.slice(s![.., 0, .., ..]).iter().all(|v| v.to_f32() == 0.));

    // the trailing segment starts at frame 6 and is scaled like the leading one
    let expected = (f64::from(scan[[2, 3, 1, 6]]) - mean) / std;
    assert_abs_diff_eq!(post[[2, 3, 1, 0]].to_f64(), expected, epsilon = 1e-2);
}

#[test]
fn segments_refuse_to_overwrite() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bold.nii");
    let mask_path = dir.path().join("mask.nii");
    write_scan(&input, &functional((4, 4, 4, 4)));
    write_scan(&mask_path, &Array3::<f32>::ones((4, 4, 4)));
    let prefix = dir.path().join("sub-02");
    fs::write(dir.path().join("sub-02_stats.npz.zst"), b"keep").unwrap();

    let result = SegmentOptions::new(&input, &mask_path, &prefix)
        .frames(2)
        .convert();
    assert!(matches!(result, Err(PrepError::OutputExists(_))));
    assert!(!dir.path().join("sub-02_pre2_masked.npy.zst").exists());
}

#[test]
fn structural_conversion_records_statistics() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("T1_brain_to_MNI.nii");
    let output = dir.path().join("out").join("1000001_T1.npy.zst");
    let scan = Array3::from_shape_fn((5, 6, 4), |(x, y, z)| x as f32 * 4. + y as f32 - z as f32 * 3. - 2.);
    write_scan(&input, &scan);

    let done = StructuralOptions::new(&input, &output).convert().unwrap();
    let stats = done.stats.unwrap();
    let csv_path = dir.path().join("out").join("1000001_T1_stats.csv");
    assert_eq!(done.outputs, vec![output.clone(), csv_path.clone()]);

    let positive: Vec<f64> = scan.iter().filter(|&&v| v > 0.).map(|&v| f64::from(v)).collect();
    assert_eq!(stats.n, positive.len());
    let (mean, std) = util::mean_std(positive);
    assert_abs_diff_eq!(stats.mean, mean, epsilon = 1e-9);
    assert_abs_diff_eq!(stats.std, std, epsilon = 1e-9);

    let stored = read_payload(&output, &Codec::default()).unwrap().into_array().unwrap();
    assert_eq!(stored.dtype(), DType::Float64);
    let stored = stored.into_array::<f64>().unwrap();
    for (v, orig) in stored.iter().zip(scan.iter()) {
        if *orig <= 0. {
            assert_eq!(*v, 0.);
        } else {
            assert_abs_diff_eq!(*v, (f64::from(*orig) - mean) / std, epsilon = 1e-9);
        }
    }

    let table = fs::read_to_string(&csv_path).unwrap();
    let mut lines = table.lines();
    assert_eq!(lines.next(), Some("eid,Mean,Std,Var"));
    let record: Vec<&str> = lines.next().unwrap().split(',').collect();
    assert_eq!(record[0], "1000001_T1.npy.zst");
    assert_abs_diff_eq!(record[1].parse::<f64>().unwrap(), stats.mean);
    assert_abs_diff_eq!(record[3].parse::<f64>().unwrap(), stats.var);
}

#[test]
fn roi_table_conversion() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("fMRI.Schaefer17n100p.csv.gz");
    let output = dir.path().join("roi100.npy");

    let mut table = String::from("roi,0,1,2,3\n");
    for r in 0..5 {
        table.push_str(&format!("{},{},{},{},{}\n", r, r, r + 2, r * 3, 1));
    }
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(table.as_bytes()).unwrap();
    fs::write(&input, encoder.finish().unwrap()).unwrap();

    let shape = voxprep::roi::convert_roi_table(&input, &output, false).unwrap();
    assert_eq!(shape, (5, 4));
    let stored = read_payload(&output, &Codec::default()).unwrap().into_array().unwrap();
    assert_eq!(stored.dtype(), DType::Float32);
    let stored = stored.into_array::<f32>().unwrap();
    for row in stored.outer_iter() {
        let (mean, _) = util::mean_std(row.iter().map(|&v| f64::from(v)));
        assert_abs_diff_eq!(mean, 0., epsilon = 1e-6);
    }
    assert!(matches!(
        voxprep::roi::convert_roi_table(&input, &output, false),
        Err(PrepError::OutputExists(_))
    ));
}

#[test]
fn mask_in_another_space_is_still_applied() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bold.nii");
    let mask_path = dir.path().join("mask_shifted.nii");
    let output = dir.path().join("sub-02.npy");
    let scan = functional((4, 4, 4, 2));
    write_scan(&input, &scan);
    // same grid, shifted by half a voxel
    let shifted = nifti::NiftiHeader {
        srow_x: [-2., 0., 0., 91.],
        ..mni_header()
    };
    let mask = Array3::from_shape_fn((4, 4, 4), |(_, _, z)| if z < 2 { 1f32 } else { 0. });
    write_scan_with(&mask_path, &mask, &shifted);

    let done = ConvertOptions::new(&input, &output, ProcessingType::FourD)
        .target(TargetGeometry::new(4, 4, 4).unwrap())
        .mask(&mask_path)
        .convert()
        .unwrap();
    let stats = done.stats.unwrap();

    let expected = scan.mapv(f64::from).into_dyn();
    let mut expected = expected.mapv(|v| (v - stats.mean) / stats.std);
    expected.slice_mut(s![.., .., 2.., ..]).fill(0.);
    let stored = half_volume(&output).mapv(|v| v.to_f64());
    assert_abs_diff_eq!(stored, expected, epsilon = 1e-2);
}

#[test]
fn segments_read_containers_of_any_codec_settings() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("bold.nii");
    let mask_path = dir.path().join("mask.nii");
    write_scan(&input, &functional((4, 4, 4, 6)));
    write_scan(&mask_path, &Array3::<f32>::ones((4, 4, 4)));
    let bare = CodecOptions::new().checksum(false).content_size(false);

    let stored = dir.path().join("bold.npy.zst");
    let _ = ConvertOptions::new(&input, &stored, ProcessingType::FourD)
        .target(TargetGeometry::new(4, 4, 4).unwrap())
        .codec(bare)
        .convert()
        .unwrap();

    let prefix = dir.path().join("sub-03");
    assert!(matches!(
        SegmentOptions::new(&stored, &mask_path, &prefix)
            .frames(3)
            .target(TargetGeometry::new(4, 4, 4).unwrap())
            .convert(),
        Err(PrepError::Integrity(_))
    ));
    let done = SegmentOptions::new(&stored, &mask_path, &prefix)
        .frames(3)
        .target(TargetGeometry::new(4, 4, 4).unwrap())
        .codec(bare)
        .convert()
        .unwrap();
    assert_eq!(done.frames, 3);
    let pre = read_payload(&done.pre, &Codec::new(bare))
        .unwrap()
        .into_array()
        .unwrap();
    assert_eq!(pre.shape(), &[4, 4, 4, 3]);
    assert_eq!(pre.dtype(), DType::Float16);
}
