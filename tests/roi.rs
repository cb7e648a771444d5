#[macro_use]
extern crate approx;

use ndarray::Array2;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;
use voxprep::roi::{AtlasOptions, ATLAS_TABLES};
use voxprep::writer::read_payload;
use voxprep::{Codec, OutputFormat, PrepError};

mod util;

fn write_table(path: &Path, regions: usize, frames: usize) {
    let mut table = String::from("roi");
    for t in 0..frames {
        table.push_str(&format!(",{}", t));
    }
    table.push('\n');
    for r in 0..regions {
        table.push_str(&r.to_string());
        for t in 0..frames {
            table.push_str(&format!(",{}", (r + 1) * t + r));
        }
        table.push('\n');
    }
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(table.as_bytes()).unwrap();
    fs::write(path, encoder.finish().unwrap()).unwrap();
}

fn stored_table(path: &Path) -> Array2<f32> {
    read_payload(path, &Codec::default())
        .unwrap()
        .into_array()
        .unwrap()
        .into_array::<f32>()
        .unwrap()
        .into_dimensionality()
        .unwrap()
}

#[test]
fn atlas_directory_is_converted() {
    let source = tempdir().unwrap();
    let out = tempdir().unwrap();
    let regions = [10, 5, 40, 36];
    for ((table, _), &n) in ATLAS_TABLES.iter().zip(regions.iter()) {
        write_table(&source.path().join(table), n, 12);
    }

    let done = AtlasOptions::new(source.path(), out.path()).convert().unwrap();
    let names: Vec<_> = done
        .iter()
        .map(|o| o.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["roi100.npy", "roi50.npy", "roi400.npy", "roi360.npy"]);

    for (output, &n) in done.iter().zip(regions.iter()) {
        assert_eq!(output.shape, (n, 12));
        let stored = stored_table(&output.path);
        assert_eq!(stored.dim(), (n, 12));
        for row in stored.outer_iter() {
            let (mean, std) = util::mean_std(row.iter().map(|&v| f64::from(v)));
            assert_abs_diff_eq!(mean, 0., epsilon = 1e-5);
            assert_abs_diff_eq!(std, 1., epsilon = 1e-5);
        }
    }

    assert!(matches!(
        AtlasOptions::new(source.path(), out.path()).convert(),
        Err(PrepError::OutputExists(_))
    ));
}

#[test]
fn incomplete_pair_is_skipped() {
    let source = tempdir().unwrap();
    let out = tempdir().unwrap();
    // cortical table without its subcortical counterpart
    write_table(&source.path().join(ATLAS_TABLES[0].0), 4, 6);
    write_table(&source.path().join(ATLAS_TABLES[3].0), 3, 6);

    let done = AtlasOptions::new(source.path(), out.path())
        .format(OutputFormat::NpyZst)
        .convert()
        .unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].path, out.path().join("roi360.npy.zst"));
    assert_eq!(stored_table(&done[0].path).dim(), (3, 6));
    assert!(!out.path().join("roi100.npy.zst").exists());
}

#[test]
fn atlas_source_must_be_a_directory() {
    let out = tempdir().unwrap();
    assert!(matches!(
        AtlasOptions::new(out.path().join("missing"), out.path()).convert(),
        Err(PrepError::InputNotFound(_))
    ));
    assert!(matches!(
        AtlasOptions::new(out.path(), out.path())
            .format(OutputFormat::Npz)
            .convert(),
        Err(PrepError::UnsupportedExtension(_))
    ));
}
