//! Conversion of ROI time series tables.
//!
//! A table holds one row per region of interest and one column per time
//! point, preceded by a header row and an index column, both of which are
//! discarded. Tables may be gzip compressed (`.csv.gz`).
//!
//! A single table is converted with [`convert_roi_table`], and the atlas
//! tables of a whole export directory with [`AtlasOptions`].
//!
//! [`convert_roi_table`]: ./fn.convert_roi_table.html
//! [`AtlasOptions`]: ./struct.AtlasOptions.html
use crate::codec::Payload;
use crate::error::{PrepError, Result};
use crate::normalize::Normalization;
use crate::npy::NpyArray;
use crate::pipeline::Precision;
use crate::util::is_gz_file;
use crate::writer::{OutputFormat, WriterOptions};
use flate2::read::GzDecoder;
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Read a `(regions, time points)` table of intensities from CSV data.
///
/// # Errors
///
/// - `PrepError::Format` if a cell is not a number or the table has no
///   data rows or columns.
/// - `PrepError::Csv` if rows have unequal lengths.
pub fn read_roi_table<R: Read>(source: R) -> Result<Array2<f64>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let mut values = Vec::new();
    let mut rows = 0;
    let mut cols = 0;
    for record in reader.records() {
        let record = record?;
        let row = record
            .iter()
            .skip(1)
            .map(|cell| {
                cell.parse::<f64>().map_err(|_| {
                    PrepError::Format(format!("invalid value `{}` in row {}", cell, rows + 1))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        cols = row.len();
        values.extend(row);
        rows += 1;
    }
    if rows == 0 || cols == 0 {
        return Err(PrepError::Format("ROI table has no data".to_string()));
    }
    Array2::from_shape_vec((rows, cols), values).map_err(|e| PrepError::Format(e.to_string()))
}

/// Read a ROI table from a `.csv` or `.csv.gz` file.
pub fn load_roi_table<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PrepError::InputNotFound(path.to_path_buf()));
    }
    let file = BufReader::new(File::open(path)?);
    if is_gz_file(path) {
        read_roi_table(GzDecoder::new(file))
    } else {
        read_roi_table(file)
    }
}

fn normalize_table(table: Array2<f64>) -> Result<NpyArray> {
    let normalized = Normalization::Temporal.apply(table.into_dyn())?;
    Ok(Precision::Single.cast(normalized.data))
}

/// Standardize each region's time series of a table and write the result
/// as a single precision array.
///
/// Returns the shape of the written array.
pub fn convert_roi_table<P, Q>(input: P, output: Q, force: bool) -> Result<(usize, usize)>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let input = input.as_ref();
    if !input.is_file() {
        return Err(PrepError::InputNotFound(input.to_path_buf()));
    }
    let writer = WriterOptions::new(output).force(force);
    if writer.check()?.is_bundle() {
        return Err(PrepError::UnsupportedExtension(writer.path().to_path_buf()));
    }

    let table = load_roi_table(input)?;
    let dim = table.dim();
    log::info!(
        "{} regions over {} time points from {}",
        dim.0,
        dim.1,
        input.display()
    );
    writer.write(&Payload::from(normalize_table(table)?))?;
    Ok(dim)
}

/// The atlas tables of a subject's export and the name of each output.
///
/// The first two are a cortical and a subcortical parcellation which are
/// only converted together.
pub const ATLAS_TABLES: [(&str, &str); 4] = [
    ("fMRI.Schaefer17n100p.csv.gz", "roi100"),
    ("fMRI.Tian_Subcortex_S3_3T.csv.gz", "roi50"),
    ("fMRI.Schaefer17n400p.csv.gz", "roi400"),
    ("fMRI.Glasser.csv.gz", "roi360"),
];

/// One table converted by an [`AtlasOptions`](struct.AtlasOptions.html)
/// batch.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasOutput {
    /// The written array.
    pub path: PathBuf,
    /// Number of regions and time points.
    pub shape: (usize, usize),
}

/// Options of the conversion of every atlas table found in a directory.
///
/// Each table of [`ATLAS_TABLES`](constant.ATLAS_TABLES.html) present in
/// the source directory is written to the output directory under its
/// output name. Missing tables are skipped with a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasOptions {
    source: PathBuf,
    output_dir: PathBuf,
    format: OutputFormat,
    force: bool,
}

impl AtlasOptions {
    /// Convert the tables of `source` into `output_dir`, as `.npy` files.
    pub fn new<P, Q>(source: P, output_dir: Q) -> Self
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        AtlasOptions {
            source: source.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            format: OutputFormat::Npy,
            force: false,
        }
    }

    /// Set the format of the outputs. Must be an array format.
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Whether existing outputs may be replaced.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The tables to convert, with their output paths.
    fn plan(&self) -> Vec<(PathBuf, PathBuf)> {
        let found = |table: &str| self.source.join(table).is_file();
        let tables: &[(&str, &str)] = &ATLAS_TABLES;
        let (paired, single) = tables.split_at(2);
        let paired_found = paired.iter().all(|(table, _)| found(*table));
        if !paired_found {
            log::warn!(
                "{} and {} are converted together, skipping both",
                paired[0].0,
                paired[1].0
            );
        }
        paired
            .iter()
            .filter(|_| paired_found)
            .chain(single.iter().filter(|(table, _)| {
                let present = found(*table);
                if !present {
                    log::warn!("{} not found in {}", table, self.source.display());
                }
                present
            }))
            .map(|(table, name)| {
                (
                    self.source.join(table),
                    self.output_dir.join(format!("{}{}", name, self.format.suffix())),
                )
            })
            .collect()
    }

    /// Run the conversion.
    ///
    /// # Errors
    ///
    /// - `PrepError::InputNotFound` if the source is not a directory.
    /// - `PrepError::UnsupportedExtension` if the format is a bundle.
    /// - `PrepError::OutputExists` if an output exists and `force` is unset,
    ///   before any table is read.
    pub fn convert(&self) -> Result<Vec<AtlasOutput>> {
        if !self.source.is_dir() {
            return Err(PrepError::InputNotFound(self.source.clone()));
        }
        if self.format.is_bundle() {
            return Err(PrepError::UnsupportedExtension(
                self.output_dir.join(format!("roi{}", self.format.suffix())),
            ));
        }
        let jobs: Vec<(PathBuf, WriterOptions)> = self
            .plan()
            .into_iter()
            .map(|(table, output)| (table, WriterOptions::new(output).force(self.force)))
            .collect();
        for (_, writer) in &jobs {
            let _ = writer.check()?;
        }

        let mut outputs = Vec::with_capacity(jobs.len());
        for (table, writer) in &jobs {
            let data = load_roi_table(table)?;
            let shape = data.dim();
            writer.write(&Payload::from(normalize_table(data)?))?;
            log::info!("Saved {}, shape {:?}", writer.path().display(), shape);
            outputs.push(AtlasOutput {
                path: writer.path().to_path_buf(),
                shape,
            });
        }
        Ok(outputs)
    }
}
