//! End to end conversions of scans into compressed arrays.
//!
//! Every conversion validates its invocation (input present, processing
//! type, output writable, output extension) before any data is loaded, then
//! runs the stages reshape, mask, normalize and encode in memory, and only
//! touches the file system once the outputs are fully encoded.
//!
//! Three conversions are provided:
//!
//! - [`ConvertOptions`]: one scan into one array, optionally masked and
//!   normalized, with a statistics bundle written alongside.
//! - [`SegmentOptions`]: a masked functional scan split into a leading and
//!   a trailing segment sharing the same scaling.
//! - [`StructuralOptions`]: a structural scan normalized over its positive
//!   voxels, with a CSV record of the statistics.
//!
//! [`ConvertOptions`]: ./struct.ConvertOptions.html
//! [`SegmentOptions`]: ./struct.SegmentOptions.html
//! [`StructuralOptions`]: ./struct.StructuralOptions.html
use crate::codec::{Codec, CodecOptions, Payload};
use crate::error::{PrepError, Result};
use crate::geometry::TargetGeometry;
use crate::loader::load_scan;
use crate::mask::mask_volume;
use crate::normalize::{Normalization, NormalizationStats, Scaling};
use crate::npy::{Bundle, NpyArray};
use crate::reshape::pad_crop;
use crate::util::has_suffix;
use crate::writer::{read_payload, sidecar_path, WriterOptions};
use half::f16;
use nalgebra::Matrix4;
use ndarray::{ArrayD, Axis, Slice};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Number of frames in each segment of a segmented conversion by default.
pub const DEFAULT_SEGMENT_FRAMES: usize = 40;

/// Suffix of the statistics bundle written next to a normalized output.
pub const STATS_BUNDLE_SUFFIX: &str = "_stats.npz.zst";

/// Suffix of the statistics table written next to a structural output.
pub const STATS_CSV_SUFFIX: &str = "_stats.csv";

/// How the loaded scan is shaped before storage.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum ProcessingType {
    /// Store the volume as loaded.
    TwoD,
    /// Pad or crop a 4D volume onto the target geometry.
    FourD,
}

impl FromStr for ProcessingType {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "2D" => Ok(ProcessingType::TwoD),
            "4D" => Ok(ProcessingType::FourD),
            other => Err(PrepError::UnsupportedType(other.to_string())),
        }
    }
}

impl fmt::Display for ProcessingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingType::TwoD => f.write_str("2D"),
            ProcessingType::FourD => f.write_str("4D"),
        }
    }
}

/// Element type of a stored volume.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum Precision {
    /// `float16`
    Half,
    /// `float32`
    Single,
    /// `float64`
    Double,
}

impl Precision {
    /// Cast a volume into this precision.
    pub fn cast(self, data: ArrayD<f64>) -> NpyArray {
        match self {
            Precision::Half => NpyArray::from(data.mapv(f16::from_f64)),
            Precision::Single => NpyArray::from(data.mapv(|v| v as f32)),
            Precision::Double => NpyArray::from(data),
        }
    }
}

/// Summary of a finished conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// Shape of the stored volume.
    pub shape: Vec<usize>,
    /// Statistics of the normalization, if one was performed.
    pub stats: Option<NormalizationStats>,
    /// Every file written, main output first.
    pub outputs: Vec<PathBuf>,
}

/// Fail with `PrepError::InputNotFound` unless `path` is a regular file.
pub fn check_input<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if path.is_file() {
        Ok(())
    } else {
        Err(PrepError::InputNotFound(path.to_path_buf()))
    }
}

/// Load a volume from a NIfTI scan, or from an array previously stored as
/// `.npy` or `.npy.zst` with the given codec settings. Only scans carry an
/// affine.
pub fn load_volume<P: AsRef<Path>>(
    path: P,
    codec: &Codec,
) -> Result<(ArrayD<f64>, Option<Matrix4<f64>>)> {
    let path = path.as_ref();
    if has_suffix(path, ".npy") || has_suffix(path, ".npy.zst") {
        let array = read_payload(path, codec)?.into_array()?;
        log::info!("Loaded {} with shape {:?}", path.display(), array.shape());
        Ok((array.to_f64(), None))
    } else {
        let scan = load_scan(path)?;
        Ok((scan.data, scan.affine))
    }
}

/// Read the scaling recorded in a statistics bundle.
pub fn read_scaling<P: AsRef<Path>>(path: P, codec: &Codec) -> Result<Scaling> {
    let bundle = read_payload(path, codec)?.into_bundle()?;
    Ok(Scaling::Supplied {
        mean: bundle.scalar("mean")?,
        std: bundle.scalar("std")?,
    })
}

fn stats_bundle(stats: &NormalizationStats) -> Bundle {
    Bundle::new()
        .with_scalar("mean", stats.mean)
        .with_scalar("std", stats.std)
}

fn apply_mask_file(
    volume: ArrayD<f64>,
    affine: Option<&Matrix4<f64>>,
    mask_path: &Path,
) -> Result<ArrayD<f64>> {
    let mask = load_scan(mask_path)?;
    if mask.same_space(affine) == Some(false) {
        log::warn!(
            "Mask {} is not in the same space as the volume",
            mask_path.display()
        );
    }
    mask_volume(volume, &mask.data)
}

fn require_four_axes(volume: &ArrayD<f64>) -> Result<()> {
    if volume.ndim() == 4 {
        Ok(())
    } else {
        Err(PrepError::Shape(format!(
            "expected 4D array (X, Y, Z, T), got shape {:?}",
            volume.shape()
        )))
    }
}

/// Append `tail` to the last component of `prefix`.
fn with_tail(prefix: &Path, tail: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(tail);
    PathBuf::from(name)
}

/// Options of a single scan conversion.
///
/// ```no_run
/// # use voxprep::pipeline::{ConvertOptions, ProcessingType};
/// let done = ConvertOptions::new("sub-01_bold.nii.gz", "sub-01.npy.zst", ProcessingType::FourD)
///     .mask("brain_mask.nii.gz")
///     .convert()?;
/// println!("stored {:?}", done.shape);
/// # Ok::<(), voxprep::PrepError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertOptions {
    input: PathBuf,
    output: PathBuf,
    kind: ProcessingType,
    target: TargetGeometry,
    fill: f64,
    mask: Option<PathBuf>,
    scaling: Option<Scaling>,
    precision: Precision,
    codec: CodecOptions,
    force: bool,
}

impl ConvertOptions {
    /// Convert `input` into `output`, with default settings otherwise.
    pub fn new<P, Q>(input: P, output: Q, kind: ProcessingType) -> Self
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        ConvertOptions {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            kind,
            target: TargetGeometry::default(),
            fill: 0.,
            mask: None,
            scaling: None,
            precision: Precision::Half,
            codec: CodecOptions::default(),
            force: false,
        }
    }

    /// Set the spatial shape of 4D outputs.
    pub fn target(mut self, target: TargetGeometry) -> Self {
        self.target = target;
        self
    }

    /// Set the intensity of padded voxels.
    pub fn fill_value(mut self, fill: f64) -> Self {
        self.fill = fill;
        self
    }

    /// Mask the volume with the scan at `path`. A masked volume is
    /// normalized over its nonzero voxels.
    pub fn mask<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.mask = Some(path.as_ref().to_path_buf());
        self
    }

    /// Normalize the nonzero voxels with the given scaling.
    pub fn scaling(mut self, scaling: Scaling) -> Self {
        self.scaling = Some(scaling);
        self
    }

    /// Set the element type of the stored volume.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set the compression settings.
    pub fn codec(mut self, codec: CodecOptions) -> Self {
        self.codec = codec;
        self
    }

    /// Whether existing outputs may be replaced.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn normalization(&self) -> Normalization {
        match (self.scaling, &self.mask) {
            (Some(scaling), _) => Normalization::Nonzero(scaling),
            (None, Some(_)) => Normalization::Nonzero(Scaling::Estimate),
            (None, None) => Normalization::Identity,
        }
    }

    /// Run the conversion.
    ///
    /// # Errors
    ///
    /// In order of verification:
    ///
    /// - `PrepError::InputNotFound` if the input or mask is missing.
    /// - `PrepError::OutputExists` if an output exists and `force` is unset.
    /// - `PrepError::UnsupportedExtension` if the output is not `.npy` or
    ///   `.npy.zst`.
    /// - `PrepError::Shape` if a 4D conversion is given another volume.
    pub fn convert(&self) -> Result<Conversion> {
        check_input(&self.input)?;
        if let Some(mask) = &self.mask {
            check_input(mask)?;
        }
        let normalization = self.normalization();
        let writer = WriterOptions::new(&self.output)
            .codec(self.codec)
            .force(self.force);
        if writer.check()?.is_bundle() {
            return Err(PrepError::UnsupportedExtension(self.output.clone()));
        }
        let stats_writer = match normalization {
            Normalization::Nonzero(_) => {
                let w = WriterOptions::new(sidecar_path(&self.output, STATS_BUNDLE_SUFFIX))
                    .codec(self.codec)
                    .force(self.force);
                let _ = w.check()?;
                Some(w)
            }
            _ => None,
        };

        let (mut volume, affine) = load_volume(&self.input, &Codec::new(self.codec))?;
        if self.kind == ProcessingType::FourD {
            require_four_axes(&volume)?;
            volume = pad_crop(&volume, &self.target, self.fill)?;
        }
        if let Some(mask) = &self.mask {
            volume = apply_mask_file(volume, affine.as_ref(), mask)?;
        }
        let normalized = normalization.apply(volume)?;

        let shape = normalized.data.shape().to_vec();
        let array = self.precision.cast(normalized.data);
        log::info!(
            "Data shape after processing: {:?}, size: {:.2} MiB",
            shape,
            array.nbytes() as f64 / (1024. * 1024.)
        );
        let payload = Payload::from(array);

        let stats_payload = match (&stats_writer, &normalized.stats) {
            (Some(_), Some(stats)) => Some(Payload::from(stats_bundle(stats))),
            _ => None,
        };

        writer.write(&payload)?;
        let mut outputs = vec![self.output.clone()];
        if let (Some(w), Some(p)) = (stats_writer, stats_payload) {
            w.write(&p)?;
            outputs.push(w.path().to_path_buf());
        }
        Ok(Conversion {
            shape,
            stats: normalized.stats,
            outputs,
        })
    }
}

/// Outcome of a segmented conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentConversion {
    /// The leading segment output.
    pub pre: PathBuf,
    /// The trailing segment output.
    pub post: PathBuf,
    /// The statistics bundle output.
    pub stats_path: PathBuf,
    /// Statistics estimated on the leading segment and applied to both.
    pub stats: NormalizationStats,
    /// Number of frames in each segment.
    pub frames: usize,
}

/// Options of a segmented functional conversion.
///
/// The time axis of a masked 4D volume is split into its first and last
/// `frames` time points. Statistics are estimated on the leading segment and
/// reused for the trailing one, so that both share the same scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOptions {
    input: PathBuf,
    mask: PathBuf,
    prefix: PathBuf,
    frames: usize,
    target: TargetGeometry,
    fill: f64,
    codec: CodecOptions,
    force: bool,
}

impl SegmentOptions {
    /// Segment `input` masked by `mask`, writing files starting with
    /// `prefix`.
    pub fn new<P, M, Q>(input: P, mask: M, prefix: Q) -> Self
    where
        P: AsRef<Path>,
        M: AsRef<Path>,
        Q: AsRef<Path>,
    {
        SegmentOptions {
            input: input.as_ref().to_path_buf(),
            mask: mask.as_ref().to_path_buf(),
            prefix: prefix.as_ref().to_path_buf(),
            frames: DEFAULT_SEGMENT_FRAMES,
            target: TargetGeometry::default(),
            fill: 0.,
            codec: CodecOptions::default(),
            force: false,
        }
    }

    /// Set the number of frames of each segment.
    pub fn frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    /// Set the spatial shape of the segments.
    pub fn target(mut self, target: TargetGeometry) -> Self {
        self.target = target;
        self
    }

    /// Set the intensity of padded voxels.
    pub fn fill_value(mut self, fill: f64) -> Self {
        self.fill = fill;
        self
    }

    /// Set the compression settings.
    pub fn codec(mut self, codec: CodecOptions) -> Self {
        self.codec = codec;
        self
    }

    /// Whether existing outputs may be replaced.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Paths of the leading segment, trailing segment and statistics
    /// outputs.
    pub fn output_paths(&self) -> (PathBuf, PathBuf, PathBuf) {
        (
            with_tail(&self.prefix, &format!("_pre{}_masked.npy.zst", self.frames)),
            with_tail(&self.prefix, &format!("_post{}_masked.npy.zst", self.frames)),
            with_tail(&self.prefix, STATS_BUNDLE_SUFFIX),
        )
    }

    /// Run the conversion.
    pub fn convert(&self) -> Result<SegmentConversion> {
        check_input(&self.input)?;
        check_input(&self.mask)?;
        if self.frames == 0 {
            return Err(PrepError::Shape("segments must hold at least one frame".to_string()));
        }
        let (pre_path, post_path, stats_path) = self.output_paths();
        let writers: Vec<WriterOptions> = [&pre_path, &post_path, &stats_path]
            .iter()
            .map(|p| WriterOptions::new(p).codec(self.codec).force(self.force))
            .collect();
        for w in &writers {
            let _ = w.check()?;
        }

        let (volume, affine) = load_volume(&self.input, &Codec::new(self.codec))?;
        require_four_axes(&volume)?;
        let volume = pad_crop(&volume, &self.target, self.fill)?;
        let volume = apply_mask_file(volume, affine.as_ref(), &self.mask)?;

        let time_points = volume.len_of(Axis(3));
        let n = if time_points < self.frames {
            log::warn!(
                "Volume has {} time points, fewer than the {} requested per segment",
                time_points,
                self.frames
            );
            time_points
        } else {
            self.frames
        };
        let pre = volume
            .slice_axis(Axis(3), Slice::from(..n))
            .to_owned();
        let post = volume
            .slice_axis(Axis(3), Slice::from(time_points - n..))
            .to_owned();
        drop(volume);

        let pre = Normalization::Nonzero(Scaling::Estimate).apply(pre)?;
        let stats = pre.stats.unwrap_or_else(NormalizationStats::identity);
        let post = Normalization::Nonzero(Scaling::from(stats)).apply(post)?;

        let payloads = [
            Payload::from(Precision::Half.cast(pre.data)),
            Payload::from(Precision::Half.cast(post.data)),
            Payload::from(stats_bundle(&stats)),
        ];
        for (w, p) in writers.iter().zip(payloads.iter()) {
            w.write(p)?;
        }
        Ok(SegmentConversion {
            pre: pre_path,
            post: post_path,
            stats_path,
            stats,
            frames: n,
        })
    }
}

/// Options of a structural scan conversion.
///
/// Negative voxels are clamped to zero and positive voxels are
/// standardized. The statistics are recorded in a CSV table next to the
/// output, with header `eid,Mean,Std,Var`.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralOptions {
    input: PathBuf,
    output: PathBuf,
    precision: Precision,
    codec: CodecOptions,
    force: bool,
}

impl StructuralOptions {
    /// Convert `input` into `output`.
    pub fn new<P, Q>(input: P, output: Q) -> Self
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        StructuralOptions {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            precision: Precision::Double,
            codec: CodecOptions::default(),
            force: false,
        }
    }

    /// Set the element type of the stored volume.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Set the compression settings.
    pub fn codec(mut self, codec: CodecOptions) -> Self {
        self.codec = codec;
        self
    }

    /// Whether existing outputs may be replaced.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Run the conversion.
    pub fn convert(&self) -> Result<Conversion> {
        check_input(&self.input)?;
        let writer = WriterOptions::new(&self.output)
            .codec(self.codec)
            .force(self.force);
        if writer.check()?.is_bundle() {
            return Err(PrepError::UnsupportedExtension(self.output.clone()));
        }
        let csv_path = sidecar_path(&self.output, STATS_CSV_SUFFIX);
        if !self.force && csv_path.exists() {
            return Err(PrepError::OutputExists(csv_path));
        }

        let scan = load_scan(&self.input)?;
        let normalized = Normalization::Positive.apply(scan.data)?;
        let shape = normalized.data.shape().to_vec();
        writer.write(&Payload::from(self.precision.cast(normalized.data)))?;

        let mut outputs = vec![self.output.clone()];
        match &normalized.stats {
            Some(stats) => {
                let eid = self
                    .output
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                write_stats_csv(&csv_path, &eid, stats)?;
                outputs.push(csv_path);
            }
            None => log::warn!("{} has no positive voxel", self.input.display()),
        }
        log::info!("Array shape: {:?}", shape);
        Ok(Conversion {
            shape,
            stats: normalized.stats,
            outputs,
        })
    }
}

/// Write a one-row statistics table with header `eid,Mean,Std,Var`.
pub fn write_stats_csv<P: AsRef<Path>>(path: P, eid: &str, stats: &NormalizationStats) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&["eid", "Mean", "Std", "Var"])?;
    writer.write_record(&[
        eid.to_string(),
        stats.mean.to_string(),
        stats.std.to_string(),
        stats.var.to_string(),
    ])?;
    writer.flush()?;
    Ok(())
}
