//! voxprep CLI: convert brain scans into normalized, compressed arrays.

use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use voxprep::pipeline::{check_input, read_scaling, DEFAULT_SEGMENT_FRAMES};
use voxprep::roi::{convert_roi_table, AtlasOptions};
use voxprep::writer::read_payload;
use voxprep::{
    Codec, CodecOptions, ConvertOptions, Payload, ProcessingType, Result, SegmentOptions,
    OutputFormat, StructuralOptions, TargetGeometry,
};

#[derive(Parser)]
#[command(name = "voxprep")]
#[command(about = "Pad, crop, mask, normalize and compress NIfTI brain volumes")]
#[command(version)]
struct Cli {
    /// Only report warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one scan into a .npy or .npy.zst array
    Convert {
        /// Type of scan to process (2D or 4D)
        #[arg(short = 't', long = "type")]
        kind: String,

        /// Input NIfTI file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (.npy or .npy.zst)
        #[arg(short, long)]
        output: PathBuf,

        /// Target shape of the first three axes
        #[arg(long = "target-xyz", num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [96, 96, 96])]
        target_xyz: Vec<usize>,

        /// Intensity of padded voxels
        #[arg(long = "fill-value", default_value_t = 0.)]
        fill_value: f64,

        /// Binary mask to apply before normalization
        #[arg(short, long)]
        mask: Option<PathBuf>,

        /// Statistics bundle of a previous conversion to normalize with
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Overwrite existing output files
        #[arg(short, long)]
        force: bool,
    },

    /// Mask a functional scan and store its leading and trailing segments
    Segments {
        /// Input functional scan (NIfTI, .npy or .npy.zst)
        input: PathBuf,

        /// Binary mask NIfTI file
        mask: PathBuf,

        /// Prefix of the output files
        output_prefix: PathBuf,

        /// Number of frames in each segment
        #[arg(long, default_value_t = DEFAULT_SEGMENT_FRAMES)]
        frames: usize,

        /// Target shape of the first three axes
        #[arg(long = "target-xyz", num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [96, 96, 96])]
        target_xyz: Vec<usize>,

        /// Overwrite existing output files
        #[arg(short, long)]
        force: bool,
    },

    /// Convert a structural scan, normalizing its positive voxels
    T1 {
        /// Input NIfTI file
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (.npy or .npy.zst)
        #[arg(short, long)]
        output: PathBuf,

        /// Overwrite existing output files
        #[arg(short, long)]
        force: bool,
    },

    /// Convert a ROI time series table (.csv or .csv.gz), or every atlas
    /// table of a directory
    Roi {
        /// Input table, one row per region, or a directory of atlas tables
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (.npy or .npy.zst), or output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Compress the outputs of a directory conversion
        #[arg(long)]
        zst: bool,

        /// Overwrite existing output files
        #[arg(short, long)]
        force: bool,
    },

    /// Describe the content of a converted file
    Inspect {
        /// File to describe
        path: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet { "warn" } else { "info" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(level));
    builder.format_timestamp_secs();
    builder.init();

    let result = match cli.command {
        Commands::Convert {
            kind,
            input,
            output,
            target_xyz,
            fill_value,
            mask,
            stats,
            force,
        } => cmd_convert(
            &kind,
            &input,
            &output,
            &target_xyz,
            fill_value,
            mask.as_deref(),
            stats.as_deref(),
            force,
        ),
        Commands::Segments {
            input,
            mask,
            output_prefix,
            frames,
            target_xyz,
            force,
        } => cmd_segments(&input, &mask, &output_prefix, frames, &target_xyz, force),
        Commands::T1 {
            input,
            output,
            force,
        } => cmd_t1(&input, &output, force),
        Commands::Roi {
            input,
            output,
            zst,
            force,
        } => cmd_roi(&input, &output, zst, force),
        Commands::Inspect { path } => cmd_inspect(&path),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn target_geometry(xyz: &[usize]) -> Result<TargetGeometry> {
    match *xyz {
        [x, y, z] => TargetGeometry::new(x, y, z),
        _ => TargetGeometry::from_shape(xyz),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_convert(
    kind: &str,
    input: &Path,
    output: &Path,
    target_xyz: &[usize],
    fill_value: f64,
    mask: Option<&Path>,
    stats: Option<&Path>,
    force: bool,
) -> Result<()> {
    info!("Processing input: {}", input.display());
    info!("Output path: {}", output.display());
    check_input(input)?;
    let kind: ProcessingType = kind.parse()?;

    let mut options = ConvertOptions::new(input, output, kind)
        .target(target_geometry(target_xyz)?)
        .fill_value(fill_value)
        .force(force);
    if let Some(mask) = mask {
        options = options.mask(mask);
    }
    if let Some(stats) = stats {
        options = options.scaling(read_scaling(stats, &Codec::default())?);
    }

    let done = options.convert()?;
    if let Some(stats) = done.stats {
        info!("Normalized with mean={}, std={}", stats.mean, stats.std);
    }
    for path in &done.outputs {
        info!("Successfully saved to: {}", path.display());
    }
    Ok(())
}

fn cmd_segments(
    input: &Path,
    mask: &Path,
    prefix: &Path,
    frames: usize,
    target_xyz: &[usize],
    force: bool,
) -> Result<()> {
    let done = SegmentOptions::new(input, mask, prefix)
        .frames(frames)
        .target(target_geometry(target_xyz)?)
        .force(force)
        .convert()?;
    info!(
        "Stored {} frames per segment in {} and {}, mean={}, std={}",
        done.frames,
        done.pre.display(),
        done.post.display(),
        done.stats.mean,
        done.stats.std
    );
    Ok(())
}

fn cmd_t1(input: &Path, output: &Path, force: bool) -> Result<()> {
    info!("Loading: {}", input.display());
    let done = StructuralOptions::new(input, output).force(force).convert()?;
    for path in &done.outputs {
        info!("Successfully saved to: {}", path.display());
    }
    Ok(())
}

fn cmd_roi(input: &Path, output: &Path, zst: bool, force: bool) -> Result<()> {
    if input.is_dir() {
        let format = if zst {
            OutputFormat::NpyZst
        } else {
            OutputFormat::Npy
        };
        let done = AtlasOptions::new(input, output)
            .format(format)
            .force(force)
            .convert()?;
        if done.is_empty() {
            warn!("No atlas table found in {}", input.display());
        }
        return Ok(());
    }
    let (rois, frames) = convert_roi_table(input, output, force)?;
    info!("Stored {} regions x {} time points", rois, frames);
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    // any well-formed frame, checksums are still verified when present
    let codec = Codec::new(CodecOptions::new().checksum(false).content_size(false));
    match read_payload(path, &codec)? {
        Payload::Array(array) => {
            println!(
                "{}: array of {} with shape {:?} ({} bytes)",
                path.display(),
                array.dtype().name(),
                array.shape(),
                array.nbytes()
            );
        }
        Payload::Bundle(bundle) => {
            println!("{}: bundle of {} members", path.display(), bundle.len());
            for (name, array) in &bundle {
                match array.scalar_value() {
                    Ok(value) if array.shape().is_empty() => println!("  {} = {}", name, value),
                    _ => println!(
                        "  {}: {} with shape {:?}",
                        name,
                        array.dtype().name(),
                        array.shape()
                    ),
                }
            }
        }
    }
    Ok(())
}
