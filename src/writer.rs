//! Writing and reading of converted outputs.
//!
//! The kind of file produced is chosen from the output path's extension:
//!
//! | extension  | content                        |
//! |------------|--------------------------------|
//! | `.npy`     | one serialized array           |
//! | `.npy.zst` | one array in a zstd container  |
//! | `.npz`     | a serialized bundle            |
//! | `.npz.zst` | a bundle in a zstd container   |
//!
//! Everything is encoded in memory first, so that a failure never leaves a
//! partially written output behind.
use crate::codec::{Codec, CodecOptions, Payload, ZSTD_MAGIC};
use crate::error::{PrepError, Result};
use crate::util::{has_suffix, strip_suffix};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Recognized output extensions, longest first.
const EXTENSIONS: [&str; 4] = [".npy.zst", ".npz.zst", ".npy", ".npz"];

/// The kind of file written at a given path.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum OutputFormat {
    /// Plain `.npy` array.
    Npy,
    /// Compressed `.npy.zst` array.
    NpyZst,
    /// Plain `.npz` bundle.
    Npz,
    /// Compressed `.npz.zst` bundle.
    NpzZst,
}

impl OutputFormat {
    /// Determine the format from the extension of `path`.
    ///
    /// # Errors
    ///
    /// - `PrepError::UnsupportedExtension` if none of the known extensions
    ///   match.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = if has_suffix(path, ".npy.zst") {
            OutputFormat::NpyZst
        } else if has_suffix(path, ".npz.zst") {
            OutputFormat::NpzZst
        } else if has_suffix(path, ".npy") {
            OutputFormat::Npy
        } else if has_suffix(path, ".npz") {
            OutputFormat::Npz
        } else {
            return Err(PrepError::UnsupportedExtension(path.to_path_buf()));
        };
        Ok(format)
    }

    /// The file name suffix of this format.
    pub fn suffix(self) -> &'static str {
        match self {
            OutputFormat::Npy => ".npy",
            OutputFormat::NpyZst => ".npy.zst",
            OutputFormat::Npz => ".npz",
            OutputFormat::NpzZst => ".npz.zst",
        }
    }

    /// Whether the content is wrapped in a zstd container.
    pub fn is_compressed(self) -> bool {
        matches!(self, OutputFormat::NpyZst | OutputFormat::NpzZst)
    }

    /// Whether the content is a bundle rather than a single array.
    pub fn is_bundle(self) -> bool {
        matches!(self, OutputFormat::Npz | OutputFormat::NpzZst)
    }
}

/// Path of a file derived from `path`: its recognized extension (if any) is
/// replaced by `tail`.
///
/// ```
/// # use std::path::Path;
/// # use voxprep::writer::sidecar_path;
/// let stats = sidecar_path("out/sub-01.npy.zst", "_stats.npz.zst");
/// assert_eq!(stats, Path::new("out/sub-01_stats.npz.zst"));
/// ```
pub fn sidecar_path<P: AsRef<Path>>(path: P, tail: &str) -> PathBuf {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = strip_suffix(&name, &EXTENSIONS);
    path.with_file_name(format!("{}{}", stem, tail))
}

/// Options and flags which can be used to configure how an output is
/// written.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    /// Where to write the output.
    path: PathBuf,
    /// Settings of the compressed container, if the format calls for one.
    codec: CodecOptions,
    /// Whether to replace an existing file.
    force: bool,
}

impl WriterOptions {
    /// Creates a blank new set of options ready for configuration.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        WriterOptions {
            path: path.as_ref().to_path_buf(),
            codec: CodecOptions::default(),
            force: false,
        }
    }

    /// Sets the compression settings of the container.
    pub fn codec(mut self, options: CodecOptions) -> Self {
        self.codec = options;
        self
    }

    /// Whether an existing file at the output path may be replaced.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the output may be written, without touching the file
    /// system.
    ///
    /// # Errors
    ///
    /// - `PrepError::OutputExists` if the path exists and `force` is unset.
    /// - `PrepError::UnsupportedExtension` if the extension is not known.
    pub fn check(&self) -> Result<OutputFormat> {
        if !self.force && self.path.exists() {
            return Err(PrepError::OutputExists(self.path.clone()));
        }
        OutputFormat::from_path(&self.path)
    }

    /// Encode the payload and write it to the output path.
    ///
    /// # Errors
    ///
    /// Besides the errors of [`check`](#method.check), `PrepError::Format`
    /// is returned if an array is written to a bundle path or vice versa.
    pub fn write(&self, payload: &Payload) -> Result<()> {
        let format = self.check()?;
        match (format.is_bundle(), payload) {
            (false, Payload::Array(_)) | (true, Payload::Bundle(_)) => {}
            (false, Payload::Bundle(_)) => {
                return Err(PrepError::Format(format!(
                    "cannot write a bundle to {}",
                    self.path.display()
                )))
            }
            (true, Payload::Array(_)) => {
                return Err(PrepError::Format(format!(
                    "cannot write a single array to {}",
                    self.path.display()
                )))
            }
        }

        let bytes = if format.is_compressed() {
            Codec::new(self.codec).encode(payload)?
        } else {
            payload.to_bytes()?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(&self.path)?);
        writer.write_all(&bytes)?;
        writer.flush()?;
        log::info!("Wrote {} ({} bytes)", self.path.display(), bytes.len());
        Ok(())
    }
}

/// Read back a file written by this module. Compressed containers are
/// recognized by their content, not by their extension, and are verified
/// against the settings of `codec`.
pub fn read_payload<P: AsRef<Path>>(path: P, codec: &Codec) -> Result<Payload> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PrepError::InputNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    if bytes.starts_with(&ZSTD_MAGIC) {
        codec.decode(&bytes)
    } else {
        Payload::from_bytes(&bytes)
    }
}
