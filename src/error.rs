//! Types for error handling go here.
use std::io::Error as IOError;
use std::path::PathBuf;

use nifti::NiftiError;

quick_error! {
    /// Error type for all fallible operations in this crate.
    #[derive(Debug)]
    pub enum PrepError {
        /// The input scan does not exist or is not a regular file.
        InputNotFound(path: PathBuf) {
            display("Input path {} is not a valid file", path.display())
        }
        /// The requested processing type is not recognized.
        UnsupportedType(name: String) {
            display("Type {} is not supported", name)
        }
        /// The output path already exists and overwriting was not requested.
        OutputExists(path: PathBuf) {
            display("Output file {} already exists", path.display())
        }
        /// The output path does not carry a recognized extension.
        UnsupportedExtension(path: PathBuf) {
            display("Output file {} must have .npy, .npy.zst, .npz or .npz.zst extension", path.display())
        }
        /// The volume does not have the number of axes required by the operation.
        Shape(msg: String) {
            display("Shape error: {}", msg)
        }
        /// The aligned mask does not cover the volume's spatial shape.
        GeometryMismatch(mask: Vec<usize>, volume: Vec<usize>) {
            display("Mask shape {:?} does not match volume spatial shape {:?}", mask, volume)
        }
        /// The compressed container failed its integrity checks.
        Integrity(msg: String) {
            display("Corrupted container: {}", msg)
        }
        /// Malformed serialized array, bundle or table.
        Format(msg: String) {
            display("Invalid format: {}", msg)
        }
        /// An array was requested with an element type other than the stored one.
        Dtype(expected: &'static str, found: &'static str) {
            display("Expected array of dtype {}, found {}", expected, found)
        }
        /// Failure reported by the NIfTI reader.
        Nifti(err: NiftiError) {
            from()
            source(err)
            display("NIfTI error: {}", err)
        }
        /// Failure reading or writing a CSV record.
        Csv(err: csv::Error) {
            from()
            source(err)
            display("CSV error: {}", err)
        }
        /// Failure reading or writing a bundle archive.
        Zip(err: zip::result::ZipError) {
            from()
            source(err)
            display("Bundle archive error: {}", err)
        }
        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
            display("I/O error: {}", err)
        }
    }
}

/// Alias type for results originating from this crate.
pub type Result<T> = ::std::result::Result<T, PrepError>;
