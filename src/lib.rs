//! Preparation of volumetric brain scans for model training.
//!
//! This crate reconciles scans of heterogeneous geometry onto a fixed
//! spatial shape, applies anatomical masks, normalizes intensities and
//! stores the results in compact, integrity checked containers readable
//! from NumPy (`.npy` / `.npz`, optionally wrapped in a zstd frame).
//!
//! The stages are available separately:
//!
//! - [`geometry`] plans the symmetric padding or cropping of each axis;
//! - [`reshape`] applies such a plan to a 3D or 4D volume;
//! - [`mask`] aligns a binary mask to a volume and zeroes excluded voxels;
//! - [`normalize`] provides the z-score strategies;
//! - [`npy`] and [`codec`] serialize and compress the results.
//!
//! The [`pipeline`] module composes them into whole conversions, reading
//! scans through the [`loader`] module.
//!
//! # Example
//!
//! ```
//! use ndarray::{Array, IxDyn};
//! use voxprep::{pad_crop, Codec, NpyArray, Payload, TargetGeometry};
//!
//! let volume = Array::<f64, _>::zeros(IxDyn(&[91, 109, 91, 2]));
//! let target = TargetGeometry::default();
//! let reshaped = pad_crop(&volume, &target, 0.)?;
//! assert_eq!(reshaped.shape(), &[96, 96, 96, 2]);
//!
//! let codec = Codec::default();
//! let payload = Payload::from(NpyArray::from(reshaped));
//! let container = codec.encode(&payload)?;
//! assert_eq!(codec.decode(&container)?, payload);
//! # Ok::<(), voxprep::PrepError>(())
//! ```
//!
//! [`geometry`]: ./geometry/index.html
//! [`reshape`]: ./reshape/index.html
//! [`mask`]: ./mask/index.html
//! [`normalize`]: ./normalize/index.html
//! [`npy`]: ./npy/index.html
//! [`codec`]: ./codec/index.html
//! [`pipeline`]: ./pipeline/index.html
//! [`loader`]: ./loader/index.html
#![deny(missing_debug_implementations)]
#![warn(missing_docs, unused_extern_crates, trivial_casts, unused_results)]

#[macro_use]
extern crate quick_error;

pub mod codec;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod mask;
pub mod normalize;
pub mod npy;
pub mod pipeline;
pub mod reshape;
pub mod roi;
pub mod writer;
mod util;

pub use crate::codec::{Codec, CodecOptions, Payload};
pub use crate::error::{PrepError, Result};
pub use crate::geometry::{plan_axis, plan_geometry, AxisMode, AxisPlan, TargetGeometry};
pub use crate::loader::{load_scan, Scan};
pub use crate::mask::{align_mask, apply_mask_inplace, mask_volume};
pub use crate::normalize::{
    nonzero_zscore, positive_zscore, zscore_rows, Normalization, NormalizationStats, Scaling,
};
pub use crate::npy::{Bundle, DType, NpyArray};
pub use crate::pipeline::{ConvertOptions, Precision, ProcessingType, SegmentOptions, StructuralOptions};
pub use crate::reshape::{pad_crop, Reshaper};
pub use crate::writer::{OutputFormat, WriterOptions};
