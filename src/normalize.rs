//! Intensity normalization strategies.
//!
//! Three z-score flavours are provided, matching the needs of the different
//! conversions:
//!
//! - [`zscore_rows`]: each row of a `(units, samples)` matrix is
//!   standardized over its own samples. The denominator is guarded with an
//!   additive epsilon.
//! - [`nonzero_zscore`]: a whole array is standardized using the statistics
//!   of its nonzero entries, with zero entries left untouched. Statistics can
//!   be estimated from the data or supplied from a previous run, so that two
//!   related arrays share the exact same scaling. The variance is clamped to
//!   a floor instead.
//! - [`positive_zscore`]: negative voxels are clamped to zero and strictly
//!   positive voxels are standardized, as done for structural scans.
//!
//! The [`Normalization`] enum selects one of these at the call site.
//!
//! [`zscore_rows`]: ./fn.zscore_rows.html
//! [`nonzero_zscore`]: ./fn.nonzero_zscore.html
//! [`positive_zscore`]: ./fn.positive_zscore.html
//! [`Normalization`]: ./enum.Normalization.html
use crate::error::{PrepError, Result};
use half::f16;
use ndarray::{Array2, ArrayBase, ArrayD, Axis, Data, Dimension, Ix2, Zip};

/// Added to each row's standard deviation in [`zscore_rows`](fn.zscore_rows.html).
pub const TEMPORAL_EPSILON: f64 = 1e-8;

/// Lower bound of the variance in [`nonzero_zscore`](fn.nonzero_zscore.html).
pub const VARIANCE_FLOOR: f64 = 1e-8;

/// Summary statistics of the voxels selected for normalization.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NormalizationStats {
    /// Mean of the selected voxels.
    pub mean: f64,
    /// Standard deviation used as the divisor.
    pub std: f64,
    /// Variance of the selected voxels. Informational only.
    pub var: f64,
    /// Number of selected voxels.
    pub n: usize,
}

impl NormalizationStats {
    /// The statistics reported when no voxel qualifies for normalization.
    pub fn identity() -> Self {
        NormalizationStats {
            mean: 0.0,
            std: 1.0,
            var: 1.0,
            n: 0,
        }
    }
}

/// How the mean and standard deviation of a global normalization are
/// obtained.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Scaling {
    /// Compute them from the array being normalized.
    Estimate,
    /// Reuse statistics computed elsewhere, such as on another segment of
    /// the same scan.
    Supplied {
        /// The mean to subtract.
        mean: f64,
        /// The standard deviation to divide by.
        std: f64,
    },
}

impl Default for Scaling {
    fn default() -> Self {
        Scaling::Estimate
    }
}

impl From<NormalizationStats> for Scaling {
    fn from(stats: NormalizationStats) -> Self {
        Scaling::Supplied {
            mean: stats.mean,
            std: stats.std,
        }
    }
}

/// Standardize each row of `matrix` over its columns:
/// `(v - mean) / (std + TEMPORAL_EPSILON)`, where `std` is the population
/// standard deviation of the row. Constant rows become zero.
pub fn zscore_rows<S>(matrix: &ArrayBase<S, Ix2>) -> Array2<f64>
where
    S: Data<Elem = f64>,
{
    let mut out = matrix.to_owned();
    let n = matrix.ncols() as f64;
    if matrix.ncols() == 0 {
        return out;
    }
    for mut row in out.axis_iter_mut(Axis(0)) {
        let mean = row.sum() / n;
        let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let denom = var.sqrt() + TEMPORAL_EPSILON;
        row.mapv_inplace(|v| (v - mean) / denom);
    }
    out
}

/// Compute the statistics of the nonzero entries of `array`.
///
/// Both sums run over the entire array, which is valid because excluded
/// entries are exactly zero. The variance is clamped to `VARIANCE_FLOOR`
/// before the square root. Returns `None` when there is no nonzero entry.
pub fn nonzero_stats<A, S, D>(array: &ArrayBase<S, D>) -> Option<NormalizationStats>
where
    A: Copy + Into<f64>,
    S: Data<Elem = A>,
    D: Dimension,
{
    let mut n = 0usize;
    let mut sum = 0f64;
    let mut sum_sq = 0f64;
    for &v in array.iter() {
        let v: f64 = v.into();
        if v != 0. {
            n += 1;
        }
        sum += v;
        sum_sq += v * v;
    }
    if n == 0 {
        return None;
    }
    let mean = sum / n as f64;
    let var = (sum_sq / n as f64 - mean * mean).max(VARIANCE_FLOOR);
    Some(NormalizationStats {
        mean,
        std: var.sqrt(),
        var,
        n,
    })
}

/// The outcome of [`nonzero_zscore`](fn.nonzero_zscore.html).
#[derive(Debug, Clone, PartialEq)]
pub struct NonzeroZScore {
    /// The normalized array in half precision.
    pub data: ArrayD<f16>,
    /// The mean that was subtracted.
    pub mean: f64,
    /// The standard deviation that was divided by.
    pub std: f64,
}

fn nonzero_zscore_f64<A, S, D>(array: &ArrayBase<S, D>, scaling: Scaling) -> (ArrayD<f64>, NormalizationStats)
where
    A: Copy + Into<f64>,
    S: Data<Elem = A>,
    D: Dimension,
{
    let data = array.map(|&v| Into::<f64>::into(v)).into_dyn();
    let stats = match scaling {
        Scaling::Estimate => match nonzero_stats(&data) {
            Some(stats) => stats,
            None => return (data, NormalizationStats::identity()),
        },
        Scaling::Supplied { mean, std } => NormalizationStats {
            mean,
            std,
            var: std * std,
            n: data.iter().filter(|&&v| v != 0.).count(),
        },
    };
    let NormalizationStats { mean, std, .. } = stats;
    let data = data.mapv_into(|v| if v != 0. { (v - mean) / std } else { v });
    (data, stats)
}

/// Standardize the nonzero entries of `array` and store the result in half
/// precision. Zero entries remain exactly zero.
///
/// With `Scaling::Estimate` and no nonzero entry, the array is returned
/// unchanged with `mean = 0` and `std = 1`.
///
/// # Example
///
/// ```
/// # use ndarray::array;
/// # use voxprep::normalize::{nonzero_zscore, Scaling};
/// let out = nonzero_zscore(&array![0., 1., 3.], Scaling::Estimate);
/// assert_eq!(out.mean, 2.);
/// assert_eq!(out.data[[0]].to_f64(), 0.);
/// assert_eq!(out.data[[1]].to_f64(), -1.);
/// ```
pub fn nonzero_zscore<A, S, D>(array: &ArrayBase<S, D>, scaling: Scaling) -> NonzeroZScore
where
    A: Copy + Into<f64>,
    S: Data<Elem = A>,
    D: Dimension,
{
    let (data, stats) = nonzero_zscore_f64(array, scaling);
    NonzeroZScore {
        data: data.mapv(f16::from_f64),
        mean: stats.mean,
        std: stats.std,
    }
}

/// Clamp negative voxels to zero and standardize the strictly positive ones
/// by their own mean and population standard deviation.
///
/// Returns `None` for the statistics if no voxel is positive, in which case
/// the clamped array is returned as is.
pub fn positive_zscore<D>(mut array: ndarray::Array<f64, D>) -> (ndarray::Array<f64, D>, Option<NormalizationStats>)
where
    D: Dimension,
{
    array.mapv_inplace(|v| if v < 0. { 0. } else { v });

    let n = array.iter().filter(|&&v| v > 0.).count();
    if n == 0 {
        return (array, None);
    }
    let mean = array.iter().filter(|&&v| v > 0.).sum::<f64>() / n as f64;
    let var = array
        .iter()
        .filter(|&&v| v > 0.)
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / n as f64;
    let std = var.sqrt();
    // a constant region is only centered
    let denom = if std > 0. { std } else { 1. };
    Zip::from(&mut array).for_each(|v| {
        if *v > 0. {
            *v = (*v - mean) / denom;
        }
    });
    (array, Some(NormalizationStats { mean, std, var, n }))
}

/// Normalization strategy selected by a conversion.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Normalization {
    /// Leave intensities untouched.
    Identity,
    /// Per-row z-score of a `(units, samples)` matrix.
    Temporal,
    /// Global z-score of the nonzero entries.
    Nonzero(Scaling),
    /// Structural z-score of the strictly positive entries.
    Positive,
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::Identity
    }
}

/// An array after normalization, in double precision, with the statistics
/// that were used (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// The normalized values.
    pub data: ArrayD<f64>,
    /// The statistics applied to the array.
    pub stats: Option<NormalizationStats>,
}

impl Normalization {
    /// Apply this strategy to the given array.
    ///
    /// # Errors
    ///
    /// - `PrepError::Shape` if the temporal strategy is given an array which
    ///   is not 2-dimensional.
    pub fn apply(&self, array: ArrayD<f64>) -> Result<Normalized> {
        match *self {
            Normalization::Identity => Ok(Normalized {
                data: array,
                stats: None,
            }),
            Normalization::Temporal => {
                let matrix = array.into_dimensionality::<Ix2>().map_err(|_| {
                    PrepError::Shape("temporal z-score expects a (units, samples) matrix".to_string())
                })?;
                Ok(Normalized {
                    data: zscore_rows(&matrix).into_dyn(),
                    stats: None,
                })
            }
            Normalization::Nonzero(scaling) => {
                let (data, stats) = nonzero_zscore_f64(&array, scaling);
                log::debug!(
                    "Nonzero z-score over {} voxels: mean={}, std={}",
                    stats.n,
                    stats.mean,
                    stats.std
                );
                Ok(Normalized {
                    data,
                    stats: Some(stats),
                })
            }
            Normalization::Positive => {
                let (data, stats) = positive_zscore(array);
                if let Some(stats) = &stats {
                    log::debug!("Performing z-score normalization on {} positive voxels", stats.n);
                }
                Ok(Normalized { data, stats })
            }
        }
    }
}
