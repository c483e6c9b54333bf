//! Statistical utilities for the leak-free feature pipeline.
//!
//! This crate provides the small set of numeric tools the pipeline needs:
//!
//! - **Descriptive statistics**: mean, median, variance, standard deviation of a feature column
//! - **Percentiles**: nearest-rank percentiles, used for median null-filling
//! - **Population stability**: PSI between a reference and a comparison distribution
//! - **Calibration metrics**: Brier score, log loss, expected calibration error and ROC AUC
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`percentiles`]: Nearest-rank percentiles and the median
//! - [`psi`]: Population Stability Index with reference-quantile binning
//! - [`calibration`]: Probability quality metrics for binary outcomes
//!
//! # Examples
//!
//! ## Computing descriptive statistics
//!
//! ```
//! use asof_stats::descriptive::DescriptiveStats;
//!
//! let values = [1.0, 2.0, 3.0, 4.0, 5.0];
//! let stats = DescriptiveStats::new(values).unwrap();
//! assert_eq!(stats.mean, 3.0);
//! ```
//!
//! ## Computing the median used for `fill_median`
//!
//! ```
//! use asof_stats::percentiles::median;
//!
//! assert_eq!(median(&[4.0, 1.0, 3.0]), Some(3.0));
//! assert_eq!(median(&[]), None);
//! ```
//!
//! ## Measuring drift between two partitions
//!
//! ```
//! use asof_stats::psi::population_stability_index;
//!
//! let reference = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
//! let psi = population_stability_index(&reference, &reference, 10).unwrap();
//! assert!(psi.abs() < 1e-9);
//! ```

pub mod calibration;
pub mod descriptive;
pub mod percentiles;
pub mod psi;
