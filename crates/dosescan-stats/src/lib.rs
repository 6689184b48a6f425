//! Order statistics and distribution summaries for dose-response analysis.
//!
//! This crate provides the numeric building blocks used to summarize samples
//! for plotting and comparison:
//!
//! - **Descriptive statistics**: mean, median, sample variance and standard deviation
//! - **Quartiles**: split-median (Tukey hinge) quartiles and IQR fences
//! - **Percentiles**: nearest-rank percentiles and fixed-rank lookups
//! - **Kernel density**: Gaussian KDE on a fixed grid for violin shapes
//! - **Distribution summaries**: everything above combined into one value
//!
//! # Modules
//!
//! - [`descriptive`]: Descriptive statistics for summarizing datasets
//! - [`quartiles`]: Quartiles, outlier and far-out fences
//! - [`percentiles`]: Nearest-rank percentile and rank extraction
//! - [`density`]: Kernel density estimation
//! - [`distribution`]: Per-group distribution summaries
//!
//! # Examples
//!
//! ## Summarizing a sample
//!
//! ```
//! use dosescan_stats::distribution::{DistributionSummary, SummaryOptions};
//!
//! let values = [0.8, 1.1, 1.3, 1.9, 2.4, 2.5, 3.1, 9.7];
//! let summary = DistributionSummary::summarize(values, &SummaryOptions::default()).unwrap();
//! assert!(summary.q1 <= summary.median && summary.median <= summary.q3);
//! assert_eq!(summary.outliers, vec![9.7]);
//! ```
//!
//! ## Computing quartiles
//!
//! ```
//! use dosescan_stats::quartiles::Quartiles;
//!
//! let quartiles = Quartiles::from_sorted(&[1.0, 2.0, 3.0, 4.0]).unwrap();
//! assert_eq!(quartiles.iqr(), 2.0);
//! ```

pub use self::error::StatsError;

pub mod density;
pub mod descriptive;
pub mod distribution;
mod error;
pub mod percentiles;
pub mod quartiles;
