//! Evaluation protocol for point-in-time feature tables.
//!
//! - [`split`]: purged temporal train/validation split around one boundary
//! - [`folds`]: walk-forward folds built on the same purge rule
//! - [`sampling`]: seeded stratified sampling inside a partition
//! - [`audit`]: independent leakage and split verification
//! - [`probability`]: the `[0, 1]` contract for model outputs
//! - [`drift`]: per-feature PSI between partitions
//!
//! ```
//! use asof_data::Subject;
//! use asof_eval::{Partition, split};
//!
//! let subject = |id: &str, cutoff: &str| Subject {
//!     subject_id: id.to_owned(),
//!     label: false,
//!     cutoff_ts: cutoff.parse().unwrap(),
//! };
//! let subjects = [
//!     subject("a", "2017-01-15"),
//!     subject("b", "2017-02-05"),
//!     subject("c", "2017-02-20"),
//! ];
//! let assignment = split(&subjects, "2017-02-01".parse().unwrap(), 10).unwrap();
//! assert_eq!(assignment.partition("a"), Some(Partition::Train));
//! assert_eq!(assignment.partition("b"), Some(Partition::Excluded));
//! assert_eq!(assignment.partition("c"), Some(Partition::Validation));
//! ```

pub mod audit;
pub mod drift;
pub mod folds;
pub mod probability;
pub mod sampling;
pub mod split;

pub use self::{
    audit::{AuditReport, LeakKind, LeakageError, OffendingEvent, audit_leakage, audit_split},
    drift::{FeatureDrift, HIGH_DRIFT_THRESHOLD, drift_report},
    folds::{Fold, FoldMode, walk_forward},
    probability::{ProbabilityRangeError, validate_probabilities},
    sampling::{Sample, SamplingConfig, stratified_sample},
    split::{Partition, PartitionCounts, SplitAssignment, SplitError, split},
};
