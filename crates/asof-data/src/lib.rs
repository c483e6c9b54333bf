//! Core data model for point-in-time feature extraction.
//!
//! This crate holds the immutable records the pipeline reads and writes:
//!
//! - [`timestamp::Timestamp`]: UTC instant with lenient parsing (RFC 3339, `YYYY-MM-DD`, `YYYYMMDD`)
//! - [`subject::Subject`] and [`subject::LabelIndex`]: subjects with their label and cutoff
//! - [`labels::ChurnRule`]: churn labels built from a transactions stream
//! - [`event::RawEvent`], [`event::EventStream`] and [`event::EventStore`]: append-only raw event streams
//! - [`row::FeatureRow`] and [`row::FeatureTable`]: extracted features with per-row event lineage
//!
//! # Data Flow
//!
//! ```text
//! transactions ─► ChurnRule ─► subjects.json
//!
//! subjects.json ──► LabelIndex ─┐
//!                               ├─► extractor ─► FeatureTable (rows + lineage)
//! <stream>.jsonl ─► EventStore ─┘
//! ```
//!
//! Nothing in this crate mutates an event after it has been appended, and a
//! [`row::FeatureRow`] records the exact `(stream, seq)` of every event that
//! contributed to it so that the lineage can be re-checked independently.

pub mod event;
pub mod labels;
pub mod row;
pub mod subject;
pub mod timestamp;

pub use self::{
    event::{EventStore, EventStream, LoadReport, RawEvent},
    labels::{ChurnLabel, ChurnRule, LabelReport},
    row::{EventRef, FeatureRow, FeatureTable},
    subject::{LabelIndex, Subject},
    timestamp::Timestamp,
};

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum DataError {
    #[display("subject {subject_id} appears more than once")]
    DuplicateSubject { subject_id: String },
    #[display("stream {stream} is already loaded")]
    DuplicateStream { stream: String },
    #[display("row {subject_id} has {found} values for {expected} columns")]
    RaggedRow {
        subject_id: String,
        expected: usize,
        found: usize,
    },
    #[display("row {subject_id} is out of subject-id order")]
    UnorderedRows { subject_id: String },
}
