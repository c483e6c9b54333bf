use serde::{Deserialize, Serialize};

use crate::{DataError, Timestamp};

/// Pointer to one raw event that contributed to a feature row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventRef {
    pub stream: String,
    pub seq: usize,
    /// Timestamp of the event as seen by the extractor.
    pub event_ts: Timestamp,
}

/// Extracted features for one subject.
///
/// `values[i]` is the value of column `i` of the owning [`FeatureTable`].
/// `lineage` lists every event read while computing any of the values,
/// sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub subject_id: String,
    pub label: bool,
    pub cutoff_ts: Timestamp,
    pub values: Vec<f64>,
    #[serde(default)]
    pub lineage: Vec<EventRef>,
}

/// Feature rows sharing one column layout, ordered by subject id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Checks what a table read from disk must satisfy before it is indexed:
    /// every row has one value per column and ids are strictly ascending.
    pub fn check_shape(&self) -> Result<(), DataError> {
        let expected = self.columns.len();
        let mut previous: Option<&str> = None;
        for row in &self.rows {
            if row.values.len() != expected {
                return Err(DataError::RaggedRow {
                    subject_id: row.subject_id.clone(),
                    expected,
                    found: row.values.len(),
                });
            }
            if previous.is_some_and(|p| p >= row.subject_id.as_str()) {
                return Err(DataError::UnorderedRows {
                    subject_id: row.subject_id.clone(),
                });
            }
            previous = Some(row.subject_id.as_str());
        }
        Ok(())
    }

    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column in row order; `None` if any row lacks it.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        self.rows.iter().map(|r| r.values.get(idx).copied()).collect()
    }

    #[must_use]
    pub fn row(&self, subject_id: &str) -> Option<&FeatureRow> {
        self.rows
            .binary_search_by(|r| r.subject_id.as_str().cmp(subject_id))
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Value of `column` for `subject_id`.
    #[must_use]
    pub fn value(&self, subject_id: &str, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.row(subject_id).and_then(|r| r.values.get(idx).copied())
    }

    #[must_use]
    pub fn lineage_len(&self) -> usize {
        self.rows.iter().map(|r| r.lineage.len()).sum()
    }
}
