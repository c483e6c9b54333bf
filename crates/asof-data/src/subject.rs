use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{DataError, Timestamp};

/// A labelled subject and the instant after which none of its data may be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub subject_id: String,
    /// Binary outcome; accepts `true`/`false` or `1`/`0` on input.
    #[serde(deserialize_with = "deserialize_label")]
    pub label: bool,
    pub cutoff_ts: Timestamp,
}

fn deserialize_label<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawLabel {
        Bool(bool),
        Int(i64),
    }

    match RawLabel::deserialize(deserializer)? {
        RawLabel::Bool(b) => Ok(b),
        RawLabel::Int(0) => Ok(false),
        RawLabel::Int(1) => Ok(true),
        RawLabel::Int(n) => Err(serde::de::Error::custom(format!(
            "invalid label: expected 0 or 1, got {n}"
        ))),
    }
}

/// Subjects keyed by id, iterated in id order.
///
/// Ordering by id keeps every downstream artifact independent of input order.
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    subjects: BTreeMap<String, Subject>,
}

impl LabelIndex {
    pub fn new<I>(subjects: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = Subject>,
    {
        let mut map = BTreeMap::new();
        for subject in subjects {
            if map.contains_key(&subject.subject_id) {
                return Err(DataError::DuplicateSubject {
                    subject_id: subject.subject_id,
                });
            }
            map.insert(subject.subject_id.clone(), subject);
        }
        Ok(Self { subjects: map })
    }

    #[must_use]
    pub fn get(&self, subject_id: &str) -> Option<&Subject> {
        self.subjects.get(subject_id)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Subject> + '_ {
        self.subjects.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    #[must_use]
    pub fn positives(&self) -> usize {
        self.subjects.values().filter(|s| s.label).count()
    }

    /// Earliest and latest cutoff, or `None` when empty.
    #[must_use]
    pub fn cutoff_range(&self) -> Option<(Timestamp, Timestamp)> {
        let min = self.subjects.values().map(|s| s.cutoff_ts).min()?;
        let max = self.subjects.values().map(|s| s.cutoff_ts).max()?;
        Some((min, max))
    }
}

impl<'a> IntoIterator for &'a LabelIndex {
    type Item = &'a Subject;
    type IntoIter = std::collections::btree_map::Values<'a, String, Subject>;

    fn into_iter(self) -> Self::IntoIter {
        self.subjects.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: &str, label: bool, cutoff: &str) -> Subject {
        Subject {
            subject_id: id.to_owned(),
            label,
            cutoff_ts: cutoff.parse().unwrap(),
        }
    }

    #[test]
    fn test_label_accepts_bool_and_int() {
        let json = r#"[
            {"subject_id": "a", "label": 1, "cutoff_ts": "2017-03-01"},
            {"subject_id": "b", "label": false, "cutoff_ts": 20170301}
        ]"#;
        let subjects: Vec<Subject> = serde_json::from_str(json).unwrap();
        assert!(subjects[0].label);
        assert!(!subjects[1].label);
        assert_eq!(subjects[0].cutoff_ts, subjects[1].cutoff_ts);
    }

    #[test]
    fn test_label_rejects_other_ints() {
        let json = r#"{"subject_id": "a", "label": 2, "cutoff_ts": "2017-03-01"}"#;
        assert!(serde_json::from_str::<Subject>(json).is_err());
    }

    #[test]
    fn test_index_orders_by_id_and_rejects_duplicates() {
        let index = LabelIndex::new([
            subject("b", true, "2017-02-01"),
            subject("a", false, "2017-01-01"),
        ])
        .unwrap();
        let ids = index.iter().map(|s| s.subject_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(index.positives(), 1);
        let (min, max) = index.cutoff_range().unwrap();
        assert_eq!(min.to_string(), "2017-01-01T00:00:00Z");
        assert_eq!(max.to_string(), "2017-02-01T00:00:00Z");

        let err = LabelIndex::new([
            subject("a", true, "2017-02-01"),
            subject("a", false, "2017-01-01"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            DataError::DuplicateSubject {
                subject_id: "a".to_owned()
            }
        );
    }
}
