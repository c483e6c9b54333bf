//! Seeded stratified down-sampling inside one partition.
//!
//! Every positive of the partition is kept; negatives are drawn without
//! replacement up to `negatives_per_positive` per positive. Candidates are
//! taken in subject-id order and the generator is seeded from the run seed
//! and the partition, so the same inputs always yield the same sample and
//! no subject ever moves between partitions.

use asof_data::LabelIndex;
use rand::{SeedableRng as _, seq::IndexedRandom as _};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::split::{Partition, SplitAssignment};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub negatives_per_positive: u32,
}

/// Sampled subject ids of one partition, sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub partition: Partition,
    pub positives: usize,
    pub negatives: usize,
    pub subject_ids: Vec<String>,
}

fn partition_stream(partition: Partition) -> u64 {
    match partition {
        Partition::Train => 0x7472_6169_6e00_0000,
        Partition::Validation => 0x7661_6c69_6400_0000,
        Partition::Excluded => 0x6578_636c_0000_0000,
    }
}

pub fn stratified_sample(
    subjects: &LabelIndex,
    assignment: &SplitAssignment,
    partition: Partition,
    config: SamplingConfig,
    seed: u64,
) -> Sample {
    let mut positives = Vec::new();
    let mut negatives = Vec::new();
    for id in assignment.ids(partition) {
        match subjects.get(id) {
            Some(s) if s.label => positives.push(id),
            Some(_) => negatives.push(id),
            None => {}
        }
    }

    let wanted = positives
        .len()
        .saturating_mul(config.negatives_per_positive as usize)
        .min(negatives.len());
    let mut rng = Pcg32::seed_from_u64(seed ^ partition_stream(partition));
    let drawn = negatives.choose_multiple(&mut rng, wanted).copied();

    let mut subject_ids = positives
        .iter()
        .copied()
        .chain(drawn)
        .map(str::to_owned)
        .collect::<Vec<_>>();
    subject_ids.sort();

    info!(
        ?partition,
        positives = positives.len(),
        negatives = wanted,
        available_negatives = negatives.len(),
        "stratified sample"
    );
    Sample {
        partition,
        positives: positives.len(),
        negatives: wanted,
        subject_ids,
    }
}

#[cfg(test)]
mod tests {
    use asof_data::{Subject, Timestamp};

    use super::*;
    use crate::split::split;

    fn fixture() -> (LabelIndex, SplitAssignment) {
        let early: Timestamp = "2016-06-01".parse().unwrap();
        let late: Timestamp = "2017-06-01".parse().unwrap();
        let subjects = LabelIndex::new((0..200).map(|i| Subject {
            subject_id: format!("s{i:03}"),
            label: i % 10 == 0,
            cutoff_ts: if i % 2 == 0 { early } else { late },
        }))
        .unwrap();
        let assignment = split(&subjects, "2017-01-01".parse().unwrap(), 30).unwrap();
        (subjects, assignment)
    }

    #[test]
    fn test_keeps_all_positives_and_caps_negatives() {
        let (subjects, assignment) = fixture();
        let sample = stratified_sample(
            &subjects,
            &assignment,
            Partition::Train,
            SamplingConfig {
                negatives_per_positive: 3,
            },
            42,
        );
        // train = even ids: 100 subjects, 20 of them positive (i % 10 == 0)
        assert_eq!(sample.positives, 20);
        assert_eq!(sample.negatives, 60);
        assert_eq!(sample.subject_ids.len(), 80);
        assert!(sample.subject_ids.is_sorted());
        for id in &sample.subject_ids {
            assert_eq!(assignment.partition(id), Some(Partition::Train));
        }
    }

    #[test]
    fn test_same_seed_same_sample() {
        let (subjects, assignment) = fixture();
        let config = SamplingConfig {
            negatives_per_positive: 1,
        };
        let a = stratified_sample(&subjects, &assignment, Partition::Train, config, 7);
        let b = stratified_sample(&subjects, &assignment, Partition::Train, config, 7);
        let c = stratified_sample(&subjects, &assignment, Partition::Train, config, 8);
        assert_eq!(a, b);
        assert_ne!(a.subject_ids, c.subject_ids);
    }

    #[test]
    fn test_validation_has_no_positives() {
        let (subjects, assignment) = fixture();
        let sample = stratified_sample(
            &subjects,
            &assignment,
            Partition::Validation,
            SamplingConfig {
                negatives_per_positive: 5,
            },
            1,
        );
        // odd ids are never positive, so nothing is drawn
        assert_eq!(sample.positives, 0);
        assert!(sample.subject_ids.is_empty());
    }
}
