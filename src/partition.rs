// 🔀 Record Partitioner - Split the batch into clustering lanes
// Excluded records bypass clustering entirely; geolocated records go to
// the spatial clusterer; everything else goes to the textual clusterer.

use crate::record::RawRecord;

/// Three disjoint index sets covering the whole batch, each in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPartition {
    /// exclusion_flag = true: become singleton units, never clustered
    pub excluded: Vec<usize>,

    /// Both coordinates present after normalization
    pub geolocated: Vec<usize>,

    /// No reliable spatial signal; clustered by name
    pub non_geolocated: Vec<usize>,
}

impl RecordPartition {
    pub fn total(&self) -> usize {
        self.excluded.len() + self.geolocated.len() + self.non_geolocated.len()
    }
}

/// Single-pass split of the normalized batch
pub fn partition_records(records: &[RawRecord]) -> RecordPartition {
    let mut partition = RecordPartition::default();

    for (index, record) in records.iter().enumerate() {
        if record.exclusion_flag {
            partition.excluded.push(index);
        } else if record.is_geolocated() {
            partition.geolocated.push(index);
        } else {
            partition.non_geolocated.push(index);
        }
    }

    partition
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::create_test_record;

    #[test]
    fn test_partition_covers_batch_in_order() {
        let mut records = vec![
            create_test_record("A", Some(3.4), Some(-76.5)),
            create_test_record("B", None, None),
            create_test_record("C", Some(3.5), Some(-76.6)),
            create_test_record("D", None, None),
        ];
        records[3].exclusion_flag = true;

        let partition = partition_records(&records);

        assert_eq!(partition.geolocated, vec![0, 2]);
        assert_eq!(partition.non_geolocated, vec![1]);
        assert_eq!(partition.excluded, vec![3]);
        assert_eq!(partition.total(), records.len());
    }

    #[test]
    fn test_exclusion_wins_over_coordinates() {
        let mut records = vec![create_test_record("A", Some(3.4), Some(-76.5))];
        records[0].exclusion_flag = true;

        let partition = partition_records(&records);

        assert_eq!(partition.excluded, vec![0]);
        assert!(partition.geolocated.is_empty());
    }

    #[test]
    fn test_half_null_pair_is_non_geolocated() {
        let mut records = vec![create_test_record("A", Some(3.4), None)];
        records[0].lon = None;

        let partition = partition_records(&records);
        assert_eq!(partition.non_geolocated, vec![0]);
    }

    #[test]
    fn test_empty_batch() {
        assert_eq!(partition_records(&[]), RecordPartition::default());
    }
}
