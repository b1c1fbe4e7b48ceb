//! Aggregation of stored records.
use super::{Record, RecordValue};
use std::collections::HashMap;

/// Stores records and aggregates them.
///
/// Values of the same key are averaged.
#[derive(Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Aggregates the stored records into a single record and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut sums: HashMap<String, (f32, usize)> = HashMap::new();
        let mut out = Record::empty();

        for record in self.data.drain(..) {
            for (k, v) in record.into_iter_in_record() {
                let RecordValue::Scalar(x) = v;
                let e = sums.entry(k).or_insert((0.0, 0));
                e.0 += x;
                e.1 += 1;
            }
        }

        for (k, (sum, n)) in sums.into_iter() {
            out.insert(k, RecordValue::Scalar(sum / n as f32));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_mean_of_scalars() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_scalar("loss", 1.0));
        storage.store(Record::from_scalar("loss", 3.0));
        let mut record = Record::from_scalar("loss", 5.0);
        record.insert("reward", RecordValue::Scalar(2.0));
        storage.store(record);

        let record = storage.aggregate();
        assert_eq!(record.get_scalar("loss").unwrap(), 3.0);
        assert_eq!(record.get_scalar("reward").unwrap(), 2.0);
        assert!(storage.is_empty());
        assert!(storage.aggregate().is_empty());
    }
}
