//! Key-value records.
use crate::error::MarlError;
use std::collections::{
    hash_map::{IntoIter, Iter},
    HashMap,
};

/// Possible values in a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordValue {
    /// A single value such as a loss or a reward.
    Scalar(f32),
}

/// A set of named values produced during training or evaluation.
#[derive(Debug, Default)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record with a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Inserts a value, overwriting the previous one with the same key.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the key-value pairs.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Returns a consuming iterator over the key-value pairs.
    pub fn into_iter_in_record(self) -> IntoIter<String, RecordValue> {
        self.0.into_iter()
    }

    /// Returns the scalar value of the given key.
    pub fn get_scalar(&self, k: &str) -> Result<f32, MarlError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            None => Err(MarlError::RecordKeyError(k.to_string())),
        }
    }

    /// Returns `true` if the record has no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_overwrites() {
        let mut record = Record::from_scalar("loss", 1.5);
        record.insert("loss", RecordValue::Scalar(2.0));
        record.insert("reward", RecordValue::Scalar(-1.0));
        assert_eq!(record.get_scalar("loss").unwrap(), 2.0);
        assert_eq!(record.iter().count(), 2);
        assert!(matches!(
            record.get_scalar("missing"),
            Err(MarlError::RecordKeyError(_))
        ));
    }
}
