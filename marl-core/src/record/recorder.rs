use super::Record;

/// Writes a record to an output destination.
pub trait Recorder {
    /// Writes a record.
    fn write(&mut self, record: Record);
}

/// Stores records and writes values aggregated over them.
pub trait AggregateRecorder {
    /// Stores a record.
    fn store(&mut self, record: Record);

    /// Writes values aggregated from the stored records and clears them.
    ///
    /// `step` is the x-axis of the written values, typically the number of
    /// updates.
    fn flush(&mut self, step: i64);
}
