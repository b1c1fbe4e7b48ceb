use super::{AggregateRecorder, Record, RecordStorage, Recorder};

/// Keeps records in memory.
///
/// Written records and records aggregated on [`AggregateRecorder::flush`]
/// are appended to the same buffer together with the step at which they
/// were flushed. Written records get the step of the latest flush.
#[derive(Default)]
pub struct BufferedRecorder {
    buf: Vec<(i64, Record)>,
    storage: RecordStorage,
    last_step: i64,
}

impl BufferedRecorder {
    /// Constructs the recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an iterator over the buffered records.
    pub fn iter(&self) -> impl Iterator<Item = &(i64, Record)> {
        self.buf.iter()
    }

    /// Returns the number of buffered records.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if no record has been buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.buf.push((self.last_step, record));
    }
}

impl AggregateRecorder for BufferedRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        self.last_step = step;
        let record = self.storage.aggregate();
        if !record.is_empty() {
            self.buf.push((step, record));
        }
    }
}
