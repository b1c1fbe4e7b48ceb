//! Writes training metrics as TFRecord for Tensorboard.
use log::trace;
use marl_core::record::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Writes records to TFRecord.
///
/// The tag of a value is the key of the record, e.g. `agent_0/critic_loss`.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    storage: RecordStorage,
    step: i64,
}

impl TensorboardRecorder {
    /// Constructs a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            storage: RecordStorage::new(),
            step: 0,
        }
    }

    fn write_at(&mut self, record: Record, step: i64) {
        let step = step.max(0) as usize;
        for (k, v) in record.iter() {
            let RecordValue::Scalar(v) = v;
            self.writer.add_scalar(k, *v, step);
        }
        trace!("Wrote a record at step {}", step);
    }
}

impl Recorder for TensorboardRecorder {
    /// Writes a [`Record`] at the step of the latest flush.
    fn write(&mut self, record: Record) {
        self.write_at(record, self.step);
    }
}

impl AggregateRecorder for TensorboardRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        self.step = step;
        let record = self.storage.aggregate();
        self.write_at(record, step);
        self.writer.flush();
    }
}
