//! Run generation.

use std::cmp::Ordering;
use std::io;

use crate::buffer::{Append, RunBuffer};
use crate::scratch::{ScratchFile, ScratchWriter};

/// Reason a record was refused by [`RunBuilder::push`].
#[derive(Debug)]
pub enum PushError {
    /// Zero-length records collide with the run-end sentinel.
    EmptyRecord,
    /// The record does not fit into an empty run buffer.
    TooLarge { len: usize, capacity: usize },
    /// Flushing a run to the scratch store failed.
    Write(io::Error),
}

/// Layout of the runs written during the write phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunLayout {
    /// Start offset of every run, in write order.
    pub offsets: Vec<u64>,
    /// Longest record seen over the whole input.
    pub max_record_len: usize,
    /// Total number of records.
    pub records: u64,
}

/// Turns a record stream into sorted, bounded runs appended to a scratch store.
pub struct RunBuilder<'a, F>
where
    F: Fn(&[u8], &[u8]) -> Ordering + Sync,
{
    buffer: RunBuffer,
    scratch: ScratchWriter,
    compare: F,
    layout: RunLayout,
    thread_pool: Option<&'a rayon::ThreadPool>,
}

impl<'a, F> RunBuilder<'a, F>
where
    F: Fn(&[u8], &[u8]) -> Ordering + Sync,
{
    /// Creates a run builder writing to `scratch`.
    /// Runs are sorted on `thread_pool` if given, otherwise on the calling thread.
    pub fn new(
        buffer: RunBuffer,
        scratch: ScratchWriter,
        compare: F,
        thread_pool: Option<&'a rayon::ThreadPool>,
    ) -> Self {
        RunBuilder {
            buffer,
            scratch,
            compare,
            layout: RunLayout::default(),
            thread_pool,
        }
    }

    /// Adds a record, flushing the current run first if the record does not fit.
    pub fn push(&mut self, record: &[u8]) -> Result<(), PushError> {
        if record.is_empty() {
            return Err(PushError::EmptyRecord);
        }

        let mut appended = self.buffer.append(record).map_err(PushError::Write)?;
        if appended == Append::Full {
            self.flush().map_err(PushError::Write)?;
            appended = self.buffer.append(record).map_err(PushError::Write)?;
        }

        match appended {
            Append::Accepted => {
                self.layout.max_record_len = self.layout.max_record_len.max(record.len());
                self.layout.records += 1;
                Ok(())
            }
            Append::Full | Append::Oversized => Err(PushError::TooLarge {
                len: record.len(),
                capacity: self.buffer.capacity(),
            }),
        }
    }

    /// Sorts the buffered records and appends them to the scratch store as one run.
    /// Does nothing if the buffer is empty.
    pub fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let start = self.scratch.position();
        log::debug!(
            "flushing run {} ({} records, {} bytes) at offset {}",
            self.layout.offsets.len(),
            self.buffer.len(),
            self.buffer.run_size(),
            start
        );

        let buffer = &mut self.buffer;
        let compare = &self.compare;
        match self.thread_pool {
            Some(thread_pool) => thread_pool.install(|| buffer.par_sort_by(compare)),
            None => buffer.sort_by(compare),
        }

        for frame in self.buffer.frames() {
            self.scratch.append(frame)?;
        }
        self.scratch.append_sentinel()?;

        self.layout.offsets.push(start);
        self.buffer.clear();

        return Ok(());
    }

    /// Flushes the last run and closes the scratch store for writing.
    pub fn finish(mut self) -> io::Result<(ScratchFile, RunLayout)> {
        self.flush()?;
        let scratch = self.scratch.finish()?;

        return Ok((scratch, self.layout));
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{PushError, RunBuilder, RunLayout};
    use crate::buffer::RunBuffer;
    use crate::frame;
    use crate::scratch::ScratchWriter;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn builder(tmp_dir: &tempfile::TempDir, capacity: usize) -> RunBuilder<'static, impl Fn(&[u8], &[u8]) -> std::cmp::Ordering + Sync> {
        let scratch = ScratchWriter::create(&tmp_dir.path().join("scratch.bin"), 64).unwrap();
        RunBuilder::new(RunBuffer::new(capacity, false), scratch, |a: &[u8], b: &[u8]| a.cmp(b), None)
    }

    #[rstest]
    fn test_two_records_per_run(tmp_dir: tempfile::TempDir) {
        let mut builder = builder(&tmp_dir, 2 * 7 + 4);
        for record in [b"30\n", b"10\n", b"20\n", b"05\n"] {
            builder.push(record).unwrap();
        }

        let (scratch, layout) = builder.finish().unwrap();

        assert_eq!(
            layout,
            RunLayout {
                offsets: vec![0, 18],
                max_record_len: 3,
                records: 4,
            }
        );

        let mut expected: Vec<u8> = Vec::new();
        for run in [[b"10\n", b"30\n"], [b"05\n", b"20\n"]] {
            for record in run {
                frame::encode(&mut expected, record).unwrap();
            }
            frame::encode_sentinel(&mut expected).unwrap();
        }
        assert_eq!(std::fs::read(scratch.path()).unwrap(), expected);
    }

    #[rstest]
    fn test_empty_input(tmp_dir: tempfile::TempDir) {
        let (scratch, layout) = builder(&tmp_dir, 64).finish().unwrap();

        assert!(scratch.is_empty());
        assert_eq!(layout, RunLayout::default());
    }

    #[rstest]
    fn test_rejected_records(tmp_dir: tempfile::TempDir) {
        let mut builder = builder(&tmp_dir, 16);
        builder.push(b"abc").unwrap();

        assert!(matches!(builder.push(b""), Err(PushError::EmptyRecord)));
        assert!(matches!(
            builder.push(&[b'x'; 9]),
            Err(PushError::TooLarge { len: 9, capacity: 16 })
        ));

        let (_, layout) = builder.finish().unwrap();
        assert_eq!(layout.offsets, vec![0]);
        assert_eq!(layout.records, 1);
    }
}
