//! Binary heap merger.

use std::cmp::Ordering;
use std::io;

use crate::cursor::RunCursor;
use crate::scratch::ScratchReader;
use crate::sink::RecordSink;

/// Merge progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Init,
    Merging,
    Done,
    Failed,
}

/// Merge failure, split by the side that failed.
#[derive(Debug)]
pub enum MergeError {
    /// Scratch store read failure.
    Read(io::Error),
    /// Output sink write failure.
    Write(io::Error),
}

/// Binary heap merger over run cursors.
/// Merges multiple sorted runs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of records,
/// *n* is the number of runs.
///
/// The heap is ordered by the injected comparator applied to cursor heads; equal heads are ordered by run
/// index so records that compare equal are emitted in the order their runs were written.
pub struct RunMerger<F>
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    heap: Vec<RunCursor>,
    compare: F,
    state: MergeState,
    failed_on_write: bool,
}

impl<F> RunMerger<F>
where
    F: Fn(&[u8], &[u8]) -> Ordering,
{
    /// Creates a merger from freshly opened cursors. Exhausted cursors are dropped.
    ///
    /// # Arguments
    /// * `cursors` - Cursors positioned on the first record of their runs
    /// * `compare` - Function to be used to compare records
    pub fn new<I>(cursors: I, compare: F) -> Self
    where
        I: IntoIterator<Item = RunCursor>,
    {
        let mut merger = RunMerger {
            heap: Vec::from_iter(cursors.into_iter().filter(|cursor| !cursor.is_exhausted())),
            compare,
            state: MergeState::Init,
            failed_on_write: false,
        };
        merger.heapify();

        return merger;
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    /// Returns the number of runs that still have records.
    pub fn active_runs(&self) -> usize {
        self.heap.len()
    }

    /// Returns the smallest pending record, if any.
    pub fn peek(&self) -> Option<&[u8]> {
        self.heap.first().map(RunCursor::head)
    }

    /// Emits the smallest pending record to `sink` and advances its run.
    /// Returns `false` once every run has been consumed.
    pub fn step<S>(&mut self, source: &mut dyn ScratchReader, sink: &mut S) -> Result<bool, MergeError>
    where
        S: RecordSink + ?Sized,
    {
        match self.state {
            MergeState::Done => return Ok(false),
            MergeState::Failed => {
                let err = io::Error::new(io::ErrorKind::Other, "merge already failed");
                return Err(if self.failed_on_write {
                    MergeError::Write(err)
                } else {
                    MergeError::Read(err)
                });
            }
            MergeState::Init | MergeState::Merging => {}
        }

        let root = match self.heap.first_mut() {
            Some(root) => root,
            None => {
                self.state = MergeState::Done;
                return Ok(false);
            }
        };
        self.state = MergeState::Merging;

        if let Err(err) = sink.write_record(root.head()) {
            self.state = MergeState::Failed;
            self.failed_on_write = true;
            return Err(MergeError::Write(err));
        }
        if let Err(err) = root.advance(source) {
            self.state = MergeState::Failed;
            return Err(MergeError::Read(err));
        }

        if root.is_exhausted() {
            self.heap.swap_remove(0);
        }
        if !self.heap.is_empty() {
            self.sift_down(0);
        }

        return Ok(true);
    }

    /// Drains every run into `sink`. Returns the number of emitted records.
    pub fn merge_into<S>(&mut self, source: &mut dyn ScratchReader, sink: &mut S) -> Result<u64, MergeError>
    where
        S: RecordSink + ?Sized,
    {
        let mut emitted = 0;
        while self.step(source, sink)? {
            emitted += 1;
        }

        return Ok(emitted);
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (a, b) = (&self.heap[a], &self.heap[b]);
        match (self.compare)(a.head(), b.head()) {
            Ordering::Equal => a.run() < b.run(),
            ordering => ordering == Ordering::Less,
        }
    }

    fn heapify(&mut self) {
        for idx in (0..self.heap.len() / 2).rev() {
            self.sift_down(idx);
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut smallest = idx;

            if left < self.heap.len() && self.less(left, smallest) {
                smallest = left;
            }
            if right < self.heap.len() && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == idx {
                return;
            }

            self.heap.swap(idx, smallest);
            idx = smallest;
        }
    }
}
