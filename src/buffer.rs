//! Bounded run buffer.

use std::cmp::Ordering;
use std::io;
use std::ops::Range;

use rayon::slice::ParallelSliceMut;

use crate::frame;

/// Outcome of an attempt to place a record into a [`RunBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    /// The record was copied into the buffer.
    Accepted,
    /// The buffer has no room left for the record; flush it and retry.
    Full,
    /// The record can never fit, even into an empty buffer.
    Oversized,
}

/// Run buffer limited by the encoded size of its content.
///
/// Records are kept already framed in a single arena, so a flushed run is a sequence of slices of that
/// arena in comparator order. Capacity accounting always reserves room for the closing sentinel.
pub struct RunBuffer {
    capacity: usize,
    arena: Vec<u8>,
    /// Frame ranges within the arena (length prefix included).
    frames: Vec<Range<usize>>,
}

impl RunBuffer {
    /// Creates a new run buffer.
    ///
    /// # Arguments
    /// * `capacity` - Maximum encoded size of a run, sentinel included
    /// * `preallocate` - Reserve the whole capacity up front instead of growing on demand
    pub fn new(capacity: usize, preallocate: bool) -> Self {
        RunBuffer {
            capacity,
            arena: if preallocate { Vec::with_capacity(capacity) } else { Vec::new() },
            frames: Vec::new(),
        }
    }

    /// Returns the configured capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the encoded size of the buffered run, sentinel included.
    pub fn run_size(&self) -> usize {
        self.arena.len() + frame::LEN_SIZE
    }

    /// Returns the number of buffered records.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Checks whether a record of `record_len` bytes fits into an empty buffer.
    pub fn admits(&self, record_len: usize) -> bool {
        record_len <= frame::MAX_RECORD_LEN
            && frame::frame_len(record_len) + frame::LEN_SIZE <= self.capacity
    }

    /// Tries to copy a record into the buffer.
    ///
    /// Zero-length records must be rejected by the caller; the frame codec refuses them.
    pub fn append(&mut self, record: &[u8]) -> io::Result<Append> {
        if !self.admits(record.len()) {
            return Ok(Append::Oversized);
        }
        if self.run_size() + frame::frame_len(record.len()) > self.capacity {
            return Ok(Append::Full);
        }

        let start = self.arena.len();
        frame::encode_into(&mut self.arena, record)?;
        self.frames.push(start..self.arena.len());

        return Ok(Append::Accepted);
    }

    /// Sorts buffered records on the calling thread with a stable sort.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let arena = &self.arena;
        self.frames.sort_by(|a, b| compare(payload(arena, a), payload(arena, b)));
    }

    /// Sorts buffered records on the current rayon thread pool with a stable sort.
    pub fn par_sort_by<F>(&mut self, compare: F)
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Sync,
    {
        let arena = &self.arena;
        self.frames.par_sort_by(|a, b| compare(payload(arena, a), payload(arena, b)));
    }

    /// Iterates over the encoded frames in their current order.
    pub fn frames(&self) -> impl Iterator<Item = &[u8]> {
        self.frames.iter().map(move |range| &self.arena[range.clone()])
    }

    /// Iterates over the record payloads in their current order.
    pub fn records(&self) -> impl Iterator<Item = &[u8]> {
        self.frames().map(|encoded| &encoded[frame::LEN_SIZE..])
    }

    /// Drops buffered records, keeping the allocated memory.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.frames.clear();
    }
}

fn payload<'a>(arena: &'a [u8], range: &Range<usize>) -> &'a [u8] {
    &arena[range.start + frame::LEN_SIZE..range.end]
}
