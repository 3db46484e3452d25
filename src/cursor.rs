//! Per-run read state.

use std::io;

use crate::scratch::ScratchReader;

/// Read cursor over a single run of the scratch store.
///
/// While the cursor is not exhausted `head` holds the run's smallest unconsumed record.
/// The head buffer is owned by the cursor and overwritten in place on every read.
#[derive(Debug)]
pub struct RunCursor {
    run: usize,
    offset: u64,
    head: Vec<u8>,
    exhausted: bool,
}

impl RunCursor {
    /// Opens a cursor positioned on the first record of a run.
    ///
    /// # Arguments
    /// * `run` - Run index, in the order runs were written
    /// * `start` - Absolute offset of the run's first frame
    /// * `head_capacity` - Initial head buffer capacity, usually the longest record length
    /// * `source` - Scratch store reader
    pub fn open(run: usize, start: u64, head_capacity: usize, source: &mut dyn ScratchReader) -> io::Result<Self> {
        let mut cursor = RunCursor {
            run,
            offset: start,
            head: Vec::with_capacity(head_capacity),
            exhausted: false,
        };
        cursor.advance(source)?;

        return Ok(cursor);
    }

    /// Reads the next record of the run into `head`.
    ///
    /// Reaching the run-end sentinel marks the cursor exhausted; further calls are no-ops.
    pub fn advance(&mut self, source: &mut dyn ScratchReader) -> io::Result<()> {
        if self.exhausted {
            return Ok(());
        }

        match source.read_frame(self.offset, &mut self.head)? {
            Some(frame_len) => self.offset += frame_len,
            None => {
                log::trace!("run {} exhausted at offset {}", self.run, self.offset);
                self.exhausted = true;
                self.head.clear();
            }
        }

        return Ok(());
    }

    pub fn run(&self) -> usize {
        self.run
    }

    /// Absolute offset of the next unread frame.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
