//! External sorter.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use crate::buffer::RunBuffer;
use crate::cursor::RunCursor;
use crate::merger::{MergeError, RunMerger};
use crate::run::{PushError, RunBuilder, RunLayout};
use crate::scratch::{ReadMode, ScratchReader, ScratchWriter};
use crate::sink::RecordSink;

/// Run buffer capacity used when none (or zero) is configured.
pub const DEFAULT_BUFFER_CAPACITY: usize = 2 * 1024 * 1024;

/// Scratch store read/write buffer size used when none is configured.
pub const DEFAULT_RW_BUF_SIZE: usize = 65 * 1024;

/// Sorting error.
#[derive(Debug)]
pub enum SortError<I: Error> {
    /// Scratch file creation or reopening error.
    Creation(io::Error),
    /// Run flushing or output writing error.
    Write(io::Error),
    /// Scratch data reading error, including truncated frames.
    Read(io::Error),
    /// Input data stream error.
    Input(I),
    /// Workers thread pool initialization error.
    ThreadPool(rayon::ThreadPoolBuildError),
    /// Zero-length input record.
    EmptyRecord { index: u64 },
    /// Input record that can not fit into an empty run buffer.
    RecordTooLarge { index: u64, len: usize, capacity: usize },
}

impl<I> Error for SortError<I>
where
    I: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Creation(err) => Some(err),
            SortError::Write(err) => Some(err),
            SortError::Read(err) => Some(err),
            SortError::Input(err) => Some(err),
            SortError::ThreadPool(err) => Some(err),
            SortError::EmptyRecord { .. } | SortError::RecordTooLarge { .. } => None,
        }
    }
}

impl<I: Error> Display for SortError<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Creation(err) => write!(f, "scratch file not created: {}", err),
            SortError::Write(err) => write!(f, "write operation failed: {}", err),
            SortError::Read(err) => write!(f, "scratch data read failed: {}", err),
            SortError::Input(err) => write!(f, "input data stream error: {}", err),
            SortError::ThreadPool(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::EmptyRecord { index } => {
                write!(f, "record #{} is empty, zero-length records are not supported", index)
            }
            SortError::RecordTooLarge { index, len, capacity } => write!(
                f,
                "record #{} of {} bytes does not fit into a {} bytes run buffer",
                index, len, capacity
            ),
        }
    }
}

impl<I: Error> From<MergeError> for SortError<I> {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::Read(err) => SortError::Read(err),
            MergeError::Write(err) => SortError::Write(err),
        }
    }
}

/// Summary of a completed sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Number of sorted records.
    pub records: u64,
    /// Number of runs written to the scratch store.
    pub runs: usize,
    /// Longest record length.
    pub max_record_len: usize,
    /// Scratch store size in bytes.
    pub scratch_bytes: u64,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Debug, Clone, Default)]
pub struct ExternalSorterBuilder {
    /// Run buffer capacity in bytes.
    buffer_capacity: usize,
    /// Whether to allocate the whole run buffer up front.
    preallocate: bool,
    /// Scratch file location, a temporary file is used if not set.
    scratch_path: Option<PathBuf>,
    /// Directory for the temporary scratch file.
    tmp_dir: Option<PathBuf>,
    /// Scratch file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Merge phase scratch access mode.
    read_mode: ReadMode,
    /// Number of threads used to sort runs.
    threads_number: Option<usize>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError<Infallible>> {
        ExternalSorter::new(
            self.buffer_capacity,
            self.preallocate,
            self.scratch_path,
            self.tmp_dir,
            self.rw_buf_size,
            self.read_mode,
            self.threads_number,
        )
    }

    /// Sets run buffer capacity in bytes. Zero selects [`DEFAULT_BUFFER_CAPACITY`].
    pub fn with_buffer_capacity(mut self, buffer_capacity: usize) -> ExternalSorterBuilder {
        self.buffer_capacity = buffer_capacity;
        return self;
    }

    /// Allocates the whole run buffer up front.
    pub fn with_preallocation(mut self, preallocate: bool) -> ExternalSorterBuilder {
        self.preallocate = preallocate;
        return self;
    }

    /// Sets scratch file path. The file is truncated and left on disk after sorting.
    pub fn with_scratch_path(mut self, path: &Path) -> ExternalSorterBuilder {
        self.scratch_path = Some(path.into());
        return self;
    }

    /// Sets directory to be used to store the temporary scratch file.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets scratch file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets merge phase scratch access mode.
    pub fn with_read_mode(mut self, read_mode: ReadMode) -> ExternalSorterBuilder {
        self.read_mode = read_mode;
        return self;
    }

    /// Sets number of threads to be used to sort runs.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }
}

/// External sorter.
pub struct ExternalSorter {
    /// Run sorting thread pool, runs are sorted on the calling thread if not set.
    thread_pool: Option<rayon::ThreadPool>,
    /// Run buffer capacity in bytes.
    buffer_capacity: usize,
    /// Whether to allocate the whole run buffer up front.
    preallocate: bool,
    /// Scratch file location.
    scratch_path: Option<PathBuf>,
    /// Directory for the temporary scratch file.
    tmp_dir: Option<PathBuf>,
    /// Scratch file read/write buffer size.
    rw_buf_size: usize,
    /// Merge phase scratch access mode.
    read_mode: ReadMode,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `buffer_capacity` - Run buffer capacity in bytes, zero selects [`DEFAULT_BUFFER_CAPACITY`].
    /// * `preallocate` - Allocate the whole run buffer up front.
    /// * `scratch_path` - Scratch file location. If the parameter is [`None`] a temporary file is created and
    ///   removed once sorting ends.
    /// * `tmp_dir` - Directory for the temporary scratch file. If the parameter is [`None`] default OS temporary
    ///   directory will be used.
    /// * `rw_buf_size` - Scratch file read/write buffer size.
    /// * `read_mode` - Merge phase scratch access mode.
    /// * `threads_number` - Number of threads to be used to sort runs. If the parameter is [`None`] or one runs
    ///   are sorted on the calling thread.
    pub fn new(
        buffer_capacity: usize,
        preallocate: bool,
        scratch_path: Option<PathBuf>,
        tmp_dir: Option<PathBuf>,
        rw_buf_size: Option<usize>,
        read_mode: ReadMode,
        threads_number: Option<usize>,
    ) -> Result<Self, SortError<Infallible>> {
        let buffer_capacity = if buffer_capacity == 0 {
            DEFAULT_BUFFER_CAPACITY
        } else {
            buffer_capacity
        };
        log::info!(
            "initializing external sorter (buffer: {} bytes, read mode: {:?})",
            buffer_capacity,
            read_mode
        );

        return Ok(ExternalSorter {
            thread_pool: Self::init_thread_pool(threads_number)?,
            buffer_capacity,
            preallocate,
            scratch_path,
            tmp_dir,
            rw_buf_size: rw_buf_size.unwrap_or(DEFAULT_RW_BUF_SIZE),
            read_mode,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<Option<rayon::ThreadPool>, SortError<Infallible>> {
        let threads_number = match threads_number {
            Some(threads_number) if threads_number > 1 => threads_number,
            _ => {
                log::info!("sorting runs on the calling thread");
                return Ok(None);
            }
        };

        log::info!("initializing thread-pool (threads: {})", threads_number);
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads_number)
            .build()
            .map_err(SortError::ThreadPool)?;

        return Ok(Some(thread_pool));
    }

    /// Returns the effective run buffer capacity in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    fn create_scratch<I: Error>(&self) -> Result<ScratchWriter, SortError<I>> {
        let scratch = match &self.scratch_path {
            Some(path) => ScratchWriter::create(path, self.rw_buf_size),
            None => ScratchWriter::create_temporary(self.tmp_dir.as_deref(), self.rw_buf_size),
        }
        .map_err(SortError::Creation)?;

        log::info!("using {} as a scratch file", scratch.path().display());

        return Ok(scratch);
    }

    /// Sorts records from the input byte-lexicographically and passes them to the sink.
    ///
    /// # Arguments
    /// * `input` - Input stream records to be fetched from
    /// * `sink` - Sorted records destination
    pub fn sort<R, E, S>(&self, input: impl IntoIterator<Item = Result<R, E>>, sink: &mut S) -> Result<SortStats, SortError<E>>
    where
        R: AsRef<[u8]>,
        E: Error,
        S: RecordSink + ?Sized,
    {
        self.sort_by(input, |a: &[u8], b: &[u8]| a.cmp(b), sink)
    }

    /// Sorts records from the input using a custom compare function and passes them to the sink.
    ///
    /// Records that compare equal are emitted in input order.
    ///
    /// # Arguments
    /// * `input` - Input stream records to be fetched from
    /// * `compare` - Function to be used to compare records
    /// * `sink` - Sorted records destination
    pub fn sort_by<R, E, F, S>(
        &self,
        input: impl IntoIterator<Item = Result<R, E>>,
        compare: F,
        sink: &mut S,
    ) -> Result<SortStats, SortError<E>>
    where
        R: AsRef<[u8]>,
        E: Error,
        F: Fn(&[u8], &[u8]) -> Ordering + Sync,
        S: RecordSink + ?Sized,
    {
        let scratch = self.create_scratch()?;
        let thread_pool = self.thread_pool.as_ref();

        let buffer = RunBuffer::new(self.buffer_capacity, self.preallocate);
        let mut builder = RunBuilder::new(buffer, scratch, &compare, thread_pool);

        for (index, item) in input.into_iter().enumerate() {
            let record = item.map_err(SortError::Input)?;
            let record = record.as_ref();
            let index = index as u64;

            builder.push(record).map_err(|err| match err {
                PushError::EmptyRecord => SortError::EmptyRecord { index },
                PushError::TooLarge { len, capacity } => SortError::RecordTooLarge { index, len, capacity },
                PushError::Write(err) => SortError::Write(err),
            })?;
        }

        let (scratch, layout) = builder.finish().map_err(SortError::Write)?;
        let RunLayout {
            offsets,
            max_record_len,
            records,
        } = layout;
        log::debug!("external sort preparation done ({} records, {} runs)", records, offsets.len());

        let stats = SortStats {
            records,
            runs: offsets.len(),
            max_record_len,
            scratch_bytes: scratch.len(),
        };

        if offsets.is_empty() {
            sink.flush().map_err(SortError::Write)?;
            return Ok(stats);
        }

        let head_buffers = offsets.len().saturating_mul(max_record_len);
        if head_buffers > self.buffer_capacity {
            log::warn!(
                "merge phase holds {} runs with records up to {} bytes, {} bytes of head buffers exceed the {} bytes run buffer",
                offsets.len(),
                max_record_len,
                head_buffers,
                self.buffer_capacity
            );
        }

        let mut source = scratch.open(self.read_mode, self.rw_buf_size).map_err(SortError::Creation)?;
        self.merge_runs(source.as_mut(), offsets, max_record_len, &compare, sink)?;

        return Ok(stats);
    }

    fn merge_runs<E, F, S>(
        &self,
        source: &mut dyn ScratchReader,
        offsets: Vec<u64>,
        max_record_len: usize,
        compare: F,
        sink: &mut S,
    ) -> Result<u64, SortError<E>>
    where
        E: Error,
        F: Fn(&[u8], &[u8]) -> Ordering,
        S: RecordSink + ?Sized,
    {
        let mut cursors = Vec::with_capacity(offsets.len());
        for (run, start) in offsets.into_iter().enumerate() {
            cursors.push(RunCursor::open(run, start, max_record_len, source).map_err(SortError::Read)?);
        }

        let mut merger = RunMerger::new(cursors, compare);
        log::debug!("merging {} runs", merger.active_runs());

        let emitted = merger.merge_into(source, sink)?;
        sink.flush().map_err(SortError::Write)?;
        log::debug!("merge done ({} records emitted)", emitted);

        return Ok(emitted);
    }
}
