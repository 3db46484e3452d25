//! `ext-byte-sort` is an external sort for opaque, variable-length byte records.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts runs of records that each fit into a bounded buffer, during the second pass it merges the
//! sorted runs together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Content agnostic:**
//!   records are raw byte slices, ordering is defined solely by the caller supplied comparator.
//! * **Bounded memory:**
//!   runs are built in a buffer of a configured byte capacity and written to a single scratch file
//!   using a simple length-prefixed framing (see [`frame`]).
//! * **Memory-mapped merge:**
//!   runs are merged through a binary heap of per-run cursors reading the scratch file by offset,
//!   either memory-mapped or through buffered seek+read.
//! * **Stable:**
//!   records comparing equal are emitted in input order.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io::{self, prelude::*};
//! use std::path;
//!
//! use ext_byte_sort::{ExternalSorterBuilder, WriteSink};
//!
//! fn main() {
//!     let mut input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
//!     let mut sink = WriteSink::new(io::BufWriter::new(fs::File::create("output.txt").unwrap()));
//!
//!     let sorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_buffer_capacity(50 * 1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     let lines = std::iter::from_fn(|| {
//!         let mut line = Vec::new();
//!         match input_reader.read_until(b'\n', &mut line) {
//!             Ok(0) => None,
//!             Ok(_) => Some(Ok(line)),
//!             Err(err) => Some(Err(err)),
//!         }
//!     });
//!
//!     sorter.sort(lines, &mut sink).unwrap();
//! }
//! ```

pub mod buffer;
pub mod cursor;
pub mod frame;
pub mod merger;
pub mod run;
pub mod scratch;
pub mod sink;
pub mod sort;

pub use buffer::{Append, RunBuffer};
pub use cursor::RunCursor;
pub use merger::{MergeState, RunMerger};
pub use run::{RunBuilder, RunLayout};
pub use scratch::{ReadMode, ScratchReader};
pub use sink::{RecordSink, WriteSink};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortStats};
