//! Scratch store: a single append-only file holding all runs back-to-back.

use std::fs;
use std::io::{self, prelude::*, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tempfile::TempPath;

use crate::frame;

/// Scratch file random access strategy used during the merge phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Memory-map the scratch file.
    #[default]
    Mmap,
    /// Seek and read through a buffered file handle.
    Buffered,
}

/// Scratch file location. Temporary files are removed when dropped.
#[derive(Debug)]
enum Location {
    Persistent(PathBuf),
    Temporary(TempPath),
}

impl Location {
    fn path(&self) -> &Path {
        match self {
            Location::Persistent(path) => path,
            Location::Temporary(path) => path,
        }
    }
}

/// Write side of the scratch store. Only appends, never seeks.
pub struct ScratchWriter {
    // dropped before `location`: the handle is flushed and closed before a temporary path is unlinked
    writer: io::BufWriter<fs::File>,
    location: Location,
    written: u64,
}

impl ScratchWriter {
    /// Creates (truncating) the scratch file at `path`. The file is left on disk afterwards.
    pub fn create(path: &Path, buf_size: usize) -> io::Result<Self> {
        let file = fs::File::create(path)?;
        return Ok(Self::with_file(Location::Persistent(path.into()), file, buf_size));
    }

    /// Creates an anonymous scratch file in `dir`, or in the OS temporary directory.
    pub fn create_temporary(dir: Option<&Path>, buf_size: usize) -> io::Result<Self> {
        let tmp_file = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir),
            None => tempfile::NamedTempFile::new(),
        }?;
        let (file, path) = tmp_file.into_parts();

        return Ok(Self::with_file(Location::Temporary(path), file, buf_size));
    }

    fn with_file(location: Location, file: fs::File, buf_size: usize) -> Self {
        log::debug!("scratch store created at {}", location.path().display());
        ScratchWriter {
            writer: io::BufWriter::with_capacity(buf_size, file),
            location,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        self.location.path()
    }

    /// Current end of the scratch data, i.e. the offset of the next appended byte.
    pub fn position(&self) -> u64 {
        self.written
    }

    /// Appends raw, already framed bytes.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.written += bytes.len() as u64;
        return Ok(());
    }

    /// Appends the run-end sentinel.
    pub fn append_sentinel(&mut self) -> io::Result<()> {
        self.append(&frame::SENTINEL)
    }

    /// Flushes buffered data and closes the write handle, ending the write phase.
    pub fn finish(self) -> io::Result<ScratchFile> {
        let file = self.writer.into_inner().map_err(|err| err.into_error())?;
        file.sync_data()?;
        drop(file);

        return Ok(ScratchFile {
            location: self.location,
            len: self.written,
        });
    }
}

/// Scratch store between the write and the read phase.
#[derive(Debug)]
pub struct ScratchFile {
    location: Location,
    len: u64,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        self.location.path()
    }

    /// Total size of the scratch data in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reopens the store read-only for random access.
    pub fn open(self, mode: ReadMode, buf_size: usize) -> io::Result<Box<dyn ScratchReader>> {
        let file = fs::File::open(self.location.path())?;
        let reader: Box<dyn ScratchReader> = match mode {
            ReadMode::Mmap => Box::new(MmapScratch::new(self.location, &file)?),
            ReadMode::Buffered => Box::new(FileScratch::new(self.location, file, buf_size)),
        };

        return Ok(reader);
    }
}

/// Random access to frames of a finished scratch store.
pub trait ScratchReader {
    /// Reads the frame starting at `offset` into `buf`, overwriting it.
    ///
    /// Returns the encoded frame size, or `None` if the frame is a run-end sentinel.
    fn read_frame(&mut self, offset: u64, buf: &mut Vec<u8>) -> io::Result<Option<u64>>;
}

/// Memory-mapped scratch store reader.
pub struct MmapScratch {
    map: Mmap,
    _location: Location,
}

impl MmapScratch {
    fn new(location: Location, file: &fs::File) -> io::Result<Self> {
        // SAFETY: the scratch file is exclusively owned by the running sort and no longer written.
        let map = unsafe { Mmap::map(file)? };
        #[cfg(unix)]
        {
            let _ = map.advise(memmap2::Advice::Random);
        }

        return Ok(MmapScratch {
            map,
            _location: location,
        });
    }
}

impl ScratchReader for MmapScratch {
    fn read_frame(&mut self, offset: u64, buf: &mut Vec<u8>) -> io::Result<Option<u64>> {
        let offset = usize::try_from(offset).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflow"))?;
        match frame::decode_at(&self.map, offset)? {
            Some(record) => {
                buf.clear();
                buf.extend_from_slice(record);
                Ok(Some(frame::frame_len(record.len()) as u64))
            }
            None => Ok(None),
        }
    }
}

/// Buffered seek+read scratch store reader.
///
/// The reader tracks its logical position, so a frame that starts inside the buffered window is read without
/// discarding the buffer.
pub struct FileScratch<R = fs::File> {
    reader: io::BufReader<R>,
    position: Option<u64>,
    _location: Location,
}

impl<R: Read + Seek> FileScratch<R> {
    fn new(location: Location, inner: R, buf_size: usize) -> Self {
        FileScratch {
            reader: io::BufReader::with_capacity(buf_size, inner),
            position: None,
            _location: location,
        }
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        // position is unknown until the next frame is fully read
        match self.position.take() {
            Some(position) if position == offset => {}
            Some(position) => self.reader.seek_relative(offset as i64 - position as i64)?,
            None => {
                self.reader.seek(SeekFrom::Start(offset))?;
            }
        }

        return Ok(());
    }
}

impl<R: Read + Seek> ScratchReader for FileScratch<R> {
    fn read_frame(&mut self, offset: u64, buf: &mut Vec<u8>) -> io::Result<Option<u64>> {
        self.seek_to(offset)?;
        let frame_len = match frame::decode(&mut self.reader, buf)? {
            frame::Decoded::Record(len) => Some(frame::frame_len(len) as u64),
            frame::Decoded::EndOfRun => None,
        };
        self.position = Some(offset + frame_len.unwrap_or(frame::LEN_SIZE as u64));

        return Ok(frame_len);
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;
    use std::io::{self, prelude::*, SeekFrom};
    use std::path::PathBuf;
    use std::rc::Rc;

    use rstest::*;

    use super::{FileScratch, Location, ReadMode, ScratchReader, ScratchWriter};
    use crate::frame;

    /// Counts bytes pulled from the wrapped reader.
    struct CountingReader {
        inner: io::Cursor<Vec<u8>>,
        pulled: Rc<Cell<usize>>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let read = self.inner.read(buf)?;
            self.pulled.set(self.pulled.get() + read);
            Ok(read)
        }
    }

    impl Seek for CountingReader {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn framed(records: &[&[u8]]) -> Vec<u8> {
        let mut bytes: Vec<u8> = Vec::new();
        for record in records {
            frame::encode_into(&mut bytes, record).unwrap();
        }
        bytes
    }

    #[rstest]
    #[case(ReadMode::Mmap)]
    #[case(ReadMode::Buffered)]
    fn test_scratch_round_trip(tmp_dir: tempfile::TempDir, #[case] mode: ReadMode) {
        let mut writer = ScratchWriter::create_temporary(Some(tmp_dir.path()), 16).unwrap();
        writer.append(&framed(&[&b"05\n"[..], b"20\n"])).unwrap();
        writer.append_sentinel().unwrap();
        let second_run = writer.position();
        writer.append(&framed(&[&b"1"[..]])).unwrap();
        writer.append_sentinel().unwrap();

        let scratch = writer.finish().unwrap();
        assert_eq!(scratch.len(), 7 + 7 + 4 + 5 + 4);
        assert_eq!(second_run, 18);

        let mut reader = scratch.open(mode, 16).unwrap();
        let mut buf: Vec<u8> = Vec::new();

        assert_eq!(reader.read_frame(second_run, &mut buf).unwrap(), Some(5));
        assert_eq!(buf, b"1");
        assert_eq!(reader.read_frame(0, &mut buf).unwrap(), Some(7));
        assert_eq!(buf, b"05\n");
        assert_eq!(reader.read_frame(7, &mut buf).unwrap(), Some(7));
        assert_eq!(buf, b"20\n");
        assert_eq!(reader.read_frame(14, &mut buf).unwrap(), None);
    }

    #[rstest]
    #[case(ReadMode::Mmap)]
    #[case(ReadMode::Buffered)]
    fn test_scratch_truncated_frame(tmp_dir: tempfile::TempDir, #[case] mode: ReadMode) {
        let mut writer = ScratchWriter::create(&tmp_dir.path().join("scratch.bin"), 16).unwrap();
        writer.append(&[9, 0, 0, 0, b'a']).unwrap();

        let mut reader = writer.finish().unwrap().open(mode, 16).unwrap();
        let err = reader.read_frame(0, &mut Vec::new()).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[rstest]
    fn test_temporary_scratch_removed(tmp_dir: tempfile::TempDir) {
        let mut writer = ScratchWriter::create_temporary(Some(tmp_dir.path()), 16).unwrap();
        writer.append_sentinel().unwrap();
        let path = writer.path().to_path_buf();

        let reader = writer.finish().unwrap().open(ReadMode::Mmap, 16).unwrap();
        assert!(path.exists());

        drop(reader);
        assert!(!path.exists());
    }

    #[rstest]
    fn test_persistent_scratch_kept(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("scratch.bin");
        std::fs::write(&path, b"stale content").unwrap();

        let mut writer = ScratchWriter::create(&path, 16).unwrap();
        writer.append_sentinel().unwrap();
        drop(writer.finish().unwrap().open(ReadMode::Buffered, 16).unwrap());

        assert_eq!(std::fs::read(&path).unwrap(), frame::SENTINEL);
    }

    #[test]
    fn test_buffered_scratch_keeps_buffer() {
        let records = Vec::from_iter((0..100u32).map(|n| format!("{:015}\n", n).into_bytes()));
        let mut image: Vec<u8> = Vec::new();
        for record in &records {
            frame::encode(&mut image, record).unwrap();
        }
        frame::encode_sentinel(&mut image).unwrap();
        let image_len = image.len();

        let pulled = Rc::new(Cell::new(0));
        let inner = CountingReader {
            inner: io::Cursor::new(image),
            pulled: pulled.clone(),
        };
        let mut reader = FileScratch::new(Location::Persistent(PathBuf::new()), inner, 256);
        let mut buf: Vec<u8> = Vec::new();

        let mut offset = 0;
        for record in &records {
            offset += reader.read_frame(offset, &mut buf).unwrap().unwrap();
            assert_eq!(&buf, record);
        }
        assert_eq!(reader.read_frame(offset, &mut buf).unwrap(), None);
        // every byte is pulled exactly once on a sequential walk
        assert_eq!(pulled.get(), image_len);

        // the last frame is still buffered
        let last = offset - 20;
        assert_eq!(reader.read_frame(last, &mut buf).unwrap(), Some(20));
        assert_eq!(&buf, &records[99]);
        assert_eq!(pulled.get(), image_len);

        // jumping outside the window refills once
        assert_eq!(reader.read_frame(0, &mut buf).unwrap(), Some(20));
        assert_eq!(&buf, &records[0]);
        assert_eq!(pulled.get(), image_len + 256);
    }

    #[rstest]
    fn test_buffered_scratch_recovers_after_error(tmp_dir: tempfile::TempDir) {
        let mut writer = ScratchWriter::create_temporary(Some(tmp_dir.path()), 16).unwrap();
        writer.append(&framed(&[&b"ok"[..]])).unwrap();
        writer.append(&[9, 0, 0, 0, b'a']).unwrap();

        let mut reader = writer.finish().unwrap().open(ReadMode::Buffered, 4).unwrap();
        let mut buf: Vec<u8> = Vec::new();

        assert_eq!(reader.read_frame(6, &mut buf).unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(reader.read_frame(0, &mut buf).unwrap(), Some(6));
        assert_eq!(buf, b"ok");
    }

    #[rstest]
    fn test_aborted_scratch_removed(tmp_dir: tempfile::TempDir) {
        let mut writer = ScratchWriter::create_temporary(Some(tmp_dir.path()), 1024).unwrap();
        writer.append(&framed(&[&b"unflushed"[..]])).unwrap();
        let path = writer.path().to_path_buf();
        assert!(path.exists());

        drop(writer);

        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }
}
