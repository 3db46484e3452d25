//! Sorted output destinations.

use std::io::{self, prelude::*};

/// Receives sorted records one by one.
///
/// A record slice is only valid for the duration of the call; sinks that retain records must copy them.
pub trait RecordSink {
    /// Consumes the next record in sorted order.
    fn write_record(&mut self, record: &[u8]) -> io::Result<()>;

    /// Called once after the last record.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F> RecordSink for F
where
    F: FnMut(&[u8]) -> io::Result<()>,
{
    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self(record)
    }
}

/// Sink writing raw record bytes back-to-back, without separators.
pub struct WriteSink<W: Write> {
    writer: W,
}

impl<W: Write> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        WriteSink { writer }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for WriteSink<W> {
    fn write_record(&mut self, record: &[u8]) -> io::Result<()> {
        self.writer.write_all(record)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod test {
    use super::{RecordSink, WriteSink};

    #[test]
    fn test_write_sink() {
        let mut sink = WriteSink::new(Vec::new());
        sink.write_record(b"05\n").unwrap();
        sink.write_record(b"10\n").unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.into_inner(), b"05\n10\n");
    }
}
