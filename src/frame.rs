//! Run framing format.
//!
//! Every record is stored as a little-endian `u32` length followed by the record bytes.
//! A zero length is reserved for the run-end sentinel, so empty records are not representable.
//!
//! ```text
//! file     := run*
//! run      := frame* sentinel
//! frame    := length:u32-le bytes[length]
//! sentinel := length:u32-le(==0)
//! ```

use std::io;
use std::io::prelude::*;

/// Width of the frame length field in bytes.
pub const LEN_SIZE: usize = 4;

/// Encoded run-end sentinel.
pub const SENTINEL: [u8; LEN_SIZE] = [0; LEN_SIZE];

/// Longest record the length field can describe.
pub const MAX_RECORD_LEN: usize = u32::MAX as usize;

/// Frame decoding outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A record of the given length was read.
    Record(usize),
    /// The run-end sentinel was read.
    EndOfRun,
}

/// Returns the encoded size of a record of `record_len` bytes.
pub fn frame_len(record_len: usize) -> usize {
    LEN_SIZE + record_len
}

fn len_prefix(record: &[u8]) -> io::Result<[u8; LEN_SIZE]> {
    match u32::try_from(record.len()) {
        Ok(0) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "zero-length record collides with the run-end sentinel",
        )),
        Ok(len) => Ok(len.to_le_bytes()),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("record length {} exceeds frame limit {}", record.len(), MAX_RECORD_LEN),
        )),
    }
}

/// Writes a single record frame.
pub fn encode<W: Write>(writer: &mut W, record: &[u8]) -> io::Result<()> {
    writer.write_all(&len_prefix(record)?)?;
    writer.write_all(record)
}

/// Appends a single record frame to `buf`.
pub fn encode_into(buf: &mut Vec<u8>, record: &[u8]) -> io::Result<()> {
    buf.extend_from_slice(&len_prefix(record)?);
    buf.extend_from_slice(record);
    return Ok(());
}

/// Writes the run-end sentinel.
pub fn encode_sentinel<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&SENTINEL)
}

/// Reads the next frame from `reader` into `buf`, overwriting its contents.
///
/// A stream that ends inside a frame fails with [`io::ErrorKind::UnexpectedEof`],
/// which is distinct from a clean [`Decoded::EndOfRun`].
pub fn decode<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Decoded> {
    let mut prefix = [0u8; LEN_SIZE];
    reader.read_exact(&mut prefix)?;

    let len = u32::from_le_bytes(prefix) as usize;
    if len == 0 {
        return Ok(Decoded::EndOfRun);
    }

    buf.clear();
    buf.resize(len, 0);
    reader.read_exact(buf)?;

    return Ok(Decoded::Record(len));
}

/// Decodes the frame starting at `offset` of an in-memory image of the scratch file.
///
/// Returns `None` for the run-end sentinel, otherwise a view of the record bytes.
pub fn decode_at(bytes: &[u8], offset: usize) -> io::Result<Option<&[u8]>> {
    let prefix_end = offset.checked_add(LEN_SIZE).filter(|end| *end <= bytes.len()).ok_or_else(|| {
        truncated(offset, bytes.len())
    })?;

    let mut prefix = [0u8; LEN_SIZE];
    prefix.copy_from_slice(&bytes[offset..prefix_end]);

    let len = u32::from_le_bytes(prefix) as usize;
    if len == 0 {
        return Ok(None);
    }

    let end = prefix_end
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| truncated(offset, bytes.len()))?;

    return Ok(Some(&bytes[prefix_end..end]));
}

fn truncated(offset: usize, total: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("frame at offset {} runs past the end of scratch data ({} bytes)", offset, total),
    )
}

#[cfg(test)]
mod test {
    use std::io::{self, Cursor};

    use rstest::*;

    use super::{decode, decode_at, encode, encode_into, encode_sentinel, Decoded, SENTINEL};

    #[test]
    fn test_encode_layout() {
        let mut buf: Vec<u8> = Vec::new();
        encode(&mut buf, b"abc").unwrap();
        encode_sentinel(&mut buf).unwrap();

        assert_eq!(buf, vec![3, 0, 0, 0, b'a', b'b', b'c', 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_rejects_empty_record() {
        let mut buf: Vec<u8> = Vec::new();
        let err = encode_into(&mut buf, b"").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_run() {
        let mut data: Vec<u8> = Vec::new();
        encode(&mut data, b"10\n").unwrap();
        encode(&mut data, b"30\n").unwrap();
        encode_sentinel(&mut data).unwrap();

        let mut reader = Cursor::new(data);
        let mut buf: Vec<u8> = Vec::new();

        assert_eq!(decode(&mut reader, &mut buf).unwrap(), Decoded::Record(3));
        assert_eq!(buf, b"10\n");
        assert_eq!(decode(&mut reader, &mut buf).unwrap(), Decoded::Record(3));
        assert_eq!(buf, b"30\n");
        assert_eq!(decode(&mut reader, &mut buf).unwrap(), Decoded::EndOfRun);
    }

    #[rstest]
    #[case(vec![5, 0])]
    #[case(vec![5, 0, 0, 0, b'a', b'b'])]
    fn test_decode_truncated(#[case] data: Vec<u8>) {
        let mut buf: Vec<u8> = Vec::new();
        let err = decode(&mut Cursor::new(data.clone()), &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let err = decode_at(&data, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_decode_at_offsets() {
        let mut data: Vec<u8> = Vec::new();
        encode(&mut data, b"xy").unwrap();
        encode_sentinel(&mut data).unwrap();
        encode(&mut data, b"z").unwrap();

        assert_eq!(decode_at(&data, 0).unwrap(), Some(&b"xy"[..]));
        assert_eq!(decode_at(&data, 6).unwrap(), None);
        assert_eq!(decode_at(&data, 10).unwrap(), Some(&b"z"[..]));
        assert_eq!(decode_at(&SENTINEL, 0).unwrap(), None);
    }
}
