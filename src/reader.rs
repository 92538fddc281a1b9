use std::io::{Error, ErrorKind, Result};

use crate::{HEADER_SIZE, MAGIC, StrHashHeader};

/// Source of a persisted buffer, consumed by [`load_buffer`].
///
/// Loading takes two reads: the fixed-size header first, then the full
/// length the header declares. Implemented for any file handle through
/// `FileExt`.
pub trait StrHashReader {
    /// Hands the `length` bytes at `offset` to `f`.
    ///
    /// A range that runs past the end of the source is an `UnexpectedEof` error.
    fn read_exact_at<F, R>(&self, offset: u64, length: u64, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> Result<R>;
}

#[cfg(unix)]
impl<T: std::os::unix::fs::FileExt> StrHashReader for T {
    fn read_exact_at<F, R>(&self, offset: u64, length: u64, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> Result<R>,
    {
        let mut buffer = vec![0u8; to_usize(length)?];
        std::os::unix::fs::FileExt::read_exact_at(self, &mut buffer, offset)?;
        f(&buffer)
    }
}

#[cfg(windows)]
impl<T: std::os::windows::fs::FileExt> StrHashReader for T {
    fn read_exact_at<F, R>(&self, offset: u64, length: u64, f: F) -> Result<R>
    where
        F: FnOnce(&[u8]) -> Result<R>,
    {
        let mut buffer = vec![0u8; to_usize(length)?];
        let mut filled = 0;
        while filled < buffer.len() {
            let bytes = self.seek_read(&mut buffer[filled..], offset + filled as u64)?;
            if bytes == 0 {
                return Err(Error::new(
                    ErrorKind::UnexpectedEof,
                    "Failed to read enough bytes",
                ));
            }
            filled += bytes;
        }
        f(&buffer)
    }
}

fn to_usize(length: u64) -> Result<usize> {
    usize::try_from(length).map_err(|_| {
        Error::new(
            ErrorKind::InvalidData,
            format!("Length {} does not fit in memory", length),
        )
    })
}

/// Reads a complete persisted buffer so it can be attached.
///
/// The header is read first to learn the declared layout length; only that
/// many bytes are then read, so trailing bytes after the buffer are ignored.
///
/// # Errors
///
/// Returns `InvalidData` when the magic number is wrong or the declared
/// length overflows, and forwards IO errors such as `UnexpectedEof` when the
/// source is shorter than the header claims.
pub fn load_buffer<R: StrHashReader>(reader: &R) -> Result<Vec<u8>> {
    let header = reader.read_exact_at(0, HEADER_SIZE as u64, |data| {
        StrHashHeader::decode(data)
            .ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, "Truncated header"))
    })?;
    if header.magic != MAGIC {
        return Err(Error::new(
            ErrorKind::InvalidData,
            format!("Invalid magic number: {:#x}", header.magic),
        ));
    }
    let total_length = header
        .total_length()
        .ok_or_else(|| Error::new(ErrorKind::InvalidData, "Declared length overflows"))?;
    reader.read_exact_at(0, total_length, |data| Ok(data.to_vec()))
}
