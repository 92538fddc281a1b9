use std::io::Result;

/// Destination for a finished buffer, used by
/// [`StrHashBuilder::build_to`](crate::StrHashBuilder::build_to).
///
/// The whole buffer is written in one call at offset 0, so the persisted
/// bytes can later be read back verbatim and attached. Implemented for any
/// file handle through `FileExt`.
pub trait StrHashWriter {
    /// Writes all of `data` at the given absolute `offset`.
    fn write_at(&self, data: &[u8], offset: u64) -> Result<()>;
}

#[cfg(unix)]
impl<T: std::os::unix::fs::FileExt> StrHashWriter for T {
    fn write_at(&self, data: &[u8], offset: u64) -> Result<()> {
        self.write_all_at(data, offset)
    }
}

#[cfg(windows)]
impl<T: std::os::windows::fs::FileExt> StrHashWriter for T {
    fn write_at(&self, mut data: &[u8], mut offset: u64) -> Result<()> {
        while !data.is_empty() {
            let written = self.seek_write(data, offset)?;
            if written == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            data = &data[written..];
            offset += written as u64;
        }
        Ok(())
    }
}
