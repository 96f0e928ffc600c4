use std::{
    io::{self, Cursor, Read, Write},
    ops::Deref,
};

use crate::binary::{
    Error, ErrorKind, IoResultMapToBinaryErrorExt, ResultContextExt, ResultMapToBinaryErrorExt,
    Serializer,
};

/// Byte-level reader over a forward-only stream, keeping track of how far into the stream it is
/// for error reporting.
#[derive(Debug, Clone, Copy)]
pub struct Deserializer<R> {
    stream_position: u64,
    stream: R,
}

impl<R> Deserializer<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream_position: 0,
            stream,
        }
    }

    pub fn stream_position(&self) -> u64 {
        self.stream_position
    }

    pub fn into_inner(self) -> R {
        self.stream
    }

    pub fn read_bytes(&mut self, out_bytes: &mut [u8]) -> Result<(), Error>
    where
        R: Read,
    {
        self.stream
            .read_exact(out_bytes)
            .map_io_err_to_binary_error(ErrorKind::Deserialize)
            .with_context(|| format!("at stream position {:08x}", self.stream_position))?;
        self.stream_position += out_bytes.len() as u64;
        Ok(())
    }

    /// Reads a single byte, returning `None` once the stream is exhausted.
    pub fn read_byte_or_eof(&mut self) -> Result<Option<u8>, Error>
    where
        R: Read,
    {
        let mut byte = [0];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.stream_position += 1;
                    return Ok(Some(byte[0]));
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    return Err(ErrorKind::Deserialize.make(error.to_string()))
                        .with_context(|| format!("at stream position {:08x}", self.stream_position))
                }
            }
        }
    }

    /// Copies bytes up to and including the next NUL byte. Returns the number of bytes copied.
    pub fn copy_through_nul(
        &mut self,
        serializer: &mut Serializer<impl Write>,
    ) -> Result<u64, Error>
    where
        R: Read,
    {
        let start = self.stream_position;
        loop {
            let byte = self
                .deserialize::<u8>()
                .context("cannot find the terminating NUL")?;
            serializer.write_bytes(&[byte])?;
            if byte == 0 {
                return Ok(self.stream_position - start);
            }
        }
    }

    /// Copies everything left in the stream. Running out of input is the expected way for this
    /// to end, so it is never reported as truncation.
    pub fn copy_to_end(&mut self, serializer: &mut Serializer<impl Write>) -> Result<u64, Error>
    where
        R: Read,
    {
        let mut buffer = [0; 8192];
        let mut copied = 0;
        loop {
            let len = match self.stream.read(&mut buffer) {
                Ok(0) => break,
                Ok(len) => len,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    return Err(error)
                        .map_err_to_binary_error(ErrorKind::Deserialize)
                        .with_context(|| {
                            format!("at stream position {:08x}", self.stream_position)
                        })
                }
            };
            serializer.write_bytes(&buffer[..len])?;
            self.stream_position += len as u64;
            copied += len as u64;
        }
        Ok(copied)
    }
}

impl<T> Deserializer<Cursor<T>>
where
    T: Deref<Target = [u8]>,
{
    pub fn from_buffer(buffer: T) -> Self {
        Self::from(Cursor::new(buffer))
    }
}

impl<T> From<Cursor<T>> for Deserializer<Cursor<T>>
where
    T: Deref<Target = [u8]>,
{
    fn from(cursor: Cursor<T>) -> Self {
        Self {
            stream_position: cursor.position(),
            stream: cursor,
        }
    }
}
