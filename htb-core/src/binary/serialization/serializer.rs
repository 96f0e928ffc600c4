use std::io::Write;

use crate::binary::{Error, ErrorKind, ResultContextExt, ResultMapToBinaryErrorExt};

#[derive(Debug, Clone, Copy)]
pub struct Serializer<W> {
    stream_position: u64,
    stream: W,
}

impl<W> Serializer<W> {
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>
    where
        W: Write,
    {
        self.stream
            .write_all(bytes)
            .map_err_to_binary_error(ErrorKind::Serialize)
            .with_context(|| format!("at output position {:08x}", self.stream_position))?;
        self.stream_position += bytes.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error>
    where
        W: Write,
    {
        self.stream
            .flush()
            .map_err_to_binary_error(ErrorKind::Serialize)
            .context("cannot flush output stream")
    }
}

impl<W> Serializer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            stream_position: 0,
            stream: writer,
        }
    }

    /// Number of bytes written so far.
    pub fn stream_position(&self) -> u64 {
        self.stream_position
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}
