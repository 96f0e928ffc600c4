use std::{
    fmt,
    io::{self, Cursor, Read, Write},
};

use htb_core::binary::{Deserializer, ErrorKind, Serializer};

use crate::{
    brotli,
    entropy::{EntropySource, PaddingSizeSampler},
    gzip, PatchError,
};

/// Container formats that can be patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Gzip,
    /// Raw brotli stream. Brotli has no magic number, so anything that isn't gzip is assumed to
    /// be brotli.
    Brotli,
}

impl Format {
    pub fn from_prefix(prefix: &[u8]) -> Self {
        if prefix.starts_with(&gzip::MAGIC) {
            Self::Gzip
        } else {
            Self::Brotli
        }
    }

    /// Peeks at the first two bytes of `stream` to pick a format. The returned reader yields the
    /// whole stream, peeked bytes included.
    pub fn sniff<R>(mut stream: R) -> Result<(Self, impl Read), PatchError>
    where
        R: Read,
    {
        let mut prefix = [0; 2];
        let mut len = 0;
        while len < prefix.len() {
            match stream.read(&mut prefix[len..]) {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    return Err(ErrorKind::Deserialize
                        .make(format!("cannot read format prefix: {error}"))
                        .into())
                }
            }
        }
        let format = Self::from_prefix(&prefix[..len]);
        Ok((format, Cursor::new(prefix).take(len as u64).chain(stream)))
    }

    pub fn patch(
        self,
        deserializer: &mut Deserializer<impl Read>,
        serializer: &mut Serializer<impl Write>,
        sampler: &PaddingSizeSampler,
        entropy: &mut impl EntropySource,
    ) -> Result<(), PatchError> {
        match self {
            Self::Gzip => gzip::patch(deserializer, serializer, sampler, entropy),
            Self::Brotli => brotli::patch(deserializer, serializer, sampler, entropy),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Gzip => f.write_str("gzip"),
            Format::Brotli => f.write_str("brotli"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_magic_selects_gzip() {
        assert_eq!(Format::from_prefix(&[0x1f, 0x8b]), Format::Gzip);
        assert_eq!(Format::from_prefix(&[0x1f, 0x8b, 0x08]), Format::Gzip);
    }

    #[test]
    fn everything_else_is_brotli() {
        assert_eq!(Format::from_prefix(&[]), Format::Brotli);
        assert_eq!(Format::from_prefix(&[0x1f]), Format::Brotli);
        assert_eq!(Format::from_prefix(&[0x8b, 0x1f]), Format::Brotli);
        assert_eq!(Format::from_prefix(&[0x0b, 0x02]), Format::Brotli);
    }

    /// Hands out one byte per read, like a slow pipe.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match (self.0.split_first(), buf.first_mut()) {
                (Some((&byte, rest)), Some(slot)) => {
                    *slot = byte;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    #[test]
    fn sniff_keeps_peeked_bytes() {
        let input = [0x1f, 0x8b, 0x08, 0x00];
        let (format, mut stream) = Format::sniff(Trickle(&input)).unwrap();
        assert_eq!(format, Format::Gzip);
        let mut all = vec![];
        stream.read_to_end(&mut all).unwrap();
        assert_eq!(all, input);
    }

    #[test]
    fn sniff_short_stream() {
        let (format, mut stream) = Format::sniff(&[0x1f][..]).unwrap();
        assert_eq!(format, Format::Brotli);
        let mut all = vec![];
        stream.read_to_end(&mut all).unwrap();
        assert_eq!(all, [0x1f]);
    }
}
