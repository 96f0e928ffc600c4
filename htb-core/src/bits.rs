//! Bit-granular cursors over byte streams.
//!
//! Bits are packed least-significant first within each byte, and multi-bit values are read and
//! written starting from their least significant bit. This is the order used by DEFLATE and
//! brotli.

use std::io::{Read, Write};

use crate::binary::{Deserializer, Error, ErrorKind, ResultContextExt, Serializer};

/// Reads bits from a [`Deserializer`], pulling in one byte at a time as needed.
#[derive(Debug)]
pub struct BitReader<'d, R> {
    deserializer: &'d mut Deserializer<R>,
    current: u8,
    /// Bits of `current` that have not been read yet.
    available: u8,
}

impl<'d, R> BitReader<'d, R>
where
    R: Read,
{
    pub fn new(deserializer: &'d mut Deserializer<R>) -> Self {
        Self {
            deserializer,
            current: 0,
            available: 0,
        }
    }

    /// Reads `count` bits (at most 32).
    pub fn read_bits(&mut self, count: u8) -> Result<u32, Error> {
        debug_assert!(count <= 32);

        let mut value = 0u32;
        let mut filled = 0;
        while filled < count {
            if self.available == 0 {
                self.current = self
                    .deserializer
                    .deserialize::<u8>()
                    .with_context(|| format!("cannot read {count} bits"))?;
                self.available = 8;
            }
            let take = (count - filled).min(self.available);
            let consumed = 8 - self.available;
            let bits = (u32::from(self.current) >> consumed) & ((1u32 << take) - 1);
            value |= bits << filled;
            filled += take;
            self.available -= take;
        }
        Ok(value)
    }

    /// Reads whatever is left of the byte currently being consumed. The returned value holds
    /// [`remaining_bits`][Self::remaining_bits] bits, right-aligned.
    pub fn read_to_byte_boundary(&mut self) -> Result<u8, Error> {
        let count = self.available;
        // A bit count below 8 always fits.
        Ok(self.read_bits(count)? as u8)
    }

    /// Number of bits of the current byte that are still unread (`0..8`).
    pub fn remaining_bits(&self) -> u8 {
        self.available
    }

    pub fn is_aligned(&self) -> bool {
        self.available == 0
    }
}

/// Writes bits to a [`Serializer`], emitting each byte once all eight of its bits are known.
#[derive(Debug)]
pub struct BitWriter<'s, W> {
    serializer: &'s mut Serializer<W>,
    current: u8,
    /// Bits of `current` that have been written so far.
    filled: u8,
}

impl<'s, W> BitWriter<'s, W>
where
    W: Write,
{
    pub fn new(serializer: &'s mut Serializer<W>) -> Self {
        Self {
            serializer,
            current: 0,
            filled: 0,
        }
    }

    /// Writes the low `count` bits of `value` (at most 32).
    pub fn write_bits(&mut self, value: u32, count: u8) -> Result<(), Error> {
        debug_assert!(count <= 32);

        let mut written = 0;
        while written < count {
            let take = (count - written).min(8 - self.filled);
            let bits = (value >> written) & ((1u32 << take) - 1);
            self.current |= (bits as u8) << self.filled;
            self.filled += take;
            written += take;
            if self.filled == 8 {
                self.serializer.serialize(&self.current)?;
                self.current = 0;
                self.filled = 0;
            }
        }
        Ok(())
    }

    /// Fills the rest of a partially written byte with zero bits and emits it.
    pub fn pad_to_byte_boundary(&mut self) -> Result<(), Error> {
        if self.filled > 0 {
            self.write_bits(0, 8 - self.filled)?;
        }
        Ok(())
    }

    /// Writes whole bytes. The writer must be [aligned][Self::is_aligned].
    pub fn write_aligned_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if !self.is_aligned() {
            return Err(ErrorKind::Serialize.make(format!(
                "cannot write whole bytes with {} pending bits",
                self.filled
            )));
        }
        self.serializer.write_bytes(bytes)
    }

    pub fn is_aligned(&self) -> bool {
        self.filled == 0
    }
}
