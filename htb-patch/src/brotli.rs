//! Brotli stream patching.
//!
//! A brotli stream opens with a window size field of 1, 4 or 7 bits, followed immediately by the
//! first meta-block header with no byte alignment in between. The padding goes into a metadata
//! meta-block spliced in right after the window size field. Decoders skip metadata, so the
//! decompressed content is unchanged, but everything after the splice point is shifted to a new
//! bit offset.
//!
//! The shift is only sound for meta-blocks that are not byte-aligned. Uncompressed and metadata
//! meta-blocks pad themselves to a byte boundary, and after the shift that padding is read at the
//! wrong place. A stream whose first meta-block is one of those (this includes every stream that
//! has already been padded) is refused with [`PatchError::UnsupportedBrotliStream`]. Uncompressed
//! meta-blocks further into the stream cannot be found without decoding the compressed blocks
//! before them, so they are not detected, and a stream containing one is corrupted by patching.

use std::io::{Read, Write};

use htb_core::{
    binary::{Deserializer, Serializer},
    bits::{BitReader, BitWriter},
};
use tracing::{debug, trace, warn};

use crate::{
    entropy::{EntropySource, PaddingSizeSampler},
    padding::PaddingSpec,
    PatchError, ResultFieldExt,
};

/// `MNIBBLES` code marking a metadata meta-block.
const METADATA_MNIBBLES: u32 = 0b11;

/// Realigned bytes to look at before deciding whether the stream can be patched. The longest
/// header prefix we need (ISLAST, ISLASTEMPTY, MNIBBLES, 24-bit MLEN, ISUNCOMPRESSED) is 29 bits.
const LOOKAHEAD_LEN: usize = 4;

/// The window size field at the start of a stream, kept as the raw bits it was read as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSizeField {
    bits: u32,
    len: u8,
}

impl WindowSizeField {
    pub fn read(reader: &mut BitReader<impl Read>) -> Result<Self, PatchError> {
        let mut field = Self::default();
        if field.read_bits(reader, 1)? == 1 && field.read_bits(reader, 3)? == 0 {
            field.read_bits(reader, 3)?;
        }
        Ok(field)
    }

    fn read_bits(&mut self, reader: &mut BitReader<impl Read>, count: u8) -> Result<u32, PatchError> {
        let value = reader.read_bits(count).field("window size")?;
        self.bits |= value << self.len;
        self.len += count;
        Ok(value)
    }

    /// Writes the field back exactly as it was read.
    pub fn write(&self, writer: &mut BitWriter<impl Write>) -> Result<(), PatchError> {
        writer.write_bits(self.bits, self.len)?;
        Ok(())
    }

    /// Length of the field in bits.
    pub fn bit_len(&self) -> u8 {
        self.len
    }

    /// Base two logarithm of the window size, or `None` for the large window marker.
    pub fn lgwin(&self) -> Option<u8> {
        match self.len {
            1 => Some(16),
            4 => Some(17 + (self.bits >> 1) as u8),
            _ => match self.bits >> 4 {
                0 => Some(17),
                1 => None,
                n => Some(8 + n as u8),
            },
        }
    }
}

/// What kind of meta-block a stream starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstMetaBlock {
    /// `ISLAST` and `ISLASTEMPTY`: the stream has no content.
    LastEmpty,
    Compressed,
    Uncompressed,
    Metadata,
}

impl FirstMetaBlock {
    /// Classifies the meta-block header at the start of `header`, which must begin on the
    /// header's first bit.
    pub fn peek(header: &[u8]) -> Result<Self, PatchError> {
        let mut deserializer = Deserializer::from_buffer(header);
        let mut reader = BitReader::new(&mut deserializer);
        let mut read_bits = |count| reader.read_bits(count).field("first meta-block header");

        let is_last = read_bits(1)? == 1;
        if is_last && read_bits(1)? == 1 {
            return Ok(Self::LastEmpty);
        }
        let mnibbles = read_bits(2)?;
        if mnibbles == METADATA_MNIBBLES {
            return Ok(Self::Metadata);
        }
        // MLEN-1, four bits per nibble.
        read_bits(4 * (mnibbles as u8 + 4))?;
        if !is_last && read_bits(1)? == 1 {
            Ok(Self::Uncompressed)
        } else {
            Ok(Self::Compressed)
        }
    }

    /// Whether the meta-block pads itself to a byte boundary.
    pub fn is_byte_aligned(self) -> bool {
        matches!(self, Self::Uncompressed | Self::Metadata)
    }

    fn describe(self) -> &'static str {
        match self {
            Self::LastEmpty => "empty",
            Self::Compressed => "compressed",
            Self::Uncompressed => "uncompressed",
            Self::Metadata => "metadata",
        }
    }
}

/// Writes the header of a metadata meta-block holding `length` bytes (at least one).
fn write_metadata_header(
    writer: &mut BitWriter<impl Write>,
    length: u16,
) -> Result<(), PatchError> {
    let skip_len = u32::from(length).checked_sub(1).ok_or_else(|| {
        PatchError::InternalInvariantViolation("metadata block cannot be empty".into())
    })?;
    // Decoders reject a length whose most significant byte is zero, so use as few as possible.
    let skip_bytes = if skip_len < 0x100 { 1 } else { 2 };
    trace!(skip_len, skip_bytes, "Metadata block header");

    writer.write_bits(0, 1)?; // ISLAST
    writer.write_bits(METADATA_MNIBBLES, 2)?;
    writer.write_bits(0, 1)?; // reserved
    writer.write_bits(skip_bytes, 2)?;
    writer.write_bits(skip_len, 8 * skip_bytes as u8)?;
    Ok(())
}

/// Copies a brotli stream, inserting a metadata meta-block with padding after its window size
/// field. Nothing is written if the stream is refused.
pub fn patch(
    deserializer: &mut Deserializer<impl Read>,
    serializer: &mut Serializer<impl Write>,
    sampler: &PaddingSizeSampler,
    entropy: &mut impl EntropySource,
) -> Result<(), PatchError> {
    let padding = PaddingSpec::sampled_non_empty(sampler, entropy)?;

    let mut reader = BitReader::new(deserializer);
    let window = WindowSizeField::read(&mut reader)?;
    match window.lgwin() {
        Some(lgwin) => debug!(lgwin, bits = window.bit_len(), "Brotli window size"),
        None => warn!("Stream uses a large window, which is not supported; output may be invalid"),
    }

    let carry_bits = reader.remaining_bits();
    let carry = reader.read_to_byte_boundary()?;
    if !reader.is_aligned() {
        return Err(PatchError::InternalInvariantViolation(
            "input not byte-aligned after the window size field".into(),
        ));
    }
    trace!(carry_bits, "Carrying {carry:#010b} into the realigned copy");

    let mut realigner = Realigner { carry, carry_bits };
    let mut lookahead = Vec::with_capacity(LOOKAHEAD_LEN);
    while lookahead.len() < LOOKAHEAD_LEN {
        match deserializer.read_byte_or_eof()? {
            Some(byte) => lookahead.push(realigner.push(byte)),
            None => break,
        }
    }
    let mut header = lookahead.clone();
    header.extend(realigner.pending());
    let first = FirstMetaBlock::peek(&header)?;
    debug!(?first, "First meta-block");
    if first.is_byte_aligned() {
        return Err(PatchError::UnsupportedBrotliStream(first.describe()));
    }

    let mut writer = BitWriter::new(serializer);
    window.write(&mut writer)?;
    write_metadata_header(&mut writer, padding.len())?;
    writer.pad_to_byte_boundary()?;
    writer.write_aligned_bytes(padding.content())?;
    if !writer.is_aligned() {
        return Err(PatchError::InternalInvariantViolation(
            "output not byte-aligned after the padding".into(),
        ));
    }

    serializer.write_bytes(&lookahead)?;
    let copied = realign(deserializer, serializer, realigner)?;
    trace!(copied = copied + lookahead.len() as u64, "Copied realigned stream");

    Ok(())
}

/// Moves every bit of the remaining input down by `8 - carry_bits` positions.
///
/// `carry` holds the `carry_bits` unread, right-aligned bits of the byte the reader stopped in.
/// Each output byte is the pending carry followed by the low bits of the next input byte, and the
/// input byte's remaining high bits become the next carry.
#[derive(Debug, Clone, Copy)]
struct Realigner {
    carry: u8,
    carry_bits: u8,
}

impl Realigner {
    fn push(&mut self, byte: u8) -> u8 {
        let wide = u16::from(self.carry) | u16::from(byte) << self.carry_bits;
        self.carry = (wide >> 8) as u8;
        wide as u8
    }

    /// The final, partial output byte, if the carry holds any bits.
    fn pending(&self) -> Option<u8> {
        (self.carry_bits > 0).then_some(self.carry)
    }
}

/// Copies the rest of the input through `realigner`. Returns the number of bytes written.
fn realign(
    deserializer: &mut Deserializer<impl Read>,
    serializer: &mut Serializer<impl Write>,
    mut realigner: Realigner,
) -> Result<u64, PatchError> {
    let mut written = 0;
    while let Some(byte) = deserializer.read_byte_or_eof()? {
        serializer.serialize(&realigner.push(byte))?;
        written += 1;
    }
    if let Some(last) = realigner.pending() {
        serializer.serialize(&last)?;
        written += 1;
    }
    Ok(written)
}
