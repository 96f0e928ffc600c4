//! Gzip member header patching.
//!
//! The padding is stored as an extra subfield in the header of the first member. Decoders are
//! required to skip subfields they don't know, so the member decompresses exactly as before.

use std::io::{Read, Write};

use htb_core::{
    binary::{self, Deserialize, Deserializer, Serialize, Serializer},
    flags::GzipFlags,
};
use tracing::{debug, trace, warn};

use crate::{
    entropy::{EntropySource, PaddingSizeSampler},
    padding::PaddingSpec,
    PatchError, ResultFieldExt,
};

pub const MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Subfield ID the padding is stored under.
pub const PADDING_SUBFIELD_ID: [u8; 2] = *b"HT";

/// Size of a subfield's ID and length.
const SUBFIELD_HEADER_LEN: u16 = 4;

/// The first four bytes of a member header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemberPrefix {
    magic: [u8; 2],
    compression_method: u8,
    flags: GzipFlags,
}

impl Deserialize for MemberPrefix {
    fn deserialize(deserializer: &mut Deserializer<impl Read>) -> Result<Self, binary::Error> {
        Ok(Self {
            magic: deserializer.deserialize()?,
            compression_method: deserializer.deserialize()?,
            flags: deserializer.deserialize()?,
        })
    }
}

impl Serialize for MemberPrefix {
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> Result<(), binary::Error> {
        serializer.serialize(&self.magic)?;
        serializer.serialize(&self.compression_method)?;
        serializer.serialize(&self.flags)
    }
}

#[derive(Debug, Clone, Copy)]
struct Subfield<'a> {
    id: [u8; 2],
    data: &'a [u8],
}

impl Serialize for Subfield<'_> {
    fn serialize(&self, serializer: &mut Serializer<impl Write>) -> Result<(), binary::Error> {
        serializer.serialize(&self.id)?;
        // Subfield data is always built from padding, which never exceeds u16::MAX bytes.
        serializer.serialize(&(self.data.len() as u16))?;
        serializer.write_bytes(self.data)
    }
}

/// Copies a gzip stream, adding a padding subfield to the header of its first member.
///
/// The output header always has `FEXTRA` set and `FHCRC` cleared. An existing header CRC is
/// dropped, since it would no longer match the header.
pub fn patch(
    deserializer: &mut Deserializer<impl Read>,
    serializer: &mut Serializer<impl Write>,
    sampler: &PaddingSizeSampler,
    entropy: &mut impl EntropySource,
) -> Result<(), PatchError> {
    let prefix = deserializer
        .deserialize::<MemberPrefix>()
        .field("gzip member header")?;
    if prefix.magic != MAGIC {
        return Err(PatchError::InternalInvariantViolation(format!(
            "gzip patcher invoked on a stream starting with {:02x?}",
            prefix.magic
        )));
    }

    let mut padding = PaddingSpec::sampled(sampler, entropy)?;

    let flags = prefix.flags;
    debug!(?flags, "Gzip header flags");
    serializer.serialize(&MemberPrefix {
        flags: (flags | GzipFlags::EXTRA) - GzipFlags::HEADER_CRC,
        ..prefix
    })?;

    let mtime_xfl_os = deserializer
        .deserialize::<[u8; 6]>()
        .field("MTIME, XFL and OS")?;
    serializer.serialize(&mtime_xfl_os)?;

    let existing_len = if flags.contains(GzipFlags::EXTRA) {
        deserializer
            .deserialize::<u16>()
            .field("extra field length")?
    } else {
        0
    };
    let room = (u16::MAX - existing_len)
        .checked_sub(SUBFIELD_HEADER_LEN)
        .ok_or(PatchError::ExtraFieldFull {
            existing: existing_len,
        })?;
    if padding.len() > room {
        warn!(
            padding = padding.len(),
            room, "Existing extra field leaves little room; shortening padding"
        );
        padding.truncate(room);
    }
    let extra_len = existing_len + SUBFIELD_HEADER_LEN + padding.len();
    trace!(existing_len, extra_len, "Extra field length");
    serializer.serialize(&extra_len)?;

    if flags.contains(GzipFlags::EXTRA) {
        let mut existing = vec![0; usize::from(existing_len)];
        deserializer
            .read_bytes(&mut existing)
            .field("extra field")?;
        serializer.write_bytes(&existing)?;
    }
    serializer.serialize(&Subfield {
        id: PADDING_SUBFIELD_ID,
        data: padding.content(),
    })?;

    if flags.contains(GzipFlags::NAME) {
        deserializer.copy_through_nul(serializer).field("file name")?;
    }
    if flags.contains(GzipFlags::COMMENT) {
        deserializer.copy_through_nul(serializer).field("comment")?;
    }
    if flags.contains(GzipFlags::HEADER_CRC) {
        let crc = deserializer.deserialize::<u16>().field("header CRC")?;
        trace!("Dropping header CRC {crc:04x}");
    }

    debug!("Copying compressed data");
    let copied = deserializer.copy_to_end(serializer)?;
    trace!(copied, "Copied compressed data and trailer");

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::entropy::FixedEntropy;

    use super::*;

    /// An empty deflate stream followed by the CRC32 and ISIZE of empty content.
    const EMPTY_BODY: [u8; 10] = [0x03, 0x00, 0, 0, 0, 0, 0, 0, 0, 0];

    fn run(input: &[u8], bound: u32, draw: u32) -> Result<Vec<u8>, PatchError> {
        let sampler = PaddingSizeSampler::new(bound).unwrap();
        let mut deserializer = Deserializer::from_buffer(input);
        let mut serializer = Serializer::new(vec![]);
        patch(
            &mut deserializer,
            &mut serializer,
            &sampler,
            &mut FixedEntropy(draw),
        )?;
        Ok(serializer.into_inner())
    }

    /// Builds a member header with whichever optional fields `flags` asks for.
    fn header(flags: GzipFlags) -> Vec<u8> {
        let mut bytes = vec![0x1f, 0x8b, 0x08, flags.bits(), 1, 2, 3, 4, 0, 3];
        if flags.contains(GzipFlags::EXTRA) {
            bytes.extend_from_slice(&[6, 0, b'A', b'B', 2, 0, b'x', b'y']);
        }
        if flags.contains(GzipFlags::NAME) {
            bytes.extend_from_slice(b"file.txt\0");
        }
        if flags.contains(GzipFlags::COMMENT) {
            bytes.extend_from_slice(b"a comment\0");
        }
        if flags.contains(GzipFlags::HEADER_CRC) {
            bytes.extend_from_slice(&[0xaa, 0xbb]);
        }
        bytes
    }

    #[test]
    fn adds_extra_field_to_minimal_header() {
        let mut input = vec![0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0, 0];
        input.extend_from_slice(&EMPTY_BODY);
        let output = run(&input, 1, 12345).unwrap();

        let mut expected = vec![0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0, 0];
        expected.extend_from_slice(&[4, 0, b'H', b'T', 0, 0]);
        expected.extend_from_slice(&EMPTY_BODY);
        assert_eq!(output, expected);
    }

    #[test]
    fn appends_after_existing_subfields() {
        let mut input = header(GzipFlags::EXTRA);
        input.extend_from_slice(&EMPTY_BODY);
        let output = run(&input, 16, 3).unwrap();

        let mut expected = vec![0x1f, 0x8b, 0x08, 0x04, 1, 2, 3, 4, 0, 3];
        expected.extend_from_slice(&[13, 0, b'A', b'B', 2, 0, b'x', b'y']);
        expected.extend_from_slice(&[b'H', b'T', 3, 0, b'h', b't', b'b']);
        expected.extend_from_slice(&EMPTY_BODY);
        assert_eq!(output, expected);
    }

    #[test]
    fn drops_header_crc_and_keeps_name_and_comment() {
        let flags = GzipFlags::TEXT | GzipFlags::NAME | GzipFlags::COMMENT | GzipFlags::HEADER_CRC;
        let mut input = header(flags);
        input.extend_from_slice(&EMPTY_BODY);
        let output = run(&input, 16, 5).unwrap();

        let mut expected = vec![0x1f, 0x8b, 0x08, 0x1d, 1, 2, 3, 4, 0, 3];
        expected.extend_from_slice(&[9, 0, b'H', b'T', 5, 0]);
        expected.extend_from_slice(b"htbv1");
        expected.extend_from_slice(b"file.txt\0a comment\0");
        expected.extend_from_slice(&EMPTY_BODY);
        assert_eq!(output, expected);
    }

    #[test]
    fn every_flag_combination_yields_a_well_formed_header() {
        for bits in 0..0x20u8 {
            let flags = GzipFlags::from_bits_retain(bits);
            let mut input = header(flags);
            input.extend_from_slice(&EMPTY_BODY);
            let padding_len = u16::from(bits) % 7;
            let output = run(&input, 7, u32::from(bits)).unwrap();

            let out_flags = GzipFlags::from_bits_retain(output[3]);
            assert!(out_flags.contains(GzipFlags::EXTRA), "flags {bits:02x}");
            assert!(!out_flags.contains(GzipFlags::HEADER_CRC), "flags {bits:02x}");
            assert_eq!(
                out_flags - GzipFlags::EXTRA,
                flags - GzipFlags::EXTRA - GzipFlags::HEADER_CRC
            );

            // Walk the subfields; they must exactly fill the extra field and end with ours.
            let extra_len = usize::from(u16::from_le_bytes([output[10], output[11]]));
            let extra = &output[12..12 + extra_len];
            let mut position = 0;
            let mut last = None;
            while position < extra.len() {
                let id = [extra[position], extra[position + 1]];
                let len = usize::from(u16::from_le_bytes([
                    extra[position + 2],
                    extra[position + 3],
                ]));
                last = Some((id, &extra[position + 4..position + 4 + len]));
                position += 4 + len;
            }
            assert_eq!(position, extra.len(), "flags {bits:02x}");
            let (id, data) = last.unwrap();
            assert_eq!(id, PADDING_SUBFIELD_ID);
            assert_eq!(data, crate::padding::generate(padding_len));

            let mut rest = &output[12 + extra_len..];
            if flags.contains(GzipFlags::NAME) {
                assert!(rest.starts_with(b"file.txt\0"));
                rest = &rest[9..];
            }
            if flags.contains(GzipFlags::COMMENT) {
                assert!(rest.starts_with(b"a comment\0"));
                rest = &rest[10..];
            }
            assert_eq!(rest, EMPTY_BODY, "flags {bits:02x}");
        }
    }

    #[test]
    fn truncated_headers_are_reported() {
        let error = run(&[0x1f, 0x8b, 0x08], 16, 0).unwrap_err();
        assert!(matches!(
            error,
            PatchError::TruncatedInput {
                field: "gzip member header",
                ..
            }
        ));

        let error = run(&[0x1f, 0x8b, 0x08, 0x00, 0, 0], 16, 0).unwrap_err();
        assert!(matches!(
            error,
            PatchError::TruncatedInput {
                field: "MTIME, XFL and OS",
                ..
            }
        ));

        let mut input = header(GzipFlags::NAME);
        input.truncate(input.len() - 1);
        let error = run(&input, 16, 0).unwrap_err();
        assert!(matches!(
            error,
            PatchError::TruncatedInput {
                field: "file name",
                ..
            }
        ));

        let mut input = header(GzipFlags::HEADER_CRC);
        input.truncate(input.len() - 1);
        let error = run(&input, 16, 0).unwrap_err();
        assert!(matches!(
            error,
            PatchError::TruncatedInput {
                field: "header CRC",
                ..
            }
        ));
    }

    #[test]
    fn body_may_be_empty() {
        let output = run(&header(GzipFlags::empty()), 1, 0).unwrap();
        assert_eq!(output.len(), 10 + 6);
    }

    #[test]
    fn wrong_magic_is_an_internal_error() {
        let error = run(&[0x1f, 0x8c, 0x08, 0x00], 16, 0).unwrap_err();
        assert!(matches!(error, PatchError::InternalInvariantViolation(_)));
    }

    #[test]
    fn nearly_full_extra_field_shortens_padding() {
        let existing_len: u16 = u16::MAX - 5;
        let mut input = vec![0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0, 0];
        input.extend_from_slice(&existing_len.to_le_bytes());
        input.extend(std::iter::repeat(0).take(usize::from(existing_len)));
        let output = run(&input, 16, 15).unwrap();

        assert_eq!(u16::from_le_bytes([output[10], output[11]]), u16::MAX);
        let subfield = &output[12 + usize::from(existing_len)..];
        assert_eq!(subfield, [b'H', b'T', 1, 0, b'h']);
    }

    #[test]
    fn full_extra_field_is_rejected() {
        let existing_len: u16 = u16::MAX - 3;
        let mut input = vec![0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0, 0];
        input.extend_from_slice(&existing_len.to_le_bytes());
        input.extend(std::iter::repeat(0).take(usize::from(existing_len)));
        let error = run(&input, 16, 0).unwrap_err();
        assert!(matches!(
            error,
            PatchError::ExtraFieldFull { existing } if existing == existing_len
        ));
    }
}
