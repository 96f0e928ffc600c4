//! Splices random padding into gzip and brotli streams without touching the compressed data, so
//! the padded stream decompresses to exactly the same bytes as the original.

pub mod brotli;
pub mod entropy;
mod error;
pub mod format;
pub mod gzip;
pub mod padding;

use std::io::{Read, Write};

use htb_core::binary::{Deserializer, Serializer};
use tracing::info;

pub use error::*;

use crate::{
    entropy::{EntropySource, PaddingSizeSampler},
    format::Format,
};

/// Copies `input` to `output`, adding between `0` and `max_padding - 1` bytes of padding (brotli
/// streams always get at least one). Returns the detected format.
pub fn patch_stream(
    input: impl Read,
    output: impl Write,
    max_padding: u32,
    entropy: &mut impl EntropySource,
) -> Result<Format, PatchError> {
    let sampler = PaddingSizeSampler::new(max_padding)?;

    let (format, input) = Format::sniff(input)?;
    info!(%format, "Detected format");

    let mut deserializer = Deserializer::new(input);
    let mut serializer = Serializer::new(output);
    format.patch(&mut deserializer, &mut serializer, &sampler, entropy)?;
    serializer.flush()?;

    info!(
        read = deserializer.stream_position(),
        written = serializer.stream_position(),
        "Patched {format} stream"
    );
    Ok(format)
}
