//! Random padding lengths.

use tracing::trace;

use crate::PatchError;

/// The gzip extra field length is 16 bits wide, so padding lengths must stay below this.
pub const MAX_PADDING_BOUND: u32 = 1 << 16;

/// A source of unpredictable bytes.
pub trait EntropySource {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), PatchError>;
}

/// The operating system's cryptographically secure random number generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), PatchError> {
        getrandom::fill(dest).map_err(|error| PatchError::RandomSourceUnavailable(error.to_string()))
    }
}

/// Produces the same 32-bit draw every time. Makes patching deterministic.
#[derive(Debug, Clone, Copy)]
pub struct FixedEntropy(pub u32);

impl EntropySource for FixedEntropy {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), PatchError> {
        let bytes = self.0.to_le_bytes();
        for (i, byte) in dest.iter_mut().enumerate() {
            *byte = bytes[i % bytes.len()];
        }
        Ok(())
    }
}

/// Picks padding lengths in `0..bound`.
///
/// The draw is reduced with a plain modulo, so lengths below `2^32 % bound` come up very slightly
/// more often than the rest. With `bound` at most 2^16 the skew is under one part in 65536.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingSizeSampler {
    bound: u32,
}

impl PaddingSizeSampler {
    pub fn new(bound: u32) -> Result<Self, PatchError> {
        if bound == 0 || bound > MAX_PADDING_BOUND {
            return Err(PatchError::InternalInvariantViolation(format!(
                "padding bound {bound} is outside 1..={MAX_PADDING_BOUND}"
            )));
        }
        Ok(Self { bound })
    }

    pub fn sample(&self, entropy: &mut impl EntropySource) -> Result<u16, PatchError> {
        let mut draw = [0; 4];
        entropy.fill_bytes(&mut draw)?;
        let draw = u32::from_le_bytes(draw);
        let length = draw % self.bound;
        trace!(draw, bound = self.bound, length, "Sampled padding length");
        // bound <= 2^16, so the remainder fits.
        Ok(length as u16)
    }
}
