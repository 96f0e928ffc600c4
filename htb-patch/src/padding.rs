use tracing::debug;

use crate::{
    entropy::{EntropySource, PaddingSizeSampler},
    PatchError,
};

/// Padding content is this string repeated and cut off at the padding length.
pub const TEMPLATE: &[u8] = b"htbv1";

/// Filler for the one-byte padding brotli gets when a length of zero is drawn.
pub const FILLER: u8 = TEMPLATE[0];

pub fn generate(length: u16) -> Vec<u8> {
    TEMPLATE
        .iter()
        .copied()
        .cycle()
        .take(usize::from(length))
        .collect()
}

/// A padding region ready to be spliced into a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddingSpec {
    content: Vec<u8>,
}

impl PaddingSpec {
    pub fn new(length: u16) -> Self {
        Self {
            content: generate(length),
        }
    }

    pub fn sampled(
        sampler: &PaddingSizeSampler,
        entropy: &mut impl EntropySource,
    ) -> Result<Self, PatchError> {
        let length = sampler.sample(entropy)?;
        debug!(length, "Padding");
        Ok(Self::new(length))
    }

    /// Like [`sampled`][Self::sampled], but never empty: brotli's metadata blocks cannot be
    /// spliced in with zero length, so a zero draw becomes a single filler byte.
    pub fn sampled_non_empty(
        sampler: &PaddingSizeSampler,
        entropy: &mut impl EntropySource,
    ) -> Result<Self, PatchError> {
        let padding = Self::sampled(sampler, entropy)?;
        if padding.is_empty() {
            debug!("Zero padding drawn; using a single filler byte instead");
            Ok(Self {
                content: vec![FILLER],
            })
        } else {
            Ok(padding)
        }
    }

    /// Shortens the padding to at most `max_length` bytes.
    pub fn truncate(&mut self, max_length: u16) {
        self.content.truncate(usize::from(max_length));
    }

    pub fn len(&self) -> u16 {
        // Only ever built from a u16 length.
        self.content.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

#[cfg(test)]
mod tests {
    use crate::entropy::FixedEntropy;

    use super::*;

    #[test]
    fn length_is_exact() {
        for length in [0, 1, 4, 5, 6, 16, 1000, u16::MAX] {
            assert_eq!(generate(length).len(), usize::from(length));
        }
    }

    #[test]
    fn content_is_repeated_template() {
        let padding = generate(13);
        assert_eq!(padding, b"htbv1htbv1htb");

        let padding = generate(1003);
        let mut chunks = padding.chunks(TEMPLATE.len());
        let last = chunks.next_back().unwrap();
        assert!(chunks.all(|chunk| chunk == TEMPLATE));
        assert_eq!(last, &TEMPLATE[..3]);
    }

    #[test]
    fn empty_padding() {
        assert!(generate(0).is_empty());
        let padding = PaddingSpec::new(0);
        assert!(padding.is_empty());
        assert_eq!(padding.len(), 0);
    }

    #[test]
    fn non_empty_replaces_zero_with_filler() {
        let sampler = PaddingSizeSampler::new(16).unwrap();
        let padding = PaddingSpec::sampled_non_empty(&sampler, &mut FixedEntropy(32)).unwrap();
        assert_eq!(padding.content(), [FILLER]);

        let padding = PaddingSpec::sampled_non_empty(&sampler, &mut FixedEntropy(7)).unwrap();
        assert_eq!(padding.content(), b"htbv1ht");
    }

    #[test]
    fn truncate_keeps_prefix() {
        let mut padding = PaddingSpec::new(12);
        padding.truncate(4);
        assert_eq!(padding.content(), b"htbv");
        padding.truncate(10);
        assert_eq!(padding.len(), 4);
    }
}
