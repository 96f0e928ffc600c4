use htb_core::binary;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    /// The input ended in the middle of a header field.
    #[error("input is truncated: cannot read {field}")]
    TruncatedInput {
        field: &'static str,
        #[source]
        source: binary::Error,
    },
    #[error("secure random source is unavailable: {0}")]
    RandomSourceUnavailable(String),
    /// A logic error in the patcher, not a problem with the input.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
    /// The existing gzip extra field leaves no room for another subfield.
    #[error("gzip extra field is already {existing} bytes long; no room for the padding subfield")]
    ExtraFieldFull { existing: u16 },
    /// The brotli stream opens with a byte-aligned meta-block, which the splice would misalign.
    #[error("cannot pad brotli stream whose first meta-block is {0}")]
    UnsupportedBrotliStream(&'static str),
    #[error("I/O error")]
    Io(#[from] binary::Error),
}

pub trait ResultFieldExt<T> {
    /// Attributes a short read to the header field named `field`.
    fn field(self, field: &'static str) -> Result<T, PatchError>;
}

impl<T> ResultFieldExt<T> for Result<T, binary::Error> {
    fn field(self, field: &'static str) -> Result<T, PatchError> {
        self.map_err(|source| {
            if source.is_truncated() {
                PatchError::TruncatedInput { field, source }
            } else {
                PatchError::Io(source)
            }
        })
    }
}
