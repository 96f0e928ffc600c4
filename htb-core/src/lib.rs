pub mod binary;
pub mod bits;
pub mod flags;
