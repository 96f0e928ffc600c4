use bitflags::bitflags;

use crate::serializable_bitflags;

bitflags! {
    /// Gzip member header `FLG` byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GzipFlags: u8 {
        const TEXT       = 0x01;
        const HEADER_CRC = 0x02;
        const EXTRA      = 0x04;
        const NAME       = 0x08;
        const COMMENT    = 0x10;
    }
}

serializable_bitflags!(GzipFlags);
