use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileFormatError {
    #[error("bad magic bytes: 0x{0:04x}")]
    BadMagic(u16),
    #[error("unsupported word size: {0} bits")]
    UnsupportedWordSize(u16),
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u64),
    #[error("reserved header field must be zero")]
    ReservedFieldNotZero,
    #[error("version 0 images cannot set nonzero flags")]
    FlagsRequireVersion,
    #[error("segment data is longer than its declared segment length")]
    DataLongerThanSegment,
    #[error("two segments' address ranges overlap")]
    SegmentOverlap,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
