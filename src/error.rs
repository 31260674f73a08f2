use thiserror::Error;

/// Everything that can go wrong decoding or encoding a GIF.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not a GIF file: magic bytes were neither GIF89a nor GIF87a")]
    InvalidMagic,

    #[error("malformed block: {0}")]
    MalformedBlock(String),

    #[error("image has no color table (neither local nor global)")]
    MissingColorTable,

    #[error("unknown disposal method {0}")]
    UnknownDisposalMethod(u8),

    #[error("LZW dictionary would exceed the 12-bit code ceiling without a CLEAR")]
    LzwOverflow,

    #[error("LZW stream truncated before an END code")]
    LzwTruncated,

    #[error("first code after a CLEAR was not in the base alphabet")]
    LzwFirstAfterReset,

    #[error("octree quantizer failed to reduce to the requested color count")]
    QuantizerFailure,

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
