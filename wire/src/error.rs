use thiserror::Error;

/// Protocol-level failures: malformed or unrecognized bytes on the wire.
///
/// These are never fatal. The owner of a packet stream drops the offending
/// packet, increments a counter, and moves on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("magic mismatch: expected 0x4647, got {0:#06x}")]
    MagicMismatch(u16),

    #[error("unknown packet type byte {0:#04x}")]
    UnknownType(u8),

    #[error("body too short: need at least {need} bytes, got {got}")]
    MalformedBody { need: usize, got: usize },

    #[error("packet exceeds maximum length of {max} bytes")]
    PacketTooLarge { max: usize },

    #[error("invalid json body: {0}")]
    InvalidJson(String),
}

/// Failures decoding a Spectrogram Payload back into a pixel grid.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload too short to contain a header")]
    MissingHeader,

    #[error("codec header mismatch: expected 0x5350, got {0:#06x}")]
    HeaderMismatch(u16),

    #[error("declared grid is {width}x{height}, codec only supports 32x32")]
    UnsupportedDimensions { width: u8, height: u8 },

    #[error("run length token must be in 1..=127, got {0}")]
    InvalidRunLength(u8),

    #[error("token stream ended with {produced} pixel-pairs decoded, expected {expected}")]
    Truncated { produced: usize, expected: usize },

    #[error("token stream overflowed: decoded {produced} pixel-pairs, expected {expected}")]
    Overflowed { produced: usize, expected: usize },
}
