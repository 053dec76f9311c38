use std::fmt::Display;

use crate::{BOOT_MAX, BOOT_MIN, LIMIT_MAX, LIMIT_MIN, ORDER_MAX, ORDER_MIN};

/// The error type of the crate.
#[derive(Debug)]
pub enum Error {
    /// Input does not begin with the stream signature.
    BadSignature,
    /// Model order outside the accepted range.
    OrderOutOfRange(u32),
    /// Memory limit in MiB outside the accepted range.
    LimitOutOfRange(u32),
    /// Bootstrap buffer size in KiB outside the accepted range.
    BootstrapOutOfRange(u32),
    /// A symbol that is not a byte was passed to the model update.
    SymbolOutOfRange(u16),
    /// The escape symbol was decoded from the uniform fallback distribution.
    EscapeLeak,
    /// Compressed data ended before the end-of-stream symbol.
    UnexpectedEof,
    /// Stored checksum does not match the decompressed data.
    ChecksumMismatch {
        /// Checksum read from the stream trailer.
        stored: u32,
        /// Checksum computed over the decompressed bytes.
        computed: u32,
    },
    /// I/O error.
    Io(std::io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadSignature => write!(f, "no magic"),
            Self::OrderOutOfRange(order) => {
                write!(f, "order {order} given, accepted order is {ORDER_MIN}-{ORDER_MAX}")
            }
            Self::LimitOutOfRange(limit) => {
                write!(f, "limit {limit} given, accepted limit is {LIMIT_MIN}-{LIMIT_MAX} MiB")
            }
            Self::BootstrapOutOfRange(size) => write!(
                f,
                "bootstrap buffer {size} given, accepted buffer is {BOOT_MIN}-{BOOT_MAX} KiB"
            ),
            Self::SymbolOutOfRange(c) => write!(f, "update symbol {c} out of range"),
            Self::EscapeLeak => write!(f, "escape decoded from the fallback distribution"),
            Self::UnexpectedEof => write!(f, "unexpected end of compressed data"),
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "checksum does not match: stream {stored:08x}, data {computed:08x}"
            ),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
