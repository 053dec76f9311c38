//! Lossless byte-stream compression built on Prediction by Partial Matching.
//!
//! The model predicts each byte from the longest matching recent context and
//! falls back to shorter contexts through escape symbols; an arithmetic coder
//! turns the resulting cumulative distributions into the output stream.
//! Context statistics live in a fixed-size table sized from a memory limit;
//! when the table fills it is cleared and, optionally, re-primed from a
//! window of recently seen bytes.
//!
//! ```
//! use ppmpress::{compress, decompress, CompressOptions};
//! use std::io::Cursor;
//!
//! let text = b"to be, or not to be, that is the question";
//! let mut packed = Vec::new();
//! compress(
//!     Cursor::new(&text[..]),
//!     &mut packed,
//!     std::io::sink(),
//!     &CompressOptions::default(),
//! )
//! .unwrap();
//!
//! let mut plain = Vec::new();
//! decompress(Cursor::new(&packed), &mut plain, std::io::sink()).unwrap();
//! assert_eq!(plain, text);
//! ```
#![warn(missing_docs)]

mod compress;
mod decompress;
mod error;
mod model;
mod range_coder;
mod table;

pub use compress::{compress, CompressOptions};
pub use decompress::decompress;
pub use error::Error;
pub use model::Model;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Largest byte symbol; the alphabet without the escape and end-of-stream
/// symbols is `0..=ALPHA`.
pub const ALPHA: u16 = 255;

/// Code for the escape symbol.
pub const ESCAPE: u16 = 256;

/// Code for the end-of-stream symbol.
pub const EOS: u16 = 257;

/// Length of a cumulative distribution array.
pub const DIST_LEN: usize = EOS as usize + 2;

/// Smallest accepted model order.
pub const ORDER_MIN: u32 = 1;
/// Largest accepted model order.
pub const ORDER_MAX: u32 = 6;
/// Default model order.
pub const ORDER_DEFAULT: u32 = 3;

/// Smallest accepted memory limit in MiB.
pub const LIMIT_MIN: u32 = 8;
/// Largest accepted memory limit in MiB.
pub const LIMIT_MAX: u32 = 2048;
/// Default memory limit in MiB.
pub const LIMIT_DEFAULT: u32 = 32;

/// Smallest accepted bootstrap buffer size in KiB.
pub const BOOT_MIN: u32 = 1;
/// Largest accepted bootstrap buffer size in KiB.
pub const BOOT_MAX: u32 = 64;
/// Default bootstrap buffer size in KiB.
pub const BOOT_DEFAULT: u32 = 16;

/// Left edge index of a symbol's interval in a cumulative array.
#[inline]
pub const fn lo(c: u16) -> usize {
    c as usize
}

/// Right edge index of a symbol's interval in a cumulative array.
#[inline]
pub const fn hi(c: u16) -> usize {
    c as usize + 1
}

/// Name used as the prefix of diagnostic lines.
pub(crate) const SELF: &str = "ppmpress";

/// Stream signature, zero-terminated.
pub(crate) const MAGIC: [u8; 5] = *b"ppmz\0";

/// Counter ceiling; no stored frequency ever reaches this value.
pub(crate) const MAX_FREQUENCY: u16 = 1 << 14;
