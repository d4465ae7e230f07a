//! Error type for torlink-cell.

use thiserror::Error;

/// An error that occurred while encoding or decoding a cell or one of
/// its parts.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The object we're trying to parse ended too soon.
    ///
    /// At the framing level this is not fatal: the caller should keep
    /// the bytes it has and retry once more arrive.
    #[error("object truncated (or not fully present)")]
    Truncated,
    /// There were extra bytes at the end of an object where none were
    /// expected.
    #[error("extra bytes at end of object")]
    ExtraneousBytes,
    /// A cell or message violated its format in some other way.
    #[error("bad object: {0}")]
    BadMessage(&'static str),
    /// A relay message declared a payload longer than the 498 bytes
    /// that fit in a relay cell.
    #[error("relay payload too long")]
    OversizedPayload,
    /// A cell used a circuit id in a way its command doesn't allow.
    #[error("cell with invalid circuit id: {0}")]
    BadCircId(&'static str),
    /// Something went wrong that indicates a bug in this crate.
    #[error("internal programming error")]
    Internal,
}
