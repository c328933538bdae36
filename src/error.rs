//! Errors surfaced at the Rust API boundary.
//!
//! Most malformed input is tolerated by design (silently dropped, or
//! healed by the next A-Sync) rather than surfaced as a [`Result::Err`]:
//! this is a streaming protocol decoder, not a parser that fails a whole
//! document. The variants below are the handful of cases that genuinely
//! are exceptional at the API boundary.

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum DecoderError {
    /// [`crate::Decoder::pump`] was called in MTB mode with a trailing
    /// slice of fewer than 8 bytes left over after consuming all
    /// complete records. Decoding of the records that did fit is
    /// unaffected; the caller should keep these bytes and prepend them
    /// to the next buffer.
    #[error("{0} trailing byte(s) left over after the last complete MTB record")]
    EmptyMtbTail(usize),
}
