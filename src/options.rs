//! Decoder configuration surface.

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Which wire format a [`crate::Decoder`] instance speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum Protocol {
    /// ETM v3.5, as emitted by ARM application cores (Appendix D4).
    Etm35,
    /// Micro Trace Buffer, fixed 8-byte records, Cortex-M0+ class cores.
    Mtb,
}

/// Width of the context-ID field accompanying I-Sync and stand-alone
/// context packets. The only legal widths are 0, 1, 2 and 4 bytes; this
/// is encoded in the type so an invalid width is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum ContextBytes {
    None,
    One,
    Two,
    Four,
}

impl ContextBytes {
    pub fn len(self) -> usize {
        match self {
            ContextBytes::None => 0,
            ContextBytes::One => 1,
            ContextBytes::Two => 2,
            ContextBytes::Four => 4,
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl Default for ContextBytes {
    fn default() -> Self {
        ContextBytes::None
    }
}

/// Decoder configuration. Every field is already a small, fully
/// legal-by-construction enum or bool, so this is constructed directly
/// (or via [`Default`]) rather than through a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct DecoderOptions {
    pub protocol: Protocol,
    pub alt_addr_encoding: bool,
    pub context_bytes: ContextBytes,
    pub cycle_accurate: bool,
    pub data_only_mode: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions {
            protocol: Protocol::Etm35,
            alt_addr_encoding: false,
            context_bytes: ContextBytes::None,
            cycle_accurate: false,
            data_only_mode: false,
        }
    }
}
