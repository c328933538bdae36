//! A sans-I/O decoder for two ARM CPU instruction-trace protocols:
//!
//! - **ETM v3.5**, the byte-oriented packet stream ARMv7-M application
//!   cores emit (ARM IHI 0064, Appendix D4).
//! - **MTB**, the fixed 8-byte discontinuity-record format used by the
//!   Cortex-M0+ Micro Trace Buffer.
//!
//! The decoder is a synchronous, allocation-free state machine: push
//! bytes (or MTB records) in through [`Decoder::pump`], get CPU-trace
//! snapshots and sticky per-field change bitmaps out through a
//! callback. Nothing here does I/O; framing, buffering and retry are
//! entirely the caller's concern.
//!
//! ```
//! use trace_decode::{Decoder, DecoderOptions};
//!
//! let mut decoder = Decoder::new(DecoderOptions::default());
//! decoder.force_sync(true);
//!
//! let mut seen = Vec::new();
//! decoder
//!     .pump(&[0x08, 0x21, 0x00, 0x00, 0x00], |cpu| seen.push(cpu.addr), None)
//!     .unwrap();
//! ```

mod address;
mod cpu_state;
mod error;
mod etm35;
mod mtb;
mod options;
mod reporter;

pub use cpu_state::{AddrMode, ChangeFlags, CpuState, Stats};
pub use error::DecoderError;
pub use options::{ContextBytes, DecoderOptions, Protocol};
pub use reporter::{LogReporter, Reporter, Verbosity};

use etm35::Etm35State;
use mtb::MtbState;

/// Owns every byte of mutable decoder state. Nothing here is behind a
/// pointer or a heap allocation: the whole instance can live on the
/// stack or be embedded in a larger struct.
pub struct Decoder {
    options: DecoderOptions,

    synced: bool,
    etm_state: Etm35State,
    mtb_state: MtbState,

    async_count: u32,
    rxed_isync: bool,

    /// Per-packet progress counter, reused across every multi-byte
    /// collector state (only one is ever active at a time).
    byte_count: u32,
    addr_construct: u32,
    cycle_construct: u32,
    context_construct: u32,
    ts_construct: u64,

    cpu: CpuState,
    stats: Stats,
}

impl Decoder {
    /// Equivalent to the original `init(protocol, altEncoding)`: builds a
    /// fresh instance with its own inline `CpuState`. Post-condition:
    /// unsynchronized, `rxed_isync = false`.
    pub fn new(options: DecoderOptions) -> Self {
        Decoder {
            options,
            synced: false,
            etm_state: Etm35State::Unsynced,
            mtb_state: MtbState::Unsynced,
            async_count: 0,
            rxed_isync: false,
            byte_count: 0,
            addr_construct: 0,
            cycle_construct: 0,
            context_construct: 0,
            ts_construct: 0,
            cpu: CpuState::default(),
            stats: Stats::default(),
        }
    }

    /// Re-initializes an existing instance in place with new options,
    /// avoiding a reallocation of the (already inline) `CpuState`.
    pub fn reset(&mut self, options: DecoderOptions) {
        *self = Decoder::new(options);
    }

    /// Feeds `buf` through the protocol selected by
    /// [`DecoderOptions::protocol`], invoking `on_packet` once per
    /// completed, synchronized packet (ETM35: gated on `rxed_isync`;
    /// MTB: as soon as a non-bootstrap record completes). Returns the
    /// number of bytes (ETM35) or records (MTB) consumed.
    ///
    /// Zero-length input is legal and consumes nothing.
    ///
    /// In MTB mode, a trailing slice of 1..=7 bytes after the last
    /// complete record is never consumed; the records that did fit are
    /// still decoded and reported, but the call returns
    /// [`DecoderError::EmptyMtbTail`] so the caller knows how many
    /// bytes to keep for the next call.
    pub fn pump(
        &mut self,
        buf: &[u8],
        mut on_packet: impl FnMut(&CpuState),
        mut reporter: Option<&mut dyn Reporter>,
    ) -> Result<usize, DecoderError> {
        match self.options.protocol {
            Protocol::Etm35 => {
                for &byte in buf {
                    self.stats.bytes_processed += 1;
                    if let Some(snapshot) = self.etm35_byte(byte, reporter.as_deref_mut()) {
                        on_packet(&snapshot);
                    }
                }
                Ok(buf.len())
            }
            Protocol::Mtb => {
                let mut consumed_records = 0usize;
                let mut chunks = buf.chunks_exact(8);
                for chunk in &mut chunks {
                    let source = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    let dest = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
                    self.stats.bytes_processed += 8;
                    consumed_records += 1;
                    if let Some(snapshot) = self.mtb_record(source, dest) {
                        on_packet(&snapshot);
                    }
                }
                let tail = chunks.remainder().len();
                if tail == 0 {
                    Ok(consumed_records)
                } else {
                    Err(DecoderError::EmptyMtbTail(tail))
                }
            }
        }
    }

    /// If currently unsynchronized and `is_synced` is true: transition
    /// to a ready-to-receive state and increment `stats.sync_count`.
    /// For ETM35 this means IDLE; for MTB it means the bootstrap
    /// sub-state (the next record consumed seeds `next_addr` without
    /// emitting, exactly as at `init`).
    ///
    /// If currently synchronized and `is_synced` is false: increment
    /// `stats.lost_sync_count`, reset `async_count` and `rxed_isync`,
    /// and drop back to unsynchronized. Otherwise a no-op.
    pub fn force_sync(&mut self, is_synced: bool) {
        if is_synced {
            if !self.synced {
                self.synced = true;
                self.stats.sync_count += 1;
                self.etm_state = Etm35State::Idle;
                self.mtb_state = MtbState::Unsynced;
            }
        } else if self.synced {
            self.synced = false;
            self.stats.lost_sync_count += 1;
            self.async_count = 0;
            self.rxed_isync = false;
            self.etm_state = Etm35State::Unsynced;
            self.mtb_state = MtbState::Unsynced;
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn cpu_state_snapshot(&self) -> CpuState {
        self.cpu.clone()
    }

    /// Read-and-clear: reports whether any of `flags` has changed since
    /// the last time this (or an overlapping) set of flags was queried,
    /// then clears exactly those bits from the sticky bitmap.
    pub fn state_changed(&mut self, flags: ChangeFlags) -> bool {
        self.cpu.clear_change(flags)
    }

    pub fn set_using_alt_addr_encode(&mut self, alt: bool) {
        self.options.alt_addr_encoding = alt;
    }

    /// Switches protocols. Since the two state machines' accumulators
    /// are not meaningfully comparable, this re-synchronizes from
    /// scratch exactly as `force_sync(false)` followed by a protocol
    /// change would, rather than risk carrying stale mid-packet state
    /// across an incompatible wire format.
    pub fn set_protocol(&mut self, protocol: Protocol) {
        self.options.protocol = protocol;
        self.synced = false;
        self.async_count = 0;
        self.rxed_isync = false;
        self.etm_state = Etm35State::Unsynced;
        self.mtb_state = MtbState::Unsynced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> Decoder {
        let mut d = Decoder::new(DecoderOptions::default());
        d.force_sync(true);
        d
    }

    #[test]
    fn trigger_packet_sets_change_bit_and_emits() {
        let mut d = decoder();
        // First I-Sync (no context bytes, default) to establish rxed_isync.
        d.pump(&[0x08, 0x00, 0x21, 0x00, 0x00, 0x00], |_| {}, None)
            .unwrap();
        assert!(d.state_changed(ChangeFlags::all()));

        let mut got = None;
        d.pump(&[0x0C], |cpu| got = Some(cpu.clone()), None).unwrap();
        let cpu = got.expect("trigger packet must emit");
        assert!(cpu.change_record().contains(ChangeFlags::TRIGGER));
    }

    #[test]
    fn mtb_bootstrap_then_discontinuity() {
        let mut options = DecoderOptions::default();
        options.protocol = Protocol::Mtb;
        let mut d = Decoder::new(options);
        d.force_sync(true);

        let mut events = Vec::new();
        // source = 0x1000_0000, dest = 0x2000_0001
        let record1 = [0x00, 0x00, 0x00, 0x10, 0x01, 0x00, 0x00, 0x20];
        // source = 0x3000_0001, dest = 0x4000_0000
        let record2 = [0x01, 0x00, 0x00, 0x30, 0x00, 0x00, 0x00, 0x40];
        d.pump(&record1, |cpu| events.push(cpu.clone()), None).unwrap();
        assert!(events.is_empty(), "bootstrap record must not emit");

        d.pump(&record2, |cpu| events.push(cpu.clone()), None).unwrap();
        assert_eq!(events.len(), 1);
        let cpu = &events[0];
        assert_eq!(cpu.addr, 0x2000_0000);
        assert!(cpu.change_record().contains(ChangeFlags::TRACESTART));
        assert!(!cpu.change_record().contains(ChangeFlags::EX_ENTRY));
        assert!(cpu.change_record().contains(ChangeFlags::ADDRESS));
        assert!(cpu.change_record().contains(ChangeFlags::LINEAR));
    }

    #[test]
    fn mtb_tail_is_reported_but_records_still_decode() {
        let mut options = DecoderOptions::default();
        options.protocol = Protocol::Mtb;
        let mut d = Decoder::new(options);
        d.force_sync(true);

        let mut buf = vec![0x01, 0x00, 0x00, 0x10, 0x01, 0x00, 0x00, 0x20];
        buf.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        let mut count = 0;
        let err = d.pump(&buf, |_| count += 1, None).unwrap_err();
        assert_eq!(err, DecoderError::EmptyMtbTail(3));
    }

    #[test]
    fn unsynced_decoder_drops_bytes() {
        let mut d = Decoder::new(DecoderOptions::default());
        let mut count = 0;
        d.pump(&[0x0C, 0x0C, 0x0C], |_| count += 1, None).unwrap();
        assert_eq!(count, 0);
        assert!(!d.is_synced());
    }
}
