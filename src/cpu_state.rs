//! The observable CPU-trace snapshot and its sticky change bitmap.

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Sticky bitmap of fields touched on the current [`CpuState`] since
    /// the consumer last polled them. Read-and-clear: see
    /// [`crate::Decoder::state_changed`].
    #[cfg_attr(
        feature = "serde",
        derive(Serialize, Deserialize),
        serde(crate = "serde_crate")
    )]
    pub struct ChangeFlags: u32 {
        const ADDRESS    = 1 << 0;
        const EX_ENTRY   = 1 << 1;
        const EX_EXIT    = 1 << 2;
        const TRIGGER    = 1 << 3;
        const CLOCKSPEED = 1 << 4;
        const EXCEPTION  = 1 << 5;
        const CANCELLED  = 1 << 6;
        const VMID       = 1 << 7;
        const CONTEXTID  = 1 << 8;
        const TSTAMP     = 1 << 9;
        const CYCLECOUNT = 1 << 10;
        const ENATOMS    = 1 << 11;
        const WATOMS     = 1 << 12;
        const SECURE     = 1 << 13;
        const ALTISA     = 1 << 14;
        const HYP        = 1 << 15;
        const JAZELLE    = 1 << 16;
        const THUMB      = 1 << 17;
        const ISLSIP     = 1 << 18;
        const REASON     = 1 << 19;
        const RESUME     = 1 << 20;
        const TRACESTART = 1 << 21;
        const LINEAR     = 1 << 22;
    }
}

/// The address mode of the last reconstructed instruction address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub enum AddrMode {
    Arm,
    Thumb,
    Jazelle,
}

impl Default for AddrMode {
    fn default() -> Self {
        AddrMode::Arm
    }
}

/// Observable CPU-trace state as reconstructed from the packet stream.
///
/// This is a plain snapshot: every field reflects the most recently
/// decoded value, not a delta. [`CpuState::change_record`] tells the
/// consumer which of these fields actually moved since the last poll.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct CpuState {
    /// Last decoded instruction address, alignment bit stripped.
    pub addr: u32,
    /// MTB only: next-instruction address; bit 0 encodes arrived-via-exception.
    pub next_addr: u32,
    /// MTB only: source side of the discontinuity.
    pub to_addr: u32,
    pub addr_mode: AddrMode,
    pub thumb: bool,
    pub jazelle: bool,
    pub alt_isa: bool,
    pub non_secure: bool,
    pub hyp: bool,
    /// Exception number, up to 9 bits assembled across two exception bytes.
    pub exception: u16,
    /// Resume-from-exception code (4 bits).
    pub resume: u8,
    /// Current context ID; width is `contextBytes * 8` bits.
    pub context_id: u32,
    pub vmid: u8,
    /// Monotonically-accumulated timestamp.
    pub ts: u64,
    /// Cycle count from CYCCNT or the cycle count preceding an I-Sync.
    pub cycle_count: u32,
    pub eatoms: u8,
    pub natoms: u8,
    pub watoms: u8,
    /// One bit per atom in the current P-header; 1 = executed.
    pub disposition: u32,
    /// Running total of atoms observed since init. Never decreases.
    pub inst_count: u64,
    /// I-Sync reason code (2 bits).
    pub reason: u8,
    /// Set if the I-Sync that produced the current address is immediately
    /// followed by a branch-address packet.
    pub is_lsip: bool,

    #[cfg_attr(feature = "serde", serde(skip))]
    change_record: ChangeFlags,
}

impl CpuState {
    /// Current change bitmap, without clearing it. Use
    /// [`crate::Decoder::state_changed`] to read-and-clear a single flag.
    pub fn change_record(&self) -> ChangeFlags {
        self.change_record
    }

    pub(crate) fn set_change(&mut self, flags: ChangeFlags) {
        self.change_record.insert(flags);
    }

    pub(crate) fn clear_change(&mut self, flags: ChangeFlags) -> bool {
        let was_set = self.change_record.intersects(flags);
        self.change_record.remove(flags);
        was_set
    }
}

/// Synchronization and throughput counters. Purely observational; never
/// consulted by the decoder for control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
pub struct Stats {
    /// Number of times the decoder has (re-)entered a synchronized state.
    pub sync_count: u64,
    /// Number of times synchronization was explicitly lost.
    pub lost_sync_count: u64,
    /// Total bytes (ETM35) or MTB-record bytes fed through [`crate::Decoder::pump`].
    pub bytes_processed: u64,
    /// Total malformed/unrecognized bytes reported to the [`crate::Reporter`].
    pub reported_errors: u64,
}
