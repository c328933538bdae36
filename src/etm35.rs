//! The ETM v3.5 byte-oriented state machine (Appendix D4).
//!
//! Each `pump`-facing helper returns `true` when a packet has just
//! completed (the caller is responsible for gating emission on
//! `rxed_isync` and cloning the snapshot). `false` means "keep
//! collecting, nothing to hand back yet".

use bitmatch::bitmatch;

use crate::address;
use crate::cpu_state::{AddrMode, ChangeFlags};
use crate::reporter::{report, Reporter, Verbosity};
use crate::Decoder;

/// ETM35-specific protocol states (Appendix D4, as reorganized per the
/// design notes into a plain sum type instead of the source's nested
/// `switch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Etm35State {
    Unsynced,
    Idle,
    CollectBaStdFormat,
    CollectBaAltFormat,
    CollectException,
    GetVmid,
    GetTstamp,
    GetCycleCount,
    GetICycleCount,
    GetContextId,
    /// Mirrors a state name present in the original decoder's state
    /// enumeration. Given the IDLE-dispatch rules actually specified,
    /// nothing transitions here; it is kept for parity with the
    /// documented state set rather than invented a transition into it.
    WaitISync,
    GetContextByte,
    GetInfoByte,
    GetIAddress,
}

impl Decoder {
    /// Feed a single ETM35 byte through the state machine. Returns
    /// `Some(snapshot)` exactly when a packet completed *and*
    /// synchronization has already been established (an I-Sync has been
    /// fully consumed at least once), per invariant 2.
    pub(crate) fn etm35_byte(
        &mut self,
        byte: u8,
        mut reporter: Option<&mut dyn Reporter>,
    ) -> Option<crate::CpuState> {
        if !self.synced {
            // Bytes before an explicit force_sync(true) are dropped
            // outright; A-Sync realignment only assists a decoder that
            // has already been told it is synchronized (testable
            // property 2's UNSYNCED carve-out).
            return None;
        }

        if self.async_count >= 5 && byte == 0x80 {
            self.etm_state = Etm35State::Idle;
            self.async_count = 0;
            return None;
        }
        if byte == 0 {
            self.async_count += 1;
        } else {
            self.async_count = 0;
        }

        let emit = match self.etm_state {
            Etm35State::Unsynced => unreachable!("guarded above"),
            Etm35State::Idle => self.idle_dispatch(byte, &mut reporter),
            Etm35State::CollectBaStdFormat => self.collect_ba_std(byte),
            Etm35State::CollectBaAltFormat => self.collect_ba_alt(byte),
            Etm35State::CollectException => self.collect_exception(byte),
            Etm35State::GetVmid => self.get_vmid(byte),
            Etm35State::GetTstamp => self.get_tstamp(byte),
            Etm35State::GetCycleCount => self.get_cycle_count(byte, false),
            Etm35State::GetICycleCount => self.get_cycle_count(byte, true),
            Etm35State::GetContextId => self.get_context_id_standalone(byte),
            Etm35State::WaitISync => false,
            Etm35State::GetContextByte => self.get_context_byte(byte),
            Etm35State::GetInfoByte => self.get_info_byte(byte),
            Etm35State::GetIAddress => self.get_iaddress(byte),
        };

        if emit && self.rxed_isync {
            Some(self.cpu.clone())
        } else {
            None
        }
    }

    #[bitmatch]
    fn idle_dispatch(&mut self, byte: u8, reporter: &mut Option<&mut dyn Reporter>) -> bool {
        #[bitmatch]
        match byte {
            "nnnnnnn1" => self.begin_branch_address(n),
            "0000_0000" => false,
            "0000_0100" => {
                self.byte_count = 0;
                self.cycle_construct = 0;
                self.etm_state = Etm35State::GetCycleCount;
                false
            }
            "0000_1000" => {
                self.enter_isync_context_or_info();
                false
            }
            "0111_0000" => {
                self.byte_count = 0;
                self.cycle_construct = 0;
                self.etm_state = Etm35State::GetICycleCount;
                false
            }
            "0000_1100" => {
                self.cpu.set_change(ChangeFlags::TRIGGER);
                self.etm_state = Etm35State::Idle;
                true
            }
            "0011_1100" => {
                self.etm_state = Etm35State::GetVmid;
                false
            }
            "0100_0k10" => {
                self.byte_count = 0;
                self.ts_construct = 0;
                if k != 0 {
                    self.cpu.set_change(ChangeFlags::CLOCKSPEED);
                }
                self.etm_state = Etm35State::GetTstamp;
                false
            }
            "0110_0110" => false,
            "0110_1110" => {
                self.byte_count = 0;
                self.context_construct = 0;
                if self.options.context_bytes.is_empty() {
                    self.etm_state = Etm35State::Idle;
                    true
                } else {
                    self.etm_state = Etm35State::GetContextId;
                    false
                }
            }
            "0111_0110" => {
                self.cpu.set_change(ChangeFlags::EX_EXIT);
                self.etm_state = Etm35State::Idle;
                true
            }
            "0111_1110" => {
                self.cpu.set_change(ChangeFlags::EX_ENTRY);
                self.etm_state = Etm35State::Idle;
                true
            }
            "1??????0" => self.decode_pheader(byte, reporter),
            "hhhhhhhh" => {
                report!(
                    self,
                    reporter.as_deref_mut(),
                    Verbosity::Error,
                    "unrecognized IDLE byte: {:#04x}",
                    h
                );
                false
            }
        }
    }

    fn decode_pheader(&mut self, byte: u8, reporter: &mut Option<&mut dyn Reporter>) -> bool {
        if !self.options.cycle_accurate {
            if byte & 0b11 == 0b00 {
                let eatoms = (byte >> 2) & 0x0F;
                let natoms = (byte >> 6) & 1;
                self.cpu.eatoms = eatoms;
                self.cpu.natoms = natoms;
                self.cpu.watoms = 0;
                self.cpu.disposition = if eatoms == 0 { 0 } else { (1u32 << eatoms) - 1 };
            } else if byte & 0x0F == 0x02 {
                let a1 = (byte >> 3) & 1 == 0;
                let a2 = (byte >> 2) & 1 == 0;
                self.cpu.eatoms = a1 as u8 + a2 as u8;
                self.cpu.natoms = 2 - self.cpu.eatoms;
                self.cpu.watoms = 0;
                self.cpu.disposition = (a1 as u32) | ((a2 as u32) << 1);
            } else {
                report!(
                    self,
                    reporter.as_deref_mut(),
                    Verbosity::Error,
                    "unrecognized P-header: {:#04x}",
                    byte
                );
                return false;
            }
            self.cpu.inst_count += (self.cpu.eatoms + self.cpu.natoms) as u64;
            self.cpu.set_change(ChangeFlags::ENATOMS);
        } else {
            if byte == 0x80 {
                self.cpu.eatoms = 0;
                self.cpu.natoms = 0;
                self.cpu.watoms = 1;
                self.cpu.disposition = 0;
            } else if byte & 0b1010_0011 == 0b1000_0000 {
                let eatoms = (byte >> 2) & 0x7;
                let natoms = (byte >> 6) & 1;
                self.cpu.eatoms = eatoms;
                self.cpu.natoms = natoms;
                self.cpu.watoms = eatoms + natoms;
                self.cpu.disposition = if eatoms == 0 { 0 } else { (1u32 << eatoms) - 1 };
            } else if byte & 0b1111_0011 == 0b1000_0010 {
                let a1 = (byte >> 3) & 1 == 0;
                let a2 = (byte >> 2) & 1 == 0;
                self.cpu.eatoms = a1 as u8 + a2 as u8;
                self.cpu.natoms = 2 - self.cpu.eatoms;
                self.cpu.watoms = 1;
                self.cpu.disposition = (a1 as u32) | ((a2 as u32) << 1);
            } else if byte & 0b1010_0000 == 0b1010_0000 {
                let eatoms = (byte >> 6) & 1;
                let watoms = (byte >> 2) & 0x7;
                self.cpu.eatoms = eatoms;
                self.cpu.natoms = 0;
                self.cpu.watoms = watoms;
                self.cpu.disposition = if eatoms == 0 { 0 } else { (1u32 << eatoms) - 1 };
            } else if byte & 0b1111_1011 == 0b1001_0010 {
                let executed = (byte >> 2) & 1 == 0;
                self.cpu.eatoms = executed as u8;
                self.cpu.natoms = (!executed) as u8;
                self.cpu.watoms = 0;
                self.cpu.disposition = executed as u32;
            } else {
                report!(
                    self,
                    reporter.as_deref_mut(),
                    Verbosity::Error,
                    "unrecognized P-header: {:#04x}",
                    byte
                );
                return false;
            }
            self.cpu.inst_count += (self.cpu.eatoms + self.cpu.natoms) as u64;
            self.cpu.set_change(ChangeFlags::ENATOMS);
            self.cpu.set_change(ChangeFlags::WATOMS);
        }
        self.etm_state = Etm35State::Idle;
        true
    }

    fn begin_branch_address(&mut self, bits7: u8) -> bool {
        let cont = (bits7 >> 6) & 1 != 0;
        let payload = (bits7 & 0x3F) as u32;

        self.byte_count = 1;
        self.addr_construct = 0;
        address::accumulate(&mut self.addr_construct, self.cpu.addr_mode, 0, payload);

        self.etm_state = if self.options.alt_addr_encoding {
            Etm35State::CollectBaAltFormat
        } else {
            Etm35State::CollectBaStdFormat
        };

        if cont {
            false
        } else {
            self.cpu.addr = self.addr_construct & !1;
            self.finish_address()
        }
    }

    fn finish_address(&mut self) -> bool {
        self.cpu.set_change(ChangeFlags::ADDRESS);
        self.etm_state = Etm35State::Idle;
        true
    }

    fn enter_collect_exception(&mut self) {
        self.cpu.set_change(ChangeFlags::EX_ENTRY);
        self.byte_count = 0;
        self.cpu.resume = 0;
        self.etm_state = Etm35State::CollectException;
    }

    fn collect_ba_std(&mut self, byte: u8) -> bool {
        let idx = self.byte_count;

        if idx == 4 {
            let cont = (byte >> 7) & 1 != 0;

            if self.cpu.addr_mode == AddrMode::Arm && cont {
                // Legacy inline exception trailer on the fifth byte.
                let exc = (byte >> 4) & 0x07;
                self.cpu.exception = exc as u16;
                self.cpu.set_change(ChangeFlags::EXCEPTION);
                if byte & (1 << 6) != 0 {
                    self.cpu.set_change(ChangeFlags::CANCELLED);
                }
                self.etm_state = Etm35State::Idle;
                return true;
            }

            let exc_follows = (byte >> 6) & 1 != 0;
            let payload = (byte & 0x3F) as u32;
            address::accumulate(&mut self.addr_construct, self.cpu.addr_mode, idx, payload);
            self.byte_count += 1;
            self.cpu.addr = self.addr_construct & !1;

            if exc_follows {
                self.enter_collect_exception();
                false
            } else {
                self.finish_address()
            }
        } else {
            let cont = (byte >> 7) & 1 != 0;
            let payload = (byte & 0x7F) as u32;
            address::accumulate(&mut self.addr_construct, self.cpu.addr_mode, idx, payload);
            self.byte_count += 1;

            if cont {
                false
            } else {
                self.cpu.addr = self.addr_construct & !1;
                self.finish_address()
            }
        }
    }

    fn collect_ba_alt(&mut self, byte: u8) -> bool {
        let idx = self.byte_count;
        let cont = (byte >> 7) & 1 != 0;

        if cont && idx < 4 {
            let payload = (byte & 0x7F) as u32;
            address::accumulate(&mut self.addr_construct, self.cpu.addr_mode, idx, payload);
            self.byte_count += 1;
            false
        } else {
            // Terminal byte: either the format's 6-bit-payload final
            // byte, or the defensive cap at five bytes total.
            let exc_follows = !cont && (byte >> 6) & 1 != 0;
            let payload = (byte & 0x3F) as u32;
            address::accumulate(&mut self.addr_construct, self.cpu.addr_mode, idx, payload);
            self.byte_count += 1;
            self.cpu.addr = self.addr_construct & !1;

            if exc_follows {
                self.enter_collect_exception();
                false
            } else {
                self.finish_address()
            }
        }
    }

    fn collect_exception(&mut self, byte: u8) -> bool {
        match self.byte_count {
            0 => {
                let ns = byte & 1 != 0;
                let low_nibble = (byte >> 1) & 0x0F;
                let cancelled = (byte >> 5) & 1 != 0;
                let alt_isa = (byte >> 6) & 1 != 0;
                let cont = (byte >> 7) & 1 != 0;

                if ns != self.cpu.non_secure {
                    self.cpu.set_change(ChangeFlags::SECURE);
                }
                self.cpu.non_secure = ns;
                self.cpu.exception = low_nibble as u16;
                if cancelled {
                    self.cpu.set_change(ChangeFlags::CANCELLED);
                }
                if alt_isa != self.cpu.alt_isa {
                    self.cpu.set_change(ChangeFlags::ALTISA);
                }
                self.cpu.alt_isa = alt_isa;

                self.byte_count = 1;
                if cont {
                    false
                } else {
                    self.etm_state = Etm35State::Idle;
                    true
                }
            }
            1 => {
                let is_extension = (byte >> 7) & 1 != 0;
                if is_extension {
                    let ext = (byte & 0x1F) as u16;
                    self.cpu.exception |= ext << 4;
                    let hyp = (byte >> 5) & 1 != 0;
                    if hyp != self.cpu.hyp {
                        self.cpu.set_change(ChangeFlags::HYP);
                    }
                    self.cpu.hyp = hyp;

                    let cont = (byte >> 6) & 1 != 0;
                    self.byte_count = 2;
                    if cont {
                        false
                    } else {
                        self.etm_state = Etm35State::Idle;
                        true
                    }
                } else {
                    let resume = byte & 0x0F;
                    if resume != 0 {
                        self.cpu.set_change(ChangeFlags::RESUME);
                    }
                    self.cpu.resume = resume;
                    self.etm_state = Etm35State::Idle;
                    true
                }
            }
            2 => {
                let resume = byte & 0x0F;
                if resume != 0 {
                    self.cpu.set_change(ChangeFlags::RESUME);
                }
                self.cpu.resume = resume;
                self.etm_state = Etm35State::Idle;
                true
            }
            _ => unreachable!(),
        }
    }

    fn get_vmid(&mut self, byte: u8) -> bool {
        if byte != self.cpu.vmid {
            self.cpu.set_change(ChangeFlags::VMID);
        }
        self.cpu.vmid = byte;
        self.etm_state = Etm35State::Idle;
        true
    }

    fn get_tstamp(&mut self, byte: u8) -> bool {
        let n = self.byte_count;
        let cont = (byte >> 7) & 1 != 0;

        if n < 8 {
            // Offsets are `n`, not `7n`: a deliberately overlapping,
            // progressive-insertion scheme rather than a packed
            // concatenation (see DESIGN.md).
            let payload = (byte & 0x7F) as u64;
            self.ts_construct |= payload << n;
            self.byte_count += 1;

            if !cont {
                self.finish_tstamp()
            } else {
                false
            }
        } else {
            self.ts_construct |= (byte as u64) << 8;
            self.byte_count += 1;
            self.finish_tstamp()
        }
    }

    fn finish_tstamp(&mut self) -> bool {
        self.cpu.ts = self.ts_construct;
        self.cpu.set_change(ChangeFlags::TSTAMP);
        self.etm_state = Etm35State::Idle;
        true
    }

    fn get_cycle_count(&mut self, byte: u8, is_isync_variant: bool) -> bool {
        let n = self.byte_count.min(4);
        let cont = (byte >> 7) & 1 != 0;
        let payload = (byte & 0x7F) as u32;

        self.cycle_construct |= payload << (7 * n);
        self.byte_count += 1;

        if !cont || self.byte_count >= 5 {
            self.cpu.cycle_count = self.cycle_construct;
            self.cpu.set_change(ChangeFlags::CYCLECOUNT);

            if is_isync_variant {
                self.enter_isync_context_or_info();
                false
            } else {
                self.etm_state = Etm35State::Idle;
                true
            }
        } else {
            false
        }
    }

    fn enter_isync_context_or_info(&mut self) {
        if !self.rxed_isync {
            self.cpu.clear_change(ChangeFlags::all());
            self.rxed_isync = true;
        }
        self.byte_count = 0;
        self.context_construct = 0;
        self.etm_state = if self.options.context_bytes.is_empty() {
            Etm35State::GetInfoByte
        } else {
            Etm35State::GetContextByte
        };
    }

    fn get_context_byte(&mut self, byte: u8) -> bool {
        let n = self.byte_count;
        self.context_construct |= (byte as u32) << (8 * n);
        self.byte_count += 1;

        if self.byte_count as usize >= self.options.context_bytes.len() {
            if self.context_construct != self.cpu.context_id {
                self.cpu.set_change(ChangeFlags::CONTEXTID);
            }
            self.cpu.context_id = self.context_construct;
            self.etm_state = Etm35State::GetInfoByte;
        }
        false
    }

    fn get_context_id_standalone(&mut self, byte: u8) -> bool {
        let n = self.byte_count;
        self.context_construct |= (byte as u32) << (8 * n);
        self.byte_count += 1;

        if self.byte_count as usize >= self.options.context_bytes.len() {
            if self.context_construct != self.cpu.context_id {
                self.cpu.set_change(ChangeFlags::CONTEXTID);
            }
            self.cpu.context_id = self.context_construct;
            self.etm_state = Etm35State::Idle;
            true
        } else {
            false
        }
    }

    fn get_info_byte(&mut self, byte: u8) -> bool {
        let is_lsip = byte & 0x01 != 0;
        let reason = (byte >> 1) & 0x03;
        let jazelle = (byte >> 3) & 1 != 0;
        let non_secure = (byte >> 4) & 1 != 0;
        let alt_isa = (byte >> 5) & 1 != 0;
        let hyp = (byte >> 6) & 1 != 0;

        if is_lsip != self.cpu.is_lsip {
            self.cpu.set_change(ChangeFlags::ISLSIP);
        }
        self.cpu.is_lsip = is_lsip;
        if reason != self.cpu.reason {
            self.cpu.set_change(ChangeFlags::REASON);
        }
        self.cpu.reason = reason;
        if jazelle != self.cpu.jazelle {
            self.cpu.set_change(ChangeFlags::JAZELLE);
        }
        self.cpu.jazelle = jazelle;
        if non_secure != self.cpu.non_secure {
            self.cpu.set_change(ChangeFlags::SECURE);
        }
        self.cpu.non_secure = non_secure;
        if alt_isa != self.cpu.alt_isa {
            self.cpu.set_change(ChangeFlags::ALTISA);
        }
        self.cpu.alt_isa = alt_isa;
        if hyp != self.cpu.hyp {
            self.cpu.set_change(ChangeFlags::HYP);
        }
        self.cpu.hyp = hyp;

        if self.options.data_only_mode {
            self.etm_state = Etm35State::Idle;
            true
        } else {
            self.byte_count = 0;
            self.addr_construct = 0;
            self.etm_state = Etm35State::GetIAddress;
            false
        }
    }

    fn get_iaddress(&mut self, byte: u8) -> bool {
        let n = self.byte_count;
        self.addr_construct |= (byte as u32) << (8 * n);
        self.byte_count += 1;

        if self.byte_count < 4 {
            return false;
        }

        if self.cpu.jazelle {
            self.cpu.addr_mode = AddrMode::Jazelle;
            self.cpu.addr = self.addr_construct;
        } else if self.addr_construct & 1 != 0 {
            if !self.cpu.thumb {
                self.cpu.set_change(ChangeFlags::THUMB);
            }
            self.cpu.thumb = true;
            self.cpu.addr_mode = AddrMode::Thumb;
            self.cpu.addr = self.addr_construct & !1;
        } else {
            if self.cpu.thumb {
                self.cpu.set_change(ChangeFlags::THUMB);
            }
            self.cpu.thumb = false;
            self.cpu.addr_mode = AddrMode::Arm;
            self.cpu.addr = self.addr_construct & 0xFFFF_FFFC;
        }
        self.cpu.set_change(ChangeFlags::ADDRESS);
        self.etm_state = Etm35State::Idle;

        if self.cpu.is_lsip {
            // A branch-address packet follows; it will complete and
            // emit the event once fully collected starting from IDLE.
            self.byte_count = 0;
            self.addr_construct = 0;
            false
        } else {
            true
        }
    }
}
