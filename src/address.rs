//! Incremental branch-address reconstruction.
//!
//! Addresses are assembled bit-slice by bit-slice across a variable
//! number of bytes. The bit offset of slice `n` depends on the address
//! mode; Jazelle's offset can go negative for `n == 0`, which is a
//! right-shift instead of a left-shift ("signed shift semantics" per
//! the design notes).

use crate::cpu_state::AddrMode;

/// Bit offset at which the `n`-th (0-indexed) address byte's payload
/// bits are inserted into the accumulator.
pub(crate) fn slice_offset(mode: AddrMode, n: u32) -> i32 {
    let n = n as i32;
    match mode {
        AddrMode::Arm => 7 * n + 1,
        AddrMode::Thumb => 7 * n,
        AddrMode::Jazelle => 7 * n - 1,
    }
}

/// Shift `payload` into position `offset`, where a negative offset is a
/// right-shift rather than a left-shift. Shifts that would move every
/// bit out of range are well-defined zero rather than relying on
/// overflowing-shift panics.
pub(crate) fn insert_at(payload: u32, offset: i32) -> u32 {
    if offset >= 0 {
        if offset >= 32 {
            0
        } else {
            payload << offset
        }
    } else {
        let shr = (-offset) as u32;
        if shr >= 32 {
            0
        } else {
            payload >> shr
        }
    }
}

/// Accumulate the `bits`-wide `payload` of address byte `n` into `addr`
/// under the given address mode.
pub(crate) fn accumulate(addr: &mut u32, mode: AddrMode, n: u32, payload: u32) {
    let offset = slice_offset(mode, n);
    *addr |= insert_at(payload, offset);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumb_offsets_are_byte_aligned() {
        assert_eq!(slice_offset(AddrMode::Thumb, 0), 0);
        assert_eq!(slice_offset(AddrMode::Thumb, 1), 7);
        assert_eq!(slice_offset(AddrMode::Thumb, 4), 28);
    }

    #[test]
    fn arm_offsets_skip_bit_zero() {
        assert_eq!(slice_offset(AddrMode::Arm, 0), 1);
        assert_eq!(slice_offset(AddrMode::Arm, 1), 8);
    }

    #[test]
    fn jazelle_first_slice_is_a_right_shift() {
        assert_eq!(slice_offset(AddrMode::Jazelle, 0), -1);
        assert_eq!(insert_at(0b11, -1), 0b1);
    }

    #[test]
    fn accumulate_ors_bits_into_place() {
        let mut addr = 0u32;
        accumulate(&mut addr, AddrMode::Thumb, 0, 0x7f);
        accumulate(&mut addr, AddrMode::Thumb, 1, 0x7f);
        assert_eq!(addr, 0x3fff);
    }
}
