//! Cycle and flag lookup tables
//!
//! T-state costs live in six per-instance tables, one per opcode page plus
//! one for taken-branch/repeat penalties, so a host can swap in measured
//! tables for clones without touching the interpreter. The defaults are the
//! NMOS Z80 numbers.
//!
//! Flag results for the 8-bit ALU come out of precomputed lookup tables,
//! including two 64 KiB add/sub tables indexed by
//! `(carry_in << 16) | (accumulator << 8) | result`. The tables are
//! process-global, built once behind a `OnceLock` and never mutated.

use std::sync::OnceLock;

use super::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};

/// Per-instance T-state tables, swappable at runtime.
#[derive(Clone)]
pub struct CycleTables {
    /// Main page.
    pub op: [u8; 256],
    /// CB page (rotates, shifts, bit ops). Totals include the prefix fetch.
    pub cb: [u8; 256],
    /// ED page. Totals include the prefix fetch.
    pub ed: [u8; 256],
    /// DD/FD page. Totals include the prefix fetch.
    pub xy: [u8; 256],
    /// DD CB / FD CB page. Totals include prefix, displacement and opcode.
    pub xycb: [u8; 256],
    /// Extra T-states: taken branches, expiring block repeats, and the
    /// interrupt-acknowledge latency at the RST slots.
    pub ex: [u8; 256],
}

#[rustfmt::skip]
const CC_OP: [u8; 256] = [
     4,10, 7, 6, 4, 4, 7, 4, 4,11, 7, 6, 4, 4, 7, 4,
     8,10, 7, 6, 4, 4, 7, 4,12,11, 7, 6, 4, 4, 7, 4,
     7,10,16, 6, 4, 4, 7, 4, 7,11,16, 6, 4, 4, 7, 4,
     7,10,13, 6,11,11,10, 4, 7,11,13, 6, 4, 4, 7, 4,
     4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
     4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
     4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
     7, 7, 7, 7, 7, 7, 4, 7, 4, 4, 4, 4, 4, 4, 7, 4,
     4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
     4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
     4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
     4, 4, 4, 4, 4, 4, 7, 4, 4, 4, 4, 4, 4, 4, 7, 4,
     5,10,10,10,10,11, 7,11, 5,10,10, 0,10,17, 7,11,
     5,10,10,11,10,11, 7,11, 5, 4,10,11,10, 0, 7,11,
     5,10,10,19,10,11, 7,11, 5, 4,10, 4,10, 0, 7,11,
     5,10,10, 4,10,11, 7,11, 5, 6,10, 4,10, 0, 7,11,
];

#[rustfmt::skip]
const CC_CB: [u8; 256] = [
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,12, 8, 8, 8, 8, 8, 8, 8,12, 8,
     8, 8, 8, 8, 8, 8,12, 8, 8, 8, 8, 8, 8, 8,12, 8,
     8, 8, 8, 8, 8, 8,12, 8, 8, 8, 8, 8, 8, 8,12, 8,
     8, 8, 8, 8, 8, 8,12, 8, 8, 8, 8, 8, 8, 8,12, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
     8, 8, 8, 8, 8, 8,15, 8, 8, 8, 8, 8, 8, 8,15, 8,
];

#[rustfmt::skip]
const CC_ED: [u8; 256] = [
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    12,12,15,20, 8,14, 8, 9,12,12,15,20, 8,14, 8, 9,
    12,12,15,20, 8,14, 8, 9,12,12,15,20, 8,14, 8, 9,
    12,12,15,20, 8,14, 8,18,12,12,15,20, 8,14, 8,18,
    12,12,15,20, 8,14, 8, 8,12,12,15,20, 8,14, 8, 8,
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    16,16,16,16, 8, 8, 8, 8,16,16,16,16, 8, 8, 8, 8,
    16,16,16,16, 8, 8, 8, 8,16,16,16,16, 8, 8, 8, 8,
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
     8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
];

#[rustfmt::skip]
const CC_XY: [u8; 256] = [
     8,14,11,10, 8, 8,11, 8, 8,15,11,10, 8, 8,11, 8,
    12,14,11,10, 8, 8,11, 8,16,15,11,10, 8, 8,11, 8,
    11,14,20,10, 8, 8,11, 8,11,15,20,10, 8, 8,11, 8,
    11,14,17,10,23,23,19, 8,11,15,17,10, 8, 8,11, 8,
     8, 8, 8, 8, 8, 8,19, 8, 8, 8, 8, 8, 8, 8,19, 8,
     8, 8, 8, 8, 8, 8,19, 8, 8, 8, 8, 8, 8, 8,19, 8,
     8, 8, 8, 8, 8, 8,19, 8, 8, 8, 8, 8, 8, 8,19, 8,
    19,19,19,19,19,19, 8,19, 8, 8, 8, 8, 8, 8,19, 8,
     8, 8, 8, 8, 8, 8,19, 8, 8, 8, 8, 8, 8, 8,19, 8,
     8, 8, 8, 8, 8, 8,19, 8, 8, 8, 8, 8, 8, 8,19, 8,
     8, 8, 8, 8, 8, 8,19, 8, 8, 8, 8, 8, 8, 8,19, 8,
     8, 8, 8, 8, 8, 8,19, 8, 8, 8, 8, 8, 8, 8,19, 8,
     9,14,14,14,14,15,11,15, 9,14,14, 0,14,21,11,15,
     9,14,14,15,14,15,11,15, 9, 8,14,15,14, 4,11,15,
     9,14,14,23,14,15,11,15, 9, 8,14, 8,14, 4,11,15,
     9,14,14, 8,14,15,11,15, 9,10,14, 8,14, 4,11,15,
];

#[rustfmt::skip]
const CC_XYCB: [u8; 256] = [
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    20,20,20,20,20,20,20,20,20,20,20,20,20,20,20,20,
    20,20,20,20,20,20,20,20,20,20,20,20,20,20,20,20,
    20,20,20,20,20,20,20,20,20,20,20,20,20,20,20,20,
    20,20,20,20,20,20,20,20,20,20,20,20,20,20,20,20,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
    23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,23,
];

#[rustfmt::skip]
const CC_EX: [u8; 256] = [
     0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
     5, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // DJNZ
     5, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, // JR NZ / JR Z
     5, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0, 0, 0, 0, 0, 0, // JR NC / JR C
     0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
     0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
     0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
     0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
     0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
     0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
     0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
     5, 5, 5, 5, 0, 0, 0, 0, 5, 5, 5, 5, 0, 0, 0, 0, // repeating block ops (ED page)
     6, 0, 0, 0, 7, 0, 0, 2, 6, 0, 0, 0, 7, 0, 0, 2, // RET cc / CALL cc / int ack
     6, 0, 0, 0, 7, 0, 0, 2, 6, 0, 0, 0, 7, 0, 0, 2,
     6, 0, 0, 0, 7, 0, 0, 2, 6, 0, 0, 0, 7, 0, 0, 2,
     6, 0, 0, 0, 7, 0, 0, 2, 6, 0, 0, 0, 7, 0, 0, 2,
];

impl Default for CycleTables {
    fn default() -> Self {
        Self {
            op: CC_OP,
            cb: CC_CB,
            ed: CC_ED,
            xy: CC_XY,
            xycb: CC_XYCB,
            ex: CC_EX,
        }
    }
}

/// Precomputed flag lookups shared by every core in the process.
pub struct FlagTables {
    /// SF/ZF/YF/XF of an 8-bit result.
    pub sz: [u8; 256],
    /// Like `sz` but a zero result also sets PF (BIT instructions).
    pub sz_bit: [u8; 256],
    /// `sz` plus even-parity PF.
    pub szp: [u8; 256],
    /// INC result flags (everything but CF).
    pub szhv_inc: [u8; 256],
    /// DEC result flags (everything but CF).
    pub szhv_dec: [u8; 256],
    /// ADD/ADC flags, indexed by `(carry << 16) | (a << 8) | result`.
    pub add: Box<[u8]>,
    /// SUB/SBC/CP flags, same indexing.
    pub sub: Box<[u8]>,
}

static FLAG_TABLES: OnceLock<FlagTables> = OnceLock::new();

/// The shared flag tables, built on first use.
pub fn flag_tables() -> &'static FlagTables {
    FLAG_TABLES.get_or_init(build_flag_tables)
}

fn build_flag_tables() -> FlagTables {
    let mut sz = [0u8; 256];
    let mut sz_bit = [0u8; 256];
    let mut szp = [0u8; 256];
    let mut szhv_inc = [0u8; 256];
    let mut szhv_dec = [0u8; 256];

    for i in 0..256usize {
        let v = i as u8;
        let mut f = if v == 0 { ZF } else { v & SF };
        f |= v & (YF | XF);
        sz[i] = f;
        sz_bit[i] = if v == 0 { ZF | PF } else { f };
        szp[i] = f | if v.count_ones() % 2 == 0 { PF } else { 0 };

        szhv_inc[i] = sz[i]
            | if v == 0x80 { PF } else { 0 }
            | if v & 0x0F == 0x00 { HF } else { 0 };
        szhv_dec[i] = sz[i]
            | NF
            | if v == 0x7F { PF } else { 0 }
            | if v & 0x0F == 0x0F { HF } else { 0 };
    }

    let mut add = vec![0u8; 2 << 16].into_boxed_slice();
    let mut sub = vec![0u8; 2 << 16].into_boxed_slice();
    for carry in 0..2usize {
        for old in 0..256usize {
            for new in 0..256usize {
                let idx = (carry << 16) | (old << 8) | new;
                let oldv = old as u8;
                let newv = new as u8;

                // value = result - accumulator (- carry_in)
                let val = newv.wrapping_sub(oldv).wrapping_sub(carry as u8);
                let mut f = sz[new];
                if carry == 0 {
                    if (newv & 0x0F) < (oldv & 0x0F) {
                        f |= HF;
                    }
                    if newv < oldv {
                        f |= CF;
                    }
                } else {
                    if (newv & 0x0F) <= (oldv & 0x0F) {
                        f |= HF;
                    }
                    if newv <= oldv {
                        f |= CF;
                    }
                }
                if (val ^ oldv ^ 0x80) & (val ^ newv) & 0x80 != 0 {
                    f |= PF;
                }
                add[idx] = f;

                // value = accumulator - result (- carry_in)
                let val = oldv.wrapping_sub(newv).wrapping_sub(carry as u8);
                let mut f = sz[new] | NF;
                if carry == 0 {
                    if (newv & 0x0F) > (oldv & 0x0F) {
                        f |= HF;
                    }
                    if newv > oldv {
                        f |= CF;
                    }
                } else {
                    if (newv & 0x0F) >= (oldv & 0x0F) {
                        f |= HF;
                    }
                    if newv >= oldv {
                        f |= CF;
                    }
                }
                if (val ^ oldv) & (oldv ^ newv) & 0x80 != 0 {
                    f |= PF;
                }
                sub[idx] = f;
            }
        }
    }

    FlagTables {
        sz,
        sz_bit,
        szp,
        szhv_inc,
        szhv_dec,
        add,
        sub,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference recipe for the add table: SF from bit 7, ZF from zero,
    /// HF from nibble carry, PF from signed overflow, CF from unsigned
    /// carry, YF/XF from the result.
    fn add_flags_reference(a: u8, b: u8, carry: u8) -> u8 {
        let wide = a as u16 + b as u16 + carry as u16;
        let res = wide as u8;
        let mut f = if res == 0 { ZF } else { res & SF };
        f |= res & (YF | XF);
        if (a & 0x0F) + (b & 0x0F) + carry > 0x0F {
            f |= HF;
        }
        if wide > 0xFF {
            f |= CF;
        }
        if (a ^ b) & 0x80 == 0 && (a ^ res) & 0x80 != 0 {
            f |= PF;
        }
        f
    }

    fn sub_flags_reference(a: u8, b: u8, carry: u8) -> u8 {
        let wide = (a as i16) - (b as i16) - (carry as i16);
        let res = wide as u8;
        let mut f = NF | if res == 0 { ZF } else { res & SF };
        f |= res & (YF | XF);
        if (a & 0x0F) as i16 - (b & 0x0F) as i16 - (carry as i16) < 0 {
            f |= HF;
        }
        if wide < 0 {
            f |= CF;
        }
        if (a ^ b) & 0x80 != 0 && (a ^ res) & 0x80 != 0 {
            f |= PF;
        }
        f
    }

    #[test]
    fn test_add_table_matches_reference() {
        let t = flag_tables();
        for carry in 0..2u8 {
            for a in 0..=255u8 {
                for b in [0u8, 1, 0x0F, 0x7F, 0x80, 0xFF, 0x55] {
                    let res = a.wrapping_add(b).wrapping_add(carry);
                    let idx = ((carry as usize) << 16) | ((a as usize) << 8) | res as usize;
                    assert_eq!(
                        t.add[idx],
                        add_flags_reference(a, b, carry),
                        "add a={a:#04X} b={b:#04X} c={carry}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_sub_table_matches_reference() {
        let t = flag_tables();
        for carry in 0..2u8 {
            for a in 0..=255u8 {
                for b in [0u8, 1, 0x0F, 0x7F, 0x80, 0xFF, 0x55] {
                    let res = a.wrapping_sub(b).wrapping_sub(carry);
                    let idx = ((carry as usize) << 16) | ((a as usize) << 8) | res as usize;
                    assert_eq!(
                        t.sub[idx],
                        sub_flags_reference(a, b, carry),
                        "sub a={a:#04X} b={b:#04X} c={carry}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_inc_dec_tables() {
        let t = flag_tables();
        assert_eq!(t.szhv_inc[0x80], SF | PF); // 0x7F + 1 overflows
        assert_eq!(t.szhv_inc[0x10], HF);
        assert_eq!(t.szhv_dec[0x7F], PF | NF | XF | YF | HF); // 0x80 - 1 overflows
        assert_eq!(t.szhv_dec[0x00], ZF | NF);
    }

    #[test]
    fn test_parity_table() {
        let t = flag_tables();
        assert_eq!(t.szp[0x00], ZF | PF);
        assert_eq!(t.szp[0x01] & PF, 0);
        assert_eq!(t.szp[0x03] & PF, PF);
    }
}
