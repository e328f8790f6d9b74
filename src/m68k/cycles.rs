//! Per-variant cycle tables
//!
//! The opcode cycle table is computed in the same pass that decodes the
//! 65,536 opcode words: each entry is the 68000 User's Manual base time
//! plus the effective-address calculation time encoded in the opcode.
//! Data-dependent costs (shift counts, MOVEM register lists, branch
//! corrections, E-clock alignment) are charged by the executor on top.
//!
//! Exception processing times are tabulated per vector and per variant.
//! The 68020-and-later numbers are best-case figures and should be read
//! as a lower bound; they are plain data, so refining them is a table
//! edit. All tables are premultiplied by the instance clock divider at
//! construction.

use super::decode::{AluOp, BitKind, BitNum, EaMode, Op, ShiftCount, Size};
use super::{CpuVariant, Vector};

/// Effective-address calculation time: byte/word, with the long-access
/// surcharge folded in by `ea_long`.
fn ea_bw(ea: EaMode) -> u32 {
    match ea {
        EaMode::DataReg(_) | EaMode::AddrReg(_) => 0,
        EaMode::Indirect(_) | EaMode::PostInc(_) => 4,
        EaMode::PreDec(_) => 6,
        EaMode::Disp16(_) | EaMode::AbsShort | EaMode::PcDisp => 8,
        EaMode::Index(_) | EaMode::PcIndex => 10,
        EaMode::AbsLong => 12,
        EaMode::Immediate => 4,
    }
}

fn ea_cost(ea: EaMode, size: Size) -> u32 {
    let base = ea_bw(ea);
    if size == Size::Long && base != 0 {
        base + 4
    } else {
        base
    }
}

/// MOVE destination time: the predecrement destination overlaps with the
/// following prefetch, costing the same as plain indirect.
fn move_dst_cost(dst: EaMode, size: Size) -> u32 {
    let dst = match dst {
        EaMode::PreDec(r) => EaMode::Indirect(r),
        other => other,
    };
    ea_cost(dst, size)
}

#[inline]
fn is_reg(ea: EaMode) -> bool {
    matches!(ea, EaMode::DataReg(_) | EaMode::AddrReg(_))
}

#[inline]
fn is_reg_or_imm(ea: EaMode) -> bool {
    is_reg(ea) || ea == EaMode::Immediate
}

/// Base cycles for one decoded opcode (68000 numbers; later parts share
/// the table, see the module note).
pub(super) fn instruction_cycles(op: &Op, _variant: CpuVariant) -> u32 {
    match *op {
        Op::OriToCcr
        | Op::AndiToCcr
        | Op::EoriToCcr
        | Op::OriToSr
        | Op::AndiToSr
        | Op::EoriToSr => 20,

        Op::AluImm { kind: AluOp::Cmp, size, ea } => {
            let base = if is_reg(ea) {
                if size == Size::Long {
                    14
                } else {
                    8
                }
            } else if size == Size::Long {
                12
            } else {
                8
            };
            base + ea_cost(ea, size)
        }
        Op::AluImm { size, ea, .. } => {
            let base = if is_reg(ea) {
                if size == Size::Long {
                    16
                } else {
                    8
                }
            } else if size == Size::Long {
                20
            } else {
                12
            };
            base + ea_cost(ea, size)
        }

        Op::Bit { kind, num, ea } => {
            let ext = if num == BitNum::Imm { 4 } else { 0 };
            let base = if is_reg(ea) {
                match kind {
                    BitKind::Tst => 6,
                    BitKind::Clr => 10,
                    _ => 8,
                }
            } else {
                match kind {
                    BitKind::Tst => 4,
                    _ => 8,
                }
            };
            base + ext + ea_cost(ea, Size::Byte)
        }

        Op::Movep { size, .. } => {
            if size == Size::Long {
                24
            } else {
                16
            }
        }

        Op::Move { size, src, dst } => 4 + ea_cost(src, size) + move_dst_cost(dst, size),
        Op::Movea { size, src, .. } => 4 + ea_cost(src, size),
        Op::Moveq { .. } => 4,

        Op::MoveFromSr { ea } | Op::MoveFromCcr { ea } => {
            if is_reg(ea) {
                6
            } else {
                8 + ea_cost(ea, Size::Word)
            }
        }
        Op::MoveToCcr { ea } | Op::MoveToSr { ea } => 12 + ea_cost(ea, Size::Word),

        Op::Negx { size, ea }
        | Op::Clr { size, ea }
        | Op::Neg { size, ea }
        | Op::Not { size, ea } => {
            if is_reg(ea) {
                if size == Size::Long {
                    6
                } else {
                    4
                }
            } else if size == Size::Long {
                12 + ea_cost(ea, size)
            } else {
                8 + ea_cost(ea, size)
            }
        }

        Op::Ext { .. } | Op::ExtbL { .. } | Op::Swap { .. } => 4,
        Op::Nbcd { ea } => {
            if is_reg(ea) {
                6
            } else {
                8 + ea_cost(ea, Size::Byte)
            }
        }
        Op::Bkpt { .. } => 4,

        Op::Pea { ea } => match ea {
            EaMode::Indirect(_) => 12,
            EaMode::Disp16(_) | EaMode::AbsShort | EaMode::PcDisp => 16,
            _ => 20,
        },
        Op::Lea { ea, .. } => match ea {
            EaMode::Indirect(_) => 4,
            EaMode::Disp16(_) | EaMode::AbsShort | EaMode::PcDisp => 8,
            _ => 12,
        },
        Op::Jsr { ea } => match ea {
            EaMode::Indirect(_) => 16,
            EaMode::Disp16(_) | EaMode::AbsShort | EaMode::PcDisp => 18,
            EaMode::AbsLong => 20,
            _ => 22,
        },
        Op::Jmp { ea } => match ea {
            EaMode::Indirect(_) => 8,
            EaMode::Disp16(_) | EaMode::AbsShort | EaMode::PcDisp => 10,
            EaMode::AbsLong => 12,
            _ => 14,
        },

        Op::Illegal | Op::LineA | Op::LineF | Op::Unimplemented => 4,

        Op::Tas { ea } => {
            if is_reg(ea) {
                4
            } else {
                10 + ea_cost(ea, Size::Byte)
            }
        }
        Op::Tst { size, ea } => 4 + ea_cost(ea, size),
        Op::Trap { .. } => 4,
        Op::Trapv => 4,
        Op::Chk { ea, .. } => 10 + ea_cost(ea, Size::Word),

        Op::Link { .. } => 16,
        Op::Unlk { .. } => 12,
        Op::MoveUsp { .. } => 4,
        Op::Reset => 132,
        Op::Nop => 4,
        Op::Stop => 4,
        Op::Rte => 20,
        Op::Rtd => 16,
        Op::Rts => 16,
        Op::Rtr => 20,
        Op::Movec { .. } => 12,

        Op::Movem { size, reg_to_mem, ea } => {
            let extra = match ea {
                EaMode::Disp16(_) | EaMode::AbsShort | EaMode::PcDisp => 4,
                EaMode::Index(_) | EaMode::PcIndex => 6,
                EaMode::AbsLong => 8,
                _ => 0,
            };
            let _ = size;
            if reg_to_mem {
                8 + extra
            } else {
                12 + extra
            }
        }

        Op::Addq { size, ea, .. } | Op::Subq { size, ea, .. } => match ea {
            EaMode::AddrReg(_) => 8,
            EaMode::DataReg(_) => {
                if size == Size::Long {
                    8
                } else {
                    4
                }
            }
            _ => {
                if size == Size::Long {
                    12 + ea_cost(ea, size)
                } else {
                    8 + ea_cost(ea, size)
                }
            }
        },

        Op::Scc { ea, .. } => {
            if is_reg(ea) {
                4
            } else {
                8 + ea_cost(ea, Size::Byte)
            }
        }
        Op::Dbcc { .. } => 10,

        Op::Bra { .. } => 10,
        Op::Bsr { .. } => 18,
        Op::Bcc { .. } => 10,

        Op::Alu { kind, size, to_ea, ea, .. } => match kind {
            AluOp::Cmp => {
                if size == Size::Long {
                    6 + ea_cost(ea, size)
                } else {
                    4 + ea_cost(ea, size)
                }
            }
            AluOp::Eor => {
                if is_reg(ea) {
                    if size == Size::Long {
                        8
                    } else {
                        4
                    }
                } else if size == Size::Long {
                    12 + ea_cost(ea, size)
                } else {
                    8 + ea_cost(ea, size)
                }
            }
            _ => {
                if to_ea {
                    if size == Size::Long {
                        12 + ea_cost(ea, size)
                    } else {
                        8 + ea_cost(ea, size)
                    }
                } else if size == Size::Long {
                    if is_reg_or_imm(ea) {
                        8
                    } else {
                        6 + ea_cost(ea, size)
                    }
                } else {
                    4 + ea_cost(ea, size)
                }
            }
        },

        Op::AluA { kind, size, ea, .. } => match kind {
            AluOp::Cmp => 6 + ea_cost(ea, size),
            _ => {
                if size == Size::Word {
                    8 + ea_cost(ea, Size::Word)
                } else if is_reg_or_imm(ea) {
                    8
                } else {
                    6 + ea_cost(ea, Size::Long)
                }
            }
        },

        Op::Addx { size, mem, .. } | Op::Subx { size, mem, .. } => {
            if mem {
                if size == Size::Long {
                    30
                } else {
                    18
                }
            } else if size == Size::Long {
                8
            } else {
                4
            }
        }
        Op::Cmpm { size, .. } => {
            if size == Size::Long {
                20
            } else {
                12
            }
        }
        Op::Abcd { mem, .. } | Op::Sbcd { mem, .. } => {
            if mem {
                18
            } else {
                6
            }
        }

        // Multiply and divide run at their worst-case times.
        Op::Mulu { ea, .. } | Op::Muls { ea, .. } => 70 + ea_cost(ea, Size::Word),
        Op::Divu { ea, .. } => 140 + ea_cost(ea, Size::Word),
        Op::Divs { ea, .. } => 158 + ea_cost(ea, Size::Word),
        Op::MulL { ea } => 44 + ea_cost(ea, Size::Long),
        Op::DivL { ea } => 90 + ea_cost(ea, Size::Long),

        Op::Exg { .. } => 6,

        Op::ShiftReg { size, count, .. } => {
            let base = if size == Size::Long { 8 } else { 6 };
            let _ = count;
            base
        }
        Op::ShiftMem { ea, .. } => 8 + ea_cost(ea, Size::Word),
    }
}

/// Exception processing times, per vector.
pub(super) fn exception_cycles(variant: CpuVariant) -> [u32; 256] {
    let is_020_plus = !matches!(
        variant,
        CpuVariant::M68000 | CpuVariant::M68010 | CpuVariant::Cpu32 | CpuVariant::ColdFire
    );

    let mut table = [34u32; 256];
    if is_020_plus {
        // Best-case (cache-resident) figures; a lower bound.
        table = [25u32; 256];
        table[Vector::ResetSsp as usize] = 30;
        table[Vector::BusError as usize] = 36;
        table[Vector::AddressError as usize] = 36;
        table[Vector::IllegalInstruction as usize] = 20;
        table[Vector::ZeroDivide as usize] = 36;
        table[Vector::ChkInstruction as usize] = 40;
        table[Vector::TrapvInstruction as usize] = 20;
        table[Vector::PrivilegeViolation as usize] = 20;
        table[Vector::Trace as usize] = 25;
        for v in 24..32 {
            table[v] = 33; // spurious + autovectors
        }
        for v in 32..48 {
            table[v] = 20; // TRAP #0..#15
        }
    } else {
        table[Vector::ResetSsp as usize] = 40;
        table[Vector::BusError as usize] = 50;
        table[Vector::AddressError as usize] = 50;
        table[Vector::IllegalInstruction as usize] = 34;
        table[Vector::ZeroDivide as usize] = 38;
        table[Vector::ChkInstruction as usize] = 40;
        table[Vector::TrapvInstruction as usize] = 34;
        table[Vector::PrivilegeViolation as usize] = 34;
        table[Vector::Trace as usize] = 34;
        table[Vector::UninitializedInterrupt as usize] = 44;
        for v in 24..32 {
            table[v] = 44; // spurious + autovectors
        }
        for v in 32..48 {
            table[v] = 30; // TRAP #0..#15, plus the 4-cycle opcode
        }
    }
    table
}

/// Penalties for the 020+ full-format extension words, keyed by
/// `(scale << 4) | (base-displacement size << 2) | outer-displacement
/// size`. Word fetches and the indirection each cost a bus access.
pub(super) const EA_INDEX_CYCLES: [u32; 64] = build_ea_index_table();

const fn build_ea_index_table() -> [u32; 64] {
    let mut table = [0u32; 64];
    let mut key = 0;
    while key < 64 {
        let bd_size = (key >> 2) & 3;
        let od_size = key & 3;
        let mut cycles = match bd_size {
            2 => 7,
            3 => 12,
            _ => 2,
        };
        if od_size != 0 {
            cycles += match od_size {
                1 => 5,
                2 => 7,
                _ => 12,
            };
        }
        table[key] = cycles;
        key += 1;
    }
    table
}
