//! 68000-family instruction execution
//!
//! One match over the decoded instruction tag. Operand access goes through
//! the effective-address layer; condition codes are computed here with the
//! carry/overflow bit identities rather than widening arithmetic, so the
//! same helpers serve all three sizes.
//!
//! # References
//! - M68000PM/AD Programmer's Reference Manual (operation descriptions,
//!   condition-code tables)

use super::decode::{AluOp, BitKind, BitNum, EaMode, Op, ShiftCount, ShiftKind, Size};
use super::{
    CpuVariant, M68k, Vector, SR_C, SR_N, SR_V, SR_X, SR_Z, STOP_LEVEL_STOP, TRAP_BASE,
};

impl M68k {
    // ========== Condition Codes ==========

    #[inline]
    pub(super) fn x_bit(&self) -> u32 {
        u32::from(self.sr() & SR_X != 0)
    }

    /// Test one of the 16 standard conditions.
    pub(super) fn cond(&self, cc: u8) -> bool {
        let sr = self.sr();
        let c = sr & SR_C != 0;
        let v = sr & SR_V != 0;
        let z = sr & SR_Z != 0;
        let n = sr & SR_N != 0;
        match cc {
            0 => true,
            1 => false,
            2 => !c && !z,     // HI
            3 => c || z,       // LS
            4 => !c,           // CC
            5 => c,            // CS
            6 => !z,           // NE
            7 => z,            // EQ
            8 => !v,           // VC
            9 => v,            // VS
            10 => !n,          // PL
            11 => n,           // MI
            12 => n == v,      // GE
            13 => n != v,      // LT
            14 => !z && n == v, // GT
            _ => z || n != v,  // LE
        }
    }

    /// Flag-only update: callers pass CCR bits, so the system byte (and
    /// with it the stack banking) is never touched.
    fn set_sr_flags(&mut self, clear: u16, set: u16) {
        let ccr = (self.sr() & !clear) | set;
        self.set_ccr(ccr);
    }

    /// N and Z from a result; V and C cleared (MOVE, logicals, TST).
    pub(super) fn flags_logic(&mut self, result: u32, size: Size) {
        let mut set = 0;
        if result & size.msb() != 0 {
            set |= SR_N;
        }
        if result & size.mask() == 0 {
            set |= SR_Z;
        }
        self.set_sr_flags(SR_N | SR_Z | SR_V | SR_C, set);
    }

    /// Flags for addition. `extend` selects the ADDX-style Z (only ever
    /// cleared, never set).
    fn flags_add(&mut self, s: u32, d: u32, r: u32, size: Size, extend: bool) {
        let msb = size.msb();
        let carry = ((s & d) | (!r & (s | d))) & msb != 0;
        let overflow = ((s ^ r) & (d ^ r)) & msb != 0;
        let mut set = 0;
        if carry {
            set |= SR_C | SR_X;
        }
        if overflow {
            set |= SR_V;
        }
        if r & msb != 0 {
            set |= SR_N;
        }
        let zero = r & size.mask() == 0;
        let mut clear = SR_N | SR_V | SR_C | SR_X;
        if extend {
            if !zero {
                clear |= SR_Z;
            }
        } else {
            clear |= SR_Z;
            if zero {
                set |= SR_Z;
            }
        }
        self.set_sr_flags(clear, set);
    }

    fn flags_sub_common(&mut self, s: u32, d: u32, r: u32, size: Size, extend: bool, x: bool) {
        let msb = size.msb();
        let borrow = (((s | r) & !d) | (s & r)) & msb != 0;
        let overflow = ((s ^ d) & (r ^ d)) & msb != 0;
        let mut set = 0;
        let mut clear = SR_N | SR_V | SR_C;
        if x {
            clear |= SR_X;
        }
        if borrow {
            set |= SR_C;
            if x {
                set |= SR_X;
            }
        }
        if overflow {
            set |= SR_V;
        }
        if r & msb != 0 {
            set |= SR_N;
        }
        let zero = r & size.mask() == 0;
        if extend {
            if !zero {
                clear |= SR_Z;
            }
        } else {
            clear |= SR_Z;
            if zero {
                set |= SR_Z;
            }
        }
        self.set_sr_flags(clear, set);
    }

    fn flags_sub(&mut self, s: u32, d: u32, r: u32, size: Size, extend: bool) {
        self.flags_sub_common(s, d, r, size, extend, true);
    }

    /// CMP never touches X.
    fn flags_cmp(&mut self, s: u32, d: u32, r: u32, size: Size) {
        self.flags_sub_common(s, d, r, size, false, false);
    }

    // ========== Dispatch ==========

    pub(super) fn execute(&mut self, op: Op) {
        match op {
            // ---- CCR/SR immediates ----
            Op::OriToCcr => {
                let imm = self.fetch_imm(Size::Byte) as u16;
                let ccr = self.sr() & 0x1F | imm;
                self.set_ccr(ccr);
            }
            Op::AndiToCcr => {
                let imm = self.fetch_imm(Size::Byte) as u16;
                let ccr = self.sr() & 0x1F & imm;
                self.set_ccr(ccr);
            }
            Op::EoriToCcr => {
                let imm = self.fetch_imm(Size::Byte) as u16;
                let ccr = (self.sr() & 0x1F) ^ imm;
                self.set_ccr(ccr);
            }
            Op::OriToSr => {
                if self.require_supervisor() {
                    let imm = self.fetch16();
                    let sr = self.sr() | imm;
                    self.set_sr(sr);
                }
            }
            Op::AndiToSr => {
                if self.require_supervisor() {
                    let imm = self.fetch16();
                    let sr = self.sr() & imm;
                    self.set_sr(sr);
                }
            }
            Op::EoriToSr => {
                if self.require_supervisor() {
                    let imm = self.fetch16();
                    let sr = self.sr() ^ imm;
                    self.set_sr(sr);
                }
            }

            // ---- immediate ALU ----
            Op::AluImm { kind, size, ea } => {
                let imm = self.fetch_imm(size);
                match kind {
                    AluOp::Cmp => {
                        let d = self.ea_read(ea, size);
                        let r = d.wrapping_sub(imm) & size.mask();
                        self.flags_cmp(imm, d, r, size);
                    }
                    _ => {
                        let (d, target) = self.ea_modify(ea, size);
                        let r = match kind {
                            AluOp::Or => {
                                let r = d | imm;
                                self.flags_logic(r, size);
                                r
                            }
                            AluOp::And => {
                                let r = d & imm;
                                self.flags_logic(r, size);
                                r
                            }
                            AluOp::Eor => {
                                let r = d ^ imm;
                                self.flags_logic(r, size);
                                r
                            }
                            AluOp::Add => {
                                let r = d.wrapping_add(imm) & size.mask();
                                self.flags_add(imm, d, r, size, false);
                                r
                            }
                            AluOp::Sub => {
                                let r = d.wrapping_sub(imm) & size.mask();
                                self.flags_sub(imm, d, r, size, false);
                                r
                            }
                            AluOp::Cmp => unreachable!(),
                        };
                        self.ea_writeback(target, size, r);
                    }
                }
            }

            // ---- bit manipulation ----
            Op::Bit { kind, num, ea } => {
                let bit = match num {
                    BitNum::Imm => self.fetch16() as u32,
                    BitNum::Reg(r) => self.dreg(r),
                };
                if let EaMode::DataReg(r) = ea {
                    let bit = bit & 31;
                    let value = self.dreg(r);
                    let mask = 1u32 << bit;
                    self.set_sr_flags(SR_Z, if value & mask == 0 { SR_Z } else { 0 });
                    let new = match kind {
                        BitKind::Tst => return,
                        BitKind::Chg => value ^ mask,
                        BitKind::Clr => value & !mask,
                        BitKind::Set => value | mask,
                    };
                    self.dar[r as usize] = new;
                } else {
                    let bit = bit & 7;
                    let mask = 1u32 << bit;
                    match kind {
                        BitKind::Tst => {
                            let value = self.ea_read(ea, Size::Byte);
                            self.set_sr_flags(SR_Z, if value & mask == 0 { SR_Z } else { 0 });
                        }
                        _ => {
                            let (value, target) = self.ea_modify(ea, Size::Byte);
                            self.set_sr_flags(SR_Z, if value & mask == 0 { SR_Z } else { 0 });
                            let new = match kind {
                                BitKind::Chg => value ^ mask,
                                BitKind::Clr => value & !mask,
                                BitKind::Set => value | mask,
                                BitKind::Tst => unreachable!(),
                            };
                            self.ea_writeback(target, Size::Byte, new);
                        }
                    }
                }
            }

            Op::Movep { dreg, areg, size, reg_to_mem } => {
                let disp = self.fetch16() as i16 as u32;
                let mut addr = self.areg(areg).wrapping_add(disp);
                let count = size.bytes();
                if reg_to_mem {
                    let value = self.dreg(dreg);
                    for i in 0..count {
                        let shift = (count - 1 - i) * 8;
                        self.write8(addr, value >> shift);
                        addr = addr.wrapping_add(2);
                    }
                } else {
                    let mut value = 0u32;
                    for _ in 0..count {
                        value = value << 8 | self.read8(addr);
                        addr = addr.wrapping_add(2);
                    }
                    self.set_dreg_sized(dreg, size, value);
                }
            }

            // ---- moves ----
            Op::Move { size, src, dst } => {
                let value = self.ea_read(src, size);
                self.flags_logic(value, size);
                self.ea_write(dst, size, value);
            }
            Op::Movea { size, areg, src } => {
                let value = self.ea_read(src, size);
                self.set_areg(areg, size.sign_extend(value));
            }
            Op::Moveq { reg, data } => {
                let value = data as i32 as u32;
                self.dar[reg as usize] = value;
                self.flags_logic(value, Size::Long);
            }

            // ---- SR/CCR moves ----
            Op::MoveFromSr { ea } => {
                // Privileged from the 68010 on; the 68000 allows it in
                // user mode.
                if self.variant() != CpuVariant::M68000 && !self.require_supervisor() {
                    return;
                }
                let sr = self.sr() as u32;
                self.ea_write(ea, Size::Word, sr);
            }
            Op::MoveFromCcr { ea } => {
                let ccr = (self.sr() & 0x1F) as u32;
                self.ea_write(ea, Size::Word, ccr);
            }
            Op::MoveToCcr { ea } => {
                let value = self.ea_read(ea, Size::Word) as u16;
                self.set_ccr(value);
            }
            Op::MoveToSr { ea } => {
                if self.require_supervisor() {
                    let value = self.ea_read(ea, Size::Word) as u16;
                    self.set_sr(value);
                }
            }

            // ---- single-operand ----
            Op::Clr { size, ea } => {
                // The 68000 bus reads the destination before clearing it.
                let (_, target) = self.ea_modify(ea, size);
                self.ea_writeback(target, size, 0);
                self.set_sr_flags(SR_N | SR_Z | SR_V | SR_C, SR_Z);
            }
            Op::Neg { size, ea } => {
                let (d, target) = self.ea_modify(ea, size);
                let r = 0u32.wrapping_sub(d) & size.mask();
                self.flags_sub(d, 0, r, size, false);
                self.ea_writeback(target, size, r);
            }
            Op::Negx { size, ea } => {
                let (d, target) = self.ea_modify(ea, size);
                let x = self.x_bit();
                let r = 0u32.wrapping_sub(d).wrapping_sub(x) & size.mask();
                self.flags_sub(d, 0, r, size, true);
                self.ea_writeback(target, size, r);
            }
            Op::Not { size, ea } => {
                let (d, target) = self.ea_modify(ea, size);
                let r = !d & size.mask();
                self.flags_logic(r, size);
                self.ea_writeback(target, size, r);
            }
            Op::Ext { to, reg } => {
                let value = match to {
                    Size::Word => self.dreg(reg) as u8 as i8 as i16 as u16 as u32,
                    _ => self.dreg(reg) as u16 as i16 as u32,
                };
                self.set_dreg_sized(reg, to, value);
                self.flags_logic(value, to);
            }
            Op::ExtbL { reg } => {
                let value = self.dreg(reg) as u8 as i8 as u32;
                self.dar[reg as usize] = value;
                self.flags_logic(value, Size::Long);
            }
            Op::Swap { reg } => {
                let value = self.dreg(reg).rotate_left(16);
                self.dar[reg as usize] = value;
                self.flags_logic(value, Size::Long);
            }
            Op::Nbcd { ea } => {
                let (d, target) = self.ea_modify(ea, Size::Byte);
                let r = self.sbcd_op(d, 0);
                self.ea_writeback(target, Size::Byte, r);
            }
            Op::Tas { ea } => {
                let (d, target) = self.ea_modify(ea, Size::Byte);
                self.flags_logic(d, Size::Byte);
                self.ea_writeback(target, Size::Byte, d | 0x80);
            }
            Op::Tst { size, ea } => {
                let value = self.ea_read(ea, size);
                self.flags_logic(value, size);
            }

            // ---- quick arithmetic ----
            Op::Addq { size, data, ea } => {
                if let EaMode::AddrReg(r) = ea {
                    // Address-register targets take the whole register and
                    // leave the flags alone.
                    let v = self.areg(r).wrapping_add(data as u32);
                    self.set_areg(r, v);
                } else {
                    let (d, target) = self.ea_modify(ea, size);
                    let r = d.wrapping_add(data as u32) & size.mask();
                    self.flags_add(data as u32, d, r, size, false);
                    self.ea_writeback(target, size, r);
                }
            }
            Op::Subq { size, data, ea } => {
                if let EaMode::AddrReg(r) = ea {
                    let v = self.areg(r).wrapping_sub(data as u32);
                    self.set_areg(r, v);
                } else {
                    let (d, target) = self.ea_modify(ea, size);
                    let r = d.wrapping_sub(data as u32) & size.mask();
                    self.flags_sub(data as u32, d, r, size, false);
                    self.ea_writeback(target, size, r);
                }
            }

            // ---- condition-driven ----
            Op::Scc { cond, ea } => {
                let value = if self.cond(cond) { 0xFFu32 } else { 0 };
                if value != 0 {
                    if let EaMode::DataReg(_) = ea {
                        self.charge(2);
                    }
                }
                match ea {
                    EaMode::DataReg(r) => self.set_dreg_sized(r, Size::Byte, value),
                    _ => {
                        let addr = self.ea_addr(ea, Size::Byte);
                        self.write8(addr, value);
                    }
                }
            }
            Op::Dbcc { cond, reg } => {
                let disp_pc = self.pc;
                let disp = self.fetch16() as i16 as u32;
                if self.cond(cond) {
                    self.charge(2); // condition true, loop exits
                } else {
                    let counter = (self.dreg(reg) as u16).wrapping_sub(1);
                    self.set_dreg_sized(reg, Size::Word, counter as u32);
                    if counter != 0xFFFF {
                        self.pc = disp_pc.wrapping_add(disp);
                    } else {
                        self.charge(4); // counter expired
                    }
                }
            }

            // ---- branches ----
            Op::Bra { disp } => {
                self.pc = self.branch_target(disp);
            }
            Op::Bsr { disp } => {
                let target = self.branch_target(disp);
                let pc = self.pc;
                self.push32(pc);
                self.pc = target;
            }
            Op::Bcc { cond, disp } => {
                if self.cond(cond) {
                    self.pc = self.branch_target(disp);
                } else {
                    // Step over the displacement words and correct the
                    // table's taken-branch timing.
                    match disp {
                        0 => {
                            self.pc = self.pc.wrapping_add(2);
                            self.charge(2);
                        }
                        -1 => self.pc = self.pc.wrapping_add(4),
                        _ => self.charge(-2),
                    }
                }
            }

            // ---- jumps, subroutines, returns ----
            Op::Jmp { ea } => {
                self.pc = self.ea_addr(ea, Size::Long);
            }
            Op::Jsr { ea } => {
                let target = self.ea_addr(ea, Size::Long);
                let pc = self.pc;
                self.push32(pc);
                self.pc = target;
            }
            Op::Rts => {
                self.pc = self.pop32();
            }
            Op::Rtr => {
                let ccr = self.pop16();
                self.set_ccr(ccr);
                self.pc = self.pop32();
            }
            Op::Rtd => {
                let disp = self.fetch16() as i16 as u32;
                self.pc = self.pop32();
                self.dar[15] = self.dar[15].wrapping_add(disp);
            }
            Op::Rte => {
                if self.require_supervisor() {
                    self.rte();
                }
            }

            // ---- system control ----
            Op::Trap { vector } => {
                self.exception_next(TRAP_BASE + vector as u16);
            }
            Op::Trapv => {
                if self.sr() & SR_V != 0 {
                    self.exception_next(Vector::TrapvInstruction as u16);
                }
            }
            Op::Chk { dreg, ea } => {
                let bound = self.ea_read(ea, Size::Word) as u16 as i16;
                let value = self.dreg(dreg) as u16 as i16;
                if value < 0 || value > bound {
                    self.set_sr_flags(SR_N, if value < 0 { SR_N } else { 0 });
                    self.exception_next(Vector::ChkInstruction as u16);
                }
            }
            Op::Illegal => {
                self.exception_restart(Vector::IllegalInstruction);
            }
            Op::LineA => {
                self.exception_restart(Vector::LineAEmulator);
            }
            Op::LineF => {
                self.exception_restart(Vector::LineFEmulator);
            }
            Op::Unimplemented => {
                log::warn!(
                    "68k: unemulated opcode {:04X} at {:06X}, raising illegal instruction",
                    self.ir,
                    self.ppc
                );
                self.exception_restart(Vector::IllegalInstruction);
            }
            Op::Bkpt { num } => {
                // No breakpoint acknowledge hardware here.
                log::debug!("68k: BKPT #{num} at {:06X}", self.ppc);
                self.exception_restart(Vector::IllegalInstruction);
            }
            Op::Reset => {
                if self.require_supervisor() {
                    if let Some(handler) = &mut self.reset_handler {
                        handler();
                    }
                }
            }
            Op::Nop => {}
            Op::Stop => {
                if self.require_supervisor() {
                    let imm = self.fetch16();
                    self.set_sr(imm);
                    self.stopped |= STOP_LEVEL_STOP;
                }
            }
            Op::Movec { to_creg } => {
                if self.require_supervisor() {
                    self.movec(to_creg);
                }
            }
            Op::MoveUsp { reg, to_usp } => {
                if self.require_supervisor() {
                    if to_usp {
                        let v = self.areg(reg);
                        *self.usp_mut() = v;
                    } else {
                        let v = *self.usp_mut();
                        self.set_areg(reg, v);
                    }
                }
            }

            // ---- stack frames ----
            Op::Link { reg } => {
                let disp = self.fetch16() as i16 as u32;
                let value = self.areg(reg);
                self.push32(value);
                let sp = self.dar[15];
                self.set_areg(reg, sp);
                self.dar[15] = sp.wrapping_add(disp);
            }
            Op::Unlk { reg } => {
                self.dar[15] = self.areg(reg);
                let value = self.pop32();
                self.set_areg(reg, value);
            }
            Op::Pea { ea } => {
                let addr = self.ea_addr(ea, Size::Long);
                self.push32(addr);
            }
            Op::Lea { areg, ea } => {
                let addr = self.ea_addr(ea, Size::Long);
                self.set_areg(areg, addr);
            }
            Op::Movem { size, reg_to_mem, ea } => {
                self.movem(size, reg_to_mem, ea);
            }

            // ---- two-operand ALU ----
            Op::Alu { kind, size, dreg, to_ea, ea } => {
                self.alu(kind, size, dreg, to_ea, ea);
            }
            Op::AluA { kind, size, areg, ea } => {
                let s = size.sign_extend(self.ea_read(ea, size));
                let d = self.areg(areg);
                match kind {
                    AluOp::Add => self.set_areg(areg, d.wrapping_add(s)),
                    AluOp::Sub => self.set_areg(areg, d.wrapping_sub(s)),
                    _ => {
                        let r = d.wrapping_sub(s);
                        self.flags_cmp(s, d, r, Size::Long);
                    }
                }
            }
            Op::Addx { size, rx, ry, mem } => {
                let x = self.x_bit();
                if mem {
                    let step = Self::predec_step(ry, size);
                    let src_addr = self.areg(ry).wrapping_sub(step);
                    self.set_areg(ry, src_addr);
                    let s = self.read_sized(src_addr, size);
                    let step = Self::predec_step(rx, size);
                    let dst_addr = self.areg(rx).wrapping_sub(step);
                    self.set_areg(rx, dst_addr);
                    let d = self.read_sized(dst_addr, size);
                    let r = d.wrapping_add(s).wrapping_add(x) & size.mask();
                    self.flags_add(s, d, r, size, true);
                    self.write_sized(dst_addr, size, r);
                } else {
                    let s = self.dreg(ry) & size.mask();
                    let d = self.dreg(rx) & size.mask();
                    let r = d.wrapping_add(s).wrapping_add(x) & size.mask();
                    self.flags_add(s, d, r, size, true);
                    self.set_dreg_sized(rx, size, r);
                }
            }
            Op::Subx { size, rx, ry, mem } => {
                let x = self.x_bit();
                if mem {
                    let step = Self::predec_step(ry, size);
                    let src_addr = self.areg(ry).wrapping_sub(step);
                    self.set_areg(ry, src_addr);
                    let s = self.read_sized(src_addr, size);
                    let step = Self::predec_step(rx, size);
                    let dst_addr = self.areg(rx).wrapping_sub(step);
                    self.set_areg(rx, dst_addr);
                    let d = self.read_sized(dst_addr, size);
                    let r = d.wrapping_sub(s).wrapping_sub(x) & size.mask();
                    self.flags_sub(s, d, r, size, true);
                    self.write_sized(dst_addr, size, r);
                } else {
                    let s = self.dreg(ry) & size.mask();
                    let d = self.dreg(rx) & size.mask();
                    let r = d.wrapping_sub(s).wrapping_sub(x) & size.mask();
                    self.flags_sub(s, d, r, size, true);
                    self.set_dreg_sized(rx, size, r);
                }
            }
            Op::Cmpm { size, ax, ay } => {
                let src_addr = self.areg(ay);
                self.set_areg(ay, src_addr.wrapping_add(Self::predec_step(ay, size)));
                let s = self.read_sized(src_addr, size);
                let dst_addr = self.areg(ax);
                self.set_areg(ax, dst_addr.wrapping_add(Self::predec_step(ax, size)));
                let d = self.read_sized(dst_addr, size);
                let r = d.wrapping_sub(s) & size.mask();
                self.flags_cmp(s, d, r, size);
            }
            Op::Abcd { rx, ry, mem } => {
                if mem {
                    let src_addr = self.areg(ry).wrapping_sub(Self::predec_step(ry, Size::Byte));
                    self.set_areg(ry, src_addr);
                    let s = self.read_sized(src_addr, Size::Byte);
                    let dst_addr = self.areg(rx).wrapping_sub(Self::predec_step(rx, Size::Byte));
                    self.set_areg(rx, dst_addr);
                    let d = self.read_sized(dst_addr, Size::Byte);
                    let r = self.abcd_op(s, d);
                    self.write_sized(dst_addr, Size::Byte, r);
                } else {
                    let s = self.dreg(ry) & 0xFF;
                    let d = self.dreg(rx) & 0xFF;
                    let r = self.abcd_op(s, d);
                    self.set_dreg_sized(rx, Size::Byte, r);
                }
            }
            Op::Sbcd { rx, ry, mem } => {
                if mem {
                    let src_addr = self.areg(ry).wrapping_sub(Self::predec_step(ry, Size::Byte));
                    self.set_areg(ry, src_addr);
                    let s = self.read_sized(src_addr, Size::Byte);
                    let dst_addr = self.areg(rx).wrapping_sub(Self::predec_step(rx, Size::Byte));
                    self.set_areg(rx, dst_addr);
                    let d = self.read_sized(dst_addr, Size::Byte);
                    let r = self.sbcd_op(d, s);
                    self.write_sized(dst_addr, Size::Byte, r);
                } else {
                    let s = self.dreg(ry) & 0xFF;
                    let d = self.dreg(rx) & 0xFF;
                    let r = self.sbcd_op(d, s);
                    self.set_dreg_sized(rx, Size::Byte, r);
                }
            }

            // ---- multiply and divide ----
            Op::Mulu { dreg, ea } => {
                let s = self.ea_read(ea, Size::Word);
                let d = self.dreg(dreg) & 0xFFFF;
                let r = s * d;
                self.dar[dreg as usize] = r;
                self.flags_logic(r, Size::Long);
            }
            Op::Muls { dreg, ea } => {
                let s = self.ea_read(ea, Size::Word) as u16 as i16 as i32;
                let d = self.dreg(dreg) as u16 as i16 as i32;
                let r = (s * d) as u32;
                self.dar[dreg as usize] = r;
                self.flags_logic(r, Size::Long);
            }
            Op::Divu { dreg, ea } => {
                let s = self.ea_read(ea, Size::Word);
                if s == 0 {
                    self.exception_next(Vector::ZeroDivide as u16);
                    return;
                }
                let d = self.dreg(dreg);
                let quotient = d / s;
                let remainder = d % s;
                if quotient > 0xFFFF {
                    self.set_sr_flags(SR_C, SR_V);
                } else {
                    let r = (remainder << 16) | quotient;
                    self.dar[dreg as usize] = r;
                    self.flags_logic(quotient, Size::Word);
                }
            }
            Op::Divs { dreg, ea } => {
                let s = self.ea_read(ea, Size::Word) as u16 as i16 as i32;
                if s == 0 {
                    self.exception_next(Vector::ZeroDivide as u16);
                    return;
                }
                let d = self.dreg(dreg) as i32;
                let quotient = d.wrapping_div(s);
                let remainder = d.wrapping_rem(s);
                if quotient > 0x7FFF || quotient < -0x8000 {
                    self.set_sr_flags(SR_C, SR_V);
                } else {
                    let r = ((remainder as u32 & 0xFFFF) << 16) | (quotient as u32 & 0xFFFF);
                    self.dar[dreg as usize] = r;
                    self.flags_logic(quotient as u32, Size::Word);
                }
            }
            Op::MulL { ea } => self.mul_long(ea),
            Op::DivL { ea } => self.div_long(ea),

            Op::Exg { mode, rx, ry } => match mode {
                0x08 => self.dar.swap(rx as usize, ry as usize),
                0x09 => self.dar.swap(8 + rx as usize, 8 + ry as usize),
                _ => self.dar.swap(rx as usize, 8 + ry as usize),
            },

            // ---- shifts and rotates ----
            Op::ShiftReg { kind, left, size, count, reg } => {
                let count = match count {
                    ShiftCount::Imm(n) => n as u32,
                    ShiftCount::Reg(r) => self.dreg(r) & 63,
                };
                self.charge(2 * count as i32);
                let value = self.dreg(reg) & size.mask();
                let r = self.do_shift(kind, left, size, value, count);
                self.set_dreg_sized(reg, size, r);
            }
            Op::ShiftMem { kind, left, ea } => {
                let (value, target) = self.ea_modify(ea, Size::Word);
                let r = self.do_shift(kind, left, Size::Word, value, 1);
                self.ea_writeback(target, Size::Word, r);
            }
        }
    }

    // ========== Helpers ==========

    #[inline]
    fn predec_step(reg: u8, size: Size) -> u32 {
        if reg == 7 && size == Size::Byte {
            2
        } else {
            size.bytes()
        }
    }

    fn branch_target(&mut self, disp: i8) -> u32 {
        let base = self.pc;
        match disp {
            0 => {
                let d = self.fetch16() as i16 as u32;
                base.wrapping_add(d)
            }
            -1 => {
                let d = self.fetch32();
                base.wrapping_add(d)
            }
            _ => base.wrapping_add(disp as u32),
        }
    }

    fn alu(&mut self, kind: AluOp, size: Size, dreg: u8, to_ea: bool, ea: EaMode) {
        if to_ea {
            let s = self.dreg(dreg) & size.mask();
            let (d, target) = self.ea_modify(ea, size);
            let r = match kind {
                AluOp::Add => {
                    let r = d.wrapping_add(s) & size.mask();
                    self.flags_add(s, d, r, size, false);
                    r
                }
                AluOp::Sub => {
                    let r = d.wrapping_sub(s) & size.mask();
                    self.flags_sub(s, d, r, size, false);
                    r
                }
                AluOp::And => {
                    let r = d & s;
                    self.flags_logic(r, size);
                    r
                }
                AluOp::Or => {
                    let r = d | s;
                    self.flags_logic(r, size);
                    r
                }
                AluOp::Eor => {
                    let r = d ^ s;
                    self.flags_logic(r, size);
                    r
                }
                AluOp::Cmp => unreachable!("CMP never targets the EA"),
            };
            self.ea_writeback(target, size, r);
        } else {
            let s = self.ea_read(ea, size);
            let d = self.dreg(dreg) & size.mask();
            match kind {
                AluOp::Add => {
                    let r = d.wrapping_add(s) & size.mask();
                    self.flags_add(s, d, r, size, false);
                    self.set_dreg_sized(dreg, size, r);
                }
                AluOp::Sub => {
                    let r = d.wrapping_sub(s) & size.mask();
                    self.flags_sub(s, d, r, size, false);
                    self.set_dreg_sized(dreg, size, r);
                }
                AluOp::And => {
                    let r = d & s;
                    self.flags_logic(r, size);
                    self.set_dreg_sized(dreg, size, r);
                }
                AluOp::Or => {
                    let r = d | s;
                    self.flags_logic(r, size);
                    self.set_dreg_sized(dreg, size, r);
                }
                AluOp::Eor => {
                    let r = d ^ s;
                    self.flags_logic(r, size);
                    self.set_dreg_sized(dreg, size, r);
                }
                AluOp::Cmp => {
                    let r = d.wrapping_sub(s) & size.mask();
                    self.flags_cmp(s, d, r, size);
                }
            }
        }
    }

    /// ABCD: BCD addition with extend.
    fn abcd_op(&mut self, s: u32, d: u32) -> u32 {
        let x = self.x_bit();
        let mut res = (s & 0x0F) + (d & 0x0F) + x;
        if res > 9 {
            res += 6;
        }
        res += (s & 0xF0) + (d & 0xF0);
        let carry = res > 0x99;
        if carry {
            res -= 0xA0;
        }
        let res = res & 0xFF;
        self.bcd_flags(res, carry);
        res
    }

    /// SBCD/NBCD: BCD subtraction `d - s` with extend.
    fn sbcd_op(&mut self, d: u32, s: u32) -> u32 {
        let x = self.x_bit() as i32;
        let mut res = (d & 0x0F) as i32 - (s & 0x0F) as i32 - x;
        if res < 0 {
            res -= 6;
        }
        res += (d & 0xF0) as i32 - (s & 0xF0) as i32;
        let borrow = res < 0;
        if borrow {
            res += 0xA0;
        }
        let res = res as u32 & 0xFF;
        self.bcd_flags(res, borrow);
        res
    }

    fn bcd_flags(&mut self, res: u32, carry: bool) {
        // Z accumulates across multi-byte strings; N and V are undefined
        // on real silicon and left cleared here.
        let mut clear = SR_N | SR_V | SR_C | SR_X;
        let mut set = 0;
        if carry {
            set |= SR_C | SR_X;
        }
        if res != 0 {
            clear |= SR_Z;
        }
        if res & 0x80 != 0 {
            set |= SR_N;
        }
        self.set_sr_flags(clear, set);
    }

    fn do_shift(&mut self, kind: ShiftKind, left: bool, size: Size, value: u32, count: u32) -> u32 {
        let mask = size.mask();
        let msb = size.msb();
        let mut v = value & mask;

        if count == 0 {
            // Count of zero still sets NZ; C mirrors X for ROXd and
            // clears otherwise. X itself is untouched.
            let mut set = 0;
            if kind == ShiftKind::RotateX && self.sr() & SR_X != 0 {
                set |= SR_C;
            }
            if v & msb != 0 {
                set |= SR_N;
            }
            if v == 0 {
                set |= SR_Z;
            }
            self.set_sr_flags(SR_N | SR_Z | SR_V | SR_C, set);
            return v;
        }

        let mut carry = false;
        let mut overflow = false;
        let mut x = self.sr() & SR_X != 0;

        for _ in 0..count {
            match (kind, left) {
                (ShiftKind::Arith, true) => {
                    carry = v & msb != 0;
                    let nv = (v << 1) & mask;
                    if (nv ^ v) & msb != 0 {
                        overflow = true;
                    }
                    v = nv;
                    x = carry;
                }
                (ShiftKind::Arith, false) => {
                    carry = v & 1 != 0;
                    v = (v >> 1) | (v & msb);
                    x = carry;
                }
                (ShiftKind::Logical, true) => {
                    carry = v & msb != 0;
                    v = (v << 1) & mask;
                    x = carry;
                }
                (ShiftKind::Logical, false) => {
                    carry = v & 1 != 0;
                    v >>= 1;
                    x = carry;
                }
                (ShiftKind::RotateX, true) => {
                    carry = v & msb != 0;
                    v = ((v << 1) | u32::from(x)) & mask;
                    x = carry;
                }
                (ShiftKind::RotateX, false) => {
                    carry = v & 1 != 0;
                    v = (v >> 1) | if x { msb } else { 0 };
                    x = carry;
                }
                (ShiftKind::Rotate, true) => {
                    carry = v & msb != 0;
                    v = ((v << 1) | u32::from(carry)) & mask;
                }
                (ShiftKind::Rotate, false) => {
                    carry = v & 1 != 0;
                    v = (v >> 1) | if carry { msb } else { 0 };
                }
            }
        }

        let mut set = 0;
        if carry {
            set |= SR_C;
        }
        if kind == ShiftKind::Arith && overflow {
            set |= SR_V;
        }
        if v & msb != 0 {
            set |= SR_N;
        }
        if v == 0 {
            set |= SR_Z;
        }
        let mut clear = SR_N | SR_Z | SR_V | SR_C;
        // ROL/ROR leave X alone; everything else tracks the last bit out.
        if kind != ShiftKind::Rotate {
            clear |= SR_X;
            if x {
                set |= SR_X;
            }
        }
        self.set_sr_flags(clear, set);
        v
    }

    fn movem(&mut self, size: Size, reg_to_mem: bool, ea: EaMode) {
        let mask = self.fetch16();
        let step = size.bytes();
        let per_reg = if size == Size::Long { 8 } else { 4 };
        match ea {
            EaMode::PreDec(r) if reg_to_mem => {
                let mut addr = self.areg(r);
                for i in 0..16 {
                    if mask & (1 << i) != 0 {
                        // bit 0 = A7 down to bit 15 = D0
                        addr = addr.wrapping_sub(step);
                        let value = self.dar[15 - i];
                        self.write_sized(addr, size, value);
                        self.charge(per_reg);
                    }
                }
                self.set_areg(r, addr);
            }
            EaMode::PostInc(r) => {
                let mut addr = self.areg(r);
                for i in 0..16 {
                    if mask & (1 << i) != 0 {
                        let value = self.read_sized(addr, size);
                        self.dar[i] = size.sign_extend(value);
                        addr = addr.wrapping_add(step);
                        self.charge(per_reg);
                    }
                }
                self.set_areg(r, addr);
            }
            _ => {
                let mut addr = self.ea_addr(ea, size);
                for i in 0..16 {
                    if mask & (1 << i) != 0 {
                        if reg_to_mem {
                            let value = self.dar[i];
                            self.write_sized(addr, size, value);
                        } else {
                            let value = self.read_sized(addr, size);
                            self.dar[i] = size.sign_extend(value);
                        }
                        addr = addr.wrapping_add(step);
                        self.charge(per_reg);
                    }
                }
            }
        }
    }

    fn rte(&mut self) {
        loop {
            let sr = self.pop16();
            let pc = self.pop32();
            let format = if self.variant() == CpuVariant::M68000 {
                0
            } else {
                self.pop16() >> 12
            };
            match format {
                0 => {
                    self.set_sr(sr);
                    self.pc = pc;
                    return;
                }
                1 => {
                    // Throwaway frame: restore SR (possibly switching
                    // stacks) and keep unwinding.
                    self.set_sr(sr);
                }
                _ => {
                    log::warn!("68k: RTE found format {format} frame, raising format error");
                    self.exception_restart(Vector::FormatError);
                    return;
                }
            }
        }
    }

    fn movec(&mut self, to_creg: bool) {
        let ext = self.fetch16();
        let reg = ((ext >> 12) & 0x0F) as usize;
        let creg = ext & 0x0FFF;
        if to_creg {
            let value = self.dar[reg];
            match creg {
                0x000 => self.sfc = value & 7,
                0x001 => self.dfc = value & 7,
                0x800 => *self.usp_mut() = value,
                0x801 => self.vbr = value,
                _ => {
                    log::debug!("68k: MOVEC to unimplemented control register {creg:03X}");
                }
            }
        } else {
            let value = match creg {
                0x000 => self.sfc,
                0x001 => self.dfc,
                0x800 => *self.usp_mut(),
                0x801 => self.vbr,
                _ => {
                    log::debug!("68k: MOVEC from unimplemented control register {creg:03X}");
                    0
                }
            };
            self.dar[reg] = value;
        }
    }

    /// 020+ long multiply: the extension word selects registers, sign and
    /// 64-bit result.
    fn mul_long(&mut self, ea: EaMode) {
        let ext = self.fetch16();
        let dl = ((ext >> 12) & 7) as usize;
        let signed = ext & 0x0800 != 0;
        let quad = ext & 0x0400 != 0;
        let dh = (ext & 7) as usize;
        let src = self.ea_read(ea, Size::Long);
        let dst = self.dar[dl];

        let (lo, hi, neg, zero, overflow) = if signed {
            let r = (src as i32 as i64) * (dst as i32 as i64);
            let lo = r as u32;
            let hi = (r >> 32) as u32;
            let ovf = !quad && r != lo as i32 as i64;
            (lo, hi, r < 0, r == 0, ovf)
        } else {
            let r = (src as u64) * (dst as u64);
            let lo = r as u32;
            let hi = (r >> 32) as u32;
            let ovf = !quad && hi != 0;
            (lo, hi, quad && hi & 0x8000_0000 != 0 || !quad && lo & 0x8000_0000 != 0, r == 0, ovf)
        };

        self.dar[dl] = lo;
        if quad {
            self.dar[dh] = hi;
        }
        let mut set = 0;
        if neg {
            set |= SR_N;
        }
        if zero {
            set |= SR_Z;
        }
        if overflow {
            set |= SR_V;
        }
        self.set_sr_flags(SR_N | SR_Z | SR_V | SR_C, set);
    }

    /// 020+ long divide.
    fn div_long(&mut self, ea: EaMode) {
        let ext = self.fetch16();
        let dq = ((ext >> 12) & 7) as usize;
        let signed = ext & 0x0800 != 0;
        let quad = ext & 0x0400 != 0;
        let dr = (ext & 7) as usize;
        let divisor = self.ea_read(ea, Size::Long);
        if divisor == 0 {
            self.exception_next(Vector::ZeroDivide as u16);
            return;
        }

        if signed {
            let divisor = divisor as i32 as i64;
            let dividend = if quad {
                ((self.dar[dr] as u64 as i64) << 32) | self.dar[dq] as u64 as i64
            } else {
                self.dar[dq] as i32 as i64
            };
            let quotient = dividend.wrapping_div(divisor);
            let remainder = dividend.wrapping_rem(divisor);
            if quotient > i32::MAX as i64 || quotient < i32::MIN as i64 {
                self.set_sr_flags(SR_C, SR_V);
                return;
            }
            self.dar[dq] = quotient as u32;
            if dr != dq {
                self.dar[dr] = remainder as u32;
            }
            self.flags_logic(quotient as u32, Size::Long);
        } else {
            let divisor = divisor as u64;
            let dividend = if quad {
                ((self.dar[dr] as u64) << 32) | self.dar[dq] as u64
            } else {
                self.dar[dq] as u64
            };
            let quotient = dividend / divisor;
            let remainder = dividend % divisor;
            if quotient > u32::MAX as u64 {
                self.set_sr_flags(SR_C, SR_V);
                return;
            }
            self.dar[dq] = quotient as u32;
            if dr != dq {
                self.dar[dr] = remainder as u32;
            }
            self.flags_logic(quotient as u32, Size::Long);
        }
    }
}
