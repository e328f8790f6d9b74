//! Z80 helper functions
//!
//! Register accessors for the 8-bit halves of the pairs, memory and I/O
//! access through the memory map, instruction fetch, stack operations, and
//! the table-driven ALU. The flag-bearing operations index the
//! process-global tables in [`tables`](super::tables) rather than compute
//! flags bit by bit.

use super::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use super::tables::flag_tables;
use super::Z80;

impl Z80 {
    // ========== Register Accessors ==========

    #[inline]
    pub fn a(&self) -> u8 {
        (self.af >> 8) as u8
    }

    #[inline]
    pub fn set_a(&mut self, val: u8) {
        self.af = (self.af & 0x00FF) | ((val as u16) << 8);
    }

    #[inline]
    pub fn f(&self) -> u8 {
        self.af as u8
    }

    #[inline]
    pub fn set_f(&mut self, val: u8) {
        self.af = (self.af & 0xFF00) | val as u16;
    }

    #[inline]
    pub fn b(&self) -> u8 {
        (self.bc >> 8) as u8
    }

    #[inline]
    pub fn set_b(&mut self, val: u8) {
        self.bc = (self.bc & 0x00FF) | ((val as u16) << 8);
    }

    #[inline]
    pub fn c(&self) -> u8 {
        self.bc as u8
    }

    #[inline]
    pub fn set_c(&mut self, val: u8) {
        self.bc = (self.bc & 0xFF00) | val as u16;
    }

    #[inline]
    pub fn d(&self) -> u8 {
        (self.de >> 8) as u8
    }

    #[inline]
    pub fn set_d(&mut self, val: u8) {
        self.de = (self.de & 0x00FF) | ((val as u16) << 8);
    }

    #[inline]
    pub fn e(&self) -> u8 {
        self.de as u8
    }

    #[inline]
    pub fn set_e(&mut self, val: u8) {
        self.de = (self.de & 0xFF00) | val as u16;
    }

    #[inline]
    pub fn h(&self) -> u8 {
        (self.hl >> 8) as u8
    }

    #[inline]
    pub fn set_h(&mut self, val: u8) {
        self.hl = (self.hl & 0x00FF) | ((val as u16) << 8);
    }

    #[inline]
    pub fn l(&self) -> u8 {
        self.hl as u8
    }

    #[inline]
    pub fn set_l(&mut self, val: u8) {
        self.hl = (self.hl & 0xFF00) | val as u16;
    }

    /// R as a program sees it: live low 7 bits, bit 7 from the last
    /// LD R,A.
    #[inline]
    pub fn r_reg(&self) -> u8 {
        (self.r & 0x7F) | (self.r2 & 0x80)
    }

    // ========== Register Access by Index ==========
    // z/y encoding: 0=B 1=C 2=D 3=E 4=H 5=L 6=(HL) 7=A

    pub(super) fn get_reg8(&mut self, idx: u8) -> u8 {
        match idx {
            0 => self.b(),
            1 => self.c(),
            2 => self.d(),
            3 => self.e(),
            4 => self.h(),
            5 => self.l(),
            6 => self.read8(self.hl),
            _ => self.a(),
        }
    }

    pub(super) fn set_reg8(&mut self, idx: u8, val: u8) {
        match idx {
            0 => self.set_b(val),
            1 => self.set_c(val),
            2 => self.set_d(val),
            3 => self.set_e(val),
            4 => self.set_h(val),
            5 => self.set_l(val),
            6 => self.write8(self.hl, val),
            _ => self.set_a(val),
        }
    }

    /// rp table: 0=BC 1=DE 2=HL 3=SP
    pub(super) fn get_rp(&self, idx: u8) -> u16 {
        match idx {
            0 => self.bc,
            1 => self.de,
            2 => self.hl,
            _ => self.sp,
        }
    }

    pub(super) fn set_rp(&mut self, idx: u8, val: u16) {
        match idx {
            0 => self.bc = val,
            1 => self.de = val,
            2 => self.hl = val,
            _ => self.sp = val,
        }
    }

    /// rp2 table: 0=BC 1=DE 2=HL 3=AF (PUSH/POP)
    pub(super) fn get_rp2(&self, idx: u8) -> u16 {
        match idx {
            0 => self.bc,
            1 => self.de,
            2 => self.hl,
            _ => self.af,
        }
    }

    pub(super) fn set_rp2(&mut self, idx: u8, val: u16) {
        match idx {
            0 => self.bc = val,
            1 => self.de = val,
            2 => self.hl = val,
            _ => self.af = val,
        }
    }

    /// Condition codes: 0=NZ 1=Z 2=NC 3=C 4=PO 5=PE 6=P 7=M
    pub(super) fn check_cc(&self, cc: u8) -> bool {
        let f = self.f();
        match cc {
            0 => f & ZF == 0,
            1 => f & ZF != 0,
            2 => f & CF == 0,
            3 => f & CF != 0,
            4 => f & PF == 0,
            5 => f & PF != 0,
            6 => f & SF == 0,
            _ => f & SF != 0,
        }
    }

    // ========== Memory and I/O ==========

    #[inline]
    pub(super) fn read8(&self, addr: u16) -> u8 {
        self.map.read8(addr as u32)
    }

    #[inline]
    pub(super) fn write8(&self, addr: u16, val: u8) {
        self.map.write8(addr as u32, val);
    }

    #[inline]
    pub(super) fn read16(&self, addr: u16) -> u16 {
        let lo = self.read8(addr) as u16;
        let hi = self.read8(addr.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    #[inline]
    pub(super) fn write16(&self, addr: u16, val: u16) {
        self.write8(addr, val as u8);
        self.write8(addr.wrapping_add(1), (val >> 8) as u8);
    }

    pub(super) fn io_read(&mut self, port: u16) -> u8 {
        match &self.io {
            Some(dev) => dev.borrow_mut().read8(port as u32),
            None => 0xFF, // open bus
        }
    }

    pub(super) fn io_write(&mut self, port: u16, val: u8) {
        if let Some(dev) = &self.io {
            dev.borrow_mut().write8(port as u32, val);
        }
    }

    // ========== Instruction Fetch ==========

    /// Fetch an opcode byte at PC: increments the low 7 bits of R.
    #[inline]
    pub(super) fn fetch_opcode(&mut self) -> u8 {
        let byte = self.read8(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.r = self.r.wrapping_add(1);
        byte
    }

    /// Fetch an argument byte at PC (no refresh).
    #[inline]
    pub(super) fn fetch_byte(&mut self) -> u8 {
        let byte = self.read8(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    #[inline]
    pub(super) fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte() as u16;
        let hi = self.fetch_byte() as u16;
        lo | (hi << 8)
    }

    // ========== Stack Operations ==========

    pub(super) fn push16(&mut self, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.write8(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.write8(self.sp, val as u8);
    }

    pub(super) fn pop16(&mut self) -> u16 {
        let lo = self.read8(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = self.read8(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        lo | (hi << 8)
    }

    // ========== 8-bit ALU ==========

    pub(super) fn alu_add(&mut self, value: u8, use_carry: bool) {
        let a = self.a();
        let c = if use_carry { self.f() & CF } else { 0 };
        let res = a.wrapping_add(value).wrapping_add(c);
        let f = flag_tables().add[((c as usize) << 16) | ((a as usize) << 8) | res as usize];
        self.set_a(res);
        self.set_f(f);
    }

    pub(super) fn alu_sub(&mut self, value: u8, use_carry: bool) {
        let a = self.a();
        let c = if use_carry { self.f() & CF } else { 0 };
        let res = a.wrapping_sub(value).wrapping_sub(c);
        let f = flag_tables().sub[((c as usize) << 16) | ((a as usize) << 8) | res as usize];
        self.set_a(res);
        self.set_f(f);
    }

    /// CP: compare discards the result, and YF/XF come from the operand.
    pub(super) fn alu_cp(&mut self, value: u8) {
        let a = self.a();
        let res = a.wrapping_sub(value);
        let f = flag_tables().sub[((a as usize) << 8) | res as usize];
        self.set_f((f & !(YF | XF)) | (value & (YF | XF)));
    }

    pub(super) fn alu_and(&mut self, value: u8) {
        let res = self.a() & value;
        self.set_a(res);
        self.set_f(flag_tables().szp[res as usize] | HF);
    }

    pub(super) fn alu_or(&mut self, value: u8) {
        let res = self.a() | value;
        self.set_a(res);
        self.set_f(flag_tables().szp[res as usize]);
    }

    pub(super) fn alu_xor(&mut self, value: u8) {
        let res = self.a() ^ value;
        self.set_a(res);
        self.set_f(flag_tables().szp[res as usize]);
    }

    /// ALU dispatch for the y field: ADD/ADC/SUB/SBC/AND/XOR/OR/CP.
    pub(super) fn execute_alu(&mut self, y: u8, value: u8) {
        match y {
            0 => self.alu_add(value, false),
            1 => self.alu_add(value, true),
            2 => self.alu_sub(value, false),
            3 => self.alu_sub(value, true),
            4 => self.alu_and(value),
            5 => self.alu_xor(value),
            6 => self.alu_or(value),
            _ => self.alu_cp(value),
        }
    }

    pub(super) fn alu_inc(&mut self, value: u8) -> u8 {
        let res = value.wrapping_add(1);
        let f = (self.f() & CF) | flag_tables().szhv_inc[res as usize];
        self.set_f(f);
        res
    }

    pub(super) fn alu_dec(&mut self, value: u8) -> u8 {
        let res = value.wrapping_sub(1);
        let f = (self.f() & CF) | flag_tables().szhv_dec[res as usize];
        self.set_f(f);
        res
    }

    // ========== 16-bit ALU ==========

    /// ADD dst,rp: only HF, NF, CF (and YF/XF from the high byte) change.
    pub(super) fn add16(&mut self, dst: u16, value: u16) -> u16 {
        self.wz = dst.wrapping_add(1);
        let res = dst as u32 + value as u32;
        let f = (self.f() & (SF | ZF | PF))
            | (((dst as u32 ^ res ^ value as u32) >> 8) as u8 & HF)
            | ((res >> 16) as u8 & CF)
            | ((res >> 8) as u8 & (YF | XF));
        self.set_f(f);
        res as u16
    }

    pub(super) fn adc16(&mut self, value: u16) {
        self.wz = self.hl.wrapping_add(1);
        let c = (self.f() & CF) as u32;
        let hl = self.hl as u32;
        let res = hl + value as u32 + c;
        let f = (((hl ^ res ^ value as u32) >> 8) as u8 & HF)
            | ((res >> 16) as u8 & CF)
            | ((res >> 8) as u8 & (SF | YF | XF))
            | if res & 0xFFFF == 0 { ZF } else { 0 }
            | (((value as u32 ^ hl ^ 0x8000) & (value as u32 ^ res) & 0x8000) >> 13) as u8;
        self.hl = res as u16;
        self.set_f(f);
    }

    pub(super) fn sbc16(&mut self, value: u16) {
        self.wz = self.hl.wrapping_add(1);
        let c = (self.f() & CF) as u32;
        let hl = self.hl as u32;
        let res = hl.wrapping_sub(value as u32).wrapping_sub(c);
        let f = (((hl ^ res ^ value as u32) >> 8) as u8 & HF)
            | NF
            | ((res >> 16) as u8 & CF)
            | ((res >> 8) as u8 & (SF | YF | XF))
            | if res & 0xFFFF == 0 { ZF } else { 0 }
            | (((value as u32 ^ hl) & (hl ^ res) & 0x8000) >> 13) as u8;
        self.hl = res as u16;
        self.set_f(f);
    }

    // ========== Rotates and Shifts ==========

    /// CB-page rotate/shift for the y field; returns the result and sets
    /// the full flag set from the parity table.
    pub(super) fn execute_rot(&mut self, y: u8, val: u8) -> u8 {
        let carry_in = self.f() & CF;
        let (res, carry) = match y {
            0 => ((val << 1) | (val >> 7), val >> 7),              // RLC
            1 => ((val >> 1) | (val << 7), val & 1),               // RRC
            2 => ((val << 1) | carry_in, val >> 7),                // RL
            3 => ((val >> 1) | (carry_in << 7), val & 1),          // RR
            4 => (val << 1, val >> 7),                             // SLA
            5 => ((val >> 1) | (val & 0x80), val & 1),             // SRA
            6 => ((val << 1) | 1, val >> 7),                       // SLL (undocumented)
            _ => (val >> 1, val & 1),                              // SRL
        };
        self.set_f(flag_tables().szp[res as usize] | (carry & CF));
        res
    }

    /// The accumulator rotates keep S, Z and P and take YF/XF from A.
    pub(super) fn rlca(&mut self) {
        let a = self.a().rotate_left(1);
        self.set_a(a);
        self.set_f((self.f() & (SF | ZF | PF)) | (a & (YF | XF | CF)));
    }

    pub(super) fn rrca(&mut self) {
        let a = self.a();
        let f = (self.f() & (SF | ZF | PF)) | (a & CF);
        let a = a.rotate_right(1);
        self.set_a(a);
        self.set_f(f | (a & (YF | XF)));
    }

    pub(super) fn rla(&mut self) {
        let a = self.a();
        let res = (a << 1) | (self.f() & CF);
        self.set_f((self.f() & (SF | ZF | PF)) | (res & (YF | XF)) | (a >> 7 & CF));
        self.set_a(res);
    }

    pub(super) fn rra(&mut self) {
        let a = self.a();
        let res = (a >> 1) | ((self.f() & CF) << 7);
        self.set_f((self.f() & (SF | ZF | PF)) | (res & (YF | XF)) | (a & CF));
        self.set_a(res);
    }

    pub(super) fn daa(&mut self) {
        let a = self.a();
        let f = self.f();
        let mut adjusted = a;
        if f & NF != 0 {
            if f & HF != 0 || a & 0x0F > 9 {
                adjusted = adjusted.wrapping_sub(6);
            }
            if f & CF != 0 || a > 0x99 {
                adjusted = adjusted.wrapping_sub(0x60);
            }
        } else {
            if f & HF != 0 || a & 0x0F > 9 {
                adjusted = adjusted.wrapping_add(6);
            }
            if f & CF != 0 || a > 0x99 {
                adjusted = adjusted.wrapping_add(0x60);
            }
        }
        let f = (f & (CF | NF))
            | if a > 0x99 { CF } else { 0 }
            | ((a ^ adjusted) & HF)
            | flag_tables().szp[adjusted as usize];
        self.set_a(adjusted);
        self.set_f(f);
    }

    // ========== Exchanges ==========

    pub(super) fn ex_af(&mut self) {
        std::mem::swap(&mut self.af, &mut self.af2);
    }

    pub(super) fn exx(&mut self) {
        std::mem::swap(&mut self.bc, &mut self.bc2);
        std::mem::swap(&mut self.de, &mut self.de2);
        std::mem::swap(&mut self.hl, &mut self.hl2);
    }

    pub(super) fn ex_de_hl(&mut self) {
        std::mem::swap(&mut self.de, &mut self.hl);
    }
}
