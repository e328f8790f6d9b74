//! Z80 instruction execution
//!
//! Opcodes are decoded with the x-y-z decomposition of the opcode byte
//! (x = bits 7-6, y = 5-3, z = 2-0, p = y >> 1, q = y & 1) and dispatched
//! through one function per opcode page:
//!
//! - `execute_main`: unprefixed page
//! - `execute_cb`: CB page (rotates, shifts, bit operations)
//! - `execute_ed`: ED page (16-bit arithmetic, block ops, I and R access)
//! - `execute_indexed`: DD/FD page (IX/IY substitution)
//! - `execute_indexed_cb`: DD CB / FD CB page (displacement fetched first,
//!   opcode fetched as an argument without touching R)
//!
//! Every dispatch deducts its page's T-state table entry before executing;
//! taken branches and expiring block repeats deduct `cc_ex` on top.
//!
//! # References
//! - Zilog Z80 CPU User Manual (UM0080)
//! - The undocumented Z80 documented (Sean Young)

use super::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use super::tables::flag_tables;
use super::{InterruptMode, Z80};

impl Z80 {
    pub(super) fn execute_main(&mut self, op: u8) {
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match x {
            0 => self.execute_x0(op, y, z, p, q),
            1 => {
                if op == 0x76 {
                    // HALT: the dispatch head burns idle slices until an
                    // interrupt arrives; PC already points past the opcode.
                    self.halted = true;
                } else {
                    let val = self.get_reg8(z);
                    self.set_reg8(y, val);
                }
            }
            2 => {
                let val = self.get_reg8(z);
                self.execute_alu(y, val);
            }
            _ => self.execute_x3(op, y, z, p, q),
        }
    }

    fn execute_x0(&mut self, op: u8, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => match y {
                0 => {} // NOP
                1 => self.ex_af(),
                2 => {
                    // DJNZ d
                    let d = self.fetch_byte() as i8;
                    self.set_b(self.b().wrapping_sub(1));
                    if self.b() != 0 {
                        self.icount -= self.tables.ex[op as usize] as i32;
                        self.pc = self.pc.wrapping_add(d as i16 as u16);
                        self.wz = self.pc;
                    }
                }
                3 => {
                    // JR d
                    let d = self.fetch_byte() as i8;
                    self.pc = self.pc.wrapping_add(d as i16 as u16);
                    self.wz = self.pc;
                }
                _ => {
                    // JR cc,d
                    let d = self.fetch_byte() as i8;
                    if self.check_cc(y - 4) {
                        self.icount -= self.tables.ex[op as usize] as i32;
                        self.pc = self.pc.wrapping_add(d as i16 as u16);
                        self.wz = self.pc;
                    }
                }
            },
            1 => {
                if q == 0 {
                    // LD rp,nn
                    let nn = self.fetch_word();
                    self.set_rp(p, nn);
                } else {
                    // ADD HL,rp
                    let value = self.get_rp(p);
                    self.hl = self.add16(self.hl, value);
                }
            }
            2 => match (p, q) {
                (0, 0) => {
                    // LD (BC),A
                    let a = self.a();
                    self.write8(self.bc, a);
                    self.wz = (self.bc.wrapping_add(1) & 0x00FF) | ((a as u16) << 8);
                }
                (0, 1) => {
                    // LD A,(BC)
                    let val = self.read8(self.bc);
                    self.set_a(val);
                    self.wz = self.bc.wrapping_add(1);
                }
                (1, 0) => {
                    // LD (DE),A
                    let a = self.a();
                    self.write8(self.de, a);
                    self.wz = (self.de.wrapping_add(1) & 0x00FF) | ((a as u16) << 8);
                }
                (1, 1) => {
                    // LD A,(DE)
                    let val = self.read8(self.de);
                    self.set_a(val);
                    self.wz = self.de.wrapping_add(1);
                }
                (2, 0) => {
                    // LD (nn),HL
                    let nn = self.fetch_word();
                    self.write16(nn, self.hl);
                    self.wz = nn.wrapping_add(1);
                }
                (2, 1) => {
                    // LD HL,(nn)
                    let nn = self.fetch_word();
                    self.hl = self.read16(nn);
                    self.wz = nn.wrapping_add(1);
                }
                (3, 0) => {
                    // LD (nn),A
                    let nn = self.fetch_word();
                    let a = self.a();
                    self.write8(nn, a);
                    self.wz = (nn.wrapping_add(1) & 0x00FF) | ((a as u16) << 8);
                }
                _ => {
                    // LD A,(nn)
                    let nn = self.fetch_word();
                    let val = self.read8(nn);
                    self.set_a(val);
                    self.wz = nn.wrapping_add(1);
                }
            },
            3 => {
                // INC/DEC rp, no flags
                let val = self.get_rp(p);
                let val = if q == 0 {
                    val.wrapping_add(1)
                } else {
                    val.wrapping_sub(1)
                };
                self.set_rp(p, val);
            }
            4 => {
                let val = self.get_reg8(y);
                let res = self.alu_inc(val);
                self.set_reg8(y, res);
            }
            5 => {
                let val = self.get_reg8(y);
                let res = self.alu_dec(val);
                self.set_reg8(y, res);
            }
            6 => {
                // LD r,n
                let n = self.fetch_byte();
                self.set_reg8(y, n);
            }
            _ => match y {
                0 => self.rlca(),
                1 => self.rrca(),
                2 => self.rla(),
                3 => self.rra(),
                4 => self.daa(),
                5 => {
                    // CPL
                    let a = !self.a();
                    self.set_a(a);
                    let f = (self.f() & (SF | ZF | PF | CF)) | HF | NF | (a & (YF | XF));
                    self.set_f(f);
                }
                6 => {
                    // SCF
                    let f = (self.f() & (SF | ZF | PF)) | CF | (self.a() & (YF | XF));
                    self.set_f(f);
                }
                _ => {
                    // CCF
                    let f = self.f();
                    let f = ((f & (SF | ZF | PF | CF)) | ((f & CF) << 4) | (self.a() & (YF | XF)))
                        ^ CF;
                    self.set_f(f);
                }
            },
        }
    }

    fn execute_x3(&mut self, op: u8, y: u8, z: u8, p: u8, q: u8) {
        match z {
            0 => {
                // RET cc
                if self.check_cc(y) {
                    self.icount -= self.tables.ex[op as usize] as i32;
                    self.pc = self.pop16();
                    self.wz = self.pc;
                }
            }
            1 => {
                if q == 0 {
                    // POP rp2
                    let val = self.pop16();
                    self.set_rp2(p, val);
                } else {
                    match p {
                        0 => {
                            // RET
                            self.pc = self.pop16();
                            self.wz = self.pc;
                        }
                        1 => self.exx(),
                        2 => self.pc = self.hl, // JP (HL)
                        _ => self.sp = self.hl, // LD SP,HL
                    }
                }
            }
            2 => {
                // JP cc,nn
                let nn = self.fetch_word();
                self.wz = nn;
                if self.check_cc(y) {
                    self.pc = nn;
                }
            }
            3 => match y {
                0 => {
                    // JP nn
                    let nn = self.fetch_word();
                    self.pc = nn;
                    self.wz = nn;
                }
                1 => self.execute_cb(),
                2 => {
                    // OUT (n),A
                    let n = self.fetch_byte();
                    let a = self.a();
                    let port = ((a as u16) << 8) | n as u16;
                    self.io_write(port, a);
                    self.wz = (port.wrapping_add(1) & 0x00FF) | ((a as u16) << 8);
                }
                3 => {
                    // IN A,(n)
                    let n = self.fetch_byte();
                    let port = ((self.a() as u16) << 8) | n as u16;
                    let val = self.io_read(port);
                    self.set_a(val);
                    self.wz = port.wrapping_add(1);
                }
                4 => {
                    // EX (SP),HL
                    let lo = self.read8(self.sp);
                    let hi = self.read8(self.sp.wrapping_add(1));
                    let (l, h) = (self.l(), self.h());
                    self.write8(self.sp, l);
                    self.write8(self.sp.wrapping_add(1), h);
                    self.hl = ((hi as u16) << 8) | lo as u16;
                    self.wz = self.hl;
                }
                5 => self.ex_de_hl(),
                6 => {
                    // DI
                    self.iff1 = false;
                    self.iff2 = false;
                }
                _ => {
                    // EI: interrupts stay blocked for one more instruction
                    self.iff1 = true;
                    self.iff2 = true;
                    self.after_ei = true;
                }
            },
            4 => {
                // CALL cc,nn
                let nn = self.fetch_word();
                self.wz = nn;
                if self.check_cc(y) {
                    self.icount -= self.tables.ex[op as usize] as i32;
                    let pc = self.pc;
                    self.push16(pc);
                    self.pc = nn;
                }
            }
            5 => {
                if q == 0 {
                    // PUSH rp2
                    let val = self.get_rp2(p);
                    self.push16(val);
                } else {
                    match p {
                        0 => {
                            // CALL nn
                            let nn = self.fetch_word();
                            self.wz = nn;
                            let pc = self.pc;
                            self.push16(pc);
                            self.pc = nn;
                        }
                        1 => self.execute_indexed(false), // DD
                        2 => self.execute_ed(),
                        _ => self.execute_indexed(true), // FD
                    }
                }
            }
            6 => {
                // ALU n
                let n = self.fetch_byte();
                self.execute_alu(y, n);
            }
            _ => {
                // RST y*8
                let pc = self.pc;
                self.push16(pc);
                self.pc = (y as u16) << 3;
                self.wz = self.pc;
            }
        }
    }

    // ========== CB Page ==========

    fn execute_cb(&mut self) {
        let op = self.fetch_opcode();
        self.icount -= self.tables.cb[op as usize] as i32;
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;

        match x {
            0 => {
                let val = self.get_reg8(z);
                let res = self.execute_rot(y, val);
                self.set_reg8(z, res);
            }
            1 => {
                // BIT y,r - YF/XF come from the operand, or from the
                // internal address latch for the (HL) form.
                let val = self.get_reg8(z);
                let masked = val & (1 << y);
                let high = if z == 6 { (self.wz >> 8) as u8 } else { val };
                let f = (self.f() & CF)
                    | HF
                    | (flag_tables().sz_bit[masked as usize] & !(YF | XF))
                    | (high & (YF | XF));
                self.set_f(f);
            }
            2 => {
                let val = self.get_reg8(z) & !(1 << y);
                self.set_reg8(z, val);
            }
            _ => {
                let val = self.get_reg8(z) | (1 << y);
                self.set_reg8(z, val);
            }
        }
    }

    // ========== ED Page ==========

    fn execute_ed(&mut self) {
        let op = self.fetch_opcode();
        self.icount -= self.tables.ed[op as usize] as i32;
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match x {
            1 => match z {
                0 => {
                    // IN r,(C)
                    let val = self.io_read(self.bc);
                    self.wz = self.bc.wrapping_add(1);
                    if y != 6 {
                        self.set_reg8(y, val);
                    }
                    let f = (self.f() & CF) | flag_tables().szp[val as usize];
                    self.set_f(f);
                }
                1 => {
                    // OUT (C),r - the missing-register form outputs 0
                    let val = if y == 6 { 0 } else { self.get_reg8(y) };
                    self.io_write(self.bc, val);
                    self.wz = self.bc.wrapping_add(1);
                }
                2 => {
                    let value = self.get_rp(p);
                    if q == 0 {
                        self.sbc16(value);
                    } else {
                        self.adc16(value);
                    }
                }
                3 => {
                    let nn = self.fetch_word();
                    if q == 0 {
                        // LD (nn),rp
                        let val = self.get_rp(p);
                        self.write16(nn, val);
                    } else {
                        // LD rp,(nn)
                        let val = self.read16(nn);
                        self.set_rp(p, val);
                    }
                    self.wz = nn.wrapping_add(1);
                }
                4 => {
                    // NEG
                    let a = self.a();
                    self.set_a(0);
                    self.alu_sub(a, false);
                }
                5 => {
                    // RETN / RETI
                    self.iff1 = self.iff2;
                    self.pc = self.pop16();
                    self.wz = self.pc;
                }
                6 => {
                    self.im = match y & 0x03 {
                        0 | 1 => InterruptMode::Mode0,
                        2 => InterruptMode::Mode1,
                        _ => InterruptMode::Mode2,
                    };
                }
                _ => match y {
                    0 => self.i = self.a(), // LD I,A
                    1 => {
                        // LD R,A
                        self.r = self.a();
                        self.r2 = self.a();
                    }
                    2 => {
                        // LD A,I
                        let val = self.i;
                        self.set_a(val);
                        let f = (self.f() & CF)
                            | flag_tables().sz[val as usize]
                            | if self.iff2 { PF } else { 0 };
                        self.set_f(f);
                        self.after_ldair = true;
                    }
                    3 => {
                        // LD A,R
                        let val = self.r_reg();
                        self.set_a(val);
                        let f = (self.f() & CF)
                            | flag_tables().sz[val as usize]
                            | if self.iff2 { PF } else { 0 };
                        self.set_f(f);
                        self.after_ldair = true;
                    }
                    4 => {
                        // RRD
                        let val = self.read8(self.hl);
                        let a = self.a();
                        self.write8(self.hl, (a << 4) | (val >> 4));
                        let a = (a & 0xF0) | (val & 0x0F);
                        self.set_a(a);
                        self.wz = self.hl.wrapping_add(1);
                        let f = (self.f() & CF) | flag_tables().szp[a as usize];
                        self.set_f(f);
                    }
                    5 => {
                        // RLD
                        let val = self.read8(self.hl);
                        let a = self.a();
                        self.write8(self.hl, (val << 4) | (a & 0x0F));
                        let a = (a & 0xF0) | (val >> 4);
                        self.set_a(a);
                        self.wz = self.hl.wrapping_add(1);
                        let f = (self.f() & CF) | flag_tables().szp[a as usize];
                        self.set_f(f);
                    }
                    _ => {} // ED 77 / ED 7F: NOP
                },
            },
            2 if z <= 3 && y >= 4 => self.execute_block(op, y, z),
            _ => {
                // NMOS Z80: undefined ED opcodes are two NOPs.
                log::warn!(
                    "z80: illegal ED opcode {:02X} at {:04X}, continuing",
                    op,
                    self.ppc
                );
            }
        }
    }

    // ========== Block Instructions ==========

    fn execute_block(&mut self, op: u8, y: u8, z: u8) {
        // y: 4 = increment, 5 = decrement, 6/7 = repeating forms
        let decrement = y & 1 != 0;
        let repeat = y >= 6;
        match z {
            0 => {
                // LDI/LDD/LDIR/LDDR
                let val = self.read8(self.hl);
                self.write8(self.de, val);
                if decrement {
                    self.hl = self.hl.wrapping_sub(1);
                    self.de = self.de.wrapping_sub(1);
                } else {
                    self.hl = self.hl.wrapping_add(1);
                    self.de = self.de.wrapping_add(1);
                }
                self.bc = self.bc.wrapping_sub(1);
                let n = val.wrapping_add(self.a());
                let mut f = self.f() & (SF | ZF | CF);
                if n & 0x02 != 0 {
                    f |= YF;
                }
                if n & 0x08 != 0 {
                    f |= XF;
                }
                if self.bc != 0 {
                    f |= PF;
                }
                self.set_f(f);
                if repeat && self.bc != 0 {
                    self.repeat_block(op);
                }
            }
            1 => {
                // CPI/CPD/CPIR/CPDR
                let val = self.read8(self.hl);
                let a = self.a();
                let mut res = a.wrapping_sub(val);
                if decrement {
                    self.hl = self.hl.wrapping_sub(1);
                    self.wz = self.wz.wrapping_sub(1);
                } else {
                    self.hl = self.hl.wrapping_add(1);
                    self.wz = self.wz.wrapping_add(1);
                }
                self.bc = self.bc.wrapping_sub(1);
                let mut f = (self.f() & CF)
                    | (flag_tables().sz[res as usize] & !(YF | XF))
                    | ((a ^ val ^ res) & HF)
                    | NF;
                if f & HF != 0 {
                    res = res.wrapping_sub(1);
                }
                if res & 0x02 != 0 {
                    f |= YF;
                }
                if res & 0x08 != 0 {
                    f |= XF;
                }
                if self.bc != 0 {
                    f |= PF;
                }
                self.set_f(f);
                if repeat && self.bc != 0 && f & ZF == 0 {
                    self.repeat_block(op);
                }
            }
            2 => {
                // INI/IND/INIR/INDR
                self.wz = if decrement {
                    self.bc.wrapping_sub(1)
                } else {
                    self.bc.wrapping_add(1)
                };
                let val = self.io_read(self.bc);
                self.set_b(self.b().wrapping_sub(1));
                self.write8(self.hl, val);
                let c_adj = if decrement {
                    self.c().wrapping_sub(1)
                } else {
                    self.c().wrapping_add(1)
                };
                if decrement {
                    self.hl = self.hl.wrapping_sub(1);
                } else {
                    self.hl = self.hl.wrapping_add(1);
                }
                let b = self.b();
                let mut f = flag_tables().sz[b as usize];
                if val & 0x80 != 0 {
                    f |= NF;
                }
                let t = c_adj as u16 + val as u16;
                if t & 0x100 != 0 {
                    f |= HF | CF;
                }
                f |= flag_tables().szp[(((t as u8) & 0x07) ^ b) as usize] & PF;
                self.set_f(f);
                if repeat && b != 0 {
                    self.repeat_block(op);
                }
            }
            _ => {
                // OUTI/OUTD/OTIR/OTDR - B decrements before the port address
                // goes out
                self.set_b(self.b().wrapping_sub(1));
                self.wz = if decrement {
                    self.bc.wrapping_sub(1)
                } else {
                    self.bc.wrapping_add(1)
                };
                let val = self.read8(self.hl);
                self.io_write(self.bc, val);
                if decrement {
                    self.hl = self.hl.wrapping_sub(1);
                } else {
                    self.hl = self.hl.wrapping_add(1);
                }
                let b = self.b();
                let mut f = flag_tables().sz[b as usize];
                if val & 0x80 != 0 {
                    f |= NF;
                }
                let t = self.l() as u16 + val as u16;
                if t & 0x100 != 0 {
                    f |= HF | CF;
                }
                f |= flag_tables().szp[(((t as u8) & 0x07) ^ b) as usize] & PF;
                self.set_f(f);
                if repeat && b != 0 {
                    self.repeat_block(op);
                }
            }
        }
    }

    /// Rewind PC over the two-byte opcode so the block instruction
    /// re-executes, and charge the repeat penalty.
    fn repeat_block(&mut self, op: u8) {
        self.pc = self.pc.wrapping_sub(2);
        self.wz = self.pc.wrapping_add(1);
        self.icount -= self.tables.ex[op as usize] as i32;
    }

    // ========== DD/FD Page ==========

    fn execute_indexed(&mut self, use_iy: bool) {
        let op = self.fetch_opcode();
        self.icount -= self.tables.xy[op as usize] as i32;
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;
        let p = (y >> 1) & 0x03;
        let q = y & 0x01;

        match op {
            // Prefix chains: the last DD/FD wins.
            0xDD => return self.execute_indexed(false),
            0xFD => return self.execute_indexed(true),
            0xCB => return self.execute_indexed_cb(use_iy),
            0xED => {
                // The index prefix has no effect on the ED page.
                log::warn!(
                    "z80: index prefix before ED at {:04X} discarded",
                    self.ppc
                );
                return self.execute_ed();
            }
            _ => {}
        }

        match x {
            0 => match z {
                1 if q == 0 && p == 2 => {
                    // LD IX,nn
                    let nn = self.fetch_word();
                    self.set_index(use_iy, nn);
                }
                1 if q == 1 => {
                    // ADD IX,rp (rp[2] is IX itself)
                    let ix = self.index(use_iy);
                    let value = if p == 2 { ix } else { self.get_rp(p) };
                    let res = self.add16(ix, value);
                    self.set_index(use_iy, res);
                }
                2 if p == 2 && q == 0 => {
                    // LD (nn),IX
                    let nn = self.fetch_word();
                    let ix = self.index(use_iy);
                    self.write16(nn, ix);
                    self.wz = nn.wrapping_add(1);
                }
                2 if p == 2 && q == 1 => {
                    // LD IX,(nn)
                    let nn = self.fetch_word();
                    let val = self.read16(nn);
                    self.set_index(use_iy, val);
                    self.wz = nn.wrapping_add(1);
                }
                3 if p == 2 => {
                    // INC/DEC IX
                    let ix = self.index(use_iy);
                    let ix = if q == 0 {
                        ix.wrapping_add(1)
                    } else {
                        ix.wrapping_sub(1)
                    };
                    self.set_index(use_iy, ix);
                }
                4 | 5 if y == 6 => {
                    // INC/DEC (IX+d)
                    let ea = self.fetch_indexed_ea(use_iy);
                    let val = self.read8(ea);
                    let res = if z == 4 {
                        self.alu_inc(val)
                    } else {
                        self.alu_dec(val)
                    };
                    self.write8(ea, res);
                }
                4 => {
                    let val = self.get_ixreg8(use_iy, y);
                    let res = self.alu_inc(val);
                    self.set_ixreg8(use_iy, y, res);
                }
                5 => {
                    let val = self.get_ixreg8(use_iy, y);
                    let res = self.alu_dec(val);
                    self.set_ixreg8(use_iy, y, res);
                }
                6 if y == 6 => {
                    // LD (IX+d),n - displacement before the immediate
                    let ea = self.fetch_indexed_ea(use_iy);
                    let n = self.fetch_byte();
                    self.write8(ea, n);
                }
                6 => {
                    let n = self.fetch_byte();
                    self.set_ixreg8(use_iy, y, n);
                }
                _ => self.execute_x0(op, y, z, p, q),
            },
            1 => {
                if op == 0x76 {
                    self.halted = true;
                } else if y == 6 {
                    // LD (IX+d),r - source is the unprefixed register
                    let ea = self.fetch_indexed_ea(use_iy);
                    let val = self.get_reg8(z);
                    self.write8(ea, val);
                } else if z == 6 {
                    // LD r,(IX+d)
                    let ea = self.fetch_indexed_ea(use_iy);
                    let val = self.read8(ea);
                    self.set_reg8(y, val);
                } else {
                    let val = self.get_ixreg8(use_iy, z);
                    self.set_ixreg8(use_iy, y, val);
                }
            }
            2 => {
                let val = if z == 6 {
                    let ea = self.fetch_indexed_ea(use_iy);
                    self.read8(ea)
                } else {
                    self.get_ixreg8(use_iy, z)
                };
                self.execute_alu(y, val);
            }
            _ => match op {
                0xE1 => {
                    // POP IX
                    let val = self.pop16();
                    self.set_index(use_iy, val);
                }
                0xE3 => {
                    // EX (SP),IX
                    let lo = self.read8(self.sp);
                    let hi = self.read8(self.sp.wrapping_add(1));
                    let ix = self.index(use_iy);
                    self.write8(self.sp, ix as u8);
                    self.write8(self.sp.wrapping_add(1), (ix >> 8) as u8);
                    let ix = ((hi as u16) << 8) | lo as u16;
                    self.set_index(use_iy, ix);
                    self.wz = ix;
                }
                0xE5 => {
                    // PUSH IX
                    let ix = self.index(use_iy);
                    self.push16(ix);
                }
                0xE9 => self.pc = self.index(use_iy), // JP (IX)
                0xF9 => self.sp = self.index(use_iy), // LD SP,IX
                _ => self.execute_x3(op, y, z, p, q),
            },
        }
    }

    // ========== DD CB / FD CB Page ==========

    fn execute_indexed_cb(&mut self, use_iy: bool) {
        // The displacement comes first; the opcode byte is fetched as an
        // argument and does not increment R.
        let ea = self.fetch_indexed_ea(use_iy);
        let op = self.fetch_byte();
        self.icount -= self.tables.xycb[op as usize] as i32;
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;

        match x {
            0 => {
                let val = self.read8(ea);
                let res = self.execute_rot(y, val);
                self.write8(ea, res);
                // Undocumented: the result also lands in the named register.
                if z != 6 {
                    self.set_reg8(z, res);
                }
            }
            1 => {
                // BIT y,(IX+d): YF/XF from the high byte of the address
                let val = self.read8(ea);
                let masked = val & (1 << y);
                let f = (self.f() & CF)
                    | HF
                    | (flag_tables().sz_bit[masked as usize] & !(YF | XF))
                    | (((ea >> 8) as u8) & (YF | XF));
                self.set_f(f);
            }
            2 => {
                let res = self.read8(ea) & !(1 << y);
                self.write8(ea, res);
                if z != 6 {
                    self.set_reg8(z, res);
                }
            }
            _ => {
                let res = self.read8(ea) | (1 << y);
                self.write8(ea, res);
                if z != 6 {
                    self.set_reg8(z, res);
                }
            }
        }
    }

    // ========== Index Helpers ==========

    #[inline]
    fn index(&self, use_iy: bool) -> u16 {
        if use_iy {
            self.iy
        } else {
            self.ix
        }
    }

    #[inline]
    fn set_index(&mut self, use_iy: bool, val: u16) {
        if use_iy {
            self.iy = val;
        } else {
            self.ix = val;
        }
    }

    /// Fetch the signed displacement and form IX+d, latching it in WZ.
    fn fetch_indexed_ea(&mut self, use_iy: bool) -> u16 {
        let d = self.fetch_byte() as i8;
        let ea = self.index(use_iy).wrapping_add(d as i16 as u16);
        self.wz = ea;
        ea
    }

    /// Register access with the H/L -> IXH/IXL substitution the DD/FD
    /// prefix applies to non-memory operands.
    fn get_ixreg8(&mut self, use_iy: bool, idx: u8) -> u8 {
        match idx {
            4 => (self.index(use_iy) >> 8) as u8,
            5 => self.index(use_iy) as u8,
            _ => self.get_reg8(idx),
        }
    }

    fn set_ixreg8(&mut self, use_iy: bool, idx: u8, val: u8) {
        match idx {
            4 => {
                let ix = (self.index(use_iy) & 0x00FF) | ((val as u16) << 8);
                self.set_index(use_iy, ix);
            }
            5 => {
                let ix = (self.index(use_iy) & 0xFF00) | val as u16;
                self.set_index(use_iy, ix);
            }
            _ => self.set_reg8(idx, val),
        }
    }
}
