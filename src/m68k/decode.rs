//! 68000-family opcode decoding
//!
//! Every 16-bit opcode word decodes once, at core construction, into a
//! tagged [`Op`] value; execution is then a fetch, a table index and a
//! match on the tag. The decoder is pure: addressing-mode extension words
//! are fetched later, by the effective-address machinery.
//!
//! Opcode availability is gated by the CPU variant through the `MASK_*`
//! generation bits, so a 68000 table decodes MOVEC to an illegal
//! instruction while a 68010 table accepts it.
//!
//! # References
//! - M68000 8-/16-/32-Bit Microprocessors User's Manual, Ninth Edition
//! - M68000PM/AD Programmer's Reference Manual

use super::CpuVariant;

/// Operand sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    #[inline]
    pub fn mask(self) -> u32 {
        match self {
            Size::Byte => 0xFF,
            Size::Word => 0xFFFF,
            Size::Long => 0xFFFF_FFFF,
        }
    }

    #[inline]
    pub fn msb(self) -> u32 {
        match self {
            Size::Byte => 0x80,
            Size::Word => 0x8000,
            Size::Long => 0x8000_0000,
        }
    }

    #[inline]
    pub fn bytes(self) -> u32 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }

    /// Sign-extend a value of this size to 32 bits.
    #[inline]
    pub fn sign_extend(self, value: u32) -> u32 {
        match self {
            Size::Byte => value as u8 as i8 as u32,
            Size::Word => value as u16 as i16 as u32,
            Size::Long => value,
        }
    }

    /// Decode the standard 2-bit size field (00=byte 01=word 10=long).
    fn from_bits(bits: u16) -> Option<Size> {
        match bits {
            0 => Some(Size::Byte),
            1 => Some(Size::Word),
            2 => Some(Size::Long),
            _ => None,
        }
    }
}

/// The 14 standard addressing modes, decoded from the mode/register fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EaMode {
    /// Dn
    DataReg(u8),
    /// An
    AddrReg(u8),
    /// (An)
    Indirect(u8),
    /// (An)+
    PostInc(u8),
    /// -(An)
    PreDec(u8),
    /// (d16,An)
    Disp16(u8),
    /// (d8,An,Xn) and the 020+ full extension forms
    Index(u8),
    /// (xxx).W
    AbsShort,
    /// (xxx).L
    AbsLong,
    /// (d16,PC)
    PcDisp,
    /// (d8,PC,Xn) and the 020+ full extension forms
    PcIndex,
    /// #imm
    Immediate,
}

impl EaMode {
    pub fn decode(mode: u16, reg: u16) -> Option<EaMode> {
        let reg8 = reg as u8;
        match mode {
            0 => Some(EaMode::DataReg(reg8)),
            1 => Some(EaMode::AddrReg(reg8)),
            2 => Some(EaMode::Indirect(reg8)),
            3 => Some(EaMode::PostInc(reg8)),
            4 => Some(EaMode::PreDec(reg8)),
            5 => Some(EaMode::Disp16(reg8)),
            6 => Some(EaMode::Index(reg8)),
            7 => match reg {
                0 => Some(EaMode::AbsShort),
                1 => Some(EaMode::AbsLong),
                2 => Some(EaMode::PcDisp),
                3 => Some(EaMode::PcIndex),
                4 => Some(EaMode::Immediate),
                _ => None,
            },
            _ => None,
        }
    }

    /// Data-alterable: a destination that is neither an address register
    /// nor PC-relative nor immediate.
    pub fn is_data_alterable(self) -> bool {
        !matches!(
            self,
            EaMode::AddrReg(_) | EaMode::PcDisp | EaMode::PcIndex | EaMode::Immediate
        )
    }

    /// Memory-alterable: data-alterable and not a data register.
    pub fn is_memory_alterable(self) -> bool {
        self.is_data_alterable() && !matches!(self, EaMode::DataReg(_))
    }

    /// Control addressing (JMP/JSR/LEA/PEA/MOVEM destinations).
    pub fn is_control(self) -> bool {
        matches!(
            self,
            EaMode::Indirect(_)
                | EaMode::Disp16(_)
                | EaMode::Index(_)
                | EaMode::AbsShort
                | EaMode::AbsLong
                | EaMode::PcDisp
                | EaMode::PcIndex
        )
    }

    pub fn is_register(self) -> bool {
        matches!(self, EaMode::DataReg(_) | EaMode::AddrReg(_))
    }
}

/// ALU operation selector shared by the register, immediate and quick
/// forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Eor,
    Cmp,
}

/// Bit-manipulation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitKind {
    Tst,
    Chg,
    Clr,
    Set,
}

/// Bit number source: static (extension word) or dynamic (Dn).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitNum {
    Imm,
    Reg(u8),
}

/// Shift/rotate family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftKind {
    Arith,
    Logical,
    RotateX,
    Rotate,
}

/// Shift count source: immediate 1..8 or modulo-64 from Dn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftCount {
    Imm(u8),
    Reg(u8),
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // ---- 0x0xxx: immediates, bit ops, MOVEP ----
    OriToCcr,
    OriToSr,
    AndiToCcr,
    AndiToSr,
    EoriToCcr,
    EoriToSr,
    /// ORI/ANDI/SUBI/ADDI/EORI/CMPI
    AluImm { kind: AluOp, size: Size, ea: EaMode },
    Bit { kind: BitKind, num: BitNum, ea: EaMode },
    Movep { dreg: u8, areg: u8, size: Size, reg_to_mem: bool },

    // ---- 0x1000-0x3FFF: moves ----
    Move { size: Size, src: EaMode, dst: EaMode },
    Movea { size: Size, areg: u8, src: EaMode },

    // ---- 0x4xxx: miscellaneous ----
    MoveFromSr { ea: EaMode },
    MoveFromCcr { ea: EaMode },
    MoveToCcr { ea: EaMode },
    MoveToSr { ea: EaMode },
    Negx { size: Size, ea: EaMode },
    Clr { size: Size, ea: EaMode },
    Neg { size: Size, ea: EaMode },
    Not { size: Size, ea: EaMode },
    /// EXT.W Dn / EXT.L Dn
    Ext { to: Size, reg: u8 },
    /// EXTB.L Dn (020+)
    ExtbL { reg: u8 },
    Nbcd { ea: EaMode },
    Swap { reg: u8 },
    Bkpt { num: u8 },
    Pea { ea: EaMode },
    Illegal,
    Tas { ea: EaMode },
    Tst { size: Size, ea: EaMode },
    Trap { vector: u8 },
    Link { reg: u8 },
    Unlk { reg: u8 },
    MoveUsp { reg: u8, to_usp: bool },
    Reset,
    Nop,
    Stop,
    Rte,
    /// RTD #d (010+)
    Rtd,
    Rts,
    Trapv,
    Rtr,
    /// MOVEC (010+); direction is control-register-to-general or back
    Movec { to_creg: bool },
    Jsr { ea: EaMode },
    Jmp { ea: EaMode },
    Movem { size: Size, reg_to_mem: bool, ea: EaMode },
    Lea { areg: u8, ea: EaMode },
    Chk { dreg: u8, ea: EaMode },

    // ---- 0x5xxx ----
    Addq { size: Size, data: u8, ea: EaMode },
    Subq { size: Size, data: u8, ea: EaMode },
    Scc { cond: u8, ea: EaMode },
    Dbcc { cond: u8, reg: u8 },

    // ---- 0x6xxx ----
    /// disp 0 means a 16-bit displacement word follows; -1 (020+) a long
    Bra { disp: i8 },
    Bsr { disp: i8 },
    Bcc { cond: u8, disp: i8 },

    // ---- 0x7xxx ----
    Moveq { reg: u8, data: i8 },

    // ---- 0x8xxx-0xDxxx: integer ALU ----
    /// ADD/SUB/AND/OR/EOR/CMP with a data register on one side
    Alu { kind: AluOp, size: Size, dreg: u8, to_ea: bool, ea: EaMode },
    /// ADDA/SUBA/CMPA
    AluA { kind: AluOp, size: Size, areg: u8, ea: EaMode },
    Addx { size: Size, rx: u8, ry: u8, mem: bool },
    Subx { size: Size, rx: u8, ry: u8, mem: bool },
    Cmpm { size: Size, ax: u8, ay: u8 },
    Abcd { rx: u8, ry: u8, mem: bool },
    Sbcd { rx: u8, ry: u8, mem: bool },
    Mulu { dreg: u8, ea: EaMode },
    Muls { dreg: u8, ea: EaMode },
    Divu { dreg: u8, ea: EaMode },
    Divs { dreg: u8, ea: EaMode },
    /// MULU.L/MULS.L (020+), operands in the extension word
    MulL { ea: EaMode },
    /// DIVU.L/DIVS.L (020+), operands in the extension word
    DivL { ea: EaMode },
    Exg { mode: u8, rx: u8, ry: u8 },

    // ---- 0xExxx: shifts and rotates ----
    ShiftReg { kind: ShiftKind, left: bool, size: Size, count: ShiftCount, reg: u8 },
    ShiftMem { kind: ShiftKind, left: bool, ea: EaMode },

    // ---- unassigned lines ----
    LineA,
    LineF,
    /// Recognised 020+ encoding the core does not emulate (bitfields,
    /// CAS/CAS2, cpSpace): logged, then delivered as illegal.
    Unimplemented,
}

/// Generation gates, combined per variant.
pub const MASK_ALL: u32 = 0x01;
pub const MASK_24BIT_SPACE: u32 = 0x02;
pub const MASK_32BIT_SPACE: u32 = 0x04;
pub const MASK_010_OR_LATER: u32 = 0x08;
pub const MASK_020_OR_LATER: u32 = 0x10;
pub const MASK_030_OR_LATER: u32 = 0x20;
pub const MASK_040_OR_LATER: u32 = 0x40;

impl CpuVariant {
    /// The generation bits this variant satisfies.
    pub fn mask(self) -> u32 {
        let space = if self.address_mask() == 0x00FF_FFFF {
            MASK_24BIT_SPACE
        } else {
            MASK_32BIT_SPACE
        };
        MASK_ALL
            | space
            | match self {
                CpuVariant::M68000 => 0,
                CpuVariant::M68010 | CpuVariant::ColdFire | CpuVariant::Cpu32 => {
                    MASK_010_OR_LATER
                }
                CpuVariant::M68Ec020 | CpuVariant::M68020 => {
                    MASK_010_OR_LATER | MASK_020_OR_LATER
                }
                CpuVariant::M68Ec030 | CpuVariant::M68030 => {
                    MASK_010_OR_LATER | MASK_020_OR_LATER | MASK_030_OR_LATER
                }
                CpuVariant::M68Ec040 | CpuVariant::M68040 => {
                    MASK_010_OR_LATER
                        | MASK_020_OR_LATER
                        | MASK_030_OR_LATER
                        | MASK_040_OR_LATER
                }
            }
    }

    #[inline]
    fn has(self, gate: u32) -> bool {
        self.mask() & gate != 0
    }
}

/// Decode one opcode word for the given variant.
pub fn decode(opcode: u16, variant: CpuVariant) -> Op {
    let line = opcode >> 12;
    match line {
        0x0 => decode_line_0(opcode, variant),
        0x1 => decode_move(opcode, Size::Byte),
        0x2 => decode_move(opcode, Size::Long),
        0x3 => decode_move(opcode, Size::Word),
        0x4 => decode_line_4(opcode, variant),
        0x5 => decode_line_5(opcode),
        0x6 => decode_line_6(opcode, variant),
        0x7 => {
            if opcode & 0x0100 == 0 {
                Op::Moveq {
                    reg: ((opcode >> 9) & 7) as u8,
                    data: opcode as i8,
                }
            } else {
                Op::Illegal
            }
        }
        0x8 => decode_or_div_sbcd(opcode),
        0x9 => decode_addsub(opcode, AluOp::Sub),
        0xA => Op::LineA,
        0xB => decode_cmp_eor(opcode),
        0xC => decode_and_mul_abcd(opcode),
        0xD => decode_addsub(opcode, AluOp::Add),
        0xE => decode_shifts(opcode),
        _ => Op::LineF,
    }
}

fn ea_of(opcode: u16) -> Option<EaMode> {
    EaMode::decode((opcode >> 3) & 7, opcode & 7)
}

fn decode_line_0(opcode: u16, variant: CpuVariant) -> Op {
    // MOVEP hides inside the bit-dynamic encodings: mode field 001.
    if opcode & 0x0138 == 0x0108 {
        let size = if opcode & 0x0040 == 0 {
            Size::Word
        } else {
            Size::Long
        };
        return Op::Movep {
            dreg: ((opcode >> 9) & 7) as u8,
            areg: (opcode & 7) as u8,
            size,
            reg_to_mem: opcode & 0x0080 != 0,
        };
    }

    // Dynamic bit ops: BTST/BCHG/BCLR/BSET with the bit number in Dn.
    if opcode & 0x0100 != 0 {
        let kind = match (opcode >> 6) & 3 {
            0 => BitKind::Tst,
            1 => BitKind::Chg,
            2 => BitKind::Clr,
            _ => BitKind::Set,
        };
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        let valid = match kind {
            // BTST allows everything but An (and immediate reads).
            BitKind::Tst => !matches!(ea, EaMode::AddrReg(_)),
            _ => ea.is_data_alterable() && ea != EaMode::Immediate,
        };
        if !valid {
            return Op::Illegal;
        }
        return Op::Bit {
            kind,
            num: BitNum::Reg(((opcode >> 9) & 7) as u8),
            ea,
        };
    }

    // Static bit ops share the 0x0800 block.
    if opcode & 0x0F00 == 0x0800 {
        let kind = match (opcode >> 6) & 3 {
            0 => BitKind::Tst,
            1 => BitKind::Chg,
            2 => BitKind::Clr,
            _ => BitKind::Set,
        };
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        let valid = match kind {
            BitKind::Tst => !matches!(ea, EaMode::AddrReg(_) | EaMode::Immediate),
            _ => ea.is_data_alterable() && ea != EaMode::Immediate,
        };
        if !valid {
            return Op::Illegal;
        }
        return Op::Bit {
            kind,
            num: BitNum::Imm,
            ea,
        };
    }

    // Immediate group. The CCR/SR forms sit where the EA field would say
    // "immediate to immediate".
    let kind = match (opcode >> 9) & 7 {
        0 => AluOp::Or,
        1 => AluOp::And,
        2 => AluOp::Sub,
        3 => AluOp::Add,
        5 => AluOp::Eor,
        6 => AluOp::Cmp,
        _ => return Op::Illegal,
    };
    let Some(size) = Size::from_bits((opcode >> 6) & 3) else {
        return Op::Illegal;
    };
    let Some(ea) = ea_of(opcode) else {
        return Op::Illegal;
    };

    if ea == EaMode::Immediate {
        return match (kind, size) {
            (AluOp::Or, Size::Byte) => Op::OriToCcr,
            (AluOp::Or, Size::Word) => Op::OriToSr,
            (AluOp::And, Size::Byte) => Op::AndiToCcr,
            (AluOp::And, Size::Word) => Op::AndiToSr,
            (AluOp::Eor, Size::Byte) => Op::EoriToCcr,
            (AluOp::Eor, Size::Word) => Op::EoriToSr,
            _ => Op::Illegal,
        };
    }

    let valid = match kind {
        // CMPI gains PC-relative modes on 020+.
        AluOp::Cmp => {
            ea.is_data_alterable()
                || (variant.has(MASK_020_OR_LATER)
                    && matches!(ea, EaMode::PcDisp | EaMode::PcIndex))
        }
        _ => ea.is_data_alterable(),
    };
    if !valid {
        return Op::Illegal;
    }
    Op::AluImm { kind, size, ea }
}

fn decode_move(opcode: u16, size: Size) -> Op {
    let Some(src) = ea_of(opcode) else {
        return Op::Illegal;
    };
    let Some(dst) = EaMode::decode((opcode >> 6) & 7, (opcode >> 9) & 7) else {
        return Op::Illegal;
    };
    if size == Size::Byte && matches!(src, EaMode::AddrReg(_)) {
        return Op::Illegal;
    }
    if let EaMode::AddrReg(areg) = dst {
        if size == Size::Byte {
            return Op::Illegal;
        }
        return Op::Movea { size, areg, src };
    }
    if !dst.is_data_alterable() {
        return Op::Illegal;
    }
    Op::Move { size, src, dst }
}

fn decode_line_4(opcode: u16, variant: CpuVariant) -> Op {
    // EXT/EXTB first: EXTB.L shares its bit pattern with an invalid LEA.
    match opcode & 0x0FF8 {
        0x0880 => {
            return Op::Ext {
                to: Size::Word,
                reg: (opcode & 7) as u8,
            }
        }
        0x08C0 => {
            return Op::Ext {
                to: Size::Long,
                reg: (opcode & 7) as u8,
            }
        }
        0x09C0 => {
            return if variant.has(MASK_020_OR_LATER) {
                Op::ExtbL {
                    reg: (opcode & 7) as u8,
                }
            } else {
                Op::Illegal
            };
        }
        _ => {}
    }

    // LEA and CHK carve out the register-field encodings next.
    match opcode & 0x01C0 {
        0x01C0 => {
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if !ea.is_control() {
                return Op::Illegal;
            }
            return Op::Lea {
                areg: ((opcode >> 9) & 7) as u8,
                ea,
            };
        }
        0x0180 => {
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if matches!(ea, EaMode::AddrReg(_)) {
                return Op::Illegal;
            }
            return Op::Chk {
                dreg: ((opcode >> 9) & 7) as u8,
                ea,
            };
        }
        _ => {}
    }

    match opcode & 0x0FC0 {
        0x00C0 => {
            // MOVE from SR
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if !ea.is_data_alterable() || ea == EaMode::Immediate {
                return Op::Illegal;
            }
            return Op::MoveFromSr { ea };
        }
        0x02C0 => {
            // MOVE from CCR (010+)
            if !variant.has(MASK_010_OR_LATER) {
                return Op::Illegal;
            }
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if !ea.is_data_alterable() || ea == EaMode::Immediate {
                return Op::Illegal;
            }
            return Op::MoveFromCcr { ea };
        }
        0x04C0 => {
            // MOVE to CCR
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if matches!(ea, EaMode::AddrReg(_)) {
                return Op::Illegal;
            }
            return Op::MoveToCcr { ea };
        }
        0x06C0 => {
            // MOVE to SR
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if matches!(ea, EaMode::AddrReg(_)) {
                return Op::Illegal;
            }
            return Op::MoveToSr { ea };
        }
        0x0800 => {
            // NBCD, and LINK.L on 020+ (An encoding)
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if !ea.is_data_alterable() || ea == EaMode::Immediate {
                return Op::Illegal;
            }
            return Op::Nbcd { ea };
        }
        0x0840 => {
            // SWAP Dn, BKPT #n (010+), PEA <ea>
            return match (opcode >> 3) & 7 {
                0 => Op::Swap {
                    reg: (opcode & 7) as u8,
                },
                1 => {
                    if variant.has(MASK_010_OR_LATER) {
                        Op::Bkpt {
                            num: (opcode & 7) as u8,
                        }
                    } else {
                        Op::Illegal
                    }
                }
                _ => {
                    let Some(ea) = ea_of(opcode) else {
                        return Op::Illegal;
                    };
                    if !ea.is_control() {
                        return Op::Illegal;
                    }
                    Op::Pea { ea }
                }
            };
        }
        0x0AC0 => {
            // TAS, and the ILLEGAL encoding 0x4AFC
            if opcode == 0x4AFC {
                return Op::Illegal;
            }
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if !ea.is_data_alterable() || ea == EaMode::Immediate {
                return Op::Illegal;
            }
            return Op::Tas { ea };
        }
        _ => {}
    }

    // NEGX/CLR/NEG/NOT blocks
    if opcode & 0x0900 == 0x0000 && opcode & 0x00C0 != 0x00C0 {
        let Some(size) = Size::from_bits((opcode >> 6) & 3) else {
            return Op::Illegal;
        };
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        if !ea.is_data_alterable() || ea == EaMode::Immediate {
            return Op::Illegal;
        }
        return match (opcode >> 9) & 7 {
            0 => Op::Negx { size, ea },
            1 => Op::Clr { size, ea },
            2 => Op::Neg { size, ea },
            3 => Op::Not { size, ea },
            _ => Op::Illegal,
        };
    }

    match opcode & 0x0FF8 {
        0x0E50 => {
            return Op::Link {
                reg: (opcode & 7) as u8,
            }
        }
        0x0E58 => {
            return Op::Unlk {
                reg: (opcode & 7) as u8,
            }
        }
        0x0E60 => {
            return Op::MoveUsp {
                reg: (opcode & 7) as u8,
                to_usp: true,
            }
        }
        0x0E68 => {
            return Op::MoveUsp {
                reg: (opcode & 7) as u8,
                to_usp: false,
            }
        }
        _ => {}
    }

    if opcode & 0x0FF0 == 0x0E40 {
        return Op::Trap {
            vector: (opcode & 0x0F) as u8,
        };
    }

    match opcode {
        0x4E70 => return Op::Reset,
        0x4E71 => return Op::Nop,
        0x4E72 => return Op::Stop,
        0x4E73 => return Op::Rte,
        0x4E74 => {
            return if variant.has(MASK_010_OR_LATER) {
                Op::Rtd
            } else {
                Op::Illegal
            }
        }
        0x4E75 => return Op::Rts,
        0x4E76 => return Op::Trapv,
        0x4E77 => return Op::Rtr,
        0x4E7A => {
            return if variant.has(MASK_010_OR_LATER) {
                Op::Movec { to_creg: false }
            } else {
                Op::Illegal
            }
        }
        0x4E7B => {
            return if variant.has(MASK_010_OR_LATER) {
                Op::Movec { to_creg: true }
            } else {
                Op::Illegal
            }
        }
        _ => {}
    }

    // JSR/JMP
    if opcode & 0x0FC0 == 0x0E80 {
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        if !ea.is_control() {
            return Op::Illegal;
        }
        return Op::Jsr { ea };
    }
    if opcode & 0x0FC0 == 0x0EC0 {
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        if !ea.is_control() {
            return Op::Illegal;
        }
        return Op::Jmp { ea };
    }

    // MOVEM: 0x4880/0x48C0 registers to memory, 0x4C80/0x4CC0 back
    if opcode & 0x0F80 == 0x0880 && opcode & 0x0038 != 0 {
        let size = if opcode & 0x0040 == 0 {
            Size::Word
        } else {
            Size::Long
        };
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        let ok = ea.is_control() && !matches!(ea, EaMode::PcDisp | EaMode::PcIndex)
            || matches!(ea, EaMode::PreDec(_));
        if !ok {
            return Op::Illegal;
        }
        return Op::Movem {
            size,
            reg_to_mem: true,
            ea,
        };
    }
    if opcode & 0x0F80 == 0x0C80 && opcode & 0x0038 != 0 {
        let size = if opcode & 0x0040 == 0 {
            Size::Word
        } else {
            Size::Long
        };
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        let ok = ea.is_control() || matches!(ea, EaMode::PostInc(_));
        if !ok {
            return Op::Illegal;
        }
        return Op::Movem {
            size,
            reg_to_mem: false,
            ea,
        };
    }

    // TST (data-alterable on the 68000; any EA on 020+)
    if opcode & 0x0F00 == 0x0A00 {
        let Some(size) = Size::from_bits((opcode >> 6) & 3) else {
            return Op::Illegal;
        };
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        let ok = ea.is_data_alterable()
            || variant.has(MASK_020_OR_LATER)
                && matches!(
                    ea,
                    EaMode::AddrReg(_) | EaMode::PcDisp | EaMode::PcIndex | EaMode::Immediate
                );
        if !ok || (size == Size::Byte && matches!(ea, EaMode::AddrReg(_))) {
            return Op::Illegal;
        }
        return Op::Tst { size, ea };
    }

    // MULU.L/MULS.L and DIVU.L/DIVS.L (020+)
    if opcode & 0x0FC0 == 0x0C00 || opcode & 0x0FC0 == 0x0C40 {
        if !variant.has(MASK_020_OR_LATER) {
            return Op::Illegal;
        }
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        if matches!(ea, EaMode::AddrReg(_)) {
            return Op::Illegal;
        }
        return if opcode & 0x0040 == 0 {
            Op::MulL { ea }
        } else {
            Op::DivL { ea }
        };
    }

    Op::Illegal
}

fn decode_line_5(opcode: u16) -> Op {
    match Size::from_bits((opcode >> 6) & 3) {
        Some(size) => {
            // ADDQ/SUBQ
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if !ea.is_data_alterable() && !matches!(ea, EaMode::AddrReg(_)) {
                return Op::Illegal;
            }
            if ea == EaMode::Immediate
                || size == Size::Byte && matches!(ea, EaMode::AddrReg(_))
            {
                return Op::Illegal;
            }
            let data = match (opcode >> 9) & 7 {
                0 => 8,
                n => n as u8,
            };
            if opcode & 0x0100 == 0 {
                Op::Addq { size, data, ea }
            } else {
                Op::Subq { size, data, ea }
            }
        }
        None => {
            // Scc/DBcc
            let cond = ((opcode >> 8) & 0x0F) as u8;
            if opcode & 0x0038 == 0x0008 {
                return Op::Dbcc {
                    cond,
                    reg: (opcode & 7) as u8,
                };
            }
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if !ea.is_data_alterable() || ea == EaMode::Immediate {
                return Op::Illegal;
            }
            Op::Scc { cond, ea }
        }
    }
}

fn decode_line_6(opcode: u16, variant: CpuVariant) -> Op {
    let disp = opcode as i8;
    // 0xFF selects a 32-bit displacement word pair on 020+ only.
    if disp == -1 && !variant.has(MASK_020_OR_LATER) {
        return Op::Illegal;
    }
    match (opcode >> 8) & 0x0F {
        0 => Op::Bra { disp },
        1 => Op::Bsr { disp },
        cond => Op::Bcc {
            cond: cond as u8,
            disp,
        },
    }
}

fn decode_or_div_sbcd(opcode: u16) -> Op {
    let reg = ((opcode >> 9) & 7) as u8;
    match (opcode >> 6) & 7 {
        3 => {
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if matches!(ea, EaMode::AddrReg(_)) {
                return Op::Illegal;
            }
            return Op::Divu { dreg: reg, ea };
        }
        7 => {
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if matches!(ea, EaMode::AddrReg(_)) {
                return Op::Illegal;
            }
            return Op::Divs { dreg: reg, ea };
        }
        _ => {}
    }
    if opcode & 0x01F0 == 0x0100 {
        return Op::Sbcd {
            rx: reg,
            ry: (opcode & 7) as u8,
            mem: opcode & 0x0008 != 0,
        };
    }
    decode_dn_alu(opcode, AluOp::Or)
}

fn decode_and_mul_abcd(opcode: u16) -> Op {
    let reg = ((opcode >> 9) & 7) as u8;
    match (opcode >> 6) & 7 {
        3 => {
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if matches!(ea, EaMode::AddrReg(_)) {
                return Op::Illegal;
            }
            return Op::Mulu { dreg: reg, ea };
        }
        7 => {
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if matches!(ea, EaMode::AddrReg(_)) {
                return Op::Illegal;
            }
            return Op::Muls { dreg: reg, ea };
        }
        _ => {}
    }
    if opcode & 0x01F0 == 0x0100 {
        return Op::Abcd {
            rx: reg,
            ry: (opcode & 7) as u8,
            mem: opcode & 0x0008 != 0,
        };
    }
    // EXG occupies three register-to-register holes in the AND map.
    if opcode & 0x01F8 == 0x0140
        || opcode & 0x01F8 == 0x0148
        || opcode & 0x01F8 == 0x0188
    {
        return Op::Exg {
            mode: ((opcode >> 3) & 0x1F) as u8,
            rx: reg,
            ry: (opcode & 7) as u8,
        };
    }
    decode_dn_alu(opcode, AluOp::And)
}

fn decode_cmp_eor(opcode: u16) -> Op {
    let reg = ((opcode >> 9) & 7) as u8;
    let opmode = (opcode >> 6) & 7;
    match opmode {
        3 | 7 => {
            // CMPA
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            return Op::AluA {
                kind: AluOp::Cmp,
                size: if opmode == 3 { Size::Word } else { Size::Long },
                areg: reg,
                ea,
            };
        }
        0..=2 => {
            // CMP
            let size = Size::from_bits(opmode).unwrap();
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if size == Size::Byte && matches!(ea, EaMode::AddrReg(_)) {
                return Op::Illegal;
            }
            return Op::Alu {
                kind: AluOp::Cmp,
                size,
                dreg: reg,
                to_ea: false,
                ea,
            };
        }
        _ => {}
    }
    // CMPM or EOR
    if opcode & 0x0038 == 0x0008 {
        let Some(size) = Size::from_bits((opcode >> 6) & 3) else {
            return Op::Illegal;
        };
        return Op::Cmpm {
            size,
            ax: reg,
            ay: (opcode & 7) as u8,
        };
    }
    let Some(size) = Size::from_bits((opcode >> 6) & 3) else {
        return Op::Illegal;
    };
    let Some(ea) = ea_of(opcode) else {
        return Op::Illegal;
    };
    if !ea.is_data_alterable() || ea == EaMode::Immediate {
        return Op::Illegal;
    }
    Op::Alu {
        kind: AluOp::Eor,
        size,
        dreg: reg,
        to_ea: true,
        ea,
    }
}

fn decode_addsub(opcode: u16, kind: AluOp) -> Op {
    let reg = ((opcode >> 9) & 7) as u8;
    let opmode = (opcode >> 6) & 7;
    if opmode == 3 || opmode == 7 {
        // ADDA/SUBA
        let Some(ea) = ea_of(opcode) else {
            return Op::Illegal;
        };
        return Op::AluA {
            kind,
            size: if opmode == 3 { Size::Word } else { Size::Long },
            areg: reg,
            ea,
        };
    }
    // ADDX/SUBX hide in the to-EA register encodings.
    if opcode & 0x0130 == 0x0100 {
        let Some(size) = Size::from_bits((opcode >> 6) & 3) else {
            return Op::Illegal;
        };
        let mem = opcode & 0x0008 != 0;
        return match kind {
            AluOp::Add => Op::Addx {
                size,
                rx: reg,
                ry: (opcode & 7) as u8,
                mem,
            },
            _ => Op::Subx {
                size,
                rx: reg,
                ry: (opcode & 7) as u8,
                mem,
            },
        };
    }
    decode_dn_alu(opcode, kind)
}

/// The shared Dn-on-one-side ALU shape: opmode bit 2 selects direction.
fn decode_dn_alu(opcode: u16, kind: AluOp) -> Op {
    let Some(size) = Size::from_bits((opcode >> 6) & 3) else {
        return Op::Illegal;
    };
    let to_ea = opcode & 0x0100 != 0;
    let Some(ea) = ea_of(opcode) else {
        return Op::Illegal;
    };
    if to_ea {
        if !ea.is_memory_alterable() {
            return Op::Illegal;
        }
    } else {
        // An as a source is word/long only, and never for AND/OR.
        if matches!(ea, EaMode::AddrReg(_))
            && (size == Size::Byte || matches!(kind, AluOp::And | AluOp::Or))
        {
            return Op::Illegal;
        }
    }
    Op::Alu {
        kind,
        size,
        dreg: ((opcode >> 9) & 7) as u8,
        to_ea,
        ea,
    }
}

fn decode_shifts(opcode: u16) -> Op {
    let left = opcode & 0x0100 != 0;
    match Size::from_bits((opcode >> 6) & 3) {
        Some(size) => {
            let kind = match (opcode >> 3) & 3 {
                0 => ShiftKind::Arith,
                1 => ShiftKind::Logical,
                2 => ShiftKind::RotateX,
                _ => ShiftKind::Rotate,
            };
            let field = ((opcode >> 9) & 7) as u8;
            let count = if opcode & 0x0020 == 0 {
                ShiftCount::Imm(if field == 0 { 8 } else { field })
            } else {
                ShiftCount::Reg(field)
            };
            Op::ShiftReg {
                kind,
                left,
                size,
                count,
                reg: (opcode & 7) as u8,
            }
        }
        None => {
            // Memory shifts, always word-sized, count of one. The 0xE8C0+
            // block is the 020+ bitfield space.
            if opcode & 0x0800 != 0 {
                return Op::Unimplemented;
            }
            let kind = match (opcode >> 9) & 3 {
                0 => ShiftKind::Arith,
                1 => ShiftKind::Logical,
                2 => ShiftKind::RotateX,
                _ => ShiftKind::Rotate,
            };
            let Some(ea) = ea_of(opcode) else {
                return Op::Illegal;
            };
            if !ea.is_memory_alterable() {
                return Op::Illegal;
            }
            Op::ShiftMem { kind, left, ea }
        }
    }
}
