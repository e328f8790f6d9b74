//! Z80 interpreter
//!
//! The Z80 runs as the sound CPU of the Genesis, behind the 68000 on the
//! other side of a bus-request handshake. The interpreter executes against
//! an externally supplied deadline: `run_to(target_cycle)` converts the
//! host-cycle budget into T-states, drains them one instruction at a time,
//! and converts back on exit. Interrupts arrive as pulse windows in host
//! cycles, scheduled by the caller.
//!
//! # Module Organization
//!
//! - `flags`: flag bit constants for the F register
//! - `tables`: per-instance T-state tables and process-global flag tables
//! - `helpers`: register access, fetch, push/pop, table-driven ALU
//! - `execute`: the main/CB/ED/DD/FD/DDCB dispatch
//!
//! # References
//! - Zilog Z80 CPU User Manual (UM0080)
//! - The undocumented Z80 documented (Sean Young)

use crate::memmap::{MemoryMap, SharedDevice};

pub mod flags;
pub mod tables;

mod execute;
mod helpers;

#[cfg(test)]
mod tests;

use tables::CycleTables;

/// Sentinel timestamp meaning "not scheduled".
pub const CYCLE_NEVER: u32 = u32::MAX;

/// Interrupt modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptMode {
    /// Mode 0: execute the instruction found on the data bus
    #[default]
    Mode0,
    /// Mode 1: call to 0x0038
    Mode1,
    /// Mode 2: vectored interrupts using the I register
    Mode2,
}

/// An IRQ sampling window in host cycles: the line is held during
/// `[start, end)` and sampled once per instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntPulse {
    pub start: u32,
    pub end: u32,
}

impl IntPulse {
    /// A window that never fires.
    pub const NEVER: IntPulse = IntPulse {
        start: CYCLE_NEVER,
        end: CYCLE_NEVER,
    };
}

/// Host callback producing the next IRQ pulse window once the current one
/// has expired.
pub type IntPulseFn = Box<dyn FnMut() -> IntPulse>;

/// Construction options.
pub struct Z80Options {
    /// Host cycles per T-state. The Genesis Z80 runs at MCLK/15.
    pub clock_divider: u32,
}

impl Default for Z80Options {
    fn default() -> Self {
        Self { clock_divider: 15 }
    }
}

/// Z80 CPU state
pub struct Z80 {
    // Register pairs; the 8-bit halves are exposed through accessors in
    // `helpers` (A and F are the halves of `af`, and so on).
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    /// IX index register
    pub ix: u16,
    /// IY index register
    pub iy: u16,
    /// Internal address latch (MEMPTR); observable through BIT n,(HL).
    pub wz: u16,

    // Alternate set (EX AF,AF' and EXX)
    pub af2: u16,
    pub bc2: u16,
    pub de2: u16,
    pub hl2: u16,

    pub sp: u16,
    pub pc: u16,
    /// PC at the start of the instruction currently executing.
    pub ppc: u16,

    /// Interrupt vector base
    pub i: u8,
    /// Refresh counter, low 7 bits incremented per opcode fetch
    pub r: u8,
    /// Bit 7 of R as last written by LD R,A
    pub r2: u8,

    pub im: InterruptMode,
    pub iff1: bool,
    pub iff2: bool,
    /// CPU is halted; each idle slice costs one NOP until an interrupt
    pub halted: bool,
    /// EI shadow: interrupts stay blocked for one more instruction
    after_ei: bool,
    /// Set by LD A,I / LD A,R; an interrupt accepted now clears PF
    /// (NMOS parity quirk, compile-time gated)
    #[cfg_attr(not(feature = "nmos-quirks"), allow(dead_code))]
    after_ldair: bool,

    // Cycle bookkeeping
    /// T-states remaining in the current `run_to` slice
    icount: i32,
    /// Position on the host clock
    pub current_cycle: u32,
    pub target_cycle: u32,
    clock_divider: u32,

    /// IRQ pulse window, host cycles
    int_pulse_start: u32,
    int_pulse_end: u32,
    /// NMI latch timestamp, CYCLE_NEVER when clear
    nmi_start: u32,

    /// Data-bus byte latched during an IM 2 acknowledge cycle
    pub im2_vector: u8,
    /// Data-bus contents during an IM 0 acknowledge: `(opcode << 16) |
    /// operand`, so a device can present CALL nn / JP nn / RST n
    pub im0_vector: u32,

    // Bus-request handshake with the 68000
    busreq: bool,
    busack: bool,
    reset: bool,

    /// T-state tables, swappable for measured clone timings
    pub tables: CycleTables,
    /// The 64 KiB sound-CPU address space
    pub map: MemoryMap,
    /// I/O space handler (IN/OUT); the Genesis leaves this open bus
    pub io: Option<SharedDevice>,
    /// Host callback refreshing the IRQ pulse window
    pub next_int_pulse: Option<IntPulseFn>,
}

impl Z80 {
    pub fn new(options: Z80Options, map: MemoryMap) -> Self {
        Self {
            af: 0,
            bc: 0,
            de: 0,
            hl: 0,
            ix: 0,
            iy: 0,
            wz: 0,
            af2: 0,
            bc2: 0,
            de2: 0,
            hl2: 0,
            sp: 0,
            pc: 0,
            ppc: 0,
            i: 0,
            r: 0,
            r2: 0,
            im: InterruptMode::Mode0,
            iff1: false,
            iff2: false,
            halted: false,
            after_ei: false,
            after_ldair: false,
            icount: 0,
            current_cycle: 0,
            target_cycle: 0,
            clock_divider: options.clock_divider.max(1),
            int_pulse_start: 0,
            int_pulse_end: 0,
            nmi_start: CYCLE_NEVER,
            im2_vector: 0xFF,
            im0_vector: 0xFF,
            busreq: false,
            busack: false,
            reset: false,
            tables: CycleTables::default(),
            map,
            io: None,
            next_int_pulse: None,
        }
    }

    /// Hard reset: PC, I and R cleared, interrupts disabled.
    pub fn reset(&mut self) {
        self.pc = 0;
        self.sp = 0;
        self.i = 0;
        self.r = 0;
        self.r2 = 0;
        self.im = InterruptMode::Mode0;
        self.iff1 = false;
        self.iff2 = false;
        self.halted = false;
        self.after_ei = false;
        self.after_ldair = false;
        self.wz = 0;
        self.nmi_start = CYCLE_NEVER;
    }

    // ========== Run Loop ==========

    /// Advance until `current_cycle >= target_cycle`, or fast-forward if
    /// the bus has been handed over or the reset line is held.
    pub fn run_to(&mut self, target_cycle: u32) {
        self.target_cycle = target_cycle;
        if self.current_cycle >= target_cycle {
            return;
        }

        // Reset held or bus granted to the 68000: time passes, nothing runs.
        if self.reset || self.busreq {
            self.busack = self.busreq;
            self.current_cycle = target_cycle;
            return;
        }
        self.busack = false;

        let divider = self.clock_divider;
        self.icount =
            ((target_cycle - self.current_cycle).div_ceil(divider)) as i32;

        while self.icount > 0 {
            let now = self.now(target_cycle);

            // The previous pulse window expired; ask the host for the next.
            if self.int_pulse_end != CYCLE_NEVER && now >= self.int_pulse_end as i64 {
                self.refresh_int_pulse();
            }

            if self.nmi_start != CYCLE_NEVER && now >= self.nmi_start as i64 {
                self.take_nmi();
                continue;
            }

            let irq_blocked = self.after_ei;
            self.after_ei = false;
            if self.iff1
                && !irq_blocked
                && now >= self.int_pulse_start as i64
                && now < self.int_pulse_end as i64
            {
                self.take_interrupt();
                continue;
            }

            self.step();
        }

        // icount may be negative here: the instruction in flight at the
        // deadline always completes, and the overshoot carries forward.
        self.current_cycle =
            (target_cycle as i64 - self.icount as i64 * divider as i64) as u32;
    }

    /// Host-cycle position implied by the remaining T-state budget.
    #[inline]
    fn now(&self, target_cycle: u32) -> i64 {
        target_cycle as i64 - self.icount as i64 * self.clock_divider as i64
    }

    fn refresh_int_pulse(&mut self) {
        let pulse = match &mut self.next_int_pulse {
            Some(f) => f(),
            None => IntPulse::NEVER,
        };
        self.int_pulse_start = pulse.start;
        self.int_pulse_end = pulse.end;
    }

    /// Execute one instruction (or burn one idle slice while halted).
    fn step(&mut self) {
        if self.halted {
            self.icount -= self.tables.op[0x00] as i32;
            return;
        }
        self.ppc = self.pc;
        let op = self.fetch_opcode();
        self.icount -= self.tables.op[op as usize] as i32;
        self.execute_main(op);
    }

    // ========== Interrupt Delivery ==========

    fn interrupt_entry(&mut self) {
        #[cfg(feature = "nmos-quirks")]
        if self.after_ldair {
            self.set_f(self.f() & !flags::PF);
        }
        self.after_ldair = false;
        self.halted = false;
        self.iff1 = false;
        self.iff2 = false;
        // Nothing should look at PPC across an interrupt edge.
        self.ppc = 0xFFFF;
    }

    fn take_interrupt(&mut self) {
        self.interrupt_entry();
        match self.im {
            InterruptMode::Mode0 => {
                // Inspect the bus byte: CALL and JP are honoured inline,
                // anything else is treated as an RST.
                let op = (self.im0_vector >> 16) as u8;
                let vector = self.im0_vector;
                match op {
                    0xCD => {
                        let pc = self.pc;
                        self.push16(pc);
                        self.pc = vector as u16;
                        self.icount -= (self.tables.op[0xCD] + self.tables.ex[0xFF]) as i32;
                    }
                    0xC3 => {
                        self.pc = vector as u16;
                        self.icount -= (self.tables.op[0xC3] + self.tables.ex[0xFF]) as i32;
                    }
                    _ => {
                        let rst = (vector & 0xFF) as u8;
                        let pc = self.pc;
                        self.push16(pc);
                        self.pc = (rst & 0x38) as u16;
                        self.icount -=
                            (self.tables.op[rst as usize] + self.tables.ex[rst as usize]) as i32;
                    }
                }
            }
            InterruptMode::Mode1 => {
                let pc = self.pc;
                self.push16(pc);
                self.pc = 0x0038;
                self.icount -= (self.tables.op[0xFF] + self.tables.ex[0xFF]) as i32;
            }
            InterruptMode::Mode2 => {
                let addr = (self.i as u16) << 8 | self.im2_vector as u16;
                let pc = self.pc;
                self.push16(pc);
                self.pc = self.read16(addr);
                self.icount -= (self.tables.op[0xCD] + self.tables.ex[0xFF]) as i32;
            }
        }
        self.wz = self.pc;
    }

    fn take_nmi(&mut self) {
        self.nmi_start = CYCLE_NEVER;
        #[cfg(feature = "nmos-quirks")]
        if self.after_ldair {
            self.set_f(self.f() & !flags::PF);
        }
        self.after_ldair = false;
        self.halted = false;
        // IFF2 keeps the pre-NMI enable state for RETN.
        self.iff1 = false;
        self.ppc = 0xFFFF;
        let pc = self.pc;
        self.push16(pc);
        self.pc = 0x0066;
        self.wz = self.pc;
        self.icount -= 11;
    }

    // ========== External Lines ==========

    /// Latch an NMI request at the given host cycle.
    pub fn assert_nmi(&mut self, cycle: u32) {
        self.nmi_start = cycle;
    }

    /// Catch up to `cycle`, then hold the reset line.
    pub fn assert_reset(&mut self, cycle: u32) {
        self.run_to(cycle);
        self.reset = true;
    }

    /// Release the reset line at `cycle` and apply the edge.
    pub fn clear_reset(&mut self, cycle: u32) {
        if self.current_cycle < cycle {
            self.current_cycle = cycle;
        }
        self.reset = false;
        self.reset();
    }

    /// Catch up to `cycle`, then request the bus. The acknowledge is
    /// published at the next instruction boundary (the top of `run_to`).
    pub fn assert_busreq(&mut self, cycle: u32) {
        self.run_to(cycle);
        self.busreq = true;
    }

    /// Release the bus at `cycle`.
    pub fn clear_busreq(&mut self, cycle: u32) {
        if self.current_cycle < cycle {
            self.current_cycle = cycle;
        }
        self.busreq = false;
        self.busack = false;
    }

    /// Whether the bus has been granted to the 68000.
    pub fn busack(&self) -> bool {
        self.busack
    }

    pub fn reset_asserted(&self) -> bool {
        self.reset
    }

    /// Rebase every latched timestamp after the host subtracts a window
    /// from its clock. Timestamps already in the past clamp to zero;
    /// pulse windows entirely in the past become "never".
    pub fn adjust_cycles(&mut self, deduction: u32) {
        self.current_cycle = self.current_cycle.saturating_sub(deduction);
        self.target_cycle = self.target_cycle.saturating_sub(deduction);
        if self.int_pulse_end != CYCLE_NEVER {
            if self.int_pulse_end <= deduction {
                self.int_pulse_start = CYCLE_NEVER;
                self.int_pulse_end = CYCLE_NEVER;
            } else {
                self.int_pulse_start = self.int_pulse_start.saturating_sub(deduction);
                self.int_pulse_end -= deduction;
            }
        }
        if self.nmi_start != CYCLE_NEVER {
            self.nmi_start = self.nmi_start.saturating_sub(deduction);
        }
    }
}

// ========== State Persistence ==========

impl Z80 {
    /// Size of the CPU state snapshot in bytes
    pub const SNAPSHOT_SIZE: usize = 64;

    /// Save architectural and control state for persistence. Memory
    /// contents, cycle tables and host callbacks are not included.
    pub fn to_bytes(&self) -> [u8; Self::SNAPSHOT_SIZE] {
        let mut buf = [0u8; Self::SNAPSHOT_SIZE];
        let mut pos = 0;

        for pair in [
            self.af, self.bc, self.de, self.hl, self.ix, self.iy, self.wz, self.af2, self.bc2,
            self.de2, self.hl2, self.sp, self.pc, self.ppc,
        ] {
            buf[pos..pos + 2].copy_from_slice(&pair.to_le_bytes());
            pos += 2;
        }

        buf[pos] = self.i;
        pos += 1;
        buf[pos] = self.r;
        pos += 1;
        buf[pos] = self.r2;
        pos += 1;
        buf[pos] = match self.im {
            InterruptMode::Mode0 => 0,
            InterruptMode::Mode1 => 1,
            InterruptMode::Mode2 => 2,
        };
        pos += 1;

        let mut bits = 0u8;
        if self.iff1 {
            bits |= 1 << 0;
        }
        if self.iff2 {
            bits |= 1 << 1;
        }
        if self.halted {
            bits |= 1 << 2;
        }
        if self.after_ei {
            bits |= 1 << 3;
        }
        if self.after_ldair {
            bits |= 1 << 4;
        }
        if self.busreq {
            bits |= 1 << 5;
        }
        if self.busack {
            bits |= 1 << 6;
        }
        if self.reset {
            bits |= 1 << 7;
        }
        buf[pos] = bits;
        pos += 1;

        buf[pos] = self.im2_vector;
        pos += 1;
        buf[pos..pos + 4].copy_from_slice(&self.im0_vector.to_le_bytes());
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.current_cycle.to_le_bytes());
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.int_pulse_start.to_le_bytes());
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.int_pulse_end.to_le_bytes());
        pos += 4;
        buf[pos..pos + 4].copy_from_slice(&self.nmi_start.to_le_bytes());
        pos += 4;
        let _ = pos;

        buf
    }

    /// Restore state saved by [Self::to_bytes].
    pub fn from_bytes(&mut self, buf: &[u8]) -> Result<(), i32> {
        if buf.len() < Self::SNAPSHOT_SIZE {
            return Err(-105); // buffer too small
        }

        let mut pos = 0;
        let mut pair = |pos: &mut usize| {
            let v = u16::from_le_bytes([buf[*pos], buf[*pos + 1]]);
            *pos += 2;
            v
        };
        self.af = pair(&mut pos);
        self.bc = pair(&mut pos);
        self.de = pair(&mut pos);
        self.hl = pair(&mut pos);
        self.ix = pair(&mut pos);
        self.iy = pair(&mut pos);
        self.wz = pair(&mut pos);
        self.af2 = pair(&mut pos);
        self.bc2 = pair(&mut pos);
        self.de2 = pair(&mut pos);
        self.hl2 = pair(&mut pos);
        self.sp = pair(&mut pos);
        self.pc = pair(&mut pos);
        self.ppc = pair(&mut pos);

        self.i = buf[pos];
        pos += 1;
        self.r = buf[pos];
        pos += 1;
        self.r2 = buf[pos];
        pos += 1;
        self.im = match buf[pos] {
            0 => InterruptMode::Mode0,
            1 => InterruptMode::Mode1,
            _ => InterruptMode::Mode2,
        };
        pos += 1;

        let bits = buf[pos];
        pos += 1;
        self.iff1 = bits & (1 << 0) != 0;
        self.iff2 = bits & (1 << 1) != 0;
        self.halted = bits & (1 << 2) != 0;
        self.after_ei = bits & (1 << 3) != 0;
        self.after_ldair = bits & (1 << 4) != 0;
        self.busreq = bits & (1 << 5) != 0;
        self.busack = bits & (1 << 6) != 0;
        self.reset = bits & (1 << 7) != 0;

        self.im2_vector = buf[pos];
        pos += 1;
        let mut long = |pos: &mut usize| {
            let v = u32::from_le_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
            *pos += 4;
            v
        };
        self.im0_vector = long(&mut pos);
        self.current_cycle = long(&mut pos);
        self.int_pulse_start = long(&mut pos);
        self.int_pulse_end = long(&mut pos);
        self.nmi_start = long(&mut pos);

        Ok(())
    }
}
