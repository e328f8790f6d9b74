//! 68k test suite
//!
//! Organized into:
//! - instructions.rs: ALU semantics, addressing modes, cycle accounting
//! - exceptions.rs: traps, privilege, trace, interrupts, stack frames

use super::*;
use crate::memmap::{shared_buffer, BusKind, Chunk, MemoryMap, CODE, READ, WRITE};

mod instructions;

// ========== Test Helpers ==========

/// CPU over 64 KiB of flat RAM with a 1:1 clock divider, reset vectors
/// pointing at SP=0x1000 / PC=0x400.
fn test_cpu() -> M68k {
    test_cpu_variant(CpuVariant::M68000)
}

fn test_cpu_variant(variant: CpuVariant) -> M68k {
    let ram = shared_buffer(0x10000);
    let map = MemoryMap::new(
        BusKind::WideBigEndian,
        vec![Chunk::buffer(0, 0xFFFF, 0xFFFF, READ | WRITE | CODE, ram)],
    );
    let mut cpu = M68k::new(
        M68kOptions {
            variant,
            clock_divider: 1,
        },
        map,
    );
    cpu.map.write32_vec(0x0000, 0x0000_1000);
    cpu.map.write32_vec(0x0004, 0x0000_0400);
    cpu.reset();
    cpu
}

/// Write a program at 0x400 (the reset PC of the test harness).
fn load(cpu: &M68k, at: u32, words: &[u16]) {
    for (i, &w) in words.iter().enumerate() {
        cpu.map.write16(at + 2 * i as u32, w);
    }
}

/// Run exactly one instruction boundary; returns the cycles consumed.
fn step(cpu: &mut M68k) -> u32 {
    let before = cpu.current_cycle;
    cpu.run_to(cpu.current_cycle + 1);
    cpu.current_cycle - before
}

fn ccr(cpu: &M68k) -> u16 {
    cpu.sr() & 0x1F
}

trait MapVecExt {
    fn write32_vec(&self, addr: u32, value: u32);
}

impl MapVecExt for MemoryMap {
    fn write32_vec(&self, addr: u32, value: u32) {
        self.write16(addr, (value >> 16) as u16);
        self.write16(addr + 2, value as u16);
    }
}
