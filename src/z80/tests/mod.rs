//! Z80 test suite
//!
//! Organized into:
//! - instructions.rs: instruction families, flags, and T-state accounting
//! - interrupts.rs: IM 0/1/2 delivery, NMI, halt, bus request, rebasing

use super::*;
use crate::memmap::{shared_buffer, BusKind, Chunk, MemoryMap, CODE, READ, WRITE};

mod instructions;
mod interrupts;

// ========== Test Helpers ==========

/// CPU over 64 KiB of flat RAM with a 1:1 clock divider.
fn test_cpu() -> Z80 {
    let ram = shared_buffer(0x10000);
    let map = MemoryMap::new(
        BusKind::Narrow,
        vec![Chunk::buffer(0x0000, 0xFFFF, 0xFFFF, READ | WRITE | CODE, ram)],
    );
    Z80::new(Z80Options { clock_divider: 1 }, map)
}

fn load(cpu: &Z80, addr: u16, bytes: &[u8]) {
    for (i, &b) in bytes.iter().enumerate() {
        cpu.map.write8(addr as u32 + i as u32, b);
    }
}

/// Run exactly one instruction boundary; returns the host cycles consumed.
fn step(cpu: &mut Z80) -> u32 {
    let before = cpu.current_cycle;
    cpu.run_to(cpu.current_cycle + 1);
    cpu.current_cycle - before
}

/// Assert flags with a readable breakdown on mismatch.
fn assert_flags(cpu: &Z80, expected: u8, context: &str) {
    assert_eq!(
        cpu.f(),
        expected,
        "{}: flags mismatch. Expected {:08b}, got {:08b} (S={} Z={} Y={} H={} X={} P={} N={} C={})",
        context,
        expected,
        cpu.f(),
        (cpu.f() >> 7) & 1,
        (cpu.f() >> 6) & 1,
        (cpu.f() >> 5) & 1,
        (cpu.f() >> 4) & 1,
        (cpu.f() >> 3) & 1,
        (cpu.f() >> 2) & 1,
        (cpu.f() >> 1) & 1,
        cpu.f() & 1,
    );
}
