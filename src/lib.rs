//! Sega Genesis / Mega Drive CPU-tier emulator core
//!
//! This crate provides the processor tier of a Genesis emulator with a
//! stable C ABI: a cycle-counting 68000-family interpreter, a Z80
//! interpreter, the chunked memory maps both CPUs resolve their accesses
//! through, and the coordination machinery between them (bus request,
//! reset propagation, shared memory windows). Video, audio and I/O
//! devices are collaborators behind map callbacks, not part of this
//! crate.
//!
//! # Architecture
//!
//! - `memmap`: address-range chunks with a direct-buffer fast path and
//!   MMIO trait objects on the slow path
//! - `m68k`: 68000/010/020/030/040/CPU32/ColdFire interpreter
//! - `z80`: Z80 interpreter with pulse-window interrupts and the
//!   bus-request handshake
//! - `system`: the dual-CPU orchestrator and Genesis memory maps
//!
//! Both CPUs run to externally supplied deadlines: the host owns the
//! clock and calls `run_to(target_cycle)`; a CPU only returns control at
//! the deadline (overshooting by at most the instruction in flight).
//!
//! Hosts install a `log` backend to surface illegal-opcode and
//! unemulated-feature diagnostics; the core itself never prints.

pub mod m68k;
pub mod memmap;
pub mod system;
pub mod z80;


use std::slice;

pub use system::System;

/// Create a new system instance.
/// Returns null on allocation failure.
#[no_mangle]
pub extern "C" fn md_system_new() -> *mut System {
    let system = Box::new(System::new());
    Box::into_raw(system)
}

/// Destroy a system instance.
/// Safe to call with null.
#[no_mangle]
pub extern "C" fn md_system_free(system: *mut System) {
    if !system.is_null() {
        unsafe {
            drop(Box::from_raw(system));
        }
    }
}

/// Load a cartridge image.
/// Returns 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn md_system_load_rom(system: *mut System, data: *const u8, len: usize) -> i32 {
    if system.is_null() || data.is_null() {
        return -1;
    }
    let system = unsafe { &mut *system };
    let rom = unsafe { slice::from_raw_parts(data, len) };
    match system.load_rom(rom) {
        Ok(()) => 0,
        Err(code) => code,
    }
}

/// Reset both CPUs (the Z80 stays held in reset until released).
#[no_mangle]
pub extern "C" fn md_system_reset(system: *mut System) {
    if system.is_null() {
        return;
    }
    let system = unsafe { &mut *system };
    system.reset();
}

/// Run both CPUs to the given host-cycle deadline.
/// Returns the 68k cycle counter after the run.
#[no_mangle]
pub extern "C" fn md_system_run(system: *mut System, target_cycle: u32) -> u32 {
    if system.is_null() {
        return 0;
    }
    let system = unsafe { &mut *system };
    system.run_to(target_cycle);
    system.m68k.current_cycle
}

/// Rebase all cycle counters by subtracting `deduction`.
#[no_mangle]
pub extern "C" fn md_system_adjust_cycles(system: *mut System, deduction: u32) {
    if system.is_null() {
        return;
    }
    let system = unsafe { &mut *system };
    system.adjust_cycles(deduction);
}

/// Raise a 68k interrupt at the given level (1..7; 0 clears).
#[no_mangle]
pub extern "C" fn md_m68k_interrupt(system: *mut System, level: u8) {
    if system.is_null() {
        return;
    }
    let system = unsafe { &mut *system };
    system.interrupt(level);
}

/// Size needed for a save-state buffer.
#[no_mangle]
pub extern "C" fn md_system_state_size(system: *const System) -> usize {
    if system.is_null() {
        return 0;
    }
    let system = unsafe { &*system };
    system.state_size()
}

/// Save system state.
/// Returns bytes written, or a negative error code.
#[no_mangle]
pub extern "C" fn md_system_save_state(system: *const System, out: *mut u8, cap: usize) -> i32 {
    if system.is_null() || out.is_null() {
        return -1;
    }
    let system = unsafe { &*system };
    let buf = unsafe { slice::from_raw_parts_mut(out, cap) };
    match system.save_state(buf) {
        Ok(size) => size as i32,
        Err(code) => code,
    }
}

/// Load system state.
/// Returns 0 on success, negative error code on failure.
#[no_mangle]
pub extern "C" fn md_system_load_state(system: *mut System, data: *const u8, len: usize) -> i32 {
    if system.is_null() || data.is_null() {
        return -1;
    }
    let system = unsafe { &mut *system };
    let buf = unsafe { slice::from_raw_parts(data, len) };
    match system.load_state(buf) {
        Ok(()) => 0,
        Err(code) => code,
    }
}
