//! Dual-CPU system orchestrator
//!
//! Owns the 68000 and the Z80, wires the Genesis memory maps, and
//! implements the coordination surface between the two processors: the
//! bus-request/bus-acknowledge handshake, the Z80 reset line driven by
//! 68k-visible control registers, the Z80 bank window into the 68k
//! address space, and interleaved `run_to` scheduling.
//!
//! # 68k memory map
//!
//! | Address Range         | Region                       |
//! |-----------------------|------------------------------|
//! | 0x000000 - 0x3FFFFF   | Cartridge ROM (direct)       |
//! | 0xA00000 - 0xA0FFFF   | Z80 address space window     |
//! | 0xA11100 - 0xA111FF   | Z80 bus request              |
//! | 0xA11200 - 0xA112FF   | Z80 reset line               |
//! | 0xE00000 - 0xFFFFFF   | 64 KiB work RAM, mirrored    |
//!
//! # Z80 memory map
//!
//! | Address Range | Region                          |
//! |---------------|---------------------------------|
//! | 0x0000-0x1FFF | 8 KiB sound RAM (direct)        |
//! | 0x2000-0x3FFF | RAM mirror                      |
//! | 0x4000-0x5FFF | FM chip (stubbed, reads 0)      |
//! | 0x6000-0x60FF | Bank register                   |
//! | 0x7F00-0x7FFF | VDP window (stubbed)            |
//! | 0x8000-0xFFFF | Banked window onto the 68k bus  |

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::m68k::{M68k, M68kOptions};
use crate::memmap::{
    byte_swap_words, shared_buffer, BusKind, Chunk, MemoryMap, MmioDevice, SharedBuffer, CODE,
    FUNC_NULL, READ, WRITE,
};
use crate::z80::{Z80Options, Z80};

/// Cartridge window size: 4 MiB, allocated up front.
const ROM_SIZE: usize = 0x40_0000;
/// 68k work RAM.
const WORK_RAM_SIZE: usize = 0x1_0000;
/// Z80 sound RAM.
const SOUND_RAM_SIZE: usize = 0x2000;

/// Scheduling quantum for the interleave loop, in host cycles.
const SLICE: u32 = 1024;

/// Z80 address-space window at 0xA00000: byte-wide access into sound RAM.
struct Z80Window {
    ram: SharedBuffer,
}

impl MmioDevice for Z80Window {
    fn read8(&mut self, addr: u32) -> u8 {
        self.ram.borrow()[(addr & 0x1FFF) as usize]
    }

    fn write8(&mut self, addr: u32, value: u8) {
        self.ram.borrow_mut()[(addr & 0x1FFF) as usize] = value;
    }
}

/// 0xA11100: bus request. Writing bit 0 of the even lane requests the Z80
/// bus; reading returns the busy bit (clear once the bus is granted).
struct BusArbiter {
    z80: Rc<RefCell<Z80>>,
    clock: Rc<Cell<u32>>,
}

impl MmioDevice for BusArbiter {
    fn read8(&mut self, addr: u32) -> u8 {
        if addr & 1 == 0 {
            u8::from(!self.z80.borrow().busack())
        } else {
            0
        }
    }

    fn write8(&mut self, addr: u32, value: u8) {
        if addr & 1 != 0 {
            return;
        }
        let cycle = self.clock.get();
        let mut z80 = self.z80.borrow_mut();
        if value & 1 != 0 {
            z80.assert_busreq(cycle);
        } else {
            z80.clear_busreq(cycle);
        }
    }
}

/// 0xA11200: Z80 reset line. Bit clear holds the Z80 in reset; setting it
/// releases the line and applies the reset edge.
struct ResetLine {
    z80: Rc<RefCell<Z80>>,
    clock: Rc<Cell<u32>>,
}

impl MmioDevice for ResetLine {
    fn read8(&mut self, _addr: u32) -> u8 {
        u8::from(!self.z80.borrow().reset_asserted())
    }

    fn write8(&mut self, addr: u32, value: u8) {
        if addr & 1 != 0 {
            return;
        }
        let cycle = self.clock.get();
        let mut z80 = self.z80.borrow_mut();
        if value & 1 != 0 {
            z80.clear_reset(cycle);
        } else {
            z80.assert_reset(cycle);
        }
    }
}

/// Z80-side bank register at 0x6000: a 9-bit shift register selecting
/// which 32 KiB of the 68k address space the window at 0x8000 sees.
struct BankRegister {
    bank: Rc<Cell<u16>>,
}

impl MmioDevice for BankRegister {
    fn read8(&mut self, _addr: u32) -> u8 {
        0xFF
    }

    fn write8(&mut self, _addr: u32, value: u8) {
        let shifted = (self.bank.get() >> 1) | ((value as u16 & 1) << 8);
        self.bank.set(shifted & 0x1FF);
    }
}

/// Z80 window at 0x8000-0xFFFF onto `bank << 15` of the 68k bus. The
/// shared ROM and work-RAM buffers keep their 16-bit storage layout, so
/// byte access swaps the lane like the 68k byte path does.
struct BankWindow {
    bank: Rc<Cell<u16>>,
    rom: SharedBuffer,
    work_ram: SharedBuffer,
}

impl BankWindow {
    fn resolve(&self, addr: u32) -> u32 {
        ((self.bank.get() as u32) << 15) | (addr & 0x7FFF)
    }
}

impl MmioDevice for BankWindow {
    fn read8(&mut self, addr: u32) -> u8 {
        let addr68k = self.resolve(addr);
        if addr68k < ROM_SIZE as u32 {
            self.rom.borrow()[((addr68k ^ 1) & (ROM_SIZE as u32 - 1)) as usize]
        } else if addr68k >= 0xE0_0000 {
            self.work_ram.borrow()[((addr68k ^ 1) & 0xFFFF) as usize]
        } else {
            0xFF
        }
    }

    fn write8(&mut self, addr: u32, value: u8) {
        let addr68k = self.resolve(addr);
        if addr68k >= 0xE0_0000 {
            self.work_ram.borrow_mut()[((addr68k ^ 1) & 0xFFFF) as usize] = value;
        }
    }
}

/// The CPU tier of a Genesis: 68000, Z80, shared memory and control wires.
pub struct System {
    pub m68k: M68k,
    pub z80: Rc<RefCell<Z80>>,
    rom: SharedBuffer,
    work_ram: SharedBuffer,
    sound_ram: SharedBuffer,
    /// 68k cycle position published to the control devices so bus and
    /// reset edges catch the Z80 up to the right point in time.
    m68k_clock: Rc<Cell<u32>>,
    rom_loaded: bool,
}

impl System {
    pub fn new() -> Self {
        let rom = shared_buffer(ROM_SIZE);
        let work_ram = shared_buffer(WORK_RAM_SIZE);
        let sound_ram = shared_buffer(SOUND_RAM_SIZE);
        let bank = Rc::new(Cell::new(0u16));
        let m68k_clock = Rc::new(Cell::new(0u32));

        let z80_map = MemoryMap::new(
            BusKind::Narrow,
            vec![
                Chunk::buffer(0x0000, 0x1FFF, 0x1FFF, READ | WRITE | CODE, sound_ram.clone()),
                Chunk::buffer(0x2000, 0x3FFF, 0x1FFF, READ | WRITE | CODE, sound_ram.clone()),
                // FM chip: out of scope, reads as zero.
                Chunk {
                    start: 0x4000,
                    end: 0x5FFF,
                    mask: 0x0003,
                    flags: READ | WRITE | FUNC_NULL,
                    ptr_index: 0,
                    buffer: None,
                    device: None,
                },
                Chunk::device(
                    0x6000,
                    0x60FF,
                    0x00FF,
                    WRITE,
                    Rc::new(RefCell::new(BankRegister { bank: bank.clone() })),
                ),
                // VDP window: out of scope.
                Chunk {
                    start: 0x7F00,
                    end: 0x7FFF,
                    mask: 0x001F,
                    flags: READ | WRITE | FUNC_NULL,
                    ptr_index: 0,
                    buffer: None,
                    device: None,
                },
                Chunk::device(
                    0x8000,
                    0xFFFF,
                    0x7FFF,
                    READ | WRITE | CODE,
                    Rc::new(RefCell::new(BankWindow {
                        bank: bank.clone(),
                        rom: rom.clone(),
                        work_ram: work_ram.clone(),
                    })),
                ),
            ],
        );
        let z80 = Rc::new(RefCell::new(Z80::new(Z80Options::default(), z80_map)));

        let m68k_map = MemoryMap::new(
            BusKind::WideBigEndian,
            vec![
                Chunk::buffer(
                    0x00_0000,
                    0x3F_FFFF,
                    ROM_SIZE as u32 - 1,
                    READ | CODE,
                    rom.clone(),
                ),
                Chunk::device(
                    0xA0_0000,
                    0xA0_FFFF,
                    0xFFFF,
                    READ | WRITE,
                    Rc::new(RefCell::new(Z80Window {
                        ram: sound_ram.clone(),
                    })),
                ),
                Chunk::device(
                    0xA1_1100,
                    0xA1_11FF,
                    0x00FF,
                    READ | WRITE,
                    Rc::new(RefCell::new(BusArbiter {
                        z80: z80.clone(),
                        clock: m68k_clock.clone(),
                    })),
                ),
                Chunk::device(
                    0xA1_1200,
                    0xA1_12FF,
                    0x00FF,
                    READ | WRITE,
                    Rc::new(RefCell::new(ResetLine {
                        z80: z80.clone(),
                        clock: m68k_clock.clone(),
                    })),
                ),
                Chunk::buffer(
                    0xE0_0000,
                    0xFF_FFFF,
                    0xFFFF,
                    READ | WRITE | CODE,
                    work_ram.clone(),
                ),
            ],
        );
        let mut m68k = M68k::new(M68kOptions::default(), m68k_map);

        // The RESET instruction pulses the external reset line, which on
        // this board resets the sound CPU.
        let reset_z80 = z80.clone();
        let reset_clock = m68k_clock.clone();
        m68k.reset_handler = Some(Box::new(move || {
            let cycle = reset_clock.get();
            let mut z80 = reset_z80.borrow_mut();
            z80.assert_reset(cycle);
            z80.clear_reset(cycle);
        }));

        Self {
            m68k,
            z80,
            rom,
            work_ram,
            sound_ram,
            m68k_clock,
            rom_loaded: false,
        }
    }

    /// Install a cartridge image. The big-endian image is byte-swapped
    /// into the 16-bit storage layout the direct path indexes.
    pub fn load_rom(&mut self, data: &[u8]) -> Result<(), i32> {
        if data.is_empty() {
            return Err(-2);
        }
        if data.len() > ROM_SIZE {
            return Err(-3);
        }
        {
            let mut rom = self.rom.borrow_mut();
            rom.fill(0);
            rom[..data.len()].copy_from_slice(data);
            byte_swap_words(&mut rom[..data.len() + data.len() % 2]);
        }
        self.rom_loaded = true;
        self.reset();
        Ok(())
    }

    /// Power-on reset: the 68k reloads its vectors; the Z80 is held in
    /// reset until the 68k program releases it through 0xA11200.
    pub fn reset(&mut self) {
        self.m68k_clock.set(self.m68k.current_cycle);
        self.m68k.reset();
        let cycle = self.m68k.current_cycle;
        let mut z80 = self.z80.borrow_mut();
        z80.assert_reset(cycle);
    }

    /// Run both CPUs to the deadline, interleaving in slices: the 68k
    /// leads, the Z80 is pulled up behind it.
    pub fn run_to(&mut self, target_cycle: u32) {
        while self.m68k.current_cycle < target_cycle {
            let next = self
                .m68k
                .current_cycle
                .saturating_add(SLICE)
                .min(target_cycle);
            self.m68k_clock.set(self.m68k.current_cycle);
            self.m68k.run_to(next);
            let m68k_cycle = self.m68k.current_cycle;
            self.z80.borrow_mut().run_to(m68k_cycle);
        }
        let m68k_cycle = self.m68k.current_cycle;
        self.z80.borrow_mut().run_to(m68k_cycle.max(target_cycle));
    }

    /// Publish a VDP interrupt level to the 68k.
    pub fn interrupt(&mut self, level: u8) {
        self.m68k.interrupt(level);
    }

    /// Rebase both CPUs after the host subtracts a window from its clock.
    pub fn adjust_cycles(&mut self, deduction: u32) {
        self.m68k.adjust_cycles(deduction);
        self.z80.borrow_mut().adjust_cycles(deduction);
        self.m68k_clock
            .set(self.m68k_clock.get().saturating_sub(deduction));
    }

    pub fn rom_loaded(&self) -> bool {
        self.rom_loaded
    }

    /// Direct work-RAM peek for hosts and tests.
    pub fn peek_ram16(&self, offset: u32) -> u16 {
        let ram = self.work_ram.borrow();
        let idx = (offset & 0xFFFE) as usize;
        (ram[idx + 1] as u16) << 8 | ram[idx] as u16
    }

    pub fn peek_sound_ram(&self, offset: u32) -> u8 {
        self.sound_ram.borrow()[(offset & 0x1FFF) as usize]
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

// ========== State Persistence ==========

const STATE_MAGIC: [u8; 4] = *b"MDST";
const STATE_VERSION: u8 = 1;

impl System {
    /// Snapshot size: header, both CPU snapshots, both RAM banks. ROM is
    /// not part of the state.
    pub fn state_size(&self) -> usize {
        8 + M68k::SNAPSHOT_SIZE + Z80::SNAPSHOT_SIZE + WORK_RAM_SIZE + SOUND_RAM_SIZE
    }

    pub fn save_state(&self, buf: &mut [u8]) -> Result<usize, i32> {
        let size = self.state_size();
        if buf.len() < size {
            return Err(-105);
        }
        buf[0..4].copy_from_slice(&STATE_MAGIC);
        buf[4] = STATE_VERSION;
        buf[5..8].fill(0);
        let mut pos = 8;
        buf[pos..pos + M68k::SNAPSHOT_SIZE].copy_from_slice(&self.m68k.to_bytes());
        pos += M68k::SNAPSHOT_SIZE;
        buf[pos..pos + Z80::SNAPSHOT_SIZE].copy_from_slice(&self.z80.borrow().to_bytes());
        pos += Z80::SNAPSHOT_SIZE;
        buf[pos..pos + WORK_RAM_SIZE].copy_from_slice(&self.work_ram.borrow());
        pos += WORK_RAM_SIZE;
        buf[pos..pos + SOUND_RAM_SIZE].copy_from_slice(&self.sound_ram.borrow());
        pos += SOUND_RAM_SIZE;
        Ok(pos)
    }

    pub fn load_state(&mut self, buf: &[u8]) -> Result<(), i32> {
        if buf.len() < self.state_size() {
            return Err(-105);
        }
        if buf[0..4] != STATE_MAGIC {
            return Err(-106); // bad magic
        }
        if buf[4] != STATE_VERSION {
            return Err(-107); // version mismatch
        }
        let mut pos = 8;
        self.m68k.from_bytes(&buf[pos..pos + M68k::SNAPSHOT_SIZE])?;
        pos += M68k::SNAPSHOT_SIZE;
        self.z80
            .borrow_mut()
            .from_bytes(&buf[pos..pos + Z80::SNAPSHOT_SIZE])?;
        pos += Z80::SNAPSHOT_SIZE;
        self.work_ram
            .borrow_mut()
            .copy_from_slice(&buf[pos..pos + WORK_RAM_SIZE]);
        pos += WORK_RAM_SIZE;
        self.sound_ram
            .borrow_mut()
            .copy_from_slice(&buf[pos..pos + SOUND_RAM_SIZE]);
        Ok(())
    }
}
