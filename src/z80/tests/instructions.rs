//! Instruction-level Z80 tests
//!
//! Covers register access, the table-driven ALU, rotates at the carry
//! edges, block transfers, and per-opcode T-state accounting against the
//! cycle tables.

use super::*;

#[test]
fn test_new_cpu() {
    let cpu = test_cpu();
    assert_eq!(cpu.pc, 0);
    assert!(!cpu.iff1);
    assert!(!cpu.iff2);
    assert!(!cpu.halted);
    assert_eq!(cpu.i, 0);
    assert_eq!(cpu.r, 0);
}

#[test]
fn test_reset_clears_state() {
    let mut cpu = test_cpu();
    cpu.pc = 0x1234;
    cpu.i = 0x55;
    cpu.r = 0x33;
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.halted = true;
    cpu.reset();
    assert_eq!(cpu.pc, 0);
    assert_eq!(cpu.sp, 0);
    assert_eq!(cpu.i, 0);
    assert_eq!(cpu.r, 0);
    assert!(!cpu.iff1 && !cpu.iff2);
    assert!(!cpu.halted);
}

#[test]
fn test_register_halves() {
    let mut cpu = test_cpu();
    cpu.bc = 0x1234;
    assert_eq!(cpu.b(), 0x12);
    assert_eq!(cpu.c(), 0x34);
    cpu.set_b(0xAB);
    cpu.set_c(0xCD);
    assert_eq!(cpu.bc, 0xABCD);
    cpu.set_a(0x7F);
    cpu.set_f(0x01);
    assert_eq!(cpu.af, 0x7F01);
}

#[test]
fn test_nop_cycles() {
    let mut cpu = test_cpu();
    load(&cpu, 0, &[0x00, 0x00]);
    assert_eq!(step(&mut cpu), 4);
    assert_eq!(cpu.pc, 1);
}

#[test]
fn test_ld_r_n_and_ld_r_r() {
    let mut cpu = test_cpu();
    load(&cpu, 0, &[0x06, 0x42, 0x48]); // LD B,0x42; LD C,B
    step(&mut cpu);
    assert_eq!(cpu.b(), 0x42);
    step(&mut cpu);
    assert_eq!(cpu.c(), 0x42);
}

#[test]
fn test_ld_hl_indirect() {
    let mut cpu = test_cpu();
    cpu.hl = 0x2000;
    load(&cpu, 0, &[0x36, 0x99, 0x7E]); // LD (HL),0x99; LD A,(HL)
    step(&mut cpu);
    assert_eq!(cpu.map.read8(0x2000), 0x99);
    let cycles = step(&mut cpu);
    assert_eq!(cpu.a(), 0x99);
    assert_eq!(cycles, 7);
}

#[test]
fn test_add_sets_carry_and_overflow() {
    let mut cpu = test_cpu();
    cpu.set_a(0x80);
    cpu.set_b(0x80);
    load(&cpu, 0, &[0x80]); // ADD A,B
    step(&mut cpu);
    assert_eq!(cpu.a(), 0x00);
    // 0x80 + 0x80: zero result, signed overflow, carry out.
    assert_flags(&cpu, flags::ZF | flags::PF | flags::CF, "ADD 80+80");
}

#[test]
fn test_adc_uses_carry_in() {
    let mut cpu = test_cpu();
    cpu.set_a(0x0F);
    cpu.set_f(flags::CF);
    load(&cpu, 0, &[0xCE, 0x00]); // ADC A,0x00
    step(&mut cpu);
    assert_eq!(cpu.a(), 0x10);
    assert!(cpu.f() & flags::HF != 0, "nibble carry from 0x0F + 1");
}

#[test]
fn test_sub_borrow_flags() {
    let mut cpu = test_cpu();
    cpu.set_a(0x00);
    load(&cpu, 0, &[0xD6, 0x01]); // SUB 0x01
    step(&mut cpu);
    assert_eq!(cpu.a(), 0xFF);
    assert!(cpu.f() & flags::CF != 0);
    assert!(cpu.f() & flags::HF != 0);
    assert!(cpu.f() & flags::NF != 0);
    assert!(cpu.f() & flags::SF != 0);
}

#[test]
fn test_cp_takes_xf_yf_from_operand() {
    let mut cpu = test_cpu();
    cpu.set_a(0x00);
    load(&cpu, 0, &[0xFE, 0x28]); // CP 0x28
    step(&mut cpu);
    // Result is discarded, YF/XF mirror the operand (0x28 has both set).
    assert!(cpu.f() & flags::YF != 0);
    assert!(cpu.f() & flags::XF != 0);
    assert_eq!(cpu.a(), 0x00);
}

#[test]
fn test_inc_dec_flags() {
    let mut cpu = test_cpu();
    cpu.set_a(0x7F);
    load(&cpu, 0, &[0x3C, 0x3D, 0x3D]); // INC A; DEC A; DEC A
    step(&mut cpu);
    assert_eq!(cpu.a(), 0x80);
    assert!(cpu.f() & flags::PF != 0, "0x7F + 1 overflows");
    step(&mut cpu);
    assert_eq!(cpu.a(), 0x7F);
    assert!(cpu.f() & flags::PF != 0, "0x80 - 1 overflows");
    step(&mut cpu);
    assert!(cpu.f() & flags::NF != 0);
}

#[test]
fn test_inc_preserves_carry() {
    let mut cpu = test_cpu();
    cpu.set_f(flags::CF);
    cpu.set_b(0xFF);
    load(&cpu, 0, &[0x04]); // INC B
    step(&mut cpu);
    assert_eq!(cpu.b(), 0x00);
    assert!(cpu.f() & flags::CF != 0, "INC never touches carry");
    assert!(cpu.f() & flags::ZF != 0);
}

#[test]
fn test_add_hl_rp() {
    let mut cpu = test_cpu();
    cpu.hl = 0x0FFF;
    cpu.bc = 0x0001;
    load(&cpu, 0, &[0x09]); // ADD HL,BC
    let cycles = step(&mut cpu);
    assert_eq!(cpu.hl, 0x1000);
    assert_eq!(cycles, 11);
    assert!(cpu.f() & flags::HF != 0, "carry out of bit 11");
    assert!(cpu.f() & flags::CF == 0);
    assert_eq!(cpu.wz, 0x1000); // HL+1 before the add
}

#[test]
fn test_sbc_hl_full_flags() {
    let mut cpu = test_cpu();
    cpu.hl = 0x0000;
    cpu.de = 0x0001;
    load(&cpu, 0, &[0xED, 0x52]); // SBC HL,DE
    let cycles = step(&mut cpu);
    assert_eq!(cpu.hl, 0xFFFF);
    assert_eq!(cycles, 15);
    assert!(cpu.f() & flags::CF != 0);
    assert!(cpu.f() & flags::SF != 0);
    assert!(cpu.f() & flags::NF != 0);
}

#[test]
fn test_daa_after_bcd_add() {
    let mut cpu = test_cpu();
    cpu.set_a(0x09);
    load(&cpu, 0, &[0xC6, 0x01, 0x27]); // ADD A,0x01; DAA
    step(&mut cpu);
    step(&mut cpu);
    assert_eq!(cpu.a(), 0x10, "0x09 + 0x01 adjusts to BCD 10");
}

#[test]
fn test_rlca_rrca_edges() {
    let mut cpu = test_cpu();
    cpu.set_a(0x80);
    load(&cpu, 0, &[0x07]); // RLCA
    step(&mut cpu);
    assert_eq!(cpu.a(), 0x01);
    assert!(cpu.f() & flags::CF != 0);

    let mut cpu = test_cpu();
    cpu.set_a(0x01);
    load(&cpu, 0, &[0x0F]); // RRCA
    step(&mut cpu);
    assert_eq!(cpu.a(), 0x80);
    assert!(cpu.f() & flags::CF != 0);
}

#[test]
fn test_cb_rlc_edge_values() {
    // RLC on 0x80: carry out, result 0x01, parity odd.
    let mut cpu = test_cpu();
    cpu.set_b(0x80);
    load(&cpu, 0, &[0xCB, 0x00]); // RLC B
    let cycles = step(&mut cpu);
    assert_eq!(cpu.b(), 0x01);
    assert_eq!(cycles, 8);
    assert_flags(&cpu, flags::CF, "RLC 0x80");

    // RRC on 0x01: carry out, result 0x80, sign set.
    let mut cpu = test_cpu();
    cpu.set_b(0x01);
    load(&cpu, 0, &[0xCB, 0x08]); // RRC B
    step(&mut cpu);
    assert_eq!(cpu.b(), 0x80);
    assert_flags(&cpu, flags::SF | flags::CF, "RRC 0x01");
}

#[test]
fn test_cb_rl_through_carry() {
    let mut cpu = test_cpu();
    cpu.set_c(0x80);
    cpu.set_f(0);
    load(&cpu, 0, &[0xCB, 0x11, 0xCB, 0x11]); // RL C; RL C
    step(&mut cpu);
    assert_eq!(cpu.c(), 0x00);
    assert!(cpu.f() & flags::CF != 0);
    step(&mut cpu);
    assert_eq!(cpu.c(), 0x01, "carry rotated back in");
}

#[test]
fn test_cb_srl_and_sra() {
    let mut cpu = test_cpu();
    cpu.set_d(0x81);
    load(&cpu, 0, &[0xCB, 0x3A]); // SRL D
    step(&mut cpu);
    assert_eq!(cpu.d(), 0x40);
    assert!(cpu.f() & flags::CF != 0);

    let mut cpu = test_cpu();
    cpu.set_d(0x81);
    load(&cpu, 0, &[0xCB, 0x2A]); // SRA D
    step(&mut cpu);
    assert_eq!(cpu.d(), 0xC0, "sign preserved");
}

#[test]
fn test_bit_set_res() {
    let mut cpu = test_cpu();
    cpu.set_e(0x00);
    load(&cpu, 0, &[0xCB, 0x63, 0xCB, 0xE3, 0xCB, 0x63, 0xCB, 0xA3]);
    // BIT 4,E
    step(&mut cpu);
    assert!(cpu.f() & flags::ZF != 0);
    assert!(cpu.f() & flags::HF != 0);
    // SET 4,E
    step(&mut cpu);
    assert_eq!(cpu.e(), 0x10);
    // BIT 4,E
    step(&mut cpu);
    assert!(cpu.f() & flags::ZF == 0);
    // RES 4,E
    step(&mut cpu);
    assert_eq!(cpu.e(), 0x00);
}

#[test]
fn test_jr_taken_and_not_taken_cycles() {
    let mut cpu = test_cpu();
    cpu.set_f(0); // Z clear
    load(&cpu, 0, &[0x28, 0x10, 0x20, 0x10]); // JR Z,+0x10; JR NZ,+0x10
    assert_eq!(step(&mut cpu), 7, "not taken");
    assert_eq!(cpu.pc, 2);
    assert_eq!(step(&mut cpu), 12, "taken");
    assert_eq!(cpu.pc, 0x14);
    assert_eq!(cpu.wz, 0x14);
}

#[test]
fn test_djnz_loop_cycles() {
    let mut cpu = test_cpu();
    cpu.set_b(2);
    load(&cpu, 0, &[0x10, 0xFE]); // DJNZ -2 (self)
    assert_eq!(step(&mut cpu), 13, "taken: 8 + 5");
    assert_eq!(cpu.pc, 0);
    assert_eq!(step(&mut cpu), 8, "expired");
    assert_eq!(cpu.pc, 2);
    assert_eq!(cpu.b(), 0);
}

#[test]
fn test_call_ret() {
    let mut cpu = test_cpu();
    cpu.sp = 0x8000;
    load(&cpu, 0, &[0xCD, 0x00, 0x40]); // CALL 0x4000
    load(&cpu, 0x4000, &[0xC9]); // RET
    assert_eq!(step(&mut cpu), 17);
    assert_eq!(cpu.pc, 0x4000);
    assert_eq!(cpu.sp, 0x7FFE);
    assert_eq!(step(&mut cpu), 10);
    assert_eq!(cpu.pc, 0x0003);
    assert_eq!(cpu.sp, 0x8000);
}

#[test]
fn test_conditional_ret_cycles() {
    let mut cpu = test_cpu();
    cpu.sp = 0x8000;
    cpu.map.write8(0x8000, 0x34);
    cpu.map.write8(0x8001, 0x12);
    cpu.set_f(flags::ZF);
    load(&cpu, 0, &[0xC0, 0xC8]); // RET NZ (not taken); RET Z (taken)
    assert_eq!(step(&mut cpu), 5);
    assert_eq!(cpu.pc, 1);
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(cpu.pc, 0x1234);
}

#[test]
fn test_rst_pushes_and_jumps() {
    let mut cpu = test_cpu();
    cpu.sp = 0x8000;
    load(&cpu, 0x100, &[0xEF]); // RST 28H
    cpu.pc = 0x100;
    assert_eq!(step(&mut cpu), 11);
    assert_eq!(cpu.pc, 0x28);
    assert_eq!(cpu.map.read8(0x7FFE), 0x01);
    assert_eq!(cpu.map.read8(0x7FFF), 0x01);
}

#[test]
fn test_ex_exx() {
    let mut cpu = test_cpu();
    cpu.af = 0x1111;
    cpu.af2 = 0x2222;
    cpu.bc = 0x3333;
    cpu.bc2 = 0x4444;
    load(&cpu, 0, &[0x08, 0xD9, 0xEB]); // EX AF,AF'; EXX; EX DE,HL
    step(&mut cpu);
    assert_eq!(cpu.af, 0x2222);
    step(&mut cpu);
    assert_eq!(cpu.bc, 0x4444);
    cpu.de = 0x5555;
    cpu.hl = 0x6666;
    step(&mut cpu);
    assert_eq!(cpu.de, 0x6666);
    assert_eq!(cpu.hl, 0x5555);
}

#[test]
fn test_ex_sp_hl() {
    let mut cpu = test_cpu();
    cpu.sp = 0x8000;
    cpu.hl = 0x1234;
    cpu.map.write8(0x8000, 0x78);
    cpu.map.write8(0x8001, 0x56);
    load(&cpu, 0, &[0xE3]); // EX (SP),HL
    assert_eq!(step(&mut cpu), 19);
    assert_eq!(cpu.hl, 0x5678);
    assert_eq!(cpu.map.read8(0x8000), 0x34);
    assert_eq!(cpu.map.read8(0x8001), 0x12);
    assert_eq!(cpu.wz, 0x5678);
}

#[test]
fn test_ldi_flags() {
    let mut cpu = test_cpu();
    cpu.hl = 0x2000;
    cpu.de = 0x3000;
    cpu.bc = 0x0002;
    cpu.map.write8(0x2000, 0x55);
    load(&cpu, 0, &[0xED, 0xA0]); // LDI
    assert_eq!(step(&mut cpu), 16);
    assert_eq!(cpu.map.read8(0x3000), 0x55);
    assert_eq!(cpu.hl, 0x2001);
    assert_eq!(cpu.de, 0x3001);
    assert_eq!(cpu.bc, 0x0001);
    assert!(cpu.f() & flags::PF != 0, "BC still nonzero");
    assert_eq!(cpu.pc, 2);
}

#[test]
fn test_ldir_repeats_in_place() {
    let mut cpu = test_cpu();
    cpu.hl = 0x2000;
    cpu.de = 0x3000;
    cpu.bc = 0x0003;
    load(&cpu, 0x2000, &[0x11, 0x22, 0x33]);
    load(&cpu, 0, &[0xED, 0xB0]); // LDIR

    // One repetition: 16 for the transfer plus 5 for the rewind.
    assert_eq!(step(&mut cpu), 21);
    assert_eq!(cpu.hl, 0x2001);
    assert_eq!(cpu.de, 0x3001);
    assert_eq!(cpu.bc, 0x0002);
    assert_eq!(cpu.map.read8(0x3000), 0x11);
    assert_eq!(cpu.pc, 0, "PC rewound to re-execute");

    // Run the copy to completion.
    cpu.run_to(cpu.current_cycle + 21 + 16);
    assert_eq!(cpu.bc, 0);
    assert_eq!(cpu.pc, 2);
    assert_eq!(cpu.map.read8(0x3001), 0x22);
    assert_eq!(cpu.map.read8(0x3002), 0x33);
}

#[test]
fn test_cpir_stops_on_match() {
    let mut cpu = test_cpu();
    cpu.hl = 0x2000;
    cpu.bc = 0x0010;
    cpu.set_a(0x22);
    load(&cpu, 0x2000, &[0x11, 0x22, 0x33]);
    load(&cpu, 0, &[0xED, 0xB1]); // CPIR
    cpu.run_to(cpu.current_cycle + 21 + 16);
    assert_eq!(cpu.hl, 0x2002);
    assert_eq!(cpu.bc, 0x000E);
    assert!(cpu.f() & flags::ZF != 0, "found the match");
    assert_eq!(cpu.pc, 2);
}

#[test]
fn test_neg() {
    let mut cpu = test_cpu();
    cpu.set_a(0x01);
    load(&cpu, 0, &[0xED, 0x44]); // NEG
    step(&mut cpu);
    assert_eq!(cpu.a(), 0xFF);
    assert!(cpu.f() & flags::NF != 0);
    assert!(cpu.f() & flags::CF != 0);
}

#[test]
fn test_ld_a_i_copies_iff2() {
    let mut cpu = test_cpu();
    cpu.i = 0x42;
    cpu.iff2 = true;
    load(&cpu, 0, &[0xED, 0x57]); // LD A,I
    assert_eq!(step(&mut cpu), 9);
    assert_eq!(cpu.a(), 0x42);
    assert!(cpu.f() & flags::PF != 0, "PF mirrors IFF2");
}

#[test]
fn test_rld() {
    let mut cpu = test_cpu();
    cpu.set_a(0x7A);
    cpu.hl = 0x5000;
    cpu.map.write8(0x5000, 0x31);
    load(&cpu, 0, &[0xED, 0x6F]); // RLD
    assert_eq!(step(&mut cpu), 18);
    assert_eq!(cpu.a(), 0x73);
    assert_eq!(cpu.map.read8(0x5000), 0x1A);
}

#[test]
fn test_r_increments_low_seven_bits() {
    let mut cpu = test_cpu();
    cpu.r = 0x7F;
    cpu.r2 = 0x80;
    load(&cpu, 0, &[0x00]); // NOP
    step(&mut cpu);
    assert_eq!(cpu.r & 0x7F, 0x00, "low 7 bits wrapped");
    assert_eq!(cpu.r_reg() & 0x80, 0x80, "bit 7 preserved from R2");
}

#[test]
fn test_indexed_load_and_cycles() {
    let mut cpu = test_cpu();
    cpu.ix = 0x2000;
    cpu.map.write8(0x2005, 0xAB);
    load(&cpu, 0, &[0xDD, 0x7E, 0x05]); // LD A,(IX+5)
    assert_eq!(step(&mut cpu), 19);
    assert_eq!(cpu.a(), 0xAB);
    assert_eq!(cpu.wz, 0x2005);
}

#[test]
fn test_indexed_negative_displacement() {
    let mut cpu = test_cpu();
    cpu.iy = 0x2000;
    cpu.map.write8(0x1FFE, 0x5C);
    load(&cpu, 0, &[0xFD, 0x46, 0xFE]); // LD B,(IY-2)
    step(&mut cpu);
    assert_eq!(cpu.b(), 0x5C);
}

#[test]
fn test_undocumented_ixh_ixl() {
    let mut cpu = test_cpu();
    cpu.ix = 0x12FF;
    load(&cpu, 0, &[0xDD, 0x24, 0xDD, 0x2D]); // INC IXH; DEC IXL
    step(&mut cpu);
    assert_eq!(cpu.ix, 0x13FF);
    step(&mut cpu);
    assert_eq!(cpu.ix, 0x13FE);
}

#[test]
fn test_indexed_cb_copies_result_to_register() {
    let mut cpu = test_cpu();
    cpu.ix = 0x3000;
    cpu.map.write8(0x3002, 0x01);
    load(&cpu, 0, &[0xDD, 0xCB, 0x02, 0x00]); // RLC (IX+2) -> B (undocumented)
    assert_eq!(step(&mut cpu), 23);
    assert_eq!(cpu.map.read8(0x3002), 0x02);
    assert_eq!(cpu.b(), 0x02);
}

#[test]
fn test_indexed_cb_bit_uses_address_high_byte() {
    let mut cpu = test_cpu();
    cpu.ix = 0x28F0;
    cpu.map.write8(0x28F2, 0xFF);
    load(&cpu, 0, &[0xDD, 0xCB, 0x02, 0x46]); // BIT 0,(IX+2)
    assert_eq!(step(&mut cpu), 20);
    // YF/XF come from the high byte of IX+d (0x28 has both set).
    assert!(cpu.f() & flags::YF != 0);
    assert!(cpu.f() & flags::XF != 0);
}

#[test]
fn test_push_pop_ix() {
    let mut cpu = test_cpu();
    cpu.sp = 0x8000;
    cpu.ix = 0xBEEF;
    load(&cpu, 0, &[0xDD, 0xE5, 0xFD, 0xE1]); // PUSH IX; POP IY
    assert_eq!(step(&mut cpu), 15);
    assert_eq!(step(&mut cpu), 14);
    assert_eq!(cpu.iy, 0xBEEF);
}

#[test]
fn test_scf_ccf_xf_yf_from_a() {
    let mut cpu = test_cpu();
    cpu.set_a(0x28);
    cpu.set_f(0);
    load(&cpu, 0, &[0x37, 0x3F]); // SCF; CCF
    step(&mut cpu);
    assert_flags(&cpu, flags::CF | flags::YF | flags::XF, "SCF");
    step(&mut cpu);
    assert_flags(&cpu, flags::HF | flags::YF | flags::XF, "CCF moves carry to HF");
}

#[test]
fn test_halt_burns_nop_slices() {
    let mut cpu = test_cpu();
    load(&cpu, 0, &[0x76]); // HALT
    step(&mut cpu);
    assert!(cpu.halted);
    assert_eq!(cpu.pc, 1);
    let before = cpu.current_cycle;
    cpu.run_to(before + 40);
    assert!(cpu.current_cycle >= before + 40);
    assert_eq!(cpu.pc, 1, "PC parked past the HALT opcode");
}

#[test]
fn test_deadline_overshoot_is_bounded() {
    let mut cpu = test_cpu();
    // EX (SP),HL is one of the longest single opcodes at 19 T-states.
    load(&cpu, 0, &[0xE3, 0xE3, 0xE3, 0xE3]);
    cpu.sp = 0x8000;
    cpu.run_to(20);
    assert!(cpu.current_cycle >= 20);
    assert!(cpu.current_cycle - 20 < 23, "overshoot below one opcode");
}

#[test]
fn test_snapshot_round_trip() {
    let mut cpu = test_cpu();
    load(&cpu, 0, &[0x06, 0x42, 0x0E, 0x17, 0xED, 0xA0]);
    cpu.hl = 0x2000;
    cpu.de = 0x3000;
    cpu.run_to(15);

    let snap = cpu.to_bytes();
    let mut other = test_cpu();
    other.from_bytes(&snap).unwrap();

    assert_eq!(other.pc, cpu.pc);
    assert_eq!(other.bc, cpu.bc);
    assert_eq!(other.current_cycle, cpu.current_cycle);
    assert_eq!(other.r, cpu.r);

    // The copies produce the same trace from the same deadline.
    for b in 0..6u16 {
        other.map.write8(b as u32, cpu.map.read8(b as u32));
    }
    cpu.run_to(60);
    other.run_to(60);
    assert_eq!(other.pc, cpu.pc);
    assert_eq!(other.current_cycle, cpu.current_cycle);
}

#[test]
fn test_snapshot_rejects_short_buffer() {
    let mut cpu = test_cpu();
    assert!(cpu.from_bytes(&[0u8; 8]).is_err());
}
