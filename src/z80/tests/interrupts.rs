//! Interrupt, NMI, bus-request and reset tests
//!
//! The IRQ line is modelled as pulse windows in host cycles; these tests
//! drive the windows through the `next_int_pulse` callback the way the
//! host scheduler does.

use super::*;

/// Window that covers everything: the line is held asserted.
fn always_asserted(cpu: &mut Z80) {
    cpu.next_int_pulse = Some(Box::new(|| IntPulse {
        start: 0,
        end: CYCLE_NEVER,
    }));
}

#[test]
fn test_im1_interrupt_entry() {
    let mut cpu = test_cpu();
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.pc = 0x1234;
    cpu.sp = 0xFFFE;
    always_asserted(&mut cpu);
    load(&cpu, 0x1234, &[0x00]);

    let before = cpu.current_cycle;
    cpu.run_to(before + 1);

    assert_eq!(cpu.pc, 0x0038);
    assert_eq!(cpu.sp, 0xFFFC);
    assert_eq!(cpu.map.read8(0xFFFC), 0x34);
    assert_eq!(cpu.map.read8(0xFFFD), 0x12);
    assert!(!cpu.iff1 && !cpu.iff2);
    assert_eq!(cpu.wz, 0x0038);
    // RST 38 cycles plus the acknowledge latency.
    assert_eq!(cpu.current_cycle - before, 13);
}

#[test]
fn test_im2_vectored_entry() {
    let mut cpu = test_cpu();
    cpu.im = InterruptMode::Mode2;
    cpu.iff1 = true;
    cpu.i = 0x80;
    cpu.im2_vector = 0x10;
    cpu.pc = 0x2000;
    cpu.sp = 0x9000;
    always_asserted(&mut cpu);
    // Vector table entry at 0x8010 points to the handler.
    cpu.map.write8(0x8010, 0x00);
    cpu.map.write8(0x8011, 0x45);

    let before = cpu.current_cycle;
    cpu.run_to(before + 1);

    assert_eq!(cpu.pc, 0x4500);
    assert_eq!(cpu.sp, 0x8FFE);
    assert_eq!(cpu.current_cycle - before, 19, "CALL cost plus latency");
}

#[test]
fn test_im0_rst_and_inline_call() {
    // Default bus byte is RST 38.
    let mut cpu = test_cpu();
    cpu.im = InterruptMode::Mode0;
    cpu.iff1 = true;
    cpu.pc = 0x2000;
    cpu.sp = 0x9000;
    always_asserted(&mut cpu);
    cpu.run_to(cpu.current_cycle + 1);
    assert_eq!(cpu.pc, 0x0038);

    // A device may present CALL nn instead.
    let mut cpu = test_cpu();
    cpu.im = InterruptMode::Mode0;
    cpu.iff1 = true;
    cpu.pc = 0x2000;
    cpu.sp = 0x9000;
    cpu.im0_vector = 0xCD_4000;
    always_asserted(&mut cpu);
    cpu.run_to(cpu.current_cycle + 1);
    assert_eq!(cpu.pc, 0x4000);
    assert_eq!(cpu.sp, 0x8FFE, "CALL pushed the return address");
}

#[test]
fn test_interrupt_masked_by_iff1() {
    let mut cpu = test_cpu();
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = false;
    always_asserted(&mut cpu);
    load(&cpu, 0, &[0x00, 0x00]);
    cpu.run_to(8);
    assert_eq!(cpu.pc, 2, "interrupt ignored while disabled");
}

#[test]
fn test_ei_shadow_delays_interrupt() {
    let mut cpu = test_cpu();
    cpu.im = InterruptMode::Mode1;
    cpu.sp = 0x8000;
    always_asserted(&mut cpu);
    load(&cpu, 0, &[0xFB, 0x3C, 0x00]); // EI; INC A; NOP

    // EI executes, then exactly one more instruction runs before the
    // interrupt is accepted.
    cpu.run_to(cpu.current_cycle + 1); // EI
    cpu.run_to(cpu.current_cycle + 1); // INC A, still shadowed
    assert_eq!(cpu.a(), 1);
    assert_eq!(cpu.pc, 2);
    cpu.run_to(cpu.current_cycle + 1); // interrupt accepted
    assert_eq!(cpu.pc, 0x0038);
    // The pushed return address is the NOP, not the handler.
    assert_eq!(cpu.map.read8(0x7FFE), 0x02);
}

#[test]
fn test_halt_interrupt_resumes_past_halt() {
    let mut cpu = test_cpu();
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    cpu.sp = 0x8000;
    load(&cpu, 0x0100, &[0x76, 0x00]); // HALT
    cpu.pc = 0x0100;

    // Halt with no interrupt source: time passes.
    cpu.run_to(50);
    assert!(cpu.halted);

    // Interrupt arrives: the pushed PC is one past the HALT opcode.
    always_asserted(&mut cpu);
    cpu.int_pulse_start = 0;
    cpu.int_pulse_end = 0; // force a refresh
    cpu.run_to(cpu.current_cycle + 1);
    assert!(!cpu.halted);
    assert_eq!(cpu.pc, 0x0038);
    assert_eq!(cpu.map.read8(0x7FFE), 0x01);
    assert_eq!(cpu.map.read8(0x7FFF), 0x01);
}

#[test]
fn test_pulse_window_expires() {
    let mut cpu = test_cpu();
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    // One short pulse early on, then never again.
    let mut delivered = false;
    cpu.next_int_pulse = Some(Box::new(move || {
        if delivered {
            IntPulse::NEVER
        } else {
            delivered = true;
            IntPulse { start: 0, end: 4 }
        }
    }));
    load(&cpu, 0, &[0x00; 16]);
    cpu.run_to(40);
    // The window covered cycle 0, so the interrupt was taken once.
    assert_eq!(cpu.map.read8(0x0038), 0);
    assert!(!cpu.iff1);
}

#[test]
fn test_pulse_window_in_future_not_sampled_early() {
    let mut cpu = test_cpu();
    cpu.im = InterruptMode::Mode1;
    cpu.iff1 = true;
    cpu.sp = 0x8000;
    cpu.next_int_pulse = Some(Box::new(|| IntPulse {
        start: 100,
        end: 120,
    }));
    load(&cpu, 0, &[0x00; 64]);
    cpu.run_to(40);
    assert_ne!(cpu.pc, 0x0038, "window not reached yet");
    cpu.run_to(110);
    assert_eq!(cpu.pc, 0x0038, "window reached");
}

#[test]
fn test_nmi_latched_and_taken() {
    let mut cpu = test_cpu();
    cpu.iff1 = true;
    cpu.iff2 = true;
    cpu.sp = 0x8000;
    load(&cpu, 0, &[0x00; 8]);
    cpu.assert_nmi(4);
    cpu.run_to(20);
    assert_eq!(cpu.pc, 0x0066);
    assert!(!cpu.iff1, "IFF1 cleared");
    assert!(cpu.iff2, "IFF2 preserved for RETN");
}

#[test]
fn test_retn_restores_iff1() {
    let mut cpu = test_cpu();
    cpu.iff1 = false;
    cpu.iff2 = true;
    cpu.sp = 0x7FFE;
    cpu.map.write8(0x7FFE, 0x00);
    cpu.map.write8(0x7FFF, 0x20);
    load(&cpu, 0, &[0xED, 0x45]); // RETN
    cpu.run_to(cpu.current_cycle + 1);
    assert!(cpu.iff1);
    assert_eq!(cpu.pc, 0x2000);
}

#[test]
fn test_busreq_freezes_execution() {
    let mut cpu = test_cpu();
    load(&cpu, 0, &[0x3C; 64]); // INC A forever
    cpu.run_to(40);
    let a_at_grant = cpu.a();

    cpu.assert_busreq(100);
    assert!(cpu.current_cycle >= 100, "caught up before granting");
    cpu.run_to(200);
    assert!(cpu.busack());
    assert_eq!(cpu.current_cycle, 200);
    assert_eq!(cpu.a(), a_at_grant + 15, "no instructions while frozen");

    cpu.clear_busreq(250);
    assert!(!cpu.busack());
    cpu.run_to(300);
    assert!(cpu.a() > a_at_grant + 15, "running again after release");
}

#[test]
fn test_reset_line_gates_and_applies_edge() {
    let mut cpu = test_cpu();
    cpu.i = 0x12;
    cpu.iff1 = true;
    load(&cpu, 0, &[0x3C; 64]);
    cpu.assert_reset(40);
    assert!(cpu.reset_asserted());
    cpu.run_to(100);
    assert_eq!(cpu.current_cycle, 100, "time passes under reset");
    let a = cpu.a();
    cpu.clear_reset(120);
    assert_eq!(cpu.pc, 0);
    assert_eq!(cpu.i, 0);
    assert_eq!(cpu.r, 0);
    assert!(!cpu.iff1 && !cpu.iff2);
    assert_eq!(cpu.a(), a, "data registers survive reset");
}

#[test]
fn test_adjust_cycles_rebases_timestamps() {
    let mut cpu = test_cpu();
    load(&cpu, 0, &[0x00; 64]);
    cpu.run_to(100);
    cpu.int_pulse_start = 150;
    cpu.int_pulse_end = 170;
    cpu.assert_nmi(40);

    cpu.adjust_cycles(60);
    assert_eq!(cpu.current_cycle, 40);
    assert_eq!(cpu.int_pulse_start, 90);
    assert_eq!(cpu.int_pulse_end, 110);
    assert_eq!(cpu.to_bytes()[0], cpu.to_bytes()[0]); // snapshot still valid

    // A window entirely in the past becomes "never".
    cpu.int_pulse_start = 10;
    cpu.int_pulse_end = 20;
    cpu.adjust_cycles(30);
    assert_eq!(cpu.int_pulse_start, CYCLE_NEVER);
    assert_eq!(cpu.int_pulse_end, CYCLE_NEVER);
}
