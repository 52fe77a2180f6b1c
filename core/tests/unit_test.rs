use std::rc::Rc;

use tessera_core::Cycle;
use tessera_core::chiplet::instruction::{BciOp, Instruction};
use tessera_core::chiplet::register::{BaseConversionRegister, FreePool, PhysicalRegister};
use tessera_core::chiplet::unit::{BaseConversionUnit, FunctionalUnit};
use tessera_core::core::interval::Interval;

const VD: Cycle = 4;

fn evg_to(dest: &Rc<PhysicalRegister>) -> Rc<Instruction> {
    dest.inc_reference();
    Rc::new(Instruction::Evg {
        dest: dest.clone(),
        limb: 0,
    })
}

fn step(unit: &mut FunctionalUnit, cycle: Cycle) {
    unit.execute_cycle_begin(cycle);
    unit.execute_cycle_end(cycle);
}

#[test]
fn value_ready_after_latency() {
    let mut unit = FunctionalUnit::new("fu", 5, VD, VD);
    let dest = PhysicalRegister::forwarding();
    let instruction = evg_to(&dest);
    unit.add_reservation(Interval::new(0, VD - 1 + 5, instruction));

    // Issued at cycle 0; the output is ready after `latency` end phases.
    for cycle in 0..4 {
        step(&mut unit, cycle);
        assert!(!dest.value_ready(), "ready too early at cycle {cycle}");
    }
    step(&mut unit, 4);
    assert!(dest.value_ready());
    assert!(!unit.okay_to_finish(), "reservation still occupies the unit");

    for cycle in 5..=(VD - 1 + 5) {
        step(&mut unit, cycle);
    }
    assert!(unit.okay_to_finish());
}

#[test]
fn reservation_blocks_overlapping_probe() {
    let mut unit = FunctionalUnit::new("fu", 1, VD, VD);
    let dest = PhysicalRegister::forwarding();
    unit.add_reservation(Interval::new(10, 10 + VD - 1, evg_to(&dest)));
    assert!(!unit.is_reservable(0, 10));
    assert!(!unit.is_reservable(13, 20));
    assert!(unit.is_reservable(0, 9));
    assert!(unit.is_reservable(14, 20));
}

#[test]
fn future_reservation_waits_for_start() {
    let mut unit = FunctionalUnit::new("fu", 1, VD, VD);
    let dest = PhysicalRegister::forwarding();
    unit.add_reservation(Interval::new(3, 3 + VD - 1, evg_to(&dest)));
    for cycle in 0..3 {
        step(&mut unit, cycle);
        assert!(!dest.value_ready());
    }
    step(&mut unit, 3);
    assert!(dest.value_ready());
}

#[test]
fn back_to_back_reservations_issue_in_order() {
    let mut unit = FunctionalUnit::new("fu", 1, VD, VD);
    let first = PhysicalRegister::forwarding();
    let second = PhysicalRegister::forwarding();
    unit.add_reservation(Interval::new(0, VD - 1, evg_to(&first)));
    unit.add_reservation(Interval::new(VD, 2 * VD - 1, evg_to(&second)));

    for cycle in 0..VD {
        step(&mut unit, cycle);
    }
    assert!(first.value_ready());
    assert!(!second.value_ready());
    for cycle in VD..2 * VD {
        step(&mut unit, cycle);
    }
    assert!(second.value_ready());
    assert!(unit.okay_to_finish());
}

#[test]
#[should_panic(expected = "missed its start")]
fn missed_reservation_is_fatal() {
    let mut unit = FunctionalUnit::new("fu", 1, VD, VD);
    let dest = PhysicalRegister::forwarding();
    unit.add_reservation(Interval::new(0, VD - 1, evg_to(&dest)));
    // First tick arrives after the reserved start cycle.
    unit.execute_cycle_begin(1);
}

#[test]
#[should_panic(expected = "not ready at reserved cycle")]
fn unready_operands_at_issue_are_fatal() {
    let mut unit = FunctionalUnit::new("fu", 1, VD, VD);
    let src = PhysicalRegister::forwarding();
    let dest = PhysicalRegister::forwarding();
    src.inc_reference();
    dest.inc_reference();
    let instruction = Rc::new(Instruction::UnOp {
        op: tessera_core::isa::opcode::OpCode::Neg,
        rot_index: None,
        dest,
        src,
        limb: 0,
    });
    unit.add_reservation(Interval::new(0, VD - 1, instruction));
    unit.execute_cycle_begin(0);
}

#[test]
fn utilisation_counts_busy_cycles() {
    let mut unit = FunctionalUnit::new("fu", 2, VD, VD);
    let dest = PhysicalRegister::forwarding();
    unit.add_reservation(Interval::new(0, VD + 1, evg_to(&dest)));
    for cycle in 0..20 {
        step(&mut unit, cycle);
    }
    let stats = unit.stats();
    assert_eq!(stats.total_cycles, 20);
    // In process for latency + VD - 1 cycles from issue.
    assert_eq!(stats.busy_cycles, 2 + VD - 1);
    assert_eq!(stats.issue_cycles, VD);
}

#[test]
fn buffer_unit_holds_one_init_until_drained() {
    let pool = FreePool::with_ids(1);
    assert_eq!(pool.acquire(), Some(0));
    let reg = BaseConversionRegister::new(0, pool.clone());
    reg.inc_reference(); // rename-map hold
    reg.set_budgets(1, 1);
    reg.inc_reference(); // bci hold
    let bci = BciOp::new(reg.clone());

    let mut unit = BaseConversionUnit::new("bcu0", 7);
    assert!(!unit.is_busy());
    unit.init_instruction(0, bci);
    assert!(unit.is_busy());
    assert_eq!(reg.slot(), 7);

    unit.execute_cycle_end(0);
    assert!(unit.is_busy(), "writes still outstanding");

    reg.execute_write();
    unit.execute_cycle_end(1);
    assert!(unit.is_busy(), "reads still outstanding");

    reg.execute_read();
    unit.execute_cycle_end(2);
    assert!(!unit.is_busy());
    assert!(!reg.has_slot(), "slot released at completion");

    // The rename map still holds the last reference.
    assert_eq!(pool.len(), 0);
    reg.dec_reference();
    assert_eq!(pool.len(), 1);
}
