mod common;

use common::{run_single, test_config};

#[test]
fn load_forwards_from_queued_store() {
    // The load of `b` hits the queued store and renames onto its register;
    // no backend request is issued for it.
    let report = run_single(
        "load r0: a\n\
         store r0: b\n\
         load r1: b\n",
    );
    let memory = &report.chiplets[0].memory;
    assert_eq!(memory.loads_issued, 1);
    assert_eq!(memory.stores_issued, 1);
}

#[test]
fn aliased_load_shares_the_physical_register() {
    let mut accelerator = common::build(
        &["load r0: a\n\
           store r0: b\n\
           load r1: b\n"],
        &test_config(1),
    );
    common::run_capped(&mut accelerator, 100_000);
    let chiplet = accelerator.chiplet(0);
    assert_eq!(chiplet.vector_mapping(0), chiplet.vector_mapping(1));
}

#[test]
fn load_forwards_from_queued_load() {
    let report = run_single(
        "load r0: a\n\
         load r1: a\n\
         store r0[X]: o0\n\
         store r1[X]: o1\n",
    );
    assert_eq!(report.chiplets[0].memory.loads_issued, 1);
    assert_eq!(report.chiplets[0].memory.stores_issued, 2);
}

#[test]
fn later_spill_quashes_queued_spill() {
    // Back-to-back spills to one address leave a single store-queue entry;
    // the quashed one never reaches the backend.
    let report = run_single(
        "load r0: a\n\
         spill r0: t\n\
         spill r0[X]: t\n",
    );
    assert_eq!(report.chiplets[0].memory.stores_issued, 1);
}

#[test]
fn later_store_quashes_queued_store() {
    let report = run_single(
        "load r0: a\n\
         load r1: b\n\
         store r0[X]: t\n\
         store r1[X]: t\n",
    );
    assert_eq!(report.chiplets[0].memory.stores_issued, 1);
}

#[test]
fn load_does_not_quash_queued_store() {
    // A load forwards from a store without cancelling it; only spills are
    // quashed by loads.
    let report = run_single(
        "load r0: a\n\
         store r0: t\n\
         load r1: t\n\
         store r1[X]: u\n",
    );
    assert_eq!(report.chiplets[0].memory.loads_issued, 1);
    assert_eq!(report.chiplets[0].memory.stores_issued, 2);
}

#[test]
fn load_quashes_queued_spill() {
    let report = run_single(
        "load r0: a\n\
         spill r0: t\n\
         load r1: t\n\
         store r1[X]: u\n",
    );
    // The spill is quashed by the aliasing load: only the original load
    // and the final store reach the backend.
    assert_eq!(report.chiplets[0].memory.loads_issued, 1);
    assert_eq!(report.chiplets[0].memory.stores_issued, 1);
}

#[test]
fn scalar_loads_bypass_the_memory_queues() {
    let report = run_single(
        "loas s0: scale\n\
         load r0: a\n\
         mul r1: r0[X], s0[X] | 0\n\
         store r1[X]: o\n",
    );
    let memory = &report.chiplets[0].memory;
    // Only the vector load and the store touch memory.
    assert_eq!(memory.loads_issued, 1);
    assert_eq!(memory.stores_issued, 1);
}

#[test]
fn registers_drain_after_dead_final_uses() {
    let mut accelerator = common::build(
        &["load r0: a\n\
           load r1: b\n\
           add r2: r0[X], r1[X] | 0\n\
           store r2[X]: c\n"],
        &test_config(1),
    );
    common::run_capped(&mut accelerator, 100_000);
    let chiplet = accelerator.chiplet(0);
    assert_eq!(chiplet.free_vector_registers(), 1024);
    assert_eq!(chiplet.vector_mapping(0), None);
    assert_eq!(chiplet.vector_mapping(2), None);
}
