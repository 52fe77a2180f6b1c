mod common;

use common::{build, run_capped, test_config};

#[test]
fn double_write_frees_the_earlier_register() {
    // r0 is written twice with no reader in between: the first physical
    // register is released as soon as its load lands.
    let mut accelerator = build(
        &["load r0: a\n\
           load r0: b\n"],
        &test_config(1),
    );
    run_capped(&mut accelerator, 100_000);
    let chiplet = accelerator.chiplet(0);
    assert_eq!(chiplet.free_vector_registers(), 1023);
    assert!(chiplet.vector_mapping(0).is_some());
}

#[test]
fn mov_aliases_without_a_new_register() {
    let mut accelerator = build(
        &["load r0: a\n\
           mov r1: r0\n"],
        &test_config(1),
    );
    run_capped(&mut accelerator, 100_000);
    let chiplet = accelerator.chiplet(0);
    assert_eq!(chiplet.free_vector_registers(), 1023);
    assert_eq!(chiplet.vector_mapping(0), chiplet.vector_mapping(1));
}

#[test]
fn mov_then_dead_reads_release_the_shared_register() {
    let mut accelerator = build(
        &["load r0: a\n\
           mov r1: r0\n\
           add r2: r0[X], r1[X] | 0\n\
           store r2[X]: o\n"],
        &test_config(1),
    );
    run_capped(&mut accelerator, 100_000);
    let chiplet = accelerator.chiplet(0);
    assert_eq!(chiplet.free_vector_registers(), 1024);
    assert_eq!(chiplet.vector_mapping(0), None);
    assert_eq!(chiplet.vector_mapping(1), None);
}

#[test]
fn dead_scalar_read_releases_the_register() {
    let mut accelerator = build(
        &["loas s0: scale\n\
           load r0: a\n\
           mul r1: r0[X], s0[X] | 0\n\
           store r1[X]: o\n"],
        &test_config(1),
    );
    run_capped(&mut accelerator, 100_000);
    let chiplet = accelerator.chiplet(0);
    assert_eq!(chiplet.free_scalar_registers(), 64);
    assert_eq!(chiplet.scalar_mapping(0), None);
    assert_eq!(chiplet.free_vector_registers(), 1024);
}

#[test]
fn rename_stalls_when_the_register_file_is_exhausted() {
    // Two vector registers, three loads of live values: the third load
    // cannot rename until something frees, and nothing ever does, so the
    // first two still complete and the dispatcher parks on the third.
    let config = test_config(1);
    let config = tessera_core::prelude::SimConfig {
        num_vector_regs: 2,
        ..config
    };
    let mut accelerator = build(
        &["load r0: a\n\
           load r1: b\n\
           load r2: c\n"],
        &config,
    );
    for _ in 0..10_000 {
        assert!(!accelerator.tick().expect("simulation error"), "must not finish");
    }
    let chiplet = accelerator.chiplet(0);
    assert_eq!(chiplet.free_vector_registers(), 0);
    assert_eq!(chiplet.vector_mapping(2), None);
    assert_eq!(chiplet.memory_unit().stats().loads_issued, 2);
}
