use tessera_core::chiplet::register::{
    BaseConversionRegister, FreePool, PhysicalRegister, RegisterKind,
};

#[test]
fn pool_hands_out_ids_in_order() {
    let pool = FreePool::with_ids(4);
    assert_eq!(pool.len(), 4);
    assert_eq!(pool.acquire(), Some(0));
    assert_eq!(pool.acquire(), Some(1));
    pool.release(0);
    assert_eq!(pool.acquire(), Some(2));
    assert_eq!(pool.acquire(), Some(3));
    // Released ids recycle at the back.
    assert_eq!(pool.acquire(), Some(0));
    assert_eq!(pool.acquire(), None);
}

#[test]
fn register_returns_to_pool_at_zero_references() {
    let pool = FreePool::with_ids(2);
    let reg = PhysicalRegister::pooled(RegisterKind::Vector, 0, pool.clone());
    assert_eq!(pool.acquire(), Some(0));
    assert_eq!(pool.len(), 1);

    reg.inc_reference();
    reg.inc_reference();
    reg.set_value_ready(true);
    reg.dec_reference();
    assert_eq!(pool.len(), 1, "register still referenced");
    reg.dec_reference();
    assert_eq!(pool.len(), 2, "register freed");
    assert!(!reg.value_ready(), "ready bit cleared on free");
}

#[test]
fn forwarding_registers_are_never_pooled() {
    let reg = PhysicalRegister::forwarding();
    assert_eq!(reg.kind(), RegisterKind::Forwarding);
    reg.inc_reference();
    reg.set_value_ready(true);
    reg.dec_reference();
    assert_eq!(reg.references(), 0);
}

#[test]
#[should_panic(expected = "reference count underflow")]
fn reference_underflow_panics() {
    let pool = FreePool::with_ids(1);
    let reg = PhysicalRegister::pooled(RegisterKind::Scalar, 0, pool);
    reg.dec_reference();
}

#[test]
fn bcvr_value_ready_tracks_write_budget() {
    let pool = FreePool::with_ids(1);
    let reg = BaseConversionRegister::new(0, pool);
    reg.assign_slot(1);
    reg.set_budgets(2, 1);
    assert!(!reg.value_ready());
    reg.execute_write();
    assert!(!reg.value_ready());
    reg.execute_write();
    assert!(reg.value_ready());
    assert!(!reg.is_completed());
    reg.execute_read();
    assert!(reg.is_completed());
}

#[test]
fn bcvr_releases_virtual_id_when_drained() {
    let pool = FreePool::with_ids(2);
    assert_eq!(pool.acquire(), Some(0));
    let reg = BaseConversionRegister::new(0, pool.clone());
    reg.inc_reference();
    reg.assign_slot(0);
    reg.set_budgets(1, 1);
    reg.execute_write();
    reg.execute_read();

    assert_eq!(pool.len(), 1);
    reg.dec_reference();
    assert_eq!(pool.len(), 2, "virtual id returned");
    assert!(!reg.has_slot());
    assert!(!reg.value_ready());
}

#[test]
#[should_panic(expected = "before value ready")]
fn bcvr_read_before_ready_panics() {
    let pool = FreePool::with_ids(1);
    let reg = BaseConversionRegister::new(0, pool);
    reg.assign_slot(0);
    reg.set_budgets(1, 1);
    reg.execute_read();
}

#[test]
#[should_panic(expected = "outstanding")]
fn bcvr_release_with_pending_writes_panics() {
    let pool = FreePool::with_ids(1);
    let reg = BaseConversionRegister::new(0, pool);
    reg.inc_reference();
    reg.set_budgets(1, 0);
    reg.dec_reference();
}
