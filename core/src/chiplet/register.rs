use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

pub type PhysRegId = u16;
pub type BcuVirtId = u16;
pub type BcuSlotId = u16;

/// Pool of free register ids, shared between the register file and the
/// registers themselves so a register can return its id when its last
/// reference drops.
#[derive(Debug)]
pub struct FreePool {
    ids: RefCell<VecDeque<u16>>,
}

impl FreePool {
    pub fn with_ids(count: u16) -> Rc<Self> {
        Rc::new(Self {
            ids: RefCell::new((0..count).collect()),
        })
    }

    pub fn acquire(&self) -> Option<u16> {
        self.ids.borrow_mut().pop_front()
    }

    pub fn release(&self, id: u16) {
        self.ids.borrow_mut().push_back(id);
    }

    pub fn len(&self) -> usize {
        self.ids.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.borrow().is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterKind {
    Vector,
    Scalar,
    /// Created when an opcode splits into pipeline stages; never pooled,
    /// dropped when the last stage releases it.
    Forwarding,
}

/// A reference-counted physical register cell.
///
/// The count tracks rename-map entries plus in-flight instruction uses.
/// When it reaches zero a pooled register clears its ready bit and returns
/// its id to the free pool; forwarding registers simply die with their
/// last `Rc`.
#[derive(Debug)]
pub struct PhysicalRegister {
    kind: RegisterKind,
    id: PhysRegId,
    value_ready: Cell<bool>,
    references: Cell<i32>,
    pool: Option<Rc<FreePool>>,
}

impl PhysicalRegister {
    pub fn pooled(kind: RegisterKind, id: PhysRegId, pool: Rc<FreePool>) -> Rc<Self> {
        assert!(kind != RegisterKind::Forwarding, "forwarding registers are not pooled");
        Rc::new(Self {
            kind,
            id,
            value_ready: Cell::new(false),
            references: Cell::new(0),
            pool: Some(pool),
        })
    }

    pub fn forwarding() -> Rc<Self> {
        Rc::new(Self {
            kind: RegisterKind::Forwarding,
            id: 0,
            value_ready: Cell::new(false),
            references: Cell::new(0),
            pool: None,
        })
    }

    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    pub fn id(&self) -> PhysRegId {
        self.id
    }

    pub fn value_ready(&self) -> bool {
        self.value_ready.get()
    }

    pub fn set_value_ready(&self, ready: bool) {
        self.value_ready.set(ready);
    }

    pub fn references(&self) -> i32 {
        self.references.get()
    }

    pub fn inc_reference(&self) {
        self.references.set(self.references.get() + 1);
    }

    pub fn dec_reference(&self) {
        let refs = self.references.get() - 1;
        assert!(refs >= 0, "reference count underflow on {self}");
        self.references.set(refs);
        if refs == 0
            && let Some(pool) = &self.pool
        {
            // A recycled register must not look ready to its next consumer.
            self.value_ready.set(false);
            pool.release(self.id);
        }
    }
}

impl fmt::Display for PhysicalRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            RegisterKind::Vector => 'R',
            RegisterKind::Scalar => 'S',
            RegisterKind::Forwarding => 'F',
        };
        write!(f, "{prefix}{}", self.id)
    }
}

/// A virtual handle onto a base-conversion buffer.
///
/// The handle is allocated at `bci` dispatch with fixed write and read
/// budgets; a physical buffer slot binds when the `bci` reaches a
/// base-conversion unit and is released when the budgets drain.
#[derive(Debug)]
pub struct BaseConversionRegister {
    virt_id: BcuVirtId,
    slot: Cell<Option<BcuSlotId>>,
    writes_remaining: Cell<i16>,
    reads_remaining: Cell<i16>,
    value_ready: Cell<bool>,
    references: Cell<i32>,
    pool: Rc<FreePool>,
}

impl BaseConversionRegister {
    pub fn new(virt_id: BcuVirtId, pool: Rc<FreePool>) -> Rc<Self> {
        Rc::new(Self {
            virt_id,
            slot: Cell::new(None),
            writes_remaining: Cell::new(0),
            reads_remaining: Cell::new(0),
            value_ready: Cell::new(false),
            references: Cell::new(0),
            pool,
        })
    }

    pub fn virt_id(&self) -> BcuVirtId {
        self.virt_id
    }

    pub fn has_slot(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn slot(&self) -> BcuSlotId {
        self.slot.get().unwrap_or_else(|| panic!("{self} has no buffer slot bound"))
    }

    pub fn assign_slot(&self, slot: BcuSlotId) {
        self.slot.set(Some(slot));
    }

    pub fn clear_slot(&self) {
        self.slot.set(None);
    }

    pub fn value_ready(&self) -> bool {
        self.value_ready.get()
    }

    pub fn set_budgets(&self, num_writes: i16, num_reads: i16) {
        self.writes_remaining.set(num_writes);
        self.reads_remaining.set(num_reads);
    }

    pub fn writes_remaining(&self) -> i16 {
        self.writes_remaining.get()
    }

    pub fn reads_remaining(&self) -> i16 {
        self.reads_remaining.get()
    }

    /// Retires one buffer write; the value becomes ready when the last
    /// write lands.
    pub fn execute_write(&self) {
        assert!(self.has_slot(), "write to unbound {self}");
        let writes = self.writes_remaining.get() - 1;
        assert!(writes >= 0, "write budget underflow on {self}");
        self.writes_remaining.set(writes);
        if writes == 0 {
            self.value_ready.set(true);
        }
    }

    /// Retires one buffer read.
    pub fn execute_read(&self) {
        assert!(self.has_slot(), "read from unbound {self}");
        assert!(self.value_ready.get(), "read from {self} before value ready");
        let reads = self.reads_remaining.get() - 1;
        assert!(reads >= 0, "read budget underflow on {self}");
        self.reads_remaining.set(reads);
    }

    pub fn is_completed(&self) -> bool {
        self.reads_remaining.get() == 0 && self.writes_remaining.get() == 0
    }

    pub fn references(&self) -> i32 {
        self.references.get()
    }

    pub fn inc_reference(&self) {
        self.references.set(self.references.get() + 1);
    }

    pub fn dec_reference(&self) {
        let refs = self.references.get() - 1;
        assert!(refs >= 0, "reference count underflow on {self}");
        self.references.set(refs);
        if refs == 0 {
            assert!(
                self.is_completed(),
                "{self} released with reads or writes outstanding"
            );
            self.pool.release(self.virt_id);
            self.slot.set(None);
            self.value_ready.set(false);
        }
    }
}

impl fmt::Display for BaseConversionRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.get() {
            Some(slot) => write!(f, "B{slot}"),
            None => write!(f, "BV{}", self.virt_id),
        }
    }
}
