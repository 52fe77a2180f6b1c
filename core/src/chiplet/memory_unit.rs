use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, trace};

use crate::Cycle;
use crate::core::memory::{AccessKind, MemoryBackend, MemoryRequest, RequestId};
use crate::core::stats::MemoryUnitStats;
use crate::isa::opcode::OpCode;

use super::instruction::MemoryOp;
use super::register::PhysicalRegister;

/// One in-flight instruction window: a load or store that has been split
/// into chunk requests and is waiting for all of them to return.
#[derive(Default)]
struct RequestSlot {
    bytes_processed: usize,
    request_size: usize,
    issued_at: Cycle,
    response_received: bool,
    busy_with: Option<Rc<MemoryOp>>,
}

/// The chiplet's load/store engine.
///
/// Two FIFOs feed a small window of concurrent instruction slots; each
/// issued instruction fans out into fixed-width chunk requests against the
/// memory backend. The alias tables let the dispatcher forward a queued
/// store's (or load's) register to a later load without touching memory,
/// and let later stores cancel queued spills.
pub struct MemoryUnit {
    name: String,
    load_queue: Vec<Rc<MemoryOp>>,
    store_queue: Vec<Rc<MemoryOp>>,
    backend: Box<dyn MemoryBackend>,
    request_width: usize,
    slots: Vec<RequestSlot>,
    outstanding: HashMap<RequestId, usize>,
    next_request_id: RequestId,
    completed_scratch: Vec<RequestId>,
    stats: MemoryUnitStats,
}

impl MemoryUnit {
    pub fn new(
        name: impl Into<String>,
        backend: Box<dyn MemoryBackend>,
        request_width: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            name: name.into(),
            load_queue: Vec::new(),
            store_queue: Vec::new(),
            backend,
            request_width,
            slots: (0..concurrency).map(|_| RequestSlot::default()).collect(),
            outstanding: HashMap::new(),
            next_request_id: 0,
            completed_scratch: Vec::new(),
            stats: MemoryUnitStats::default(),
        }
    }

    pub fn add_to_load_queue(&mut self, instruction: Rc<MemoryOp>) {
        self.load_queue.push(instruction);
    }

    pub fn add_to_store_queue(&mut self, instruction: Rc<MemoryOp>) {
        self.store_queue.push(instruction);
    }

    /// Newest-first scan of the store queue for an instruction at `addr`.
    ///
    /// A hit hands back the queued instruction's register so the caller
    /// can rename onto it. Spills are always quashed on a hit; stores are
    /// quashed too when `quash_aliasing_store` is set (a later store to
    /// the same address makes them dead).
    pub fn find_store_alias(
        &mut self,
        addr: u64,
        quash_aliasing_store: bool,
    ) -> Option<Rc<PhysicalRegister>> {
        let idx = self
            .store_queue
            .iter()
            .rposition(|instruction| instruction.addr() == addr)?;
        let instruction = self.store_queue[idx].clone();
        let reg = instruction.reg().clone();
        debug!("{}: store alias for {addr:#x}: `{instruction}`", self.name);
        if quash_aliasing_store || instruction.opcode() == OpCode::Spill {
            instruction.quash();
            self.store_queue.remove(idx);
            debug!("{}: quashed `{instruction}`", self.name);
        }
        Some(reg)
    }

    /// Newest-first scan of the load queue; no mutation on hit.
    pub fn find_load_alias(&self, addr: u64) -> Option<Rc<PhysicalRegister>> {
        self.load_queue
            .iter()
            .rev()
            .find(|instruction| instruction.addr() == addr)
            .map(|instruction| instruction.reg().clone())
    }

    fn issue_chunks(&mut self, slot: usize, instruction: &MemoryOp) {
        let kind = if instruction.is_load() {
            AccessKind::Read
        } else {
            AccessKind::Write
        };
        let mut offset = 0;
        while offset < instruction.size() {
            let id = self.next_request_id;
            self.next_request_id += 1;
            self.outstanding.insert(id, slot);
            self.backend.send(MemoryRequest {
                id,
                addr: instruction.addr() + offset as u64,
                width: self.request_width,
                kind,
            });
            offset += self.request_width;
        }
        self.slots[slot].request_size = instruction.size();
        self.slots[slot].bytes_processed = 0;
        if instruction.is_load() {
            self.stats.loads_issued += 1;
        } else {
            self.stats.stores_issued += 1;
        }
    }

    fn operate_queue(&mut self, cycle: Cycle, is_load_queue: bool) {
        for slot in 0..self.slots.len() {
            if self.slots[slot].busy_with.is_some() {
                continue;
            }
            let queue = if is_load_queue {
                &self.load_queue
            } else {
                &self.store_queue
            };
            let Some(idx) = queue.iter().position(|instruction| {
                debug_assert!(!instruction.is_quashed());
                instruction.all_operands_ready()
            }) else {
                return;
            };
            let instruction = if is_load_queue {
                self.load_queue.remove(idx)
            } else {
                self.store_queue.remove(idx)
            };
            debug!("{}: {cycle} issuing `{instruction}`", self.name);
            assert!(
                instruction.opcode() != OpCode::LoadS,
                "{}: scalar load reached the memory queues",
                self.name
            );
            self.issue_chunks(slot, &instruction);
            self.slots[slot].issued_at = cycle;
            self.slots[slot].response_received = false;
            self.slots[slot].busy_with = Some(instruction);
        }
    }

    fn handle_response(&mut self, id: RequestId, cycle: Cycle) {
        let Some(slot) = self.outstanding.remove(&id) else {
            panic!("{}: response for unknown request {id}", self.name);
        };
        let slot_state = &mut self.slots[slot];
        slot_state.bytes_processed += self.request_width;
        if slot_state.bytes_processed >= slot_state.request_size && !slot_state.response_received {
            slot_state.response_received = true;
            let latency = cycle - slot_state.issued_at;
            self.stats.total_latency += latency;
            self.stats.max_latency = self.stats.max_latency.max(latency);
            trace!("{}: {cycle} all chunks landed for slot {slot} ({latency} cycles)", self.name);
        }
    }

    pub fn execute_cycle_begin(&mut self, cycle: Cycle) {
        let mut completed = std::mem::take(&mut self.completed_scratch);
        completed.clear();
        self.backend.poll_completed(cycle, &mut completed);
        for id in completed.drain(..) {
            self.handle_response(id, cycle);
        }
        self.completed_scratch = completed;

        self.operate_queue(cycle, true);
        self.operate_queue(cycle, false);

        self.stats.total_cycles += 1;
        if self.slots.iter().any(|slot| slot.busy_with.is_some()) {
            self.stats.busy_cycles += 1;
        }
    }

    pub fn execute_cycle_end(&mut self, cycle: Cycle) {
        let name = &self.name;
        for slot in &mut self.slots {
            if slot.response_received {
                let instruction = slot
                    .busy_with
                    .take()
                    .unwrap_or_else(|| panic!("{name}: slot completed with no instruction bound"));
                instruction.complete_execution();
                debug!("{name}: {cycle} completed `{instruction}`");
                slot.response_received = false;
            }
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.load_queue.is_empty()
            && self.store_queue.is_empty()
            && self.slots.iter().all(|slot| slot.busy_with.is_none())
    }

    pub fn load_queue_len(&self) -> usize {
        self.load_queue.len()
    }

    pub fn store_queue_len(&self) -> usize {
        self.store_queue.len()
    }

    pub fn outstanding_requests(&self) -> usize {
        self.outstanding.len()
    }

    pub fn stats(&self) -> MemoryUnitStats {
        self.stats
    }
}
