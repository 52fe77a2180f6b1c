use std::rc::Rc;

use log::trace;

use crate::Cycle;
use crate::core::interval::{DisjointIntervalSet, Interval};
use crate::core::stats::{FunctionalUnitReport, FunctionalUnitStats};

use super::instruction::{BciOp, Instruction};
use super::register::BcuSlotId;

pub type InstructionInterval = Interval<Rc<Instruction>>;

/// A pipelined functional unit.
///
/// Queues book disjoint `[start, end]` reservations; the unit issues the
/// front reservation when its start cycle arrives. Two countdown lists
/// track each issued instruction: `busy_with` until its value is ready at
/// the unit output (the unit latency) and `in_process` until the pipeline
/// is clear of it (latency + vector depth − 1). While `consuming_cycles`
/// is non-zero the input port is still streaming limbs of the previous
/// issue and nothing new may enter.
pub struct FunctionalUnit {
    name: String,
    latency: Cycle,
    /// Input-port occupancy per issue; vector depth for most units, wider
    /// for base-conversion reads and resolve/mod-switch pipelines.
    burst: Cycle,
    vec_depth: Cycle,
    reservations: DisjointIntervalSet<Rc<Instruction>>,
    front_issued: bool,
    busy_with: Vec<(Rc<Instruction>, Cycle)>,
    in_process: Vec<(Rc<Instruction>, Cycle)>,
    consuming_cycles: Cycle,
    stats: FunctionalUnitStats,
}

impl FunctionalUnit {
    pub fn new(name: impl Into<String>, latency: Cycle, burst: Cycle, vec_depth: Cycle) -> Self {
        Self {
            name: name.into(),
            latency,
            burst,
            vec_depth,
            reservations: DisjointIntervalSet::new(),
            front_issued: false,
            busy_with: Vec::new(),
            in_process: Vec::new(),
            consuming_cycles: 0,
            stats: FunctionalUnitStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_reservable(&self, start: Cycle, end: Cycle) -> bool {
        !self.reservations.has_overlap_range(start, end)
    }

    /// Books a reservation. Callers must probe with
    /// [`is_reservable`](Self::is_reservable) first; booking an
    /// overlapping interval is a scheduling bug and panics.
    pub fn add_reservation(&mut self, interval: InstructionInterval) {
        self.reservations.insert(interval);
    }

    pub fn execute_cycle_begin(&mut self, cycle: Cycle) {
        if self.consuming_cycles > 0 {
            self.consuming_cycles -= 1;
        }

        let Some(front) = self.reservations.front() else {
            return;
        };
        if self.front_issued || front.start() > cycle {
            return;
        }
        assert!(
            front.start() == cycle,
            "{}: reservation {} missed its start at cycle {}",
            self.name,
            front,
            cycle
        );

        let instruction = front.value().clone();
        assert!(
            instruction.all_operands_ready(),
            "{}: operands of `{instruction}` not ready at reserved cycle {cycle}",
            self.name
        );
        assert!(
            self.consuming_cycles == 0,
            "{}: `{instruction}` issued while input port busy at cycle {cycle}",
            self.name
        );

        trace!("{}: {cycle} issuing `{instruction}`", self.name);
        self.busy_with.push((instruction.clone(), self.latency));
        self.in_process
            .push((instruction, self.latency + self.vec_depth - 1));
        self.consuming_cycles = self.burst;
        self.stats.issue_cycles += self.burst;
        self.front_issued = true;
    }

    /// Returns the busy-cycle contribution to hand to the owning chiplet
    /// (vector depth per drained reservation).
    pub fn execute_cycle_end(&mut self, cycle: Cycle) -> Cycle {
        self.stats.total_cycles += 1;
        if !self.in_process.is_empty() {
            self.stats.busy_cycles += 1;
        }

        let name = &self.name;
        self.busy_with.retain_mut(|(instruction, cycles_to_ready)| {
            *cycles_to_ready -= 1;
            if *cycles_to_ready == 0 {
                trace!("{name}: {cycle} `{instruction}` value ready");
                instruction.complete_execution();
                false
            } else {
                true
            }
        });
        self.in_process.retain_mut(|(_, cycles_to_clear)| {
            *cycles_to_clear -= 1;
            *cycles_to_clear != 0
        });

        let front_ends_now = self
            .reservations
            .front()
            .is_some_and(|front| front.end() == cycle);
        if front_ends_now {
            self.reservations.pop_front();
            self.front_issued = false;
            self.vec_depth
        } else {
            0
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.reservations.is_empty() && self.busy_with.is_empty()
    }

    pub fn stats(&self) -> FunctionalUnitStats {
        self.stats
    }

    pub fn report(&self) -> FunctionalUnitReport {
        FunctionalUnitReport {
            name: self.name.clone(),
            stats: self.stats,
            utilisation: self.stats.utilisation(),
            issue_rate: self.stats.issue_rate(),
        }
    }
}

/// A base-conversion buffer unit.
///
/// Non-pipelined: it hosts one `bci` at a time, binding the instruction's
/// virtual register to this unit's physical slot. The instruction retires
/// when every write into and read out of the buffer has drained.
pub struct BaseConversionUnit {
    name: String,
    slot: BcuSlotId,
    busy_with: Option<Rc<BciOp>>,
}

impl BaseConversionUnit {
    pub fn new(name: impl Into<String>, slot: BcuSlotId) -> Self {
        Self {
            name: name.into(),
            slot,
            busy_with: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy_with.is_some()
    }

    pub fn init_instruction(&mut self, cycle: Cycle, instruction: Rc<BciOp>) {
        assert!(
            self.busy_with.is_none(),
            "{}: second bci bound while busy at cycle {cycle}",
            self.name
        );
        instruction.bind_slot(self.slot);
        trace!("{}: {cycle} bound `{instruction}`", self.name);
        self.busy_with = Some(instruction);
    }

    pub fn execute_cycle_begin(&mut self, _cycle: Cycle) {}

    pub fn execute_cycle_end(&mut self, cycle: Cycle) {
        let Some(instruction) = &self.busy_with else {
            return;
        };
        if instruction.is_completed() {
            trace!("{}: {cycle} `{instruction}` drained", self.name);
            instruction.complete_execution();
            self.busy_with = None;
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.busy_with.is_none()
    }
}
