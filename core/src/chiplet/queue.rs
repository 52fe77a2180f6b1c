use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, trace};

use crate::Cycle;
use crate::core::interval::Interval;
use crate::core::latency::Latency;
use crate::isa::opcode::OpCode;
use crate::network::{ChipletPort, CollectiveKind, Network};

use super::instruction::{BciOp, CollectiveOp, Instruction};
use super::unit::{BaseConversionUnit, FunctionalUnit};

pub type FuHandle = Rc<RefCell<FunctionalUnit>>;
pub type FuVec = Vec<FuHandle>;
pub type BcuHandle = Rc<RefCell<BaseConversionUnit>>;

/// First unit (in configuration order) able to host `[start, end]`.
fn find_reservable(units: &[FuHandle], start: Cycle, end: Cycle) -> Option<usize> {
    units
        .iter()
        .position(|unit| unit.borrow().is_reservable(start, end))
}

fn reserve(units: &[FuHandle], index: usize, start: Cycle, end: Cycle, value: Rc<Instruction>) {
    units[index]
        .borrow_mut()
        .add_reservation(Interval::new(start, end, value));
}

fn nop() -> Rc<Instruction> {
    Rc::new(Instruction::Nop)
}

/// Adds, subtracts, and negations; a single full-rate stage.
pub struct AddQueue {
    name: String,
    vec_depth: Cycle,
    fifo: VecDeque<Rc<Instruction>>,
    units: FuVec,
}

impl AddQueue {
    pub fn new(name: impl Into<String>, vec_depth: Cycle, units: FuVec) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            fifo: VecDeque::new(),
            units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            matches!(instruction.opcode(), OpCode::Add | OpCode::Sub | OpCode::Neg),
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }
            let (start, end) = (cycle, cycle + self.vec_depth - 1);
            let Some(unit) = find_reservable(&self.units, start, end) else {
                return;
            };
            trace!("{}: {cycle} reserved [{start},{end}] for `{instruction}`", self.name);
            reserve(&self.units, unit, start, end, instruction);
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Multiplies; the pipe tail keeps the unit reserved for the multiplier
/// latency past the last input limb.
pub struct MulQueue {
    name: String,
    vec_depth: Cycle,
    latency: Latency,
    fifo: VecDeque<Rc<Instruction>>,
    units: FuVec,
}

impl MulQueue {
    pub fn new(name: impl Into<String>, vec_depth: Cycle, latency: Latency, units: FuVec) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            latency,
            fifo: VecDeque::new(),
            units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            instruction.opcode() == OpCode::Mul,
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }
            let (start, end) = (cycle, cycle + self.vec_depth - 1 + self.latency.mul);
            let Some(unit) = find_reservable(&self.units, start, end) else {
                return;
            };
            trace!("{}: {cycle} reserved [{start},{end}] for `{instruction}`", self.name);
            reserve(&self.units, unit, start, end, instruction);
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Evaluation-key generation.
pub struct EvgQueue {
    name: String,
    vec_depth: Cycle,
    latency: Latency,
    fifo: VecDeque<Rc<Instruction>>,
    units: FuVec,
}

impl EvgQueue {
    pub fn new(name: impl Into<String>, vec_depth: Cycle, latency: Latency, units: FuVec) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            latency,
            fifo: VecDeque::new(),
            units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            instruction.opcode() == OpCode::EvkGen,
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }
            let (start, end) = (cycle, cycle + self.vec_depth - 1 + self.latency.evg);
            let Some(unit) = find_reservable(&self.units, start, end) else {
                return;
            };
            reserve(&self.units, unit, start, end, instruction);
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Rotations and conjugations: a rotate pass, a transpose, and a second
/// rotate pass, with the two transpose windows booked on the shared
/// transpose units as occupancy-only reservations.
pub struct RotQueue {
    name: String,
    vec_depth: Cycle,
    latency: Latency,
    fifo: VecDeque<Rc<Instruction>>,
    rot_units: FuVec,
    transpose_units: FuVec,
}

impl RotQueue {
    pub fn new(
        name: impl Into<String>,
        vec_depth: Cycle,
        latency: Latency,
        rot_units: FuVec,
        transpose_units: FuVec,
    ) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            latency,
            fifo: VecDeque::new(),
            rot_units,
            transpose_units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            matches!(instruction.opcode(), OpCode::Rot | OpCode::Con),
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let vd = self.vec_depth;
        let lat = &self.latency;
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }

            let (rot_start, rot_end) = (cycle, cycle + vd - 1);
            let tra1_start = cycle + lat.rot_one_stage;
            let tra1_end = tra1_start + vd - 1;
            let tra2_start = cycle + lat.rot_one_stage + lat.transpose + lat.rot_one_stage;
            let tra2_end = tra2_start + vd - 1;

            let Some(rot_unit) = find_reservable(&self.rot_units, rot_start, rot_end) else {
                return;
            };
            let Some(tra1_unit) = find_reservable(&self.transpose_units, tra1_start, tra1_end)
            else {
                return;
            };
            let Some(tra2_unit) = find_reservable(&self.transpose_units, tra2_start, tra2_end)
            else {
                return;
            };

            debug!("{}: {cycle} dispatched `{instruction}`", self.name);
            reserve(&self.rot_units, rot_unit, rot_start, rot_end, instruction);
            reserve(&self.transpose_units, tra1_unit, tra1_start, tra1_end, nop());
            reserve(&self.transpose_units, tra2_unit, tra2_start, tra2_end, nop());
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Forward and inverse NTTs. A source sitting in a base-conversion buffer
/// first crosses a buffer-read unit, delaying the butterfly start; the
/// mid-transform transpose books a window on the shared transpose units.
pub struct NttQueue {
    name: String,
    vec_depth: Cycle,
    latency: Latency,
    fifo: VecDeque<Rc<Instruction>>,
    bc_read_units: FuVec,
    ntt_units: FuVec,
    transpose_units: FuVec,
}

impl NttQueue {
    pub fn new(
        name: impl Into<String>,
        vec_depth: Cycle,
        latency: Latency,
        bc_read_units: FuVec,
        ntt_units: FuVec,
        transpose_units: FuVec,
    ) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            latency,
            fifo: VecDeque::new(),
            bc_read_units,
            ntt_units,
            transpose_units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            matches!(instruction.opcode(), OpCode::Ntt | OpCode::Int),
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let vd = self.vec_depth;
        let lat = &self.latency;
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }

            let has_bcu_src = instruction.has_bcu_source();
            let (bcr_start, bcr_end) = (cycle, cycle + vd - 1 + lat.bcu_read);
            let mut bcr_unit = None;
            let ntt_start = if has_bcu_src {
                let Some(unit) = find_reservable(&self.bc_read_units, bcr_start, bcr_end) else {
                    return;
                };
                bcr_unit = Some(unit);
                bcr_start + lat.bcu_read
            } else {
                cycle
            };
            // Reserve past the last limb; the butterfly cannot pipeline
            // across limbs.
            let ntt_end = ntt_start + vd - 1 + lat.ntt_butterfly;
            let tra_start = ntt_start + lat.ntt_one_stage + lat.mul;
            let tra_end = tra_start + vd - 1;

            let Some(ntt_unit) = find_reservable(&self.ntt_units, ntt_start, ntt_end) else {
                return;
            };
            let Some(tra_unit) = find_reservable(&self.transpose_units, tra_start, tra_end) else {
                return;
            };

            debug!("{}: {cycle} dispatched `{instruction}`", self.name);
            if has_bcu_src {
                let split = instruction.split_ntt();
                reserve(&self.bc_read_units, bcr_unit.unwrap(), bcr_start, bcr_end, split[0].clone());
                reserve(&self.ntt_units, ntt_unit, ntt_start, ntt_end, split[1].clone());
            } else {
                reserve(&self.ntt_units, ntt_unit, ntt_start, ntt_end, instruction);
            }
            reserve(&self.transpose_units, tra_unit, tra_start, tra_end, nop());
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Scale-and-divide: (buffer read →) NTT → subtract → divide, the last
/// two landing on add and multiply units at fixed offsets behind the
/// transform.
pub struct SudQueue {
    name: String,
    vec_depth: Cycle,
    latency: Latency,
    fifo: VecDeque<Rc<Instruction>>,
    bc_read_units: FuVec,
    add_units: FuVec,
    mul_units: FuVec,
    ntt_units: FuVec,
    transpose_units: FuVec,
}

impl SudQueue {
    pub fn new(
        name: impl Into<String>,
        vec_depth: Cycle,
        latency: Latency,
        bc_read_units: FuVec,
        add_units: FuVec,
        mul_units: FuVec,
        ntt_units: FuVec,
        transpose_units: FuVec,
    ) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            latency,
            fifo: VecDeque::new(),
            bc_read_units,
            add_units,
            mul_units,
            ntt_units,
            transpose_units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            instruction.opcode() == OpCode::SuD,
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let vd = self.vec_depth;
        let lat = &self.latency;
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }

            let has_bcu_src = instruction.has_bcu_source();
            let (bcr_start, bcr_end) = (cycle, cycle + vd - 1 + lat.bcu_read);
            let mut bcr_unit = None;
            let ntt_start = if has_bcu_src {
                let Some(unit) = find_reservable(&self.bc_read_units, bcr_start, bcr_end) else {
                    return;
                };
                bcr_unit = Some(unit);
                bcr_start + lat.bcu_read
            } else {
                cycle
            };
            let ntt_end = ntt_start + vd - 1 + lat.ntt_butterfly;
            let tra_start = ntt_start + lat.ntt_one_stage + lat.mul;
            let tra_end = tra_start + vd - 1;
            let sub_start = ntt_start + lat.ntt;
            let sub_end = sub_start + vd - 1;
            let div_start = sub_start + lat.add;
            let div_end = div_start + vd - 1 + lat.mul;

            let Some(ntt_unit) = find_reservable(&self.ntt_units, ntt_start, ntt_end) else {
                return;
            };
            let Some(tra_unit) = find_reservable(&self.transpose_units, tra_start, tra_end) else {
                return;
            };
            let Some(sub_unit) = find_reservable(&self.add_units, sub_start, sub_end) else {
                return;
            };
            let Some(div_unit) = find_reservable(&self.mul_units, div_start, div_end) else {
                return;
            };

            debug!("{}: {cycle} dispatched `{instruction}`", self.name);
            let split = instruction.split_sud();
            let mut stage = split.iter();
            if has_bcu_src {
                let read = stage.next().unwrap().clone();
                reserve(&self.bc_read_units, bcr_unit.unwrap(), bcr_start, bcr_end, read);
            }
            reserve(&self.ntt_units, ntt_unit, ntt_start, ntt_end, stage.next().unwrap().clone());
            reserve(&self.add_units, sub_unit, sub_start, sub_end, stage.next().unwrap().clone());
            reserve(&self.mul_units, div_unit, div_start, div_end, stage.next().unwrap().clone());
            reserve(&self.transpose_units, tra_unit, tra_start, tra_end, nop());
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Base-conversion inits: each takes the first idle buffer unit. A busy
/// pair does not block later inits whose turn comes up.
pub struct BciQueue {
    name: String,
    fifo: VecDeque<Rc<BciOp>>,
    units: Vec<BcuHandle>,
}

impl BciQueue {
    pub fn new(name: impl Into<String>, units: Vec<BcuHandle>) -> Self {
        Self {
            name: name.into(),
            fifo: VecDeque::new(),
            units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<BciOp>) {
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            let idle = self.units.iter().position(|unit| !unit.borrow().is_busy());
            match idle {
                Some(unit) => {
                    debug!("{}: {cycle} bound `{instruction}` to buffer {unit}", self.name);
                    self.units[unit].borrow_mut().init_instruction(cycle, instruction);
                    self.fifo.remove(i);
                }
                None => i += 1,
            }
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Standalone buffer writes.
pub struct BcwQueue {
    name: String,
    vec_depth: Cycle,
    fifo: VecDeque<Rc<Instruction>>,
    units: FuVec,
}

impl BcwQueue {
    pub fn new(name: impl Into<String>, vec_depth: Cycle, units: FuVec) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            fifo: VecDeque::new(),
            units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            instruction.opcode() == OpCode::BcW,
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }
            let (start, end) = (cycle, cycle + self.vec_depth - 1);
            let Some(unit) = find_reservable(&self.units, start, end) else {
                return;
            };
            reserve(&self.units, unit, start, end, instruction);
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// First key-switch phase: an inverse NTT draining into a buffer write,
/// with the mid-transform transpose window.
pub struct Pl1Queue {
    name: String,
    vec_depth: Cycle,
    latency: Latency,
    fifo: VecDeque<Rc<Instruction>>,
    ntt_units: FuVec,
    transpose_units: FuVec,
    bc_write_units: FuVec,
}

impl Pl1Queue {
    pub fn new(
        name: impl Into<String>,
        vec_depth: Cycle,
        latency: Latency,
        ntt_units: FuVec,
        transpose_units: FuVec,
        bc_write_units: FuVec,
    ) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            latency,
            fifo: VecDeque::new(),
            ntt_units,
            transpose_units,
            bc_write_units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            instruction.opcode() == OpCode::Pl1,
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let vd = self.vec_depth;
        let lat = &self.latency;
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }

            let (intt_start, intt_end) = (cycle, cycle + vd - 1 + lat.ntt_butterfly);
            let tra_start = cycle + lat.ntt_one_stage + lat.mul;
            let tra_end = tra_start + vd - 1;
            let bcw_start = cycle + lat.ntt;
            let bcw_end = bcw_start + vd - 1;

            let Some(ntt_unit) = find_reservable(&self.ntt_units, intt_start, intt_end) else {
                return;
            };
            let Some(tra_unit) = find_reservable(&self.transpose_units, tra_start, tra_end) else {
                return;
            };
            let Some(bcw_unit) = find_reservable(&self.bc_write_units, bcw_start, bcw_end) else {
                return;
            };

            debug!("{}: {cycle} dispatched `{instruction}`", self.name);
            let split = instruction.split_pl1();
            reserve(&self.ntt_units, ntt_unit, intt_start, intt_end, split[0].clone());
            reserve(&self.bc_write_units, bcw_unit, bcw_start, bcw_end, split[1].clone());
            reserve(&self.transpose_units, tra_unit, tra_start, tra_end, nop());
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Resolve-init and resolve instructions; a long non-pipelined stage.
pub struct RsvQueue {
    name: String,
    vec_depth: Cycle,
    latency: Latency,
    fifo: VecDeque<Rc<Instruction>>,
    units: FuVec,
}

impl RsvQueue {
    pub fn new(name: impl Into<String>, vec_depth: Cycle, latency: Latency, units: FuVec) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            latency,
            fifo: VecDeque::new(),
            units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            matches!(instruction.opcode(), OpCode::Rsi | OpCode::Rsv),
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }
            let (start, end) = (cycle, cycle + self.vec_depth - 1 + self.latency.resolve);
            let Some(unit) = find_reservable(&self.units, start, end) else {
                return;
            };
            reserve(&self.units, unit, start, end, instruction);
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Modulus switches; same shape as the resolve pipeline.
pub struct ModQueue {
    name: String,
    vec_depth: Cycle,
    latency: Latency,
    fifo: VecDeque<Rc<Instruction>>,
    units: FuVec,
}

impl ModQueue {
    pub fn new(name: impl Into<String>, vec_depth: Cycle, latency: Latency, units: FuVec) -> Self {
        Self {
            name: name.into(),
            vec_depth,
            latency,
            fifo: VecDeque::new(),
            units,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<Instruction>) {
        assert!(
            instruction.opcode() == OpCode::Mod,
            "{}: routed `{instruction}`",
            self.name
        );
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        let mut i = 0;
        while i < self.fifo.len() {
            let instruction = self.fifo[i].clone();
            if !instruction.all_operands_ready() {
                i += 1;
                continue;
            }
            let (start, end) = (cycle, cycle + self.vec_depth - 1 + self.latency.modswitch);
            let Some(unit) = find_reservable(&self.units, start, end) else {
                return;
            };
            reserve(&self.units, unit, start, end, instruction);
            self.fifo.remove(i);
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty()
    }
}

/// Collective instructions, strictly one at a time: the head registers its
/// barrier, waits for every participant, then either pushes its value into
/// the network, waits for a response, or both.
pub struct CollectiveQueue {
    name: String,
    chiplet_id: usize,
    network: Arc<Network>,
    port: Arc<ChipletPort>,
    fifo: VecDeque<Rc<CollectiveOp>>,
    busy_with: Option<Rc<CollectiveOp>>,
    sync_registered: bool,
    waiting_for_network_cycles: Cycle,
}

impl CollectiveQueue {
    pub fn new(
        name: impl Into<String>,
        chiplet_id: usize,
        network: Arc<Network>,
        port: Arc<ChipletPort>,
    ) -> Self {
        Self {
            name: name.into(),
            chiplet_id,
            network,
            port,
            fifo: VecDeque::new(),
            busy_with: None,
            sync_registered: false,
            waiting_for_network_cycles: 0,
        }
    }

    pub fn enqueue(&mut self, instruction: Rc<CollectiveOp>) {
        self.fifo.push_back(instruction);
    }

    pub fn tick(&mut self, cycle: Cycle) {
        while let Some(sync_id) = self.port.pop_due(cycle) {
            let Some(busy) = self.busy_with.take() else {
                panic!("{}: spurious network response for sync {sync_id}", self.name);
            };
            assert!(
                busy.sync_id() == sync_id,
                "{}: response sync {sync_id} does not match `{busy}`",
                self.name
            );
            debug!("{}: {cycle} response completes `{busy}`", self.name);
            busy.complete_execution();
            self.sync_registered = false;
        }

        if self.busy_with.is_some() {
            return;
        }
        let Some(head) = self.fifo.front() else {
            return;
        };
        let head = head.clone();
        if !head.all_operands_ready() {
            return;
        }

        if !self.sync_registered {
            let kind = match head.opcode() {
                OpCode::Dis | OpCode::Rcv => CollectiveKind::Broadcast,
                OpCode::Joi => CollectiveKind::Aggregate,
                op => panic!("{}: `{op}` is not a network operation", self.name),
            };
            self.sync_registered = self.network.try_register_sync(
                self.chiplet_id,
                head.sync_id(),
                head.sync_size(),
                kind,
                head.has_dest(),
                head.has_source(),
            );
            if self.sync_registered {
                debug!("{}: {cycle} registered sync for `{head}`", self.name);
            }
        }

        if !self.network.network_ready(head.sync_id()) {
            self.waiting_for_network_cycles += 1;
            return;
        }

        self.fifo.pop_front();
        debug!("{}: {cycle} network ready for `{head}`", self.name);
        match head.opcode() {
            OpCode::Dis => {
                self.network.send_packet(self.chiplet_id, head.sync_id());
                head.complete_execution();
                self.sync_registered = false;
            }
            OpCode::Rcv => {
                self.busy_with = Some(head);
            }
            OpCode::Joi => {
                if head.has_source() {
                    self.network.send_packet(self.chiplet_id, head.sync_id());
                }
                if head.has_dest() {
                    self.busy_with = Some(head);
                } else {
                    head.complete_execution();
                    self.sync_registered = false;
                }
            }
            _ => unreachable!(),
        }
    }

    pub fn okay_to_finish(&self) -> bool {
        self.fifo.is_empty() && self.busy_with.is_none()
    }

    /// Cycles the head instruction spent registered but blocked on the
    /// barrier.
    pub fn waiting_for_network_cycles(&self) -> Cycle {
        self.waiting_for_network_cycles
    }
}
