pub mod instruction;
pub mod memory_unit;
pub mod queue;
pub mod register;
pub mod unit;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::debug;

use crate::Cycle;
use crate::core::config::SimConfig;
use crate::core::error::SimError;
use crate::core::latency::{LIMB_BYTES, Latency, SCALAR_BYTES};
use crate::core::memory::MemoryBackend;
use crate::core::stats::ChipletReport;
use crate::isa::opcode::OpCode;
use crate::isa::trace::{Operand, ParsedInstruction, TraceReader};
use crate::network::Network;

use instruction::{BciOp, CollectiveOp, Instruction, MemoryOp, VectorOrBcu};
use memory_unit::MemoryUnit;
use queue::{
    AddQueue, BciQueue, BcuHandle, BcwQueue, CollectiveQueue, EvgQueue, FuHandle, FuVec, ModQueue,
    MulQueue, NttQueue, Pl1Queue, RotQueue, RsvQueue, SudQueue,
};
use register::{BaseConversionRegister, FreePool, PhysRegId, PhysicalRegister, RegisterKind};
use unit::{BaseConversionUnit, FunctionalUnit};

/// One chiplet: rename state, instruction queues, functional units, and a
/// private memory unit, all driven by a per-cycle tick.
///
/// Out-of-order issue falls out of the queue structure: the dispatcher
/// renames and routes strictly in trace order, but each queue fires any
/// head-of-line instruction whose operands are ready, and the alias tables
/// let loads bypass memory entirely.
pub struct Chiplet {
    id: u32,
    name: String,
    vec_depth: Cycle,
    use_prng: bool,

    vector_regs: Vec<Rc<PhysicalRegister>>,
    scalar_regs: Vec<Rc<PhysicalRegister>>,
    bcu_regs: Vec<Rc<BaseConversionRegister>>,
    free_vector: Rc<FreePool>,
    free_scalar: Rc<FreePool>,
    free_bcu: Rc<FreePool>,
    vector_map: std::collections::HashMap<u16, PhysRegId>,
    scalar_map: std::collections::HashMap<u16, PhysRegId>,
    bcu_map: std::collections::HashMap<u8, register::BcuVirtId>,

    term_addresses: std::collections::HashMap<String, u64>,
    num_terms: u64,

    reader: Box<dyn TraceReader>,
    fetched: Option<ParsedInstruction>,
    num_instructions: u64,

    memory_unit: MemoryUnit,
    functional_units: FuVec,
    bcu_units: Vec<BcuHandle>,

    add_queue: AddQueue,
    mul_queue: MulQueue,
    rot_queue: RotQueue,
    evg_queue: EvgQueue,
    ntt_queue: NttQueue,
    sud_queue: SudQueue,
    bci_queue: BciQueue,
    bcw_queue: BcwQueue,
    pl1_queue: Pl1Queue,
    rsv_queue: RsvQueue,
    mod_queue: ModQueue,
    dis_queue: CollectiveQueue,

    busy_cycles: Cycle,
    vector_register_reads: u64,
    vector_register_writes: u64,
}

fn make_units(
    all: &mut FuVec,
    prefix: &str,
    count: u16,
    latency: Cycle,
    burst: Cycle,
    vec_depth: Cycle,
) -> FuVec {
    let mut units = Vec::with_capacity(count as usize);
    for i in 0..count {
        let unit: FuHandle = Rc::new(RefCell::new(FunctionalUnit::new(
            format!("{prefix}{i}"),
            latency,
            burst,
            vec_depth,
        )));
        all.push(unit.clone());
        units.push(unit);
    }
    units
}

impl Chiplet {
    pub fn new(
        id: u32,
        config: &SimConfig,
        latency: Latency,
        reader: Box<dyn TraceReader>,
        backend: Box<dyn MemoryBackend>,
        network: Arc<Network>,
    ) -> Self {
        let vd = config.vec_depth;
        let name = format!("chiplet{id}");

        let free_vector = FreePool::with_ids(config.num_vector_regs);
        let free_scalar = FreePool::with_ids(config.num_scalar_regs);
        let free_bcu = FreePool::with_ids(config.num_bcu_vregs);
        let vector_regs = (0..config.num_vector_regs)
            .map(|i| PhysicalRegister::pooled(RegisterKind::Vector, i, free_vector.clone()))
            .collect();
        let scalar_regs = (0..config.num_scalar_regs)
            .map(|i| PhysicalRegister::pooled(RegisterKind::Scalar, i, free_scalar.clone()))
            .collect();
        let bcu_regs = (0..config.num_bcu_vregs)
            .map(|i| BaseConversionRegister::new(i, free_bcu.clone()))
            .collect();

        let mut all_units = FuVec::new();
        let add_units = make_units(&mut all_units, "add", config.num_add_units, latency.add, vd, vd);
        let mul_units = make_units(&mut all_units, "mul", config.num_mul_units, latency.mul, vd, vd);

        // One write port per buffer.
        let bcu_units: Vec<BcuHandle> = (0..config.num_bcu_buffs)
            .map(|i| Rc::new(RefCell::new(BaseConversionUnit::new(format!("bcu{i}"), i))))
            .collect();
        let bc_write_units = make_units(
            &mut all_units,
            "bcWrite",
            config.num_bcu_buffs,
            latency.bcu_write,
            vd,
            vd,
        );
        let bc_read_units = make_units(
            &mut all_units,
            "bcRead",
            config.num_bcu_units,
            latency.bcu_read,
            vd * 2,
            vd,
        );

        let ntt_units = make_units(&mut all_units, "ntt", config.num_ntt_units, latency.ntt, vd, vd);
        let tra_units = make_units(
            &mut all_units,
            "tra",
            config.num_tra_units,
            latency.transpose,
            vd,
            vd,
        );
        let rot_units = make_units(&mut all_units, "rot", config.num_rot_units, latency.rot, vd, vd);
        let evg_units = make_units(&mut all_units, "evg", config.num_evg_units, latency.evg, vd, vd);
        let rsv_units = make_units(&mut all_units, "rsv", 1, latency.resolve, vd * 16, vd);
        let mod_units = make_units(&mut all_units, "mod", 1, latency.modswitch, vd * 16, vd);

        let add_queue = AddQueue::new(format!("{name}.addQueue"), vd, add_units.clone());
        let mul_queue = MulQueue::new(format!("{name}.mulQueue"), vd, latency, mul_units.clone());
        let rot_queue = RotQueue::new(
            format!("{name}.rotQueue"),
            vd,
            latency,
            rot_units,
            tra_units.clone(),
        );
        let evg_queue = EvgQueue::new(format!("{name}.evgQueue"), vd, latency, evg_units);
        let ntt_queue = NttQueue::new(
            format!("{name}.nttQueue"),
            vd,
            latency,
            bc_read_units.clone(),
            ntt_units.clone(),
            tra_units.clone(),
        );
        let sud_queue = SudQueue::new(
            format!("{name}.sudQueue"),
            vd,
            latency,
            bc_read_units,
            add_units,
            mul_units,
            ntt_units.clone(),
            tra_units.clone(),
        );
        let bci_queue = BciQueue::new(format!("{name}.bciQueue"), bcu_units.clone());
        let bcw_queue = BcwQueue::new(format!("{name}.bcwQueue"), vd, bc_write_units.clone());
        let pl1_queue = Pl1Queue::new(
            format!("{name}.pl1Queue"),
            vd,
            latency,
            ntt_units,
            tra_units,
            bc_write_units,
        );
        let rsv_queue = RsvQueue::new(format!("{name}.rsvQueue"), vd, latency, rsv_units);
        let mod_queue = ModQueue::new(format!("{name}.modQueue"), vd, latency, mod_units);
        let dis_queue = CollectiveQueue::new(
            format!("{name}.disQueue"),
            id as usize,
            network.clone(),
            network.port(id as usize),
        );

        let memory_unit = MemoryUnit::new(
            format!("{name}.memoryUnit"),
            backend,
            config.memory_request_width,
            config.mem_concurrency,
        );

        Self {
            id,
            name,
            vec_depth: vd,
            use_prng: config.use_prng,
            vector_regs,
            scalar_regs,
            bcu_regs,
            free_vector,
            free_scalar,
            free_bcu,
            vector_map: Default::default(),
            scalar_map: Default::default(),
            bcu_map: Default::default(),
            term_addresses: Default::default(),
            num_terms: 0,
            reader,
            fetched: None,
            num_instructions: 0,
            memory_unit,
            functional_units: all_units,
            bcu_units,
            add_queue,
            mul_queue,
            rot_queue,
            evg_queue,
            ntt_queue,
            sud_queue,
            bci_queue,
            bcw_queue,
            pl1_queue,
            rsv_queue,
            mod_queue,
            dis_queue,
            busy_cycles: 0,
            vector_register_reads: 0,
            vector_register_writes: 0,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    // ---- rename machinery ----

    /// A destination write needs a free physical register of the operand's
    /// kind. Conservative: renaming could free the previous mapping, but
    /// that headroom is not exploited.
    fn can_map(&self, operand: &Operand) -> bool {
        match operand {
            Operand::Vector { .. } => !self.free_vector.is_empty(),
            Operand::Scalar { .. } => !self.free_scalar.is_empty(),
            _ => false,
        }
    }

    /// Renames a destination write onto a fresh physical register. The
    /// returned register carries two holds: one for the rename map and one
    /// for the issuing instruction.
    fn map_to_physical(&mut self, operand: &Operand) -> Rc<PhysicalRegister> {
        match operand {
            Operand::Vector { id, .. } => {
                if let Some(&old) = self.vector_map.get(id) {
                    self.vector_regs[old as usize].dec_reference();
                }
                let fresh = self
                    .free_vector
                    .acquire()
                    .unwrap_or_else(|| panic!("{}: no free vector register for r{id}", self.name));
                self.vector_map.insert(*id, fresh);
                let reg = self.vector_regs[fresh as usize].clone();
                reg.inc_reference();
                reg.inc_reference();
                self.vector_register_writes += 1;
                reg
            }
            Operand::Scalar { id, .. } => {
                if let Some(&old) = self.scalar_map.get(id) {
                    self.scalar_regs[old as usize].dec_reference();
                }
                let fresh = self
                    .free_scalar
                    .acquire()
                    .unwrap_or_else(|| panic!("{}: no free scalar register for s{id}", self.name));
                self.scalar_map.insert(*id, fresh);
                let reg = self.scalar_regs[fresh as usize].clone();
                reg.inc_reference();
                reg.inc_reference();
                reg
            }
            other => panic!("{}: `{other}` cannot be renamed as a register", self.name),
        }
    }

    /// Resolves a source read to its physical register, taking one hold
    /// for the reading instruction. On a dead read the rename map's hold
    /// transfers to the instruction instead, so the count never dips to
    /// zero while the value is still consumed.
    fn mapped_physical(&mut self, operand: &Operand) -> Rc<PhysicalRegister> {
        match operand {
            Operand::Vector { id, dead } => {
                let phys = *self
                    .vector_map
                    .get(id)
                    .unwrap_or_else(|| panic!("{}: read of unmapped register r{id}", self.name));
                let reg = self.vector_regs[phys as usize].clone();
                if *dead {
                    self.vector_map.remove(id);
                } else {
                    reg.inc_reference();
                }
                self.vector_register_reads += 1;
                reg
            }
            Operand::Scalar { id, dead } => {
                let phys = *self
                    .scalar_map
                    .get(id)
                    .unwrap_or_else(|| panic!("{}: read of unmapped register s{id}", self.name));
                let reg = self.scalar_regs[phys as usize].clone();
                if *dead {
                    self.scalar_map.remove(id);
                } else {
                    reg.inc_reference();
                }
                reg
            }
            other => panic!("{}: `{other}` is not a register source", self.name),
        }
    }

    /// `mov` aliasing: the destination architectural name points at the
    /// source's physical register; no instruction is issued.
    fn map_src_to_dest(&mut self, dest: u16, src: u16) {
        if let Some(old) = self.vector_map.remove(&dest) {
            self.vector_regs[old as usize].dec_reference();
        }
        let phys = *self
            .vector_map
            .get(&src)
            .unwrap_or_else(|| panic!("{}: mov from unmapped register r{src}", self.name));
        self.vector_map.insert(dest, phys);
        self.vector_regs[phys as usize].inc_reference();
    }

    fn rename_vector_to(&mut self, operand: &Operand, alias: &Rc<PhysicalRegister>) {
        let Operand::Vector { id, .. } = operand else {
            panic!("{}: `{operand}` is not a vector destination", self.name);
        };
        if let Some(&old) = self.vector_map.get(id) {
            self.vector_regs[old as usize].dec_reference();
        }
        self.vector_map.insert(*id, alias.id());
        alias.inc_reference();
    }

    fn rename_scalar_to(&mut self, operand: &Operand, alias: &Rc<PhysicalRegister>) {
        let Operand::Scalar { id, .. } = operand else {
            panic!("{}: `{operand}` is not a scalar destination", self.name);
        };
        if let Some(&old) = self.scalar_map.get(id) {
            self.scalar_regs[old as usize].dec_reference();
        }
        self.scalar_map.insert(*id, alias.id());
        alias.inc_reference();
    }

    /// Binds a `bci` destination to a fresh virtual register; two holds,
    /// as with [`map_to_physical`](Self::map_to_physical).
    fn map_bcu_init(&mut self, bcu_id: u8) -> Rc<BaseConversionRegister> {
        if let Some(&old) = self.bcu_map.get(&bcu_id) {
            self.bcu_regs[old as usize].dec_reference();
        }
        let fresh = self
            .free_bcu
            .acquire()
            .unwrap_or_else(|| panic!("{}: no free base-conversion register for b{bcu_id}", self.name));
        self.bcu_map.insert(bcu_id, fresh);
        let reg = self.bcu_regs[fresh as usize].clone();
        reg.inc_reference();
        reg.inc_reference();
        reg
    }

    /// Resolves a buffer reference, taking one hold for the instruction.
    fn mapped_bcu(&self, bcu_id: u8) -> Rc<BaseConversionRegister> {
        let virt = *self
            .bcu_map
            .get(&bcu_id)
            .unwrap_or_else(|| panic!("{}: use of unmapped buffer b{bcu_id}", self.name));
        let reg = self.bcu_regs[virt as usize].clone();
        reg.inc_reference();
        reg
    }

    /// First use of a memory term assigns it the next limb-sized slot of
    /// the address space.
    fn term_address(&mut self, term: &str) -> u64 {
        if let Some(&addr) = self.term_addresses.get(term) {
            return addr;
        }
        let addr = self.num_terms * LIMB_BYTES as u64;
        self.num_terms += 1;
        debug!("{}: term `{term}` mapped to {addr:#x}", self.name);
        self.term_addresses.insert(term.to_string(), addr);
        addr
    }

    // ---- per-opcode dispatch ----

    fn dispatch_memory(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        let op = parsed.opcode;
        let Some(Operand::Term { name: term, .. }) = parsed.srcs.first() else {
            panic!("{}: memory instruction without a term source", self.name);
        };
        let term = term.clone();
        let addr = self.term_address(&term);

        match op {
            OpCode::Store | OpCode::Spill => {
                // A later store makes queued stores dead; a spill only
                // displaces queued spills (it may itself be quashed).
                let quash = op == OpCode::Store;
                let _ = self.memory_unit.find_store_alias(addr, quash);
                let reg = self.mapped_physical(&parsed.dests[0]);
                let instruction = MemoryOp::new(op, reg, addr, LIMB_BYTES);
                debug!("{}: {cycle} dispatching `{instruction}`", self.name);
                self.memory_unit.add_to_store_queue(instruction);
            }
            OpCode::LoadV => {
                if let Some(alias) = self.memory_unit.find_store_alias(addr, false) {
                    self.rename_vector_to(&parsed.dests[0], &alias);
                    return true;
                }
                if let Some(alias) = self.memory_unit.find_load_alias(addr) {
                    self.rename_vector_to(&parsed.dests[0], &alias);
                    return true;
                }
                if !self.can_map(&parsed.dests[0]) {
                    return false;
                }
                let reg = self.map_to_physical(&parsed.dests[0]);
                let instruction = MemoryOp::new(op, reg, addr, LIMB_BYTES);
                debug!("{}: {cycle} dispatching `{instruction}`", self.name);
                self.memory_unit.add_to_load_queue(instruction);
            }
            OpCode::LoadS => {
                if let Some(alias) = self.memory_unit.find_load_alias(addr) {
                    self.rename_scalar_to(&parsed.dests[0], &alias);
                    return true;
                }
                if !self.can_map(&parsed.dests[0]) {
                    return false;
                }
                let reg = self.map_to_physical(&parsed.dests[0]);
                let instruction = MemoryOp::new(op, reg, addr, SCALAR_BYTES);
                // Scalar loads are free: complete at dispatch, never queued.
                instruction.complete_execution();
            }
            _ => panic!("{}: `{op}` is not a memory opcode", self.name),
        }
        true
    }

    fn dispatch_bin_op(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        if !self.can_map(&parsed.dests[0]) {
            return false;
        }
        let dest = self.map_to_physical(&parsed.dests[0]);
        let src1 = self.mapped_physical(&parsed.srcs[0]);
        let src2 = self.mapped_physical(&parsed.srcs[1]);

        let op = parsed.opcode;
        let instruction = Rc::new(Instruction::BinOp {
            op,
            dest,
            src1,
            src2,
            limb: parsed.limb.unwrap_or(0),
        });
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        match op {
            OpCode::Add | OpCode::Sub => self.add_queue.enqueue(instruction),
            OpCode::Mul => self.mul_queue.enqueue(instruction),
            _ => panic!("{}: `{op}` is not a binary opcode", self.name),
        }
        true
    }

    fn dispatch_un_op(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        if !self.can_map(&parsed.dests[0]) {
            return false;
        }
        let dest = self.map_to_physical(&parsed.dests[0]);
        let src = self.mapped_physical(&parsed.srcs[0]);

        let op = parsed.opcode;
        let instruction = Rc::new(Instruction::UnOp {
            op,
            rot_index: parsed.rot_index,
            dest,
            src,
            limb: parsed.limb.unwrap_or(0),
        });
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        match op {
            OpCode::Int => self.ntt_queue.enqueue(instruction),
            OpCode::Neg => self.add_queue.enqueue(instruction),
            OpCode::Rot | OpCode::Con => self.rot_queue.enqueue(instruction),
            _ => panic!("{}: `{op}` is not a unary opcode", self.name),
        }
        true
    }

    fn dispatch_evg(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        if !self.can_map(&parsed.dests[0]) {
            return false;
        }
        let dest = self.map_to_physical(&parsed.dests[0]);
        let instruction = Rc::new(Instruction::Evg {
            dest,
            limb: parsed.limb.unwrap_or(0),
        });
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        self.evg_queue.enqueue(instruction);
        true
    }

    fn dispatch_ntt(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        if !self.can_map(&parsed.dests[0]) {
            return false;
        }
        let dest = self.map_to_physical(&parsed.dests[0]);
        let src = match &parsed.srcs[0] {
            Operand::BcuRef { bcu_id, .. } => VectorOrBcu::Bcu(self.mapped_bcu(*bcu_id)),
            operand => VectorOrBcu::Vector(self.mapped_physical(operand)),
        };
        let instruction = Rc::new(Instruction::Ntt {
            dest,
            src,
            limb: parsed.limb.unwrap_or(0),
        });
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        self.ntt_queue.enqueue(instruction);
        true
    }

    fn dispatch_sud(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        if !self.can_map(&parsed.dests[0]) {
            return false;
        }
        let dest = self.map_to_physical(&parsed.dests[0]);
        let src1 = self.mapped_physical(&parsed.srcs[0]);
        let src2 = match &parsed.srcs[1] {
            Operand::BcuRef { bcu_id, .. } => VectorOrBcu::Bcu(self.mapped_bcu(*bcu_id)),
            operand => VectorOrBcu::Vector(self.mapped_physical(operand)),
        };
        let instruction = Rc::new(Instruction::Sud {
            dest,
            src1,
            src2,
            limb: parsed.limb.unwrap_or(0),
        });
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        self.sud_queue.enqueue(instruction);
        true
    }

    fn dispatch_bci(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        if self.free_bcu.is_empty() {
            return false;
        }
        let Operand::BcuInit {
            bcu_id,
            num_writes,
            num_reads,
        } = parsed.dests[0]
        else {
            panic!("{}: bci without an init destination", self.name);
        };
        let dest = self.map_bcu_init(bcu_id);
        dest.set_budgets(num_writes as i16, num_reads as i16);
        let instruction = BciOp::new(dest);
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        self.bci_queue.enqueue(instruction);
        true
    }

    fn dispatch_bcw(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        let Operand::BcuRef { bcu_id, .. } = parsed.dests[0] else {
            panic!("{}: bcw without a buffer destination", self.name);
        };
        let dest = self.mapped_bcu(bcu_id);
        let src = self.mapped_physical(&parsed.srcs[0]);
        let instruction = Rc::new(Instruction::BcWrite {
            dest,
            src,
            limb: parsed.limb.unwrap_or(0),
        });
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        self.bcw_queue.enqueue(instruction);
        true
    }

    fn dispatch_pl1(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        let Operand::BcuRef { bcu_id, .. } = parsed.dests[0] else {
            panic!("{}: pl1 without a buffer destination", self.name);
        };
        let dest = self.mapped_bcu(bcu_id);
        let src = self.mapped_physical(&parsed.srcs[0]);
        let instruction = Rc::new(Instruction::Pl1 {
            dest,
            src,
            limb: parsed.limb.unwrap_or(0),
        });
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        self.pl1_queue.enqueue(instruction);
        true
    }

    fn dispatch_mov(&mut self, _cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        let (Operand::Vector { id: dest, .. }, Operand::Vector { id: src, .. }) =
            (&parsed.dests[0], &parsed.srcs[0])
        else {
            panic!("{}: mov operands must be vector registers", self.name);
        };
        self.map_src_to_dest(*dest, *src);
        true
    }

    fn dispatch_resolve(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        let op = parsed.opcode;
        if op == OpCode::Rsi && self.free_vector.len() < parsed.dests.len() {
            return false;
        }

        let src = parsed.srcs.first().map(|operand| self.mapped_physical(operand));
        let dests = parsed
            .dests
            .iter()
            .map(|operand| {
                if op == OpCode::Rsi {
                    self.map_to_physical(operand)
                } else {
                    self.mapped_physical(operand)
                }
            })
            .collect();

        let instruction = Rc::new(Instruction::Resolve {
            op,
            dests,
            src,
            limb: parsed.limb.unwrap_or(0),
        });
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        self.rsv_queue.enqueue(instruction);
        true
    }

    fn dispatch_mod(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        if !self.can_map(&parsed.dests[0]) {
            return false;
        }
        let dest = self.map_to_physical(&parsed.dests[0]);
        let srcs = parsed
            .srcs
            .iter()
            .map(|operand| self.mapped_physical(operand))
            .collect();
        let instruction = Rc::new(Instruction::ModSwitch {
            dest,
            srcs,
            limb: parsed.limb.unwrap_or(0),
        });
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        self.mod_queue.enqueue(instruction);
        true
    }

    fn dispatch_collective(&mut self, cycle: Cycle, parsed: &ParsedInstruction) -> bool {
        let op = parsed.opcode;
        let mut dest = None;
        let mut src = None;
        if let Some(operand) = parsed.dests.first() {
            if !self.can_map(operand) {
                return false;
            }
            dest = Some(self.map_to_physical(operand));
        }
        if let Some(operand) = parsed.srcs.first() {
            src = Some(self.mapped_physical(operand));
        }
        let instruction = CollectiveOp::new(
            op,
            dest,
            src,
            parsed.sync_id.expect("collective without a sync id"),
            parsed.sync_size.expect("collective without a sync size"),
            parsed.limb,
        );
        debug!("{}: {cycle} dispatching `{instruction}`", self.name);
        self.dis_queue.enqueue(instruction);
        true
    }

    // ---- the cycle ----

    pub fn tick(&mut self, cycle: Cycle) -> Result<bool, SimError> {
        if self.fetched.is_none() {
            self.fetched = self.fetch()?;
        }

        while let Some(mut parsed) = self.fetched.take() {
            if parsed.opcode == OpCode::EvkGen && !self.use_prng {
                // Without a PRNG the key material comes from memory.
                parsed.opcode = OpCode::LoadV;
            }
            let dispatched = match parsed.opcode {
                OpCode::LoadV | OpCode::LoadS | OpCode::Store | OpCode::Spill => {
                    self.dispatch_memory(cycle, &parsed)
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul => self.dispatch_bin_op(cycle, &parsed),
                OpCode::Int | OpCode::Neg | OpCode::Rot | OpCode::Con => {
                    self.dispatch_un_op(cycle, &parsed)
                }
                OpCode::EvkGen => self.dispatch_evg(cycle, &parsed),
                OpCode::Ntt => self.dispatch_ntt(cycle, &parsed),
                OpCode::SuD => self.dispatch_sud(cycle, &parsed),
                OpCode::Bci => self.dispatch_bci(cycle, &parsed),
                OpCode::BcW => self.dispatch_bcw(cycle, &parsed),
                OpCode::Pl1 => self.dispatch_pl1(cycle, &parsed),
                OpCode::Mov => self.dispatch_mov(cycle, &parsed),
                OpCode::Rsi | OpCode::Rsv => self.dispatch_resolve(cycle, &parsed),
                OpCode::Mod => self.dispatch_mod(cycle, &parsed),
                OpCode::Dis | OpCode::Rcv | OpCode::Joi => self.dispatch_collective(cycle, &parsed),
                op => panic!("{}: `{op}` cannot be dispatched", self.name),
            };
            if dispatched {
                self.fetched = self.fetch()?;
            } else {
                // Resources exhausted; retry the same instruction next cycle.
                self.fetched = Some(parsed);
                break;
            }
        }

        let trace_completed = self.fetched.is_none();

        self.add_queue.tick(cycle);
        self.mul_queue.tick(cycle);
        self.rot_queue.tick(cycle);
        self.evg_queue.tick(cycle);
        self.ntt_queue.tick(cycle);
        self.sud_queue.tick(cycle);
        self.bci_queue.tick(cycle);
        self.bcw_queue.tick(cycle);
        self.pl1_queue.tick(cycle);
        self.rsv_queue.tick(cycle);
        self.mod_queue.tick(cycle);
        self.dis_queue.tick(cycle);

        self.memory_unit.execute_cycle_begin(cycle);
        for unit in &self.functional_units {
            unit.borrow_mut().execute_cycle_begin(cycle);
        }
        for unit in &self.bcu_units {
            unit.borrow_mut().execute_cycle_begin(cycle);
        }
        self.memory_unit.execute_cycle_end(cycle);
        for unit in &self.functional_units {
            self.busy_cycles += unit.borrow_mut().execute_cycle_end(cycle);
        }
        for unit in &self.bcu_units {
            unit.borrow_mut().execute_cycle_end(cycle);
        }

        if trace_completed {
            let mut okay = self.memory_unit.okay_to_finish();
            okay &= self.functional_units.iter().all(|u| u.borrow().okay_to_finish());
            okay &= self.bcu_units.iter().all(|u| u.borrow().okay_to_finish());
            okay &= self.add_queue.okay_to_finish();
            okay &= self.mul_queue.okay_to_finish();
            okay &= self.rot_queue.okay_to_finish();
            okay &= self.evg_queue.okay_to_finish();
            okay &= self.ntt_queue.okay_to_finish();
            okay &= self.sud_queue.okay_to_finish();
            okay &= self.bci_queue.okay_to_finish();
            okay &= self.bcw_queue.okay_to_finish();
            okay &= self.pl1_queue.okay_to_finish();
            okay &= self.rsv_queue.okay_to_finish();
            okay &= self.mod_queue.okay_to_finish();
            okay &= self.dis_queue.okay_to_finish();
            return Ok(okay);
        }
        Ok(false)
    }

    fn fetch(&mut self) -> Result<Option<ParsedInstruction>, SimError> {
        let parsed = self
            .reader
            .next_instruction()
            .map_err(|source| SimError::Trace {
                chiplet: self.id,
                source,
            })?;
        if parsed.is_some() {
            self.num_instructions += 1;
        }
        Ok(parsed)
    }

    pub fn report(&self, completed_ns: u64) -> ChipletReport {
        ChipletReport {
            chiplet: self.id,
            completed_ns,
            memory: self.memory_unit.stats(),
            units: self
                .functional_units
                .iter()
                .map(|unit| unit.borrow().report())
                .collect(),
            vector_register_reads: self.vector_register_reads,
            vector_register_writes: self.vector_register_writes,
        }
    }

    // ---- inspection (used by the frontend and tests) ----

    pub fn num_instructions(&self) -> u64 {
        self.num_instructions
    }

    pub fn busy_cycles(&self) -> Cycle {
        self.busy_cycles
    }

    pub fn memory_unit(&self) -> &MemoryUnit {
        &self.memory_unit
    }

    pub fn free_vector_registers(&self) -> usize {
        self.free_vector.len()
    }

    pub fn free_scalar_registers(&self) -> usize {
        self.free_scalar.len()
    }

    pub fn free_bcu_registers(&self) -> usize {
        self.free_bcu.len()
    }

    pub fn vector_mapping(&self, arch: u16) -> Option<PhysRegId> {
        self.vector_map.get(&arch).copied()
    }

    pub fn scalar_mapping(&self, arch: u16) -> Option<PhysRegId> {
        self.scalar_map.get(&arch).copied()
    }

    pub fn collective_wait_cycles(&self) -> Cycle {
        self.dis_queue.waiting_for_network_cycles()
    }
}
