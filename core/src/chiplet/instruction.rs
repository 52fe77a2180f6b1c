use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::isa::opcode::OpCode;

use super::register::{BaseConversionRegister, PhysicalRegister};

pub type LimbId = u16;

/// A source or destination that is either a renamed physical register or a
/// base-conversion buffer handle.
#[derive(Clone)]
pub enum VectorOrBcu {
    Vector(Rc<PhysicalRegister>),
    Bcu(Rc<BaseConversionRegister>),
}

impl VectorOrBcu {
    fn value_ready(&self) -> bool {
        match self {
            VectorOrBcu::Vector(reg) => reg.value_ready(),
            VectorOrBcu::Bcu(reg) => reg.value_ready(),
        }
    }
}

impl fmt::Display for VectorOrBcu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VectorOrBcu::Vector(reg) => write!(f, "{reg}"),
            VectorOrBcu::Bcu(reg) => write!(f, "{reg}"),
        }
    }
}

/// An instruction bound to renamed registers, flowing through the compute
/// queues and functional units.
///
/// Completion is a pure register-state transition: sources drop one
/// reference, destinations become value-ready and drop the issue-time
/// reference. No values are computed anywhere.
pub enum Instruction {
    /// Occupancy-only placeholder (transpose stages).
    Nop,
    BinOp {
        op: OpCode,
        dest: Rc<PhysicalRegister>,
        src1: Rc<PhysicalRegister>,
        src2: Rc<PhysicalRegister>,
        limb: LimbId,
    },
    UnOp {
        op: OpCode,
        rot_index: Option<i32>,
        dest: Rc<PhysicalRegister>,
        src: Rc<PhysicalRegister>,
        limb: LimbId,
    },
    Evg {
        dest: Rc<PhysicalRegister>,
        limb: LimbId,
    },
    Ntt {
        dest: Rc<PhysicalRegister>,
        src: VectorOrBcu,
        limb: LimbId,
    },
    BcRead {
        dest: Rc<PhysicalRegister>,
        src: Rc<BaseConversionRegister>,
        limb: LimbId,
    },
    BcWrite {
        dest: Rc<BaseConversionRegister>,
        src: Rc<PhysicalRegister>,
        limb: LimbId,
    },
    /// Scale-and-divide; split into NTT → Sub → Div stages at issue.
    Sud {
        dest: Rc<PhysicalRegister>,
        src1: Rc<PhysicalRegister>,
        src2: VectorOrBcu,
        limb: LimbId,
    },
    /// First key-switch phase; split into iNTT → BcWrite at issue.
    Pl1 {
        dest: Rc<BaseConversionRegister>,
        src: Rc<PhysicalRegister>,
        limb: LimbId,
    },
    Resolve {
        op: OpCode,
        dests: Vec<Rc<PhysicalRegister>>,
        src: Option<Rc<PhysicalRegister>>,
        limb: LimbId,
    },
    ModSwitch {
        dest: Rc<PhysicalRegister>,
        srcs: Vec<Rc<PhysicalRegister>>,
        limb: LimbId,
    },
}

impl Instruction {
    pub fn opcode(&self) -> OpCode {
        match self {
            Instruction::Nop => OpCode::Nop,
            Instruction::BinOp { op, .. } => *op,
            Instruction::UnOp { op, .. } => *op,
            Instruction::Evg { .. } => OpCode::EvkGen,
            Instruction::Ntt { .. } => OpCode::Ntt,
            Instruction::BcRead { .. } => OpCode::BcR,
            Instruction::BcWrite { .. } => OpCode::BcW,
            Instruction::Sud { .. } => OpCode::SuD,
            Instruction::Pl1 { .. } => OpCode::Pl1,
            Instruction::Resolve { op, .. } => *op,
            Instruction::ModSwitch { .. } => OpCode::Mod,
        }
    }

    pub fn all_operands_ready(&self) -> bool {
        match self {
            Instruction::Nop | Instruction::Evg { .. } => true,
            Instruction::BinOp { src1, src2, .. } => src1.value_ready() && src2.value_ready(),
            Instruction::UnOp { src, .. } => src.value_ready(),
            Instruction::Ntt { src, .. } => src.value_ready(),
            Instruction::BcRead { src, .. } => src.value_ready(),
            Instruction::BcWrite { dest, src, .. } => dest.has_slot() && src.value_ready(),
            Instruction::Sud { src1, src2, .. } => src1.value_ready() && src2.value_ready(),
            Instruction::Pl1 { dest, src, .. } => dest.has_slot() && src.value_ready(),
            Instruction::Resolve { src, .. } => src.as_ref().is_none_or(|s| s.value_ready()),
            Instruction::ModSwitch { srcs, .. } => srcs.iter().all(|s| s.value_ready()),
        }
    }

    /// The "execution complete" contract: advance destination readiness and
    /// drop every operand reference this instruction holds.
    pub fn complete_execution(&self) {
        match self {
            Instruction::Nop => {}
            Instruction::BinOp {
                dest, src1, src2, ..
            } => {
                src1.dec_reference();
                src2.dec_reference();
                dest.set_value_ready(true);
                dest.dec_reference();
            }
            Instruction::UnOp { dest, src, .. } => {
                src.dec_reference();
                dest.set_value_ready(true);
                dest.dec_reference();
            }
            Instruction::Evg { dest, .. } => {
                dest.set_value_ready(true);
                dest.dec_reference();
            }
            Instruction::Ntt { dest, src, .. } => {
                match src {
                    VectorOrBcu::Vector(reg) => reg.dec_reference(),
                    VectorOrBcu::Bcu(reg) => {
                        reg.execute_read();
                        reg.dec_reference();
                    }
                }
                dest.set_value_ready(true);
                dest.dec_reference();
            }
            Instruction::BcRead { dest, src, .. } => {
                src.execute_read();
                src.dec_reference();
                dest.set_value_ready(true);
                dest.dec_reference();
            }
            Instruction::BcWrite { dest, src, .. } => {
                src.dec_reference();
                dest.execute_write();
                dest.dec_reference();
            }
            Instruction::Sud {
                dest, src1, src2, ..
            } => {
                src1.dec_reference();
                match src2 {
                    VectorOrBcu::Vector(reg) => reg.dec_reference(),
                    VectorOrBcu::Bcu(reg) => {
                        reg.execute_read();
                        reg.dec_reference();
                    }
                }
                dest.set_value_ready(true);
                dest.dec_reference();
            }
            Instruction::Pl1 { dest, src, .. } => {
                src.dec_reference();
                dest.execute_write();
                dest.dec_reference();
            }
            Instruction::Resolve { op, dests, src, .. } => {
                if let Some(src) = src {
                    src.dec_reference();
                }
                for dest in dests {
                    dest.dec_reference();
                }
                if *op == OpCode::Rsi {
                    return;
                }
                // One resolve write readies one destination; the budget of
                // resolve instructions equals the destination count, so the
                // set is fully ready when the last one retires.
                for dest in dests {
                    if !dest.value_ready() {
                        dest.set_value_ready(true);
                        return;
                    }
                }
            }
            Instruction::ModSwitch { dest, srcs, .. } => {
                for src in srcs {
                    src.dec_reference();
                }
                dest.set_value_ready(true);
                dest.dec_reference();
            }
        }
    }

    /// Splits an NTT whose source sits in a base-conversion buffer into a
    /// buffer read feeding the butterfly network through a forwarding
    /// register. A plain-register NTT stays whole.
    pub fn split_ntt(&self) -> Vec<Rc<Instruction>> {
        let Instruction::Ntt { dest, src, limb } = self else {
            panic!("split_ntt on {} instruction", self.opcode());
        };
        match src {
            VectorOrBcu::Bcu(bcu) => {
                let fw = PhysicalRegister::forwarding();
                let read = Rc::new(Instruction::BcRead {
                    dest: fw.clone(),
                    src: bcu.clone(),
                    limb: *limb,
                });
                fw.inc_reference();
                let ntt = Rc::new(Instruction::Ntt {
                    dest: dest.clone(),
                    src: VectorOrBcu::Vector(fw.clone()),
                    limb: *limb,
                });
                fw.inc_reference();
                vec![read, ntt]
            }
            VectorOrBcu::Vector(reg) => {
                vec![Rc::new(Instruction::Ntt {
                    dest: dest.clone(),
                    src: VectorOrBcu::Vector(reg.clone()),
                    limb: *limb,
                })]
            }
        }
    }

    /// Splits a scale-and-divide into (BcRead →) NTT → Sub → Div chained
    /// through forwarding registers. The logical destination and sources
    /// are consumed by the terminal stages.
    pub fn split_sud(&self) -> Vec<Rc<Instruction>> {
        let Instruction::Sud {
            dest,
            src1,
            src2,
            limb,
        } = self
        else {
            panic!("split_sud on {} instruction", self.opcode());
        };
        let limb = *limb;
        let mut split = Vec::with_capacity(4);

        let ntt_out = PhysicalRegister::forwarding();
        match src2 {
            VectorOrBcu::Bcu(bcu) => {
                let read_out = PhysicalRegister::forwarding();
                let read = Rc::new(Instruction::BcRead {
                    dest: read_out.clone(),
                    src: bcu.clone(),
                    limb,
                });
                read_out.inc_reference();
                let ntt = Rc::new(Instruction::Ntt {
                    dest: ntt_out.clone(),
                    src: VectorOrBcu::Vector(read_out.clone()),
                    limb,
                });
                read_out.inc_reference();
                ntt_out.inc_reference();
                split.push(read);
                split.push(ntt);
            }
            VectorOrBcu::Vector(reg) => {
                let ntt = Rc::new(Instruction::Ntt {
                    dest: ntt_out.clone(),
                    src: VectorOrBcu::Vector(reg.clone()),
                    limb,
                });
                ntt_out.inc_reference();
                split.push(ntt);
            }
        }

        let sub_out = PhysicalRegister::forwarding();
        let sub = Rc::new(Instruction::BinOp {
            op: OpCode::Sub,
            dest: sub_out.clone(),
            src1: src1.clone(),
            src2: ntt_out.clone(),
            limb,
        });
        ntt_out.inc_reference();
        sub_out.inc_reference();
        split.push(sub);

        let div = Rc::new(Instruction::UnOp {
            op: OpCode::Div,
            rot_index: None,
            dest: dest.clone(),
            src: sub_out.clone(),
            limb,
        });
        sub_out.inc_reference();
        split.push(div);
        split
    }

    /// Splits the first key-switch phase into an iNTT feeding a buffer
    /// write through a forwarding register.
    pub fn split_pl1(&self) -> Vec<Rc<Instruction>> {
        let Instruction::Pl1 { dest, src, limb } = self else {
            panic!("split_pl1 on {} instruction", self.opcode());
        };
        let fw = PhysicalRegister::forwarding();
        let intt = Rc::new(Instruction::UnOp {
            op: OpCode::Int,
            rot_index: None,
            dest: fw.clone(),
            src: src.clone(),
            limb: *limb,
        });
        fw.inc_reference();
        let write = Rc::new(Instruction::BcWrite {
            dest: dest.clone(),
            src: fw.clone(),
            limb: *limb,
        });
        fw.inc_reference();
        vec![intt, write]
    }

    pub fn has_bcu_source(&self) -> bool {
        matches!(
            self,
            Instruction::Ntt {
                src: VectorOrBcu::Bcu(_),
                ..
            } | Instruction::Sud {
                src2: VectorOrBcu::Bcu(_),
                ..
            }
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nop => write!(f, "nop"),
            Instruction::BinOp {
                op,
                dest,
                src1,
                src2,
                limb,
            } => write!(f, "{op} {dest}: {src1}, {src2} | {limb}"),
            Instruction::UnOp {
                op,
                rot_index,
                dest,
                src,
                limb,
            } => {
                write!(f, "{op}")?;
                if let Some(index) = rot_index {
                    write!(f, " {index}")?;
                }
                write!(f, " {dest}: {src} | {limb}")
            }
            Instruction::Evg { dest, limb } => write!(f, "evg {dest}: | {limb}"),
            Instruction::Ntt { dest, src, limb } => write!(f, "ntt {dest}: {src} | {limb}"),
            Instruction::BcRead { dest, src, limb } => write!(f, "bcr {dest}: {src} | {limb}"),
            Instruction::BcWrite { dest, src, limb } => write!(f, "bcw {dest}: {src} | {limb}"),
            Instruction::Sud {
                dest,
                src1,
                src2,
                limb,
            } => write!(f, "sud {dest}: {src1}, {src2} | {limb}"),
            Instruction::Pl1 { dest, src, limb } => write!(f, "pl1 {dest}: {src} | {limb}"),
            Instruction::Resolve { op, dests, src, limb } => {
                write!(f, "{op} {{")?;
                for (i, dest) in dests.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{dest}")?;
                }
                write!(f, "}}:")?;
                if let Some(src) = src {
                    write!(f, " {src}")?;
                }
                if *op != OpCode::Rsi {
                    write!(f, " | {limb}")?;
                }
                Ok(())
            }
            Instruction::ModSwitch { dest, srcs, limb } => {
                write!(f, "mod {dest}: {{")?;
                for (i, src) in srcs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{src}")?;
                }
                write!(f, "}} | {limb}")
            }
        }
    }
}

/// A load, store, or spill in the memory unit's queues.
pub struct MemoryOp {
    op: OpCode,
    reg: Rc<PhysicalRegister>,
    addr: u64,
    size: usize,
    quashed: Cell<bool>,
}

impl MemoryOp {
    pub fn new(op: OpCode, reg: Rc<PhysicalRegister>, addr: u64, size: usize) -> Rc<Self> {
        assert!(
            matches!(op, OpCode::LoadV | OpCode::LoadS | OpCode::Store | OpCode::Spill),
            "{op} is not a memory operation"
        );
        Rc::new(Self {
            op,
            reg,
            addr,
            size,
            quashed: Cell::new(false),
        })
    }

    pub fn opcode(&self) -> OpCode {
        self.op
    }

    pub fn reg(&self) -> &Rc<PhysicalRegister> {
        &self.reg
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_load(&self) -> bool {
        matches!(self.op, OpCode::LoadV | OpCode::LoadS)
    }

    /// Loads are always issueable; stores and spills wait for the stored
    /// value.
    pub fn all_operands_ready(&self) -> bool {
        self.is_load() || self.reg.value_ready()
    }

    pub fn complete_execution(&self) {
        if self.quashed.get() {
            return;
        }
        if self.is_load() {
            self.reg.set_value_ready(true);
        }
        self.reg.dec_reference();
    }

    /// Cancels a still-queued store or spill overwritten by a later one.
    pub fn quash(&self) {
        self.quashed.set(true);
        self.reg.dec_reference();
    }

    pub fn is_quashed(&self) -> bool {
        self.quashed.get()
    }
}

impl fmt::Display for MemoryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {:#x}", self.op, self.reg, self.addr)
    }
}

/// A base-conversion init resident on (or waiting for) a buffer unit.
pub struct BciOp {
    dest: Rc<BaseConversionRegister>,
}

impl BciOp {
    pub fn new(dest: Rc<BaseConversionRegister>) -> Rc<Self> {
        Rc::new(Self { dest })
    }

    pub fn bind_slot(&self, slot: super::register::BcuSlotId) {
        self.dest.assign_slot(slot);
    }

    pub fn is_completed(&self) -> bool {
        self.dest.is_completed()
    }

    pub fn complete_execution(&self) {
        self.dest.clear_slot();
        self.dest.dec_reference();
    }
}

impl fmt::Display for BciOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bci {}", self.dest)
    }
}

/// A collective (`dis`, `rcv`, `joi`) waiting on the network barrier.
pub struct CollectiveOp {
    op: OpCode,
    dest: Option<Rc<PhysicalRegister>>,
    src: Option<Rc<PhysicalRegister>>,
    sync_id: u64,
    sync_size: u64,
    limb: Option<LimbId>,
}

impl CollectiveOp {
    pub fn new(
        op: OpCode,
        dest: Option<Rc<PhysicalRegister>>,
        src: Option<Rc<PhysicalRegister>>,
        sync_id: u64,
        sync_size: u64,
        limb: Option<LimbId>,
    ) -> Rc<Self> {
        assert!(
            matches!(op, OpCode::Dis | OpCode::Rcv | OpCode::Joi),
            "{op} is not a collective operation"
        );
        Rc::new(Self {
            op,
            dest,
            src,
            sync_id,
            sync_size,
            limb,
        })
    }

    pub fn opcode(&self) -> OpCode {
        self.op
    }

    pub fn sync_id(&self) -> u64 {
        self.sync_id
    }

    pub fn sync_size(&self) -> u64 {
        self.sync_size
    }

    pub fn has_source(&self) -> bool {
        self.src.is_some()
    }

    pub fn has_dest(&self) -> bool {
        self.dest.is_some()
    }

    pub fn all_operands_ready(&self) -> bool {
        self.src.as_ref().is_none_or(|s| s.value_ready())
    }

    pub fn complete_execution(&self) {
        if let Some(dest) = &self.dest {
            dest.set_value_ready(true);
            dest.dec_reference();
        }
        if let Some(src) = &self.src {
            src.dec_reference();
        }
    }
}

impl fmt::Display for CollectiveOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}:{} ", self.op, self.sync_id, self.sync_size)?;
        if let Some(dest) = &self.dest {
            write!(f, "{dest}")?;
        }
        write!(f, " : ")?;
        if let Some(src) = &self.src {
            write!(f, "{src}")?;
        }
        if let Some(limb) = self.limb {
            write!(f, " | {limb}")?;
        }
        Ok(())
    }
}
