pub mod opcode;
pub mod trace;

pub use opcode::OpCode;
pub use trace::{Operand, ParsedInstruction, TextTraceReader, TraceReader};
