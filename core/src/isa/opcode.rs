use std::fmt;

/// Every operation the execution engine understands.
///
/// `Div` and `BcR` never appear in traces; they are synthesized when a
/// scale-and-divide or base-conversion read is split into pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    LoadV,
    LoadS,
    Store,
    Spill,
    EvkGen,
    Dis,
    Rcv,
    Joi,
    Add,
    Sub,
    Neg,
    Mul,
    Div,
    Rot,
    Con,
    Ntt,
    Int,
    Mov,
    Pl1,
    SuD,
    Bci,
    BcW,
    BcR,
    Nop,
    Rsi,
    Rsv,
    Mod,
}

impl OpCode {
    /// Maps a trace mnemonic to its opcode, canonicalizing the scalar and
    /// plaintext aliases (`ads`, `sus`, `mup`, `mus`, `loas`).
    pub fn from_mnemonic(mnemonic: &str) -> Option<OpCode> {
        let op = match mnemonic {
            "load" => OpCode::LoadV,
            "loas" => OpCode::LoadS,
            "store" => OpCode::Store,
            "spill" => OpCode::Spill,
            "evg" => OpCode::EvkGen,
            "dis" => OpCode::Dis,
            "rcv" => OpCode::Rcv,
            "joi" => OpCode::Joi,
            "add" | "ads" => OpCode::Add,
            "sub" | "sus" => OpCode::Sub,
            "neg" => OpCode::Neg,
            "mul" | "mup" | "mus" => OpCode::Mul,
            "rot" => OpCode::Rot,
            "con" => OpCode::Con,
            "ntt" => OpCode::Ntt,
            "int" => OpCode::Int,
            "mov" => OpCode::Mov,
            "pl1" => OpCode::Pl1,
            "sud" => OpCode::SuD,
            "bci" => OpCode::Bci,
            "bcw" => OpCode::BcW,
            "rsi" => OpCode::Rsi,
            "rsv" => OpCode::Rsv,
            "mod" => OpCode::Mod,
            _ => return None,
        };
        Some(op)
    }

    /// The canonical trace mnemonic for this opcode.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::LoadV => "load",
            OpCode::LoadS => "loas",
            OpCode::Store => "store",
            OpCode::Spill => "spill",
            OpCode::EvkGen => "evg",
            OpCode::Dis => "dis",
            OpCode::Rcv => "rcv",
            OpCode::Joi => "joi",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Neg => "neg",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Rot => "rot",
            OpCode::Con => "con",
            OpCode::Ntt => "ntt",
            OpCode::Int => "int",
            OpCode::Mov => "mov",
            OpCode::Pl1 => "pl1",
            OpCode::SuD => "sud",
            OpCode::Bci => "bci",
            OpCode::BcW => "bcw",
            OpCode::BcR => "bcr",
            OpCode::Nop => "nop",
            OpCode::Rsi => "rsi",
            OpCode::Rsv => "rsv",
            OpCode::Mod => "mod",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
