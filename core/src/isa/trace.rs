use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use regex::Regex;

use crate::core::error::TraceError;
use crate::isa::opcode::OpCode;

/// One operand as it appears in the trace text, before renaming.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    /// `rN`, with `[X]` marking the architectural register's last use.
    Vector { id: u16, dead: bool },
    /// `sN`, with the same dead marker.
    Scalar { id: u16, dead: bool },
    /// `bN` or `bN{K}` or `BN`: a reference to a base-conversion register.
    BcuRef { bcu_id: u8, slot: Option<u16> },
    /// The destination of a `bci`, carrying how many writes fill the
    /// buffer and how many reads drain it.
    BcuInit {
        bcu_id: u8,
        num_writes: u8,
        num_reads: u8,
    },
    /// A named memory location; `{F}` requests freeing it after use.
    Term { name: String, free_from_mem: bool },
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Vector { id, dead } => {
                write!(f, "r{id}{}", if *dead { "[X]" } else { "" })
            }
            Operand::Scalar { id, dead } => {
                write!(f, "s{id}{}", if *dead { "[X]" } else { "" })
            }
            Operand::BcuRef { bcu_id, slot: Some(slot) } => write!(f, "b{bcu_id}{{{slot}}}"),
            Operand::BcuRef { bcu_id, slot: None } => write!(f, "B{bcu_id}"),
            Operand::BcuInit { bcu_id, .. } => write!(f, "b{bcu_id}"),
            Operand::Term { name, free_from_mem } => {
                write!(f, "{name}{}", if *free_from_mem { "{F}" } else { "" })
            }
        }
    }
}

/// One trace line, parsed but not yet renamed or routed.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedInstruction {
    pub opcode: OpCode,
    pub rot_index: Option<i32>,
    pub limb: Option<u16>,
    pub sync_id: Option<u64>,
    pub sync_size: Option<u64>,
    pub dests: Vec<Operand>,
    pub srcs: Vec<Operand>,
}

impl ParsedInstruction {
    fn new(opcode: OpCode, limb: Option<u16>, dests: Vec<Operand>, srcs: Vec<Operand>) -> Self {
        Self {
            opcode,
            rot_index: None,
            limb,
            sync_id: None,
            sync_size: None,
            dests,
            srcs,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, operands: &[Operand]) -> fmt::Result {
    for (i, op) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{op}")?;
    }
    Ok(())
}

/// Canonical trace text for this instruction. Re-parsing the emitted line
/// yields a structurally equal record.
impl fmt::Display for ParsedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode {
            OpCode::Rsi => {
                write!(f, "rsi {{")?;
                write_list(f, &self.dests)?;
                write!(f, "}}")
            }
            OpCode::Rsv => {
                write!(f, "rsv {{")?;
                write_list(f, &self.dests)?;
                write!(
                    f,
                    "}}: {}: [] | {}",
                    self.srcs[0],
                    self.limb.unwrap_or(0)
                )
            }
            OpCode::Mod => {
                write!(f, "mod {}: {{", self.dests[0])?;
                write_list(f, &self.srcs)?;
                write!(f, "}} | {}", self.limb.unwrap_or(0))
            }
            OpCode::Rcv => write!(
                f,
                "rcv @ {}:{} {}:",
                self.sync_id.unwrap_or(0),
                self.sync_size.unwrap_or(0),
                self.dests[0]
            ),
            OpCode::Dis => write!(
                f,
                "dis @ {}:{} : {}",
                self.sync_id.unwrap_or(0),
                self.sync_size.unwrap_or(0),
                self.srcs[0]
            ),
            OpCode::Joi => {
                write!(
                    f,
                    "joi @ {}:{} ",
                    self.sync_id.unwrap_or(0),
                    self.sync_size.unwrap_or(0)
                )?;
                if let Some(dest) = self.dests.first() {
                    write!(f, "{dest}")?;
                }
                write!(f, ": ")?;
                if let Some(src) = self.srcs.first() {
                    write!(f, "{src} ")?;
                }
                write!(f, "| {}", self.limb.unwrap_or(0))
            }
            OpCode::Bci => {
                let Some(Operand::BcuInit {
                    bcu_id,
                    num_writes,
                    num_reads,
                }) = self.dests.first()
                else {
                    return Err(fmt::Error);
                };
                write!(f, "bci b{bcu_id}: [")?;
                for i in 0..*num_reads {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "B{i}")?;
                }
                write!(f, "] [")?;
                for i in 0..*num_writes {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "B{i}")?;
                }
                write!(f, "]")
            }
            OpCode::Rot => write!(
                f,
                "rot {} {}: {} | {}",
                self.rot_index.unwrap_or(0),
                self.dests[0],
                self.srcs[0],
                self.limb.unwrap_or(0)
            ),
            _ => {
                write!(f, "{} ", self.opcode)?;
                write_list(f, &self.dests)?;
                write!(f, ": ")?;
                write_list(f, &self.srcs)?;
                if let Some(limb) = self.limb {
                    write!(f, " | {limb}")?;
                }
                Ok(())
            }
        }
    }
}

/// Lazy source of parsed instructions; one per chiplet.
pub trait TraceReader {
    fn next_instruction(&mut self) -> Result<Option<ParsedInstruction>, TraceError>;
}

/// Parses the line-oriented text trace format.
pub struct TextTraceReader<R> {
    source_name: String,
    input: R,
    line_no: usize,
    rsi_re: Regex,
    rsv_re: Regex,
    mod_re: Regex,
    rcv_re: Regex,
    dis_re: Regex,
    joi_re: Regex,
}

impl TextTraceReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        let name = path.as_ref().display().to_string();
        let file = File::open(path.as_ref()).map_err(|source| TraceError::Io {
            source_name: name.clone(),
            source,
        })?;
        Ok(Self::new(name, BufReader::new(file)))
    }
}

impl<R: BufRead> TextTraceReader<R> {
    pub fn new(source_name: impl Into<String>, input: R) -> Self {
        Self {
            source_name: source_name.into(),
            input,
            line_no: 0,
            rsi_re: Regex::new(r"^\{(.*)\}$").unwrap(),
            rsv_re: Regex::new(r"^\{(.*)\}: (r[0-9]+(?:\[X\])?): \[.*\] \| ([0-9]+)$").unwrap(),
            mod_re: Regex::new(r"^(r[0-9]+(?:\[X\])?): \{(.*)\} \| ([0-9]+)$").unwrap(),
            rcv_re: Regex::new(r"^@ ([0-9]+):([0-9]+) (r[0-9]+(?:\[X\])?):$").unwrap(),
            dis_re: Regex::new(r"^@ ([0-9]+):([0-9]+) : (r[0-9]+(?:\[X\])?)$").unwrap(),
            joi_re: Regex::new(
                r"^@ ([0-9]+):([0-9]+) (r[0-9]+(?:\[X\])?)?: ?(r[0-9]+(?:\[X\])?)? ?\| ([0-9]+)$",
            )
            .unwrap(),
        }
    }

    fn malformed(&self, text: &str) -> TraceError {
        TraceError::Malformed {
            source_name: self.source_name.clone(),
            line: self.line_no,
            text: text.to_string(),
        }
    }

    fn parse_operand(&self, text: &str, full: &str) -> Result<Operand, TraceError> {
        let text = text.trim();
        let malformed = || self.malformed(full);
        let mut chars = text.chars();
        let kind = chars.next().ok_or_else(|| malformed())?;
        let rest = chars.as_str();
        match kind {
            'r' | 's' => {
                let (digits, dead) = match rest.find('[') {
                    Some(pos) => (&rest[..pos], true),
                    None => (rest, false),
                };
                let id: u16 = digits.parse().map_err(|_| malformed())?;
                if kind == 'r' {
                    Ok(Operand::Vector { id, dead })
                } else {
                    Ok(Operand::Scalar { id, dead })
                }
            }
            'B' => {
                let bcu_id: u8 = rest.parse().map_err(|_| malformed())?;
                Ok(Operand::BcuRef { bcu_id, slot: None })
            }
            'b' => match (rest.find('{'), rest.find('}')) {
                (Some(lb), Some(rb)) if lb < rb => {
                    let bcu_id: u8 = rest[..lb].parse().map_err(|_| malformed())?;
                    let slot: u16 = rest[lb + 1..rb].parse().map_err(|_| malformed())?;
                    Ok(Operand::BcuRef {
                        bcu_id,
                        slot: Some(slot),
                    })
                }
                (None, None) => {
                    let bcu_id: u8 = rest.parse().map_err(|_| malformed())?;
                    Ok(Operand::BcuRef { bcu_id, slot: None })
                }
                _ => Err(malformed()),
            },
            _ => Err(malformed()),
        }
    }

    fn parse_operand_list(&self, text: &str, full: &str) -> Result<Vec<Operand>, TraceError> {
        text.split(',')
            .map(|item| self.parse_operand(item, full))
            .collect()
    }

    fn parse_rsi(&self, rest: &str, full: &str) -> Result<ParsedInstruction, TraceError> {
        let caps = self.rsi_re.captures(rest).ok_or_else(|| self.malformed(full))?;
        let dests = self.parse_operand_list(&caps[1], full)?;
        Ok(ParsedInstruction::new(OpCode::Rsi, None, dests, Vec::new()))
    }

    fn parse_rsv(&self, rest: &str, full: &str) -> Result<ParsedInstruction, TraceError> {
        let caps = self.rsv_re.captures(rest).ok_or_else(|| self.malformed(full))?;
        let dests = self.parse_operand_list(&caps[1], full)?;
        let src = self.parse_operand(&caps[2], full)?;
        let limb: u16 = caps[3].parse().map_err(|_| self.malformed(full))?;
        Ok(ParsedInstruction::new(
            OpCode::Rsv,
            Some(limb),
            dests,
            vec![src],
        ))
    }

    fn parse_mod(&self, rest: &str, full: &str) -> Result<ParsedInstruction, TraceError> {
        let caps = self.mod_re.captures(rest).ok_or_else(|| self.malformed(full))?;
        let dest = self.parse_operand(&caps[1], full)?;
        let srcs = self.parse_operand_list(&caps[2], full)?;
        let limb: u16 = caps[3].parse().map_err(|_| self.malformed(full))?;
        Ok(ParsedInstruction::new(
            OpCode::Mod,
            Some(limb),
            vec![dest],
            srcs,
        ))
    }

    fn parse_rcv(&self, rest: &str, full: &str) -> Result<ParsedInstruction, TraceError> {
        let caps = self.rcv_re.captures(rest).ok_or_else(|| self.malformed(full))?;
        let dest = self.parse_operand(&caps[3], full)?;
        let mut instruction = ParsedInstruction::new(OpCode::Rcv, None, vec![dest], Vec::new());
        instruction.sync_id = Some(caps[1].parse().map_err(|_| self.malformed(full))?);
        instruction.sync_size = Some(caps[2].parse().map_err(|_| self.malformed(full))?);
        Ok(instruction)
    }

    fn parse_dis(&self, rest: &str, full: &str) -> Result<ParsedInstruction, TraceError> {
        let caps = self.dis_re.captures(rest).ok_or_else(|| self.malformed(full))?;
        let src = self.parse_operand(&caps[3], full)?;
        let mut instruction = ParsedInstruction::new(OpCode::Dis, None, Vec::new(), vec![src]);
        instruction.sync_id = Some(caps[1].parse().map_err(|_| self.malformed(full))?);
        instruction.sync_size = Some(caps[2].parse().map_err(|_| self.malformed(full))?);
        Ok(instruction)
    }

    fn parse_joi(&self, rest: &str, full: &str) -> Result<ParsedInstruction, TraceError> {
        let caps = self.joi_re.captures(rest).ok_or_else(|| self.malformed(full))?;
        let dests = match caps.get(3) {
            Some(m) => vec![self.parse_operand(m.as_str(), full)?],
            None => Vec::new(),
        };
        let srcs = match caps.get(4) {
            Some(m) => vec![self.parse_operand(m.as_str(), full)?],
            None => Vec::new(),
        };
        if dests.is_empty() && srcs.is_empty() {
            return Err(self.malformed(full));
        }
        let limb: u16 = caps[5].parse().map_err(|_| self.malformed(full))?;
        let mut instruction = ParsedInstruction::new(OpCode::Joi, Some(limb), dests, srcs);
        instruction.sync_id = Some(caps[1].parse().map_err(|_| self.malformed(full))?);
        instruction.sync_size = Some(caps[2].parse().map_err(|_| self.malformed(full))?);
        Ok(instruction)
    }

    fn parse_bci(&self, dests_str: &str, srcs_str: &str, full: &str) -> Result<ParsedInstruction, TraceError> {
        let dest = dests_str.trim();
        if !dest.starts_with('b') && !dest.starts_with('B') {
            return Err(self.malformed(full));
        }
        let bcu_id: u8 = dest[1..].parse().map_err(|_| self.malformed(full))?;

        let mut groups = Vec::with_capacity(2);
        let mut rest = srcs_str;
        for _ in 0..2 {
            let lb = rest.find('[').ok_or_else(|| self.malformed(full))?;
            let rb = rest.find(']').ok_or_else(|| self.malformed(full))?;
            if rb < lb {
                return Err(self.malformed(full));
            }
            let inner = rest[lb + 1..rb].trim();
            if inner.is_empty() {
                return Err(self.malformed(full));
            }
            groups.push(inner.split(',').count() as u8);
            rest = &rest[rb + 1..];
        }

        let dest = Operand::BcuInit {
            bcu_id,
            num_reads: groups[0],
            num_writes: groups[1],
        };
        Ok(ParsedInstruction::new(
            OpCode::Bci,
            None,
            vec![dest],
            Vec::new(),
        ))
    }

    fn parse_memory(
        &self,
        opcode: OpCode,
        limb: Option<u16>,
        dests_str: &str,
        srcs_str: &str,
        full: &str,
    ) -> Result<ParsedInstruction, TraceError> {
        if dests_str.contains(',') || srcs_str.contains(',') {
            return Err(self.malformed(full));
        }
        let dest = self.parse_operand(dests_str, full)?;
        match (&dest, opcode) {
            (Operand::Scalar { .. }, OpCode::LoadS) => {}
            (Operand::Vector { .. }, OpCode::LoadS) => return Err(self.malformed(full)),
            (Operand::Vector { .. }, _) => {}
            _ => return Err(self.malformed(full)),
        }

        let mut name = srcs_str.trim();
        let mut free_from_mem = false;
        if let Some(stripped) = name.strip_suffix("{F}") {
            name = stripped.trim_end();
            free_from_mem = true;
        }
        if name.is_empty() {
            return Err(self.malformed(full));
        }
        let src = Operand::Term {
            name: name.to_string(),
            free_from_mem,
        };
        Ok(ParsedInstruction::new(opcode, limb, vec![dest], vec![src]))
    }

    fn parse_line(&self, text: &str) -> Result<ParsedInstruction, TraceError> {
        let (mnemonic, rest) = text.split_once(' ').ok_or_else(|| self.malformed(text))?;
        if matches!(mnemonic, "pl2" | "pl3" | "pl4") {
            return Err(TraceError::UnsupportedOpcode {
                source_name: self.source_name.clone(),
                line: self.line_no,
                mnemonic: mnemonic.to_string(),
            });
        }
        let opcode = OpCode::from_mnemonic(mnemonic).ok_or_else(|| TraceError::UnknownOpcode {
            source_name: self.source_name.clone(),
            line: self.line_no,
            text: text.to_string(),
        })?;

        let mut rest = rest.trim();
        let mut rot_index = None;
        if opcode == OpCode::Rot {
            let (index, tail) = rest.split_once(' ').ok_or_else(|| self.malformed(text))?;
            rot_index = Some(index.parse().map_err(|_| self.malformed(text))?);
            rest = tail.trim();
        }

        match opcode {
            OpCode::Rsi => return self.parse_rsi(rest, text),
            OpCode::Rsv => return self.parse_rsv(rest, text),
            OpCode::Mod => return self.parse_mod(rest, text),
            OpCode::Rcv => return self.parse_rcv(rest, text),
            OpCode::Dis => return self.parse_dis(rest, text),
            OpCode::Joi => return self.parse_joi(rest, text),
            _ => {}
        }

        let (body, limb) = match rest.rsplit_once('|') {
            Some((body, limb_str)) => {
                let limb: u16 = limb_str.trim().parse().map_err(|_| self.malformed(text))?;
                (body.trim_end(), Some(limb))
            }
            None => (rest, None),
        };
        let (dests_str, srcs_str) = body.split_once(':').ok_or_else(|| self.malformed(text))?;
        let dests_str = dests_str.trim();
        let srcs_str = srcs_str.trim();

        match opcode {
            OpCode::Bci => self.parse_bci(dests_str, srcs_str, text),
            OpCode::LoadV | OpCode::LoadS | OpCode::Store | OpCode::Spill | OpCode::EvkGen => {
                self.parse_memory(opcode, limb, dests_str, srcs_str, text)
            }
            _ => {
                let dests = self.parse_operand_list(dests_str, text)?;
                let srcs = self.parse_operand_list(srcs_str, text)?;
                let mut instruction = ParsedInstruction::new(opcode, limb, dests, srcs);
                instruction.rot_index = rot_index;
                Ok(instruction)
            }
        }
    }
}

impl<R: BufRead> TraceReader for TextTraceReader<R> {
    fn next_instruction(&mut self) -> Result<Option<ParsedInstruction>, TraceError> {
        loop {
            let mut line = String::new();
            let read = self.input.read_line(&mut line).map_err(|source| TraceError::Io {
                source_name: self.source_name.clone(),
                source,
            })?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            return self.parse_line(text).map(Some);
        }
    }
}
