//! Emits a randomized single-chiplet compute trace: terms are loaded,
//! combined through adds, multiplies, and rotations, and the surviving
//! values stored back. Every emitted line is round-tripped through the
//! trace parser before it is printed.
//!
//! Usage: gen_compute_trace [num-instructions] [seed] [num-limbs]

use std::io::Cursor;

use anyhow::{Context, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tessera_core::isa::trace::{TextTraceReader, TraceReader};

struct Generator {
    rng: StdRng,
    num_limbs: u16,
    /// Architectural registers currently holding a live value.
    live: Vec<u16>,
    next_reg: u16,
    next_term: u32,
    lines: Vec<String>,
}

impl Generator {
    fn new(seed: u64, num_limbs: u16) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            num_limbs,
            live: Vec::new(),
            next_reg: 0,
            next_term: 0,
            lines: Vec::new(),
        }
    }

    fn fresh_reg(&mut self) -> u16 {
        let reg = self.next_reg;
        self.next_reg += 1;
        reg
    }

    fn limb(&mut self) -> u16 {
        self.rng.gen_range(0..self.num_limbs)
    }

    /// Picks a live source register; marks it dead (final read) roughly
    /// half the time to exercise rename-map erasure.
    fn source(&mut self) -> String {
        let idx = self.rng.gen_range(0..self.live.len());
        if self.rng.gen_range(0..2) == 0 {
            let reg = self.live.swap_remove(idx);
            format!("r{reg}[X]")
        } else {
            format!("r{}", self.live[idx])
        }
    }

    fn emit_load(&mut self) {
        let reg = self.fresh_reg();
        let term = self.next_term;
        self.next_term += 1;
        self.lines.push(format!("load r{reg}: poly_{term}"));
        self.live.push(reg);
    }

    fn emit_bin_op(&mut self) {
        let op = ["add", "sub", "mul"][self.rng.gen_range(0..3)];
        let src1 = self.source();
        let src2 = self.source();
        let dest = self.fresh_reg();
        let limb = self.limb();
        self.lines.push(format!("{op} r{dest}: {src1}, {src2} | {limb}"));
        self.live.push(dest);
    }

    fn emit_un_op(&mut self) {
        let src = self.source();
        let dest = self.fresh_reg();
        let limb = self.limb();
        if self.rng.gen_range(0..2) == 0 {
            let index = self.rng.gen_range(1..1024);
            self.lines.push(format!("rot {index} r{dest}: {src} | {limb}"));
        } else {
            self.lines.push(format!("neg r{dest}: {src} | {limb}"));
        }
        self.live.push(dest);
    }

    fn emit_store(&mut self) {
        let src = self.source();
        let term = self.next_term;
        self.next_term += 1;
        self.lines.push(format!("store {src}: out_{term}"));
    }

    fn run(&mut self, count: usize) {
        for _ in 0..count {
            if self.live.len() < 2 {
                self.emit_load();
                continue;
            }
            match self.rng.gen_range(0..10) {
                0..=2 => self.emit_load(),
                3..=6 => self.emit_bin_op(),
                7..=8 => self.emit_un_op(),
                _ => self.emit_store(),
            }
        }
        // Drain what's still live so the trace releases every register.
        while let Some(reg) = self.live.pop() {
            let term = self.next_term;
            self.next_term += 1;
            self.lines.push(format!("store r{reg}[X]: out_{term}"));
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let count: usize = args.get(1).map_or(Ok(200), |s| s.parse()).context("bad count")?;
    let seed: u64 = args.get(2).map_or(Ok(1), |s| s.parse()).context("bad seed")?;
    let num_limbs: u16 = args.get(3).map_or(Ok(8), |s| s.parse()).context("bad limb count")?;

    let mut generator = Generator::new(seed, num_limbs);
    generator.run(count);

    let text = generator.lines.join("\n");
    let mut reader = TextTraceReader::new("generated", Cursor::new(text.clone()));
    let mut parsed = 0usize;
    while reader
        .next_instruction()
        .context("generated an unparseable line")?
        .is_some()
    {
        parsed += 1;
    }
    if parsed != generator.lines.len() {
        bail!("generated {} lines but parsed {parsed}", generator.lines.len());
    }

    println!("{text}");
    Ok(())
}
