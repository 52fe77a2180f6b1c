//! Emits matched multi-chiplet collective traces: every round is either a
//! broadcast (one sender, the rest receive) or an aggregation (one
//! collector, the rest contribute). Writes `collective_<i>.trace` in the
//! given directory, one file per chiplet.
//!
//! Usage: gen_collective_trace <out-dir> [num-chiplets] [rounds] [seed]

use std::fs;
use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tessera_core::isa::trace::{TextTraceReader, TraceReader};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let out_dir = args.get(1).context("usage: gen_collective_trace <out-dir> [chiplets] [rounds] [seed]")?;
    let num_chiplets: usize = args.get(2).map_or(Ok(4), |s| s.parse()).context("bad chiplet count")?;
    let rounds: usize = args.get(3).map_or(Ok(16), |s| s.parse()).context("bad round count")?;
    let seed: u64 = args.get(4).map_or(Ok(1), |s| s.parse()).context("bad seed")?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut traces: Vec<Vec<String>> = vec![Vec::new(); num_chiplets];
    let mut next_reg = vec![0u16; num_chiplets];

    // Seed every chiplet with one loaded value to send around.
    for (chiplet, trace) in traces.iter_mut().enumerate() {
        trace.push(format!("load r0: seed_{chiplet}"));
        next_reg[chiplet] = 1;
    }

    for sync_id in 0..rounds as u64 {
        let focus = rng.gen_range(0..num_chiplets);
        let broadcast = rng.gen_range(0..2) == 0;
        let limb = rng.gen_range(0..8);
        for chiplet in 0..num_chiplets {
            let reg = next_reg[chiplet];
            if broadcast {
                if chiplet == focus {
                    traces[chiplet].push(format!("dis @ {sync_id}:{num_chiplets} : r0"));
                } else {
                    traces[chiplet].push(format!("rcv @ {sync_id}:{num_chiplets} r{reg}:"));
                    next_reg[chiplet] += 1;
                }
            } else if chiplet == focus {
                traces[chiplet].push(format!("joi @ {sync_id}:{num_chiplets} r{reg}: | {limb}"));
                next_reg[chiplet] += 1;
            } else {
                traces[chiplet].push(format!("joi @ {sync_id}:{num_chiplets} : r0 | {limb}"));
            }
        }
    }

    // Store every received value so the traces retire cleanly.
    for (chiplet, trace) in traces.iter_mut().enumerate() {
        for reg in 0..next_reg[chiplet] {
            trace.push(format!("store r{reg}[X]: out_{chiplet}_{reg}"));
        }
    }

    fs::create_dir_all(out_dir).with_context(|| format!("failed to create {out_dir}"))?;
    for (chiplet, trace) in traces.iter().enumerate() {
        let text = trace.join("\n");
        let mut reader = TextTraceReader::new("generated", Cursor::new(text.clone()));
        while reader
            .next_instruction()
            .context("generated an unparseable line")?
            .is_some()
        {}
        let path = Path::new(out_dir).join(format!("collective_{chiplet}.trace"));
        fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}: {} instructions", path.display(), trace.len());
    }
    Ok(())
}
