#![allow(dead_code)] // each test binary uses its own slice of the harness

use std::io::Cursor;

use tessera_core::prelude::*;

/// A configuration sized for fast tests: default hardware, but a short
/// fixed memory latency and a wide backend issue port.
pub fn test_config(num_chiplets: usize) -> SimConfig {
    SimConfig {
        num_chiplets,
        mem_latency: 20,
        mem_issue_per_cycle: 64,
        ..SimConfig::default()
    }
}

/// Builds an accelerator over in-memory traces, one per chiplet.
pub fn build(traces: &[&str], config: &SimConfig) -> Accelerator {
    let readers: Vec<Box<dyn TraceReader>> = traces
        .iter()
        .enumerate()
        .map(|(i, text)| {
            Box::new(TextTraceReader::new(
                format!("trace{i}"),
                Cursor::new(text.to_string()),
            )) as Box<dyn TraceReader>
        })
        .collect();
    let backends: Vec<Box<dyn MemoryBackend>> = traces
        .iter()
        .map(|_| {
            Box::new(FixedLatencyMemory::new(
                config.mem_latency,
                config.mem_issue_per_cycle,
            )) as Box<dyn MemoryBackend>
        })
        .collect();
    Accelerator::new(config, readers, backends).expect("failed to build accelerator")
}

/// Ticks to completion, with a cycle cap so a scheduling bug fails the
/// test instead of hanging it.
pub fn run_capped(accelerator: &mut Accelerator, cap: u64) -> RunReport {
    for _ in 0..cap {
        if accelerator.tick().expect("simulation error") {
            return accelerator.report();
        }
    }
    panic!(
        "simulation still running after {cap} cycles (cycle {})",
        accelerator.current_cycle()
    );
}

/// Builds and runs a set of traces with the default test configuration.
pub fn run(traces: &[&str], config: &SimConfig) -> RunReport {
    let mut accelerator = build(traces, config);
    run_capped(&mut accelerator, 1_000_000)
}

/// Single-chiplet convenience wrapper.
pub fn run_single(trace: &str) -> RunReport {
    run(&[trace], &test_config(1))
}
