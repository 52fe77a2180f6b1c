use std::fs;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use log::info;

use tessera_core::prelude::*;

/// Cycle-accurate trace-driven simulator for a multi-chiplet FHE vector
/// accelerator.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about)]
struct Args {
    /// Instruction trace files, one per chiplet, in chiplet order.
    #[arg(required = true)]
    traces: Vec<PathBuf>,

    /// TOML configuration file; defaults apply for anything not set.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of chiplets (defaults to the trace count).
    #[arg(long)]
    num_chiplets: Option<usize>,

    /// Override the vector depth.
    #[arg(long)]
    vec_depth: Option<u64>,

    /// Override the core clock, e.g. "2GHz".
    #[arg(long)]
    clock: Option<String>,

    /// Override the network link bandwidth, e.g. "256GB/s".
    #[arg(long)]
    link_bw: Option<String>,

    /// Write the run report as JSON to this path ("-" for stdout).
    #[arg(long)]
    stats_json: Option<PathBuf>,

    /// Increase log verbosity (repeat for more).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(args: &Args) -> anyhow::Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => SimConfig::default(),
    };

    config.num_chiplets = args.num_chiplets.unwrap_or(args.traces.len());
    if let Some(vec_depth) = args.vec_depth {
        config.vec_depth = vec_depth;
    }
    if let Some(clock) = &args.clock {
        config.clock = clock.clone();
    }
    if let Some(link_bw) = &args.link_bw {
        config.link_bw = link_bw.clone();
    }
    config.verbose = config.verbose.max(u32::from(args.verbose));
    Ok(config)
}

fn log_filter(verbose: u32) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(config.verbose)),
    )
    .init();

    if args.traces.len() != config.num_chiplets {
        bail!(
            "{} chiplet(s) configured but {} trace file(s) given",
            config.num_chiplets,
            args.traces.len()
        );
    }

    let mut readers: Vec<Box<dyn TraceReader>> = Vec::new();
    for path in &args.traces {
        readers.push(Box::new(TextTraceReader::open(path)?));
    }
    let backends: Vec<Box<dyn MemoryBackend>> = (0..config.num_chiplets)
        .map(|_| {
            Box::new(FixedLatencyMemory::new(
                config.mem_latency,
                config.mem_issue_per_cycle,
            )) as Box<dyn MemoryBackend>
        })
        .collect();

    info!("starting simulation of {} trace(s)", args.traces.len());
    let mut accelerator = Accelerator::new(&config, readers, backends)?;
    let report = accelerator.run()?;

    print!("{report}");

    if let Some(path) = &args.stats_json {
        let json = serde_json::to_string_pretty(&report)?;
        if path.as_os_str() == "-" {
            println!("{json}");
        } else {
            fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }
    Ok(())
}
