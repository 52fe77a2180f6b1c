use std::sync::Arc;

use log::info;

use crate::Cycle;
use crate::chiplet::Chiplet;
use crate::core::config::SimConfig;
use crate::core::error::{ConfigError, SimError};
use crate::core::latency::Latency;
use crate::core::memory::MemoryBackend;
use crate::isa::trace::TraceReader;
use crate::network::Network;

pub use crate::core::stats::RunReport;

/// The whole accelerator: N chiplets sharing one collective network,
/// advanced by a host-driven clock.
pub struct Accelerator {
    chiplets: Vec<Chiplet>,
    network: Arc<Network>,
    clock_hz: u64,
    cycle: Cycle,
}

impl Accelerator {
    /// Builds the accelerator from a validated configuration, one trace
    /// reader and one memory backend per chiplet.
    pub fn new(
        config: &SimConfig,
        readers: Vec<Box<dyn TraceReader>>,
        backends: Vec<Box<dyn MemoryBackend>>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        if readers.len() != config.num_chiplets {
            return Err(ConfigError::TraceCountMismatch {
                chiplets: config.num_chiplets,
                traces: readers.len(),
            }
            .into());
        }
        assert!(
            backends.len() == readers.len(),
            "one memory backend per chiplet"
        );

        let clock_hz = config.clock_hz().map_err(SimError::from)?;
        let link_bw = config.link_bandwidth().map_err(SimError::from)?;
        let latency = Latency::for_vec_depth(config.vec_depth);
        info!(
            "accelerator: {} chiplet(s), vec depth {}, clock {}",
            config.num_chiplets, config.vec_depth, config.clock
        );

        let network = Arc::new(Network::new(config.num_chiplets, clock_hz, link_bw));
        let chiplets = readers
            .into_iter()
            .zip(backends)
            .enumerate()
            .map(|(id, (reader, backend))| {
                Chiplet::new(id as u32, config, latency, reader, backend, network.clone())
            })
            .collect();

        Ok(Self {
            chiplets,
            network,
            clock_hz,
            cycle: 0,
        })
    }

    /// Advances every chiplet, then the network, by one cycle. Returns
    /// true once every chiplet has drained its trace and pipelines.
    pub fn tick(&mut self) -> Result<bool, SimError> {
        let cycle = self.cycle;
        let mut done = true;
        for chiplet in &mut self.chiplets {
            done &= chiplet.tick(cycle)?;
        }
        self.network.tick(cycle);
        self.cycle += 1;
        Ok(done)
    }

    /// Runs the simulation to completion and reports statistics.
    pub fn run(&mut self) -> Result<RunReport, SimError> {
        while !self.tick()? {}
        Ok(self.report())
    }

    pub fn report(&self) -> RunReport {
        let nanoseconds = self.cycle * 1_000_000_000 / self.clock_hz;
        RunReport {
            cycles: self.cycle,
            nanoseconds,
            chiplets: self
                .chiplets
                .iter()
                .map(|chiplet| chiplet.report(nanoseconds))
                .collect(),
            network: self.network.stats(),
        }
    }

    pub fn current_cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn chiplet(&self, index: usize) -> &Chiplet {
        &self.chiplets[index]
    }

    pub fn network(&self) -> &Network {
        &self.network
    }
}
