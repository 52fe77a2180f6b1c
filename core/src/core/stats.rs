use std::fmt;

use serde::Serialize;

use crate::Cycle;

/// Raw counters kept by a functional unit.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct FunctionalUnitStats {
    pub total_cycles: Cycle,
    pub busy_cycles: Cycle,
    pub issue_cycles: Cycle,
}

impl FunctionalUnitStats {
    pub fn utilisation(&self) -> f64 {
        percentage(self.busy_cycles, self.total_cycles)
    }

    pub fn issue_rate(&self) -> f64 {
        percentage(self.issue_cycles, self.total_cycles)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FunctionalUnitReport {
    pub name: String,
    #[serde(flatten)]
    pub stats: FunctionalUnitStats,
    pub utilisation: f64,
    pub issue_rate: f64,
}

impl fmt::Display for FunctionalUnitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Functional Unit: {}", self.name)?;
        writeln!(f, "\tTotal Cycles: {}", self.stats.total_cycles)?;
        writeln!(f, "\tBusy Cycles: {}", self.stats.busy_cycles)?;
        writeln!(f, "\tIssue Cycles: {}", self.stats.issue_cycles)?;
        writeln!(f, "\tUtilisation %: {:.2}", self.utilisation)?;
        writeln!(f, "\tIssue Rate %: {:.2}", self.issue_rate)
    }
}

/// Raw counters kept by the memory unit.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct MemoryUnitStats {
    pub loads_issued: u64,
    pub stores_issued: u64,
    pub total_cycles: Cycle,
    pub busy_cycles: Cycle,
    pub total_latency: Cycle,
    pub max_latency: Cycle,
}

impl MemoryUnitStats {
    pub fn utilisation(&self) -> f64 {
        percentage(self.busy_cycles, self.total_cycles)
    }

    pub fn average_latency(&self) -> f64 {
        let issued = self.loads_issued + self.stores_issued;
        if issued == 0 {
            0.0
        } else {
            self.total_latency as f64 / issued as f64
        }
    }
}

impl fmt::Display for MemoryUnitStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Memory Unit")?;
        writeln!(f, "\tTotal Cycles: {}", self.total_cycles)?;
        writeln!(f, "\tBusy Cycles: {}", self.busy_cycles)?;
        writeln!(f, "\tUtilisation %: {:.2}", self.utilisation())?;
        writeln!(f, "\tLoads Executed: {}", self.loads_issued)?;
        writeln!(f, "\tStores Executed: {}", self.stores_issued)?;
        writeln!(f, "\tMax Latency: {}", self.max_latency)?;
        writeln!(f, "\tAverage Latency: {:.2}", self.average_latency())
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct NetworkStats {
    pub total_cycles: Cycle,
    pub busy_cycles: Cycle,
}

impl NetworkStats {
    pub fn utilisation(&self) -> f64 {
        percentage(self.busy_cycles, self.total_cycles)
    }
}

impl fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network Unit:")?;
        writeln!(f, "\tTotal Cycles: {}", self.total_cycles)?;
        writeln!(f, "\tBusy Cycles: {}", self.busy_cycles)?;
        writeln!(f, "\tUtilisation %: {:.2}", self.utilisation())
    }
}

/// End-of-run statistics for one chiplet.
#[derive(Clone, Debug, Serialize)]
pub struct ChipletReport {
    pub chiplet: u32,
    pub completed_ns: u64,
    pub memory: MemoryUnitStats,
    pub units: Vec<FunctionalUnitReport>,
    pub vector_register_reads: u64,
    pub vector_register_writes: u64,
}

impl fmt::Display for ChipletReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RULE: &str =
            "------------------------------------------------------------------------";
        const SUBRULE: &str =
            "- - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -";
        writeln!(f, "{RULE}")?;
        writeln!(f, "Chiplet: {} Statistics:", self.chiplet)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "- Completed at: {} ns", self.completed_ns)?;
        writeln!(f, "{RULE}")?;
        write!(f, "{}", self.memory)?;
        writeln!(f, "{RULE}")?;
        for unit in &self.units {
            write!(f, "{unit}")?;
            writeln!(f, "{SUBRULE}")?;
        }
        writeln!(f, "Register File:")?;
        writeln!(f, "\tVector Register Reads : {}", self.vector_register_reads)?;
        writeln!(f, "\tVector Register Writes: {}", self.vector_register_writes)?;
        writeln!(f, "{RULE}")
    }
}

/// Whole-run report: one entry per chiplet plus the shared network.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub cycles: Cycle,
    pub nanoseconds: u64,
    pub chiplets: Vec<ChipletReport>,
    pub network: NetworkStats,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RULE: &str =
            "------------------------------------------------------------------------";
        for chiplet in &self.chiplets {
            write!(f, "{chiplet}")?;
        }
        writeln!(f, "{RULE}")?;
        write!(f, "{}", self.network)?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "Finished in {} cycles ({} ns)", self.cycles, self.nanoseconds)
    }
}

fn percentage(part: Cycle, whole: Cycle) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}
