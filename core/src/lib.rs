pub mod accelerator;
pub mod chiplet;
pub mod core;
pub mod isa;
pub mod network;

/// Simulation time, in core clock cycles.
pub type Cycle = u64;

pub mod prelude {
    pub use crate::Cycle;
    pub use crate::accelerator::{Accelerator, RunReport};
    pub use crate::core::config::SimConfig;
    pub use crate::core::error::{ConfigError, SimError, TraceError};
    pub use crate::core::memory::{FixedLatencyMemory, MemoryBackend};
    pub use crate::isa::trace::{TextTraceReader, TraceReader};
}
