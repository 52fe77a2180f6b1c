pub mod config;
pub mod error;
pub mod interval;
pub mod latency;
pub mod memory;
pub mod stats;

pub use config::SimConfig;
pub use error::{ConfigError, SimError, TraceError};
pub use interval::{DisjointIntervalSet, Interval};
pub use latency::{LIMB_BYTES, Latency, SCALAR_BYTES};
pub use memory::{FixedLatencyMemory, MemoryBackend, MemoryRequest, RequestId};
