use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;

/// Full simulator configuration.
///
/// Every field has a default, so a TOML config file (or CLI override set)
/// only needs to name what it changes. Clock and bandwidth are kept as
/// strings in the config surface and parsed on use; `KB`/`MB`/`GB` are
/// binary multiples.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Log verbosity: 0 = warnings, 1 = info, 2 = debug, 3+ = trace.
    pub verbose: u32,
    /// Core clock, e.g. "1GHz".
    pub clock: String,
    /// Limbs processed per issue burst; the pipelining quantum.
    pub vec_depth: u64,
    pub num_chiplets: usize,

    pub num_vector_regs: u16,
    pub num_scalar_regs: u16,
    pub num_bcu_vregs: u16,

    pub num_add_units: u16,
    pub num_mul_units: u16,
    pub num_ntt_units: u16,
    pub num_rot_units: u16,
    pub num_tra_units: u16,
    pub num_bcu_units: u16,
    pub num_bcu_buffs: u16,
    pub num_evg_units: u16,

    /// When false, evaluation-key generation is rewritten into a vector
    /// load of the key material instead of occupying a generator unit.
    pub use_prng: bool,

    /// Bytes per backend memory request chunk.
    pub memory_request_width: usize,
    /// Concurrent in-flight instruction windows in the memory unit.
    pub mem_concurrency: usize,
    /// Backend model: cycles from chunk issue to chunk completion.
    pub mem_latency: u64,
    /// Backend model: chunks accepted per cycle.
    pub mem_issue_per_cycle: usize,

    /// Nominal hop count of the chiplet topology. The collective engine
    /// derives actual hop latency from the participant span.
    pub hops: u32,
    /// Per-link bandwidth of the inter-chiplet network, e.g. "128GB/s".
    pub link_bw: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            clock: "1GHz".to_string(),
            vec_depth: 64,
            num_chiplets: 1,
            num_vector_regs: 1024,
            num_scalar_regs: 64,
            num_bcu_vregs: 64,
            num_add_units: 5,
            num_mul_units: 5,
            num_ntt_units: 2,
            num_rot_units: 1,
            num_tra_units: 2,
            num_bcu_units: 2,
            num_bcu_buffs: 2,
            num_evg_units: 1,
            use_prng: true,
            memory_request_width: 1024,
            mem_concurrency: 2,
            mem_latency: 100,
            mem_issue_per_cycle: 8,
            hops: 2,
            link_bw: "128GB/s".to_string(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_chiplets == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "num_chiplets",
                requirement: "at least 1",
            });
        }
        if self.vec_depth == 0 || !self.vec_depth.is_power_of_two() {
            return Err(ConfigError::InvalidParameter {
                name: "vec_depth",
                requirement: "a power of two",
            });
        }
        if self.memory_request_width == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "memory_request_width",
                requirement: "non-zero",
            });
        }
        if self.mem_concurrency == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "mem_concurrency",
                requirement: "non-zero",
            });
        }
        if self.mem_issue_per_cycle == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "mem_issue_per_cycle",
                requirement: "non-zero",
            });
        }
        self.clock_hz()?;
        self.link_bandwidth()?;
        Ok(())
    }

    /// Core clock in Hz.
    pub fn clock_hz(&self) -> Result<u64, ConfigError> {
        parse_frequency(&self.clock)
    }

    /// Network link bandwidth in bytes per second.
    pub fn link_bandwidth(&self) -> Result<u64, ConfigError> {
        parse_bandwidth(&self.link_bw)
    }
}

/// Parses "1GHz"-style frequency strings into Hz.
pub fn parse_frequency(text: &str) -> Result<u64, ConfigError> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| ConfigError::InvalidFrequency(text.to_string()))?;
    let (number, suffix) = text.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| ConfigError::InvalidFrequency(text.to_string()))?;
    let scale = match suffix.trim().to_ascii_lowercase().as_str() {
        "hz" => 1.0,
        "khz" => 1e3,
        "mhz" => 1e6,
        "ghz" => 1e9,
        _ => return Err(ConfigError::InvalidFrequency(text.to_string())),
    };
    let hz = value * scale;
    if hz < 1.0 {
        return Err(ConfigError::InvalidFrequency(text.to_string()));
    }
    Ok(hz as u64)
}

/// Parses "128GB/s"-style bandwidth strings into bytes per second.
pub fn parse_bandwidth(text: &str) -> Result<u64, ConfigError> {
    let text = text.trim();
    let split = text
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| ConfigError::InvalidBandwidth(text.to_string()))?;
    let (number, suffix) = text.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| ConfigError::InvalidBandwidth(text.to_string()))?;
    let scale = match suffix.trim().to_ascii_lowercase().as_str() {
        "b/s" => 1.0,
        "kb/s" => 1024.0,
        "mb/s" => 1024.0 * 1024.0,
        "gb/s" => 1024.0 * 1024.0 * 1024.0,
        _ => return Err(ConfigError::InvalidBandwidth(text.to_string())),
    };
    let bps = value * scale;
    if bps < 1.0 {
        return Err(ConfigError::InvalidBandwidth(text.to_string()));
    }
    Ok(bps as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_suffixes() {
        assert_eq!(parse_frequency("1GHz").unwrap(), 1_000_000_000);
        assert_eq!(parse_frequency("2.5GHz").unwrap(), 2_500_000_000);
        assert_eq!(parse_frequency("800MHz").unwrap(), 800_000_000);
        assert!(parse_frequency("fast").is_err());
        assert!(parse_frequency("3").is_err());
    }

    #[test]
    fn bandwidth_suffixes() {
        assert_eq!(parse_bandwidth("1KB/s").unwrap(), 1024);
        assert_eq!(parse_bandwidth("128GB/s").unwrap(), 128 * 1024 * 1024 * 1024);
        assert!(parse_bandwidth("128").is_err());
    }

    #[test]
    fn default_config_is_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_power_of_two_vec_depth() {
        let cfg = SimConfig {
            vec_depth: 48,
            ..SimConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
