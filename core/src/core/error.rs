use thiserror::Error;

/// Construction-time configuration failures. These are fatal: the
/// simulation never starts with a malformed configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid frequency `{0}` (expected e.g. \"1GHz\")")]
    InvalidFrequency(String),

    #[error("invalid bandwidth `{0}` (expected e.g. \"128GB/s\")")]
    InvalidBandwidth(String),

    #[error("`{name}` must be {requirement}")]
    InvalidParameter {
        name: &'static str,
        requirement: &'static str,
    },

    #[error("expected one trace per chiplet: {chiplets} chiplets, {traces} traces")]
    TraceCountMismatch { chiplets: usize, traces: usize },
}

/// Trace parse failures, reported with the source name and line number of
/// the offending instruction.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("{source_name}:{line}: unknown opcode in `{text}`")]
    UnknownOpcode {
        source_name: String,
        line: usize,
        text: String,
    },

    #[error("{source_name}:{line}: opcode `{mnemonic}` is not supported")]
    UnsupportedOpcode {
        source_name: String,
        line: usize,
        mnemonic: String,
    },

    #[error("{source_name}:{line}: malformed instruction `{text}`")]
    Malformed {
        source_name: String,
        line: usize,
        text: String,
    },

    #[error("failed to read trace `{source_name}`")]
    Io {
        source_name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level simulation failure.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("chiplet {chiplet}: {source}")]
    Trace {
        chiplet: u32,
        #[source]
        source: TraceError,
    },
}
