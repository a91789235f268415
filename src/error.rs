//! Error taxonomy (spec §7).
//!
//! The detection core never raises exceptions across a frame boundary: a
//! detector that would fail returns zero alerts and increments a per-detector
//! counter instead of propagating `CoreError`. `CoreError` is reserved for the
//! boundaries that can genuinely fail — config load, baseline mode violations,
//! frame source reads, persistence, and malformed input.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// DLC/payload mismatch or out-of-range arbitration ID. Counted, frame skipped.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Missing required config field or value out of range. Fatal at startup.
    #[error("config error: {0}")]
    ConfigError(String),

    /// Internal contract violation (e.g. observe() on a frozen baseline).
    #[error("wrong mode: {0}")]
    WrongMode(String),

    /// Frame source failure.
    #[error("source error: {0}")]
    SourceError(String),

    /// Alert sink failure. Counted, never propagated past the Alert Manager.
    #[error("sink error: {0}")]
    SinkError(String),

    /// Soft warning at 80% of memory_limit_mb, aggressive eviction at 95%, fatal at 100%.
    #[error("memory pressure: {0}")]
    MemoryPressure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
