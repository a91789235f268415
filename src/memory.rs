//! Memory pressure monitoring (spec §3 "Memory pressure", §5 resource
//! policy): enforcement of `memory_limit_mb` via periodic OS-level
//! resident-size checks, with proactive eviction at 80% of the limit.
//!
//! Grounded on the teacher's own `sysinfo`-based process sampling
//! (`logic/collector.rs`'s `process.memory()` / `total_memory()` reads);
//! narrowed here from "every process on the host" to just this one.

use sysinfo::{Pid, System};

use crate::error::CoreError;

/// Tiers mirroring spec §7's `MemoryPressure` taxonomy: soft warning at 80%
/// of `memory_limit_mb`, aggressive eviction at 95%, fatal at 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLevel {
    Normal,
    Soft,
    Aggressive,
    Fatal,
}

/// Abstracts the OS-level resident-size read so `MemoryMonitor`'s tiering
/// logic is testable without depending on the actual process's RSS at test
/// time.
pub trait ProcessMemorySampler {
    /// Current process resident set size, in bytes.
    fn resident_bytes(&mut self) -> u64;
}

/// Real sampler backed by `sysinfo`, refreshing only this process on each
/// read (spec §5: "periodic OS-level resident-size checks").
pub struct SysinfoSampler {
    system: System,
    pid: Pid,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().unwrap_or(Pid::from(0));
        Self {
            system: System::new_all(),
            pid,
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMemorySampler for SysinfoSampler {
    fn resident_bytes(&mut self) -> u64 {
        self.system.refresh_processes();
        self.system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }
}

pub struct MemoryMonitor {
    sampler: Box<dyn ProcessMemorySampler + Send>,
    limit_bytes: u64,
}

impl MemoryMonitor {
    pub fn new(limit_mb: u64) -> Self {
        Self::with_sampler(Box::new(SysinfoSampler::new()), limit_mb)
    }

    pub fn with_sampler(sampler: Box<dyn ProcessMemorySampler + Send>, limit_mb: u64) -> Self {
        Self {
            sampler,
            limit_bytes: limit_mb.saturating_mul(1024 * 1024),
        }
    }

    /// Samples current RSS and classifies it against the configured limit.
    /// Returns `Normal` when `limit_bytes == 0` (monitoring disabled).
    pub fn level(&mut self) -> MemoryLevel {
        if self.limit_bytes == 0 {
            return MemoryLevel::Normal;
        }
        let used = self.sampler.resident_bytes();
        let ratio = used as f64 / self.limit_bytes as f64;
        if ratio >= 1.0 {
            MemoryLevel::Fatal
        } else if ratio >= 0.95 {
            MemoryLevel::Aggressive
        } else if ratio >= 0.8 {
            MemoryLevel::Soft
        } else {
            MemoryLevel::Normal
        }
    }

    pub fn fatal_error(&mut self) -> CoreError {
        CoreError::MemoryPressure(format!(
            "resident size reached configured limit ({} MB)",
            self.limit_bytes / (1024 * 1024)
        ))
    }
}
