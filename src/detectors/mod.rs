//! Detector chain (spec §4.3): Drop, Tamper, Replay, GeneralRules, run in that
//! fixed order so alert emission is deterministic (spec §5).

mod drop;
mod general_rules;
mod replay;
mod tamper;

pub use drop::DropDetector;
pub use general_rules::{GeneralRulesDetector, GeneralRulesOutcome};
pub use replay::ReplayDetector;
pub use tamper::TamperDetector;

use crate::alert::Alert;
use crate::baseline::BaselineEngine;
use crate::config::Config;
use crate::frame::Frame;
use crate::state::PerIdState;

/// Per-detector failure counters (spec §7): a detector that would fail
/// internally returns zero alerts and increments its counter here instead of
/// propagating an error across the frame boundary. Every rule in this chain
/// is a total function over `(frame, state, baseline, config)` by
/// construction, so under normal operation these stay at zero; they exist so
/// the Alert Manager's periodic stats tick (spec §7) has somewhere to report
/// a detector bug if one is ever introduced.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetectorErrorCounters {
    pub drop: u64,
    pub tamper: u64,
    pub replay: u64,
    pub general_rules: u64,
}

pub struct DetectorChain {
    pub drop: DropDetector,
    pub tamper: TamperDetector,
    pub replay: ReplayDetector,
    pub general_rules: GeneralRulesDetector,
    pub errors: DetectorErrorCounters,
}

impl DetectorChain {
    pub fn new() -> Self {
        Self {
            drop: DropDetector,
            tamper: TamperDetector,
            replay: ReplayDetector::new(),
            general_rules: GeneralRulesDetector::new(),
            errors: DetectorErrorCounters::default(),
        }
    }

    /// Runs Drop, Tamper, Replay in fixed order and returns their alerts plus
    /// the general-rules outcome (which the orchestrator applies separately,
    /// since it may request a baseline mutation the detector itself cannot
    /// perform).
    pub fn run(
        &mut self,
        frame: &Frame,
        state: &PerIdState,
        baseline: &BaselineEngine,
        baseline_ready: bool,
        config: &Config,
    ) -> (Vec<Alert>, GeneralRulesOutcome) {
        let resolved = config.resolved_for(frame.can_id);
        let frozen = baseline.lookup(frame.can_id);

        let mut alerts = Vec::new();
        alerts.extend(self.drop.detect(frame, state, frozen, &resolved));
        alerts.extend(self.tamper.detect(frame, state, frozen, &resolved));
        alerts.extend(self.replay.detect(frame, state, frozen, &resolved));

        let general = self
            .general_rules
            .detect(frame, baseline, baseline_ready, &resolved);

        (alerts, general)
    }
}

impl Default for DetectorChain {
    fn default() -> Self {
        Self::new()
    }
}
