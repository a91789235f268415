//! General Rules Detector (spec §4.3.d): catches frames whose ID is not part
//! of the baseline.

use std::collections::{HashMap, HashSet};

use crate::alert::{Alert, AlertType, Severity};
use crate::baseline::BaselineEngine;
use crate::config::{Config, GeneralRulesLearningMode};
use crate::frame::Frame;

/// Result of running the general-rules detector on one frame: the alerts to
/// emit, plus any IDs whose shadow window just closed and should be folded
/// into the baseline as untrained entries. The detector itself must not
/// mutate the Baseline Engine (spec §4.3 contract) — the orchestrator applies
/// `add_to_baseline` after this call returns.
#[derive(Debug, Default)]
pub struct GeneralRulesOutcome {
    pub alerts: Vec<Alert>,
    pub add_to_baseline: Vec<u32>,
}

/// Per-ID shadow timer: an ID first seen inside the shadow window starts its
/// own timer, capped at `shadow_duration_sec` (spec §4.3.d).
#[derive(Debug, Default)]
pub struct GeneralRulesDetector {
    shadow_start: HashMap<u32, f64>,
    added: HashSet<u32>,
}

impl GeneralRulesDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect(
        &mut self,
        frame: &Frame,
        baseline: &BaselineEngine,
        baseline_ready: bool,
        config: &Config,
    ) -> GeneralRulesOutcome {
        let mut outcome = GeneralRulesOutcome::default();
        let cfg = &config.general_rules.detect_unknown_id;
        if !cfg.enabled || !baseline_ready || baseline.contains(frame.can_id) {
            return outcome;
        }

        match cfg.learning_mode {
            GeneralRulesLearningMode::Strict => {
                outcome.alerts.push(Alert::new(
                    frame.timestamp,
                    frame.can_id,
                    AlertType::UnknownIdDetected,
                    Severity::Medium,
                    format!("can_id {:#x} not present in baseline", frame.can_id),
                ));
            }
            GeneralRulesLearningMode::Shadow => {
                let started = *self
                    .shadow_start
                    .entry(frame.can_id)
                    .or_insert(frame.timestamp);
                let elapsed = frame.timestamp - started;

                if elapsed < cfg.shadow_duration_sec {
                    // Still inside this ID's own grace period: recorded but
                    // not emitted (spec §4.3.d).
                } else if cfg.auto_add_to_baseline {
                    if self.added.insert(frame.can_id) {
                        outcome.add_to_baseline.push(frame.can_id);
                    }
                    // Once added the ID is known, so `baseline.contains`
                    // short-circuits future calls before this arm is reached
                    // again — no alert for this frame either.
                } else {
                    // Grace period elapsed and nothing promoted the ID into
                    // the baseline: it is no longer "in shadow", it is an
                    // unrecognized ID on a live bus, so it surfaces exactly
                    // like strict mode (spec §4.3.d: shadow is a bounded
                    // per-ID grace period, not permanent silence).
                    outcome.alerts.push(Alert::new(
                        frame.timestamp,
                        frame.can_id,
                        AlertType::UnknownIdDetected,
                        Severity::Medium,
                        format!(
                            "can_id {:#x} not present in baseline (shadow window elapsed)",
                            frame.can_id
                        ),
                    ));
                }
            }
        }

        outcome
    }
}
