//! Tamper Detector (spec §4.3.b): detects payload or DLC deviations.
//!
//! Emission order for a single frame is fixed: DLC, then entropy, then
//! static-byte, then byte-behavior (determinism requirement).

use crate::alert::{Alert, AlertType, Severity};
use crate::baseline::{ByteBehavior, IdBaseline};
use crate::config::{Config, DlcLearningMode};
use crate::entropy::shannon_entropy;
use crate::frame::Frame;
use crate::state::PerIdState;

#[derive(Debug, Default)]
pub struct TamperDetector;

impl TamperDetector {
    pub fn detect(
        &self,
        frame: &Frame,
        state: &PerIdState,
        baseline: Option<&IdBaseline>,
        config: &Config,
    ) -> Vec<Alert> {
        let Some(baseline) = baseline else {
            return Vec::new();
        };

        let mut alerts = Vec::new();

        if let Some(a) = self.dlc_anomaly(frame, baseline, config) {
            alerts.push(a);
        }

        if !baseline.untrained {
            if let Some(a) = self.entropy_anomaly(frame, baseline, config) {
                alerts.push(a);
            }
            if let Some(a) = self.static_byte_mismatch(frame, baseline, config) {
                alerts.push(a);
            }
            if let Some(a) = self.byte_behavior_anomaly(frame, state, baseline, config) {
                alerts.push(a);
            }
        }

        alerts
    }

    fn dlc_anomaly(&self, frame: &Frame, baseline: &IdBaseline, config: &Config) -> Option<Alert> {
        // Open question (spec §9): "adaptive" mode is treated as strict_whitelist
        // until a concrete adaptation algorithm is specified.
        let _ = matches!(config.tamper.dlc_learning_mode, DlcLearningMode::Adaptive);
        if baseline.learned_dlcs.contains(&frame.dlc) {
            return None;
        }
        Some(
            Alert::new(
                frame.timestamp,
                frame.can_id,
                AlertType::TamperDlcAnomaly,
                Severity::High,
                format!(
                    "dlc {} not in learned whitelist {:?}",
                    frame.dlc, baseline.learned_dlcs
                ),
            )
            .with_context("dlc", frame.dlc),
        )
    }

    fn entropy_anomaly(&self, frame: &Frame, baseline: &IdBaseline, config: &Config) -> Option<Alert> {
        let params = &config.tamper.entropy_params;
        if !params.enabled {
            return None;
        }
        if baseline.entropy_samples < config.learning.min_entropy_samples {
            return None;
        }
        if (frame.dlc as usize) < config.tamper.payload_analysis_min_dlc as usize {
            return None;
        }

        let entropy = shannon_entropy(&frame.payload);
        let deviation = (entropy - baseline.entropy_mean).abs();
        let threshold = params.sigma_threshold * baseline.entropy_sigma;
        if deviation <= threshold {
            return None;
        }

        Some(
            Alert::new(
                frame.timestamp,
                frame.can_id,
                AlertType::EntropyAnomaly,
                Severity::Medium,
                format!(
                    "entropy {entropy:.2} deviates {deviation:.2} from mean {:.2} (threshold {threshold:.2})",
                    baseline.entropy_mean
                ),
            )
            .with_context("entropy", entropy)
            .with_context("entropy_mean", baseline.entropy_mean),
        )
    }

    fn static_byte_mismatch(&self, frame: &Frame, baseline: &IdBaseline, config: &Config) -> Option<Alert> {
        if !config.tamper.byte_behavior_params.enabled {
            return None;
        }

        let mut offending = Vec::new();
        for (i, behavior) in baseline.byte_behavior.iter().enumerate() {
            if let ByteBehavior::Static(expected) = behavior {
                if let Some(&actual) = frame.payload.get(i) {
                    if actual != *expected {
                        offending.push(i);
                    }
                }
            }
        }

        if offending.len() < config.tamper.byte_behavior_params.static_byte_mismatch_threshold as usize {
            return None;
        }

        Some(
            Alert::new(
                frame.timestamp,
                frame.can_id,
                AlertType::StaticByteMismatch,
                Severity::High,
                format!("static byte mismatch at position(s) {offending:?}"),
            )
            .with_context("positions", offending),
        )
    }

    fn byte_behavior_anomaly(
        &self,
        frame: &Frame,
        state: &PerIdState,
        baseline: &IdBaseline,
        config: &Config,
    ) -> Option<Alert> {
        if !config.tamper.byte_behavior_params.enabled {
            return None;
        }
        let counter_params = &config.tamper.byte_behavior_params.counter_byte_params;

        let mut offending = Vec::new();
        for (i, behavior) in baseline.byte_behavior.iter().enumerate() {
            let Some(&actual) = frame.payload.get(i) else {
                continue;
            };
            match *behavior {
                ByteBehavior::Variable { min, max } => {
                    if actual < min || actual > max {
                        offending.push(i);
                    }
                }
                ByteBehavior::Counter { step, modulus } => {
                    if !counter_params.detect_simple_counters {
                        continue;
                    }
                    // [.., previous, current] — current was already appended by
                    // the State Manager before detectors ran.
                    let ring = &state.payload_byte_history[i];
                    let mut last_two = ring.last_n(2);
                    let (Some(&prev), Some(&cur)) = (last_two.next(), last_two.next()) else {
                        continue;
                    };
                    let observed_step = (cur as i32 - prev as i32).rem_euclid(modulus as i32) as u8;
                    let diff = (observed_step as i32 - step as i32).unsigned_abs();
                    let wrapped_diff = (modulus as u32).saturating_sub(diff);
                    if diff > counter_params.allowed_counter_skips
                        && wrapped_diff > counter_params.allowed_counter_skips
                    {
                        offending.push(i);
                    }
                }
                ByteBehavior::Static(_) | ByteBehavior::Rare => {}
            }
        }

        if offending.is_empty() {
            return None;
        }

        let severity = if offending.len() >= 4 {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(
            Alert::new(
                frame.timestamp,
                frame.can_id,
                AlertType::ByteBehaviorAnomaly,
                severity,
                format!("byte behavior deviation at position(s) {offending:?}"),
            )
            .with_context("positions", offending),
        )
    }
}
