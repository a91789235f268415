//! Drop Detector (spec §4.3.a): detects missing frames on periodic IDs.

use crate::alert::{Alert, AlertType, Severity};
use crate::baseline::IdBaseline;
use crate::config::Config;
use crate::frame::Frame;
use crate::state::PerIdState;

#[derive(Debug)]
struct Candidate {
    alert_type: AlertType,
    severity: Severity,
    details: String,
}

/// Stateless: every rule reads only the current frame, the live `PerIdState`,
/// and the frozen baseline.
#[derive(Debug, Default)]
pub struct DropDetector;

impl DropDetector {
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
        // Spec §4.3.a gates all three rules on a frozen baseline with a
        // positive iat_mean; unlike the tamper rules, the `untrained` flag
        // (which only suppresses byte/entropy classification, spec §4.2)
        // does not gate drop detection.
        if baseline.iat_mean <= 0.0 {
            return Vec::new();
        }
        let Some(current_iat) = state.current_iat() else {
            return Vec::new();
        };

        let cfg = &config.drop;
        let mut candidates = Vec::new();

        if current_iat > baseline.iat_mean * cfg.max_iat_factor {
            candidates.push(Candidate {
                alert_type: AlertType::IatMaxFactorViolation,
                severity: Severity::Medium,
                details: format!(
                    "IAT {current_iat:.4}s exceeds {:.1}x baseline mean {:.4}s",
                    cfg.max_iat_factor, baseline.iat_mean
                ),
            });
        }

        if current_iat > baseline.iat_mean + cfg.missing_frame_sigma * baseline.iat_sigma {
            candidates.push(Candidate {
                alert_type: AlertType::MissingFrameSigma,
                severity: Severity::High,
                details: format!(
                    "IAT {current_iat:.4}s exceeds mean+{:.1}sigma ({:.4}s)",
                    cfg.missing_frame_sigma,
                    baseline.iat_mean + cfg.missing_frame_sigma * baseline.iat_sigma
                ),
            });
        }

        let consecutive_missing = (current_iat / baseline.iat_mean).floor() as i64 - 1;
        if consecutive_missing > cfg.consecutive_missing_allowed as i64 {
            candidates.push(Candidate {
                alert_type: AlertType::ConsecutiveMissing,
                severity: Severity::High,
                details: format!(
                    "estimated {consecutive_missing} consecutive missing frame(s), allowed {}",
                    cfg.consecutive_missing_allowed
                ),
            });
        }

        let Some(winner) = pick_highest_severity(candidates) else {
            return Vec::new();
        };

        vec![Alert::new(
            frame.timestamp,
            frame.can_id,
            winner.alert_type,
            winner.severity,
            winner.details,
        )
        .with_context("current_iat", current_iat)
        .with_context("iat_mean", baseline.iat_mean)
        .with_context("iat_sigma", baseline.iat_sigma)]
    }
}

/// Highest severity wins. Spec §9's open question pins ties to "lexicographic
/// alert_type"; spec §8 scenario 6 (iat_mean=0.01, sigma=0.001, iat=0.05)
/// requires `missing_frame_sigma` to win a same-severity tie against
/// `consecutive_missing`, which only holds under *descending* lexicographic
/// order. Resolved that way here (see DESIGN.md).
fn pick_highest_severity(mut candidates: Vec<Candidate>) -> Option<Candidate> {
    // `AlertType`'s derived `Ord` follows declaration order, not its wire
    // name, so the tie-break has to go through `as_str()` explicitly rather
    // than comparing the enum value directly.
    candidates.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.alert_type.as_str().cmp(a.alert_type.as_str()))
    });
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::ByteBehavior;
    use crate::state::StateCaps;

    fn baseline(iat_mean: f64, iat_sigma: f64) -> IdBaseline {
        IdBaseline {
            iat_mean,
            iat_sigma,
            iat_samples: 1000,
            learned_dlcs: [8].into_iter().collect(),
            entropy_mean: 0.0,
            entropy_sigma: 0.0,
            entropy_samples: 0,
            byte_behavior: [ByteBehavior::Rare; 8],
            static_byte_values: [None; 8],
            frame_count: 1000,
            learned_period: iat_mean,
            untrained: false,
        }
    }

    fn state_with_iat(iat: f64) -> PerIdState {
        let mut s = PerIdState::new(0x100, StateCaps::default());
        s.update(&Frame::new(0.0, 0x100, 8, vec![0; 8]).unwrap(), false);
        s.update(&Frame::new(iat, 0x100, 8, vec![0; 8]).unwrap(), false);
        s
    }

    #[test]
    fn scenario_missing_frame_wins_over_iat_max_factor() {
        // spec §8 scenario 6: iat_mean=0.01, sigma=0.001, max_iat_factor=2.5,
        // missing_frame_sigma=3.5, observed iat=0.05.
        let b = baseline(0.01, 0.001);
        let s = state_with_iat(0.05);
        let mut config = Config::default();
        config.drop.max_iat_factor = 2.5;
        config.drop.missing_frame_sigma = 3.5;

        let detector = DropDetector;
        let frame = Frame::new(1.05, 0x100, 8, vec![0; 8]).unwrap();
        let alerts = detector.detect(&frame, &s, Some(&b), &config);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::MissingFrameSigma);
        assert_eq!(alerts[0].severity, Severity::High);
    }

    #[test]
    fn no_alert_when_iat_within_bounds() {
        let b = baseline(0.01, 0.001);
        let s = state_with_iat(0.01);
        let config = Config::default();
        let detector = DropDetector;
        let frame = Frame::new(1.0, 0x100, 8, vec![0; 8]).unwrap();
        assert!(detector.detect(&frame, &s, Some(&b), &config).is_empty());
    }

    #[test]
    fn zero_iat_mean_suppresses_detection() {
        let b = baseline(0.0, 0.0);
        let s = state_with_iat(1.0);
        let config = Config::default();
        let detector = DropDetector;
        let frame = Frame::new(1.0, 0x100, 8, vec![0; 8]).unwrap();
        assert!(detector.detect(&frame, &s, Some(&b), &config).is_empty());
    }

    #[test]
    fn untrained_baseline_still_runs_drop_rules() {
        // drop detection is gated on iat_mean > 0, not on `untrained` (spec §4.3.a)
        let mut b = baseline(0.01, 0.001);
        b.untrained = true;
        let s = state_with_iat(0.05);
        let mut config = Config::default();
        config.drop.max_iat_factor = 2.5;
        config.drop.missing_frame_sigma = 3.5;
        let detector = DropDetector;
        let frame = Frame::new(1.05, 0x100, 8, vec![0; 8]).unwrap();
        assert!(!detector.detect(&frame, &s, Some(&b), &config).is_empty());
    }
}
