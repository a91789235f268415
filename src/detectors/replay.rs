//! Replay Detector (spec §4.3.c): detects unauthorized repetition of payloads
//! or sequences. Rules 2 and 3 may both fire on the same frame; both are
//! emitted (no tie-break, unlike the Drop Detector).

use std::collections::HashMap;

use crate::alert::{Alert, AlertType, Severity};
use crate::baseline::IdBaseline;
use crate::config::Config;
use crate::frame::Frame;
use crate::hash::PayloadHash;
use crate::state::PerIdState;

/// Key for the sequence-replay rolling map: a rolling tuple-hash over the last
/// `sequence_length` payload hashes for one ID (spec §9, pinning the source's
/// underspecified sequence-matching contract).
fn rolling_subsequence_hash(hashes: &[PayloadHash]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    hashes.hash(&mut hasher);
    hasher.finish()
}

/// Owns the sequence-replay rolling map — bookkeeping beyond what
/// `PerIdState`'s own `sequence_buffer` ring retains, and therefore the
/// detector's own state rather than the State Manager's (spec §4.3 contract:
/// detectors must not mutate State Manager/Baseline Engine state, but may
/// hold their own).
#[derive(Debug, Default)]
pub struct ReplayDetector {
    /// (can_id, subsequence hash) -> last time that subsequence was seen.
    sequence_seen: HashMap<(u32, u64), f64>,
}

impl ReplayDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect(
        &mut self,
        frame: &Frame,
        state: &PerIdState,
        baseline: Option<&IdBaseline>,
        config: &Config,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if let Some(baseline) = baseline {
            if let Some(a) = self.non_periodic_fast_replay(frame, state, baseline, config) {
                alerts.push(a);
            }
        }

        if let Some(a) = self.identical_payload_repetition(frame, state, config) {
            alerts.push(a);
        }

        if let Some(a) = self.sequence_replay(frame, state, config) {
            alerts.push(a);
        }

        alerts
    }

    fn non_periodic_fast_replay(
        &self,
        frame: &Frame,
        state: &PerIdState,
        baseline: &IdBaseline,
        config: &Config,
    ) -> Option<Alert> {
        let current_iat = state.current_iat()?;
        let cfg = &config.replay;
        // absolute_min_iat_ms is milliseconds; iat_mean is seconds (spec §6
        // leaves the unit reconciliation implicit — normalized here).
        let threshold = (cfg.absolute_min_iat_ms / 1000.0)
            .max(baseline.iat_mean * cfg.min_iat_factor_for_fast_replay);
        if current_iat >= threshold {
            return None;
        }
        Some(
            Alert::new(
                frame.timestamp,
                frame.can_id,
                AlertType::NonPeriodicFastReplay,
                Severity::Low,
                format!("iat {current_iat:.4}s below fast-replay threshold {threshold:.4}s"),
            )
            .with_context("current_iat", current_iat)
            .with_context("threshold", threshold),
        )
    }

    fn identical_payload_repetition(
        &self,
        frame: &Frame,
        state: &PerIdState,
        config: &Config,
    ) -> Option<Alert> {
        let params = &config.replay.identical_payload_params;
        if !params.enabled {
            return None;
        }
        let window_start = frame.timestamp - params.time_window_ms as f64 / 1000.0;
        let current_hash = state.payload_hash_history.last()?.1;

        let count = state
            .payload_hash_history
            .iter()
            .filter(|(ts, hash)| *ts >= window_start && *hash == current_hash)
            .count();

        if count < params.repetition_threshold as usize {
            return None;
        }

        Some(
            Alert::new(
                frame.timestamp,
                frame.can_id,
                AlertType::IdenticalPayloadRepetition,
                Severity::Medium,
                format!(
                    "identical payload seen {count} time(s) within {}ms window",
                    params.time_window_ms
                ),
            )
            .with_context("count", count as u64),
        )
    }

    fn sequence_replay(&mut self, frame: &Frame, state: &PerIdState, config: &Config) -> Option<Alert> {
        let params = &config.replay.sequence_replay_params;
        if !params.enabled {
            return None;
        }
        if state.sequence_buffer.len() < params.sequence_length {
            return None;
        }

        let recent: Vec<PayloadHash> = state.sequence_buffer.last_n(params.sequence_length).copied().collect();
        let key = (frame.can_id, rolling_subsequence_hash(&recent));

        let previous = self.sequence_seen.insert(key, frame.timestamp);

        let prior_ts = previous?;
        let gap = frame.timestamp - prior_ts;
        if gap < params.min_interval_between_sequences_sec || gap > params.max_sequence_age_sec {
            return None;
        }

        Some(
            Alert::new(
                frame.timestamp,
                frame.can_id,
                AlertType::SequenceReplay,
                Severity::Medium,
                format!(
                    "{}-frame sequence repeated after {gap:.1}s (last seen at t={prior_ts:.3})",
                    params.sequence_length
                ),
            )
            .with_context("gap_sec", gap),
        )
    }
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

    #[test]
    fn scenario_fast_replay() {
        // spec §8 scenario 2: iat_mean=0.01, iat_sigma=0.001; frames at
        // t=100.000 and t=100.002 with identical payload. iat=0.002 <
        // 0.01*0.3=0.003 -> fires, severity low.
        let b = baseline(0.01, 0.001);
        let mut state = PerIdState::new(0x316, StateCaps::default());
        let config = Config::default();

        let f1 = Frame::new(100.000, 0x316, 3, vec![1, 2, 3]).unwrap();
        state.update(&f1, false);
        let f2 = Frame::new(100.002, 0x316, 3, vec![1, 2, 3]).unwrap();
        state.update(&f2, false);

        let mut detector = ReplayDetector::new();
        let alerts = detector.detect(&f2, &state, Some(&b), &config);
        assert!(alerts.iter().any(|a| a.alert_type == AlertType::NonPeriodicFastReplay && a.severity == Severity::Low));
    }

    #[test]
    fn identical_payload_fires_after_threshold_repeats() {
        let mut state = PerIdState::new(0x100, StateCaps::default());
        let mut config = Config::default();
        config.replay.identical_payload_params.repetition_threshold = 3;
        config.replay.identical_payload_params.time_window_ms = 10_000;

        let payload = vec![1, 2, 3];
        let mut last_frame = None;
        for t in [0.0, 1.0, 2.0] {
            let f = Frame::new(t, 0x100, 3, payload.clone()).unwrap();
            state.update(&f, false);
            last_frame = Some(f);
        }
        let mut detector = ReplayDetector::new();
        let alerts = detector.detect(&last_frame.unwrap(), &state, None, &config);
        assert!(alerts.iter().any(|a| a.alert_type == AlertType::IdenticalPayloadRepetition));
    }

    #[test]
    fn sequence_replay_requires_full_window_and_prior_occurrence() {
        let mut state = PerIdState::new(0x100, StateCaps::default());
        let mut config = Config::default();
        config.replay.sequence_replay_params.sequence_length = 2;
        config.replay.sequence_replay_params.min_interval_between_sequences_sec = 0.0;
        config.replay.sequence_replay_params.max_sequence_age_sec = 1000.0;
        config.replay.identical_payload_params.enabled = false;

        let mut detector = ReplayDetector::new();

        // first occurrence of [A, B]: no prior match
        let fa = Frame::new(0.0, 0x100, 1, vec![0xAA]).unwrap();
        state.update(&fa, false);
        detector.detect(&fa, &state, None, &config);
        let fb = Frame::new(1.0, 0x100, 1, vec![0xBB]).unwrap();
        state.update(&fb, false);
        let alerts = detector.detect(&fb, &state, None, &config);
        assert!(alerts.iter().all(|a| a.alert_type != AlertType::SequenceReplay));

        // break the sequence, then repeat [A, B] later
        let fc = Frame::new(2.0, 0x100, 1, vec![0xCC]).unwrap();
        state.update(&fc, false);
        detector.detect(&fc, &state, None, &config);
        let fa2 = Frame::new(3.0, 0x100, 1, vec![0xAA]).unwrap();
        state.update(&fa2, false);
        detector.detect(&fa2, &state, None, &config);
        let fb2 = Frame::new(4.0, 0x100, 1, vec![0xBB]).unwrap();
        state.update(&fb2, false);
        let alerts = detector.detect(&fb2, &state, None, &config);
        assert!(alerts.iter().any(|a| a.alert_type == AlertType::SequenceReplay));
    }
}
