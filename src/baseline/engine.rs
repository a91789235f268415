//! Baseline Engine (spec §4.2): open → frozen state machine over per-ID
//! statistical accumulators.

use std::collections::HashMap;

use log::info;

use super::types::{ByteBehavior, IdAccumulator, IdBaseline};
use crate::config::Config;
use crate::entropy::shannon_entropy;
use crate::error::CoreError;
use crate::frame::Frame;
use crate::state::PerIdState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Open,
    Frozen,
}

pub struct BaselineEngine {
    mode: Mode,
    accumulators: HashMap<u32, IdAccumulator>,
    frozen: HashMap<u32, IdBaseline>,
}

impl BaselineEngine {
    pub fn new() -> Self {
        Self {
            mode: Mode::Open,
            accumulators: HashMap::new(),
            frozen: HashMap::new(),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.mode == Mode::Frozen
    }

    /// Feed one frame's statistics into its ID's accumulator. Open-state only.
    pub fn observe(&mut self, frame: &Frame, state: &PerIdState, config: &Config) -> Result<(), CoreError> {
        if self.mode == Mode::Frozen {
            return Err(CoreError::WrongMode(
                "observe() called on a frozen baseline".into(),
            ));
        }

        let acc = self
            .accumulators
            .entry(frame.can_id)
            .or_insert_with(IdAccumulator::new);

        if let Some(iat) = state.current_iat() {
            acc.iat_stats.update(iat);
        }
        acc.learned_dlcs.insert(frame.dlc);
        acc.frame_count += 1;

        if frame.dlc as usize >= config.tamper.payload_analysis_min_dlc as usize {
            acc.entropy_stats.update(shannon_entropy(&frame.payload));
        }

        let modulus = config.tamper.byte_behavior_params.counter_byte_params.max_value_before_rollover_guess as u16 + 1;
        let allowed_skips = config.tamper.byte_behavior_params.counter_byte_params.allowed_counter_skips;
        for (i, byte_acc) in acc.byte_acc.iter_mut().enumerate() {
            if let Some(&v) = frame.payload.get(i) {
                byte_acc.observe(v, allowed_skips, modulus);
            }
        }

        Ok(())
    }

    /// Transition `open -> frozen`, finalizing each ID's `IdBaseline` (spec §4.2).
    pub fn freeze(&mut self, config: &Config) {
        if self.mode == Mode::Frozen {
            return;
        }

        for (can_id, acc) in self.accumulators.drain() {
            let untrained = acc.frame_count < config.learning.min_samples_for_stable_baseline;

            let mut byte_behavior = [ByteBehavior::Rare; 8];
            let mut static_byte_values = [None; 8];
            if !untrained {
                for (i, ba) in acc.byte_acc.iter().enumerate() {
                    if ba.total_samples == 0 {
                        continue;
                    }
                    byte_behavior[i] = if ba.distinct_values.len() == 1 {
                        let v = *ba.distinct_values.iter().next().unwrap();
                        static_byte_values[i] = Some(v);
                        ByteBehavior::Static(v)
                    } else if ba.counter_consistent_samples() >= config.learning.min_counter_samples as u32 {
                        ByteBehavior::Counter {
                            step: ba.counter_step(),
                            modulus: config
                                .tamper
                                .byte_behavior_params
                                .counter_byte_params
                                .max_value_before_rollover_guess as u16
                                + 1,
                        }
                    } else {
                        ByteBehavior::Variable {
                            min: ba.min,
                            max: ba.max,
                        }
                    };
                }
            }

            let iat_mean = acc.iat_stats.mean();
            let baseline = IdBaseline {
                iat_mean,
                iat_sigma: acc.iat_stats.sigma(),
                iat_samples: acc.iat_stats.samples(),
                learned_dlcs: acc.learned_dlcs,
                entropy_mean: acc.entropy_stats.mean(),
                entropy_sigma: acc.entropy_stats.sigma(),
                entropy_samples: acc.entropy_stats.samples(),
                byte_behavior,
                static_byte_values,
                frame_count: acc.frame_count,
                learned_period: iat_mean,
                untrained,
            };
            self.frozen.insert(can_id, baseline);
        }

        self.mode = Mode::Frozen;
        info!("baseline frozen: {} ID(s) learned", self.frozen.len());
    }

    /// Frozen-state-only lookup.
    pub fn lookup(&self, can_id: u32) -> Option<&IdBaseline> {
        if self.mode == Mode::Frozen {
            self.frozen.get(&can_id)
        } else {
            None
        }
    }

    pub fn contains(&self, can_id: u32) -> bool {
        self.mode == Mode::Frozen && self.frozen.contains_key(&can_id)
    }

    pub fn frozen_ids(&self) -> impl Iterator<Item = &u32> {
        self.frozen.keys()
    }

    /// Adds a new, untrained entry for an ID discovered after freezing (spec
    /// §4.4 general-rules shadow mode, `auto_add_to_baseline`). Never
    /// overwrites an existing entry — freezing's immutability invariant
    /// covers mutation of already-learned IDs, not the addition of new ones.
    /// Installs a previously frozen snapshot (e.g. loaded via
    /// `baseline::persistence::load`) without running the learning phase.
    /// Used by `detect`-mode orchestration, which never observes frames.
    pub fn load_frozen(&mut self, ids: HashMap<u32, IdBaseline>) {
        self.frozen = ids;
        self.mode = Mode::Frozen;
    }

    pub fn add_untrained_id(&mut self, can_id: u32) {
        self.frozen.entry(can_id).or_insert_with(|| IdBaseline {
            iat_mean: 0.0,
            iat_sigma: 0.0,
            iat_samples: 0,
            learned_dlcs: Default::default(),
            entropy_mean: 0.0,
            entropy_sigma: 0.0,
            entropy_samples: 0,
            byte_behavior: [ByteBehavior::Rare; 8],
            static_byte_values: [None; 8],
            frame_count: 0,
            learned_period: 0.0,
            untrained: true,
        });
    }
}

impl Default for BaselineEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PerIdState, StateCaps};

    fn frame(ts: f64, id: u32, dlc: u8, payload: &[u8]) -> Frame {
        Frame::new(ts, id, dlc, payload.to_vec()).unwrap()
    }

    #[test]
    fn observe_after_freeze_is_wrong_mode() {
        let mut engine = BaselineEngine::new();
        engine.freeze(&Config::default());
        let state = PerIdState::new(0x100, StateCaps::default());
        let f = frame(1.0, 0x100, 2, &[1, 2]);
        assert!(engine.observe(&f, &state, &Config::default()).is_err());
    }

    #[test]
    fn lookup_returns_none_before_freeze() {
        let engine = BaselineEngine::new();
        assert!(engine.lookup(0x100).is_none());
    }

    #[test]
    fn below_sample_threshold_marks_untrained() {
        let mut engine = BaselineEngine::new();
        let mut config = Config::default();
        config.learning.min_samples_for_stable_baseline = 1000;
        let mut state = PerIdState::new(0x100, StateCaps::default());

        for i in 0..5 {
            let f = frame(i as f64, 0x100, 2, &[1, 2]);
            state.update(&f, false);
            engine.observe(&f, &state, &config).unwrap();
        }
        engine.freeze(&config);
        assert!(engine.lookup(0x100).unwrap().untrained);
    }

    #[test]
    fn static_byte_position_classified_after_freeze() {
        let mut engine = BaselineEngine::new();
        let mut config = Config::default();
        config.learning.min_samples_for_stable_baseline = 3;
        let mut state = PerIdState::new(0x316, StateCaps::default());

        for i in 0..10 {
            let f = frame(i as f64, 0x316, 2, &[0x00, i as u8]);
            state.update(&f, false);
            engine.observe(&f, &state, &config).unwrap();
        }
        engine.freeze(&config);
        let b = engine.lookup(0x316).unwrap();
        assert_eq!(b.byte_behavior[0], ByteBehavior::Static(0x00));
    }
}
