//! Structured, validated configuration (spec §6).
//!
//! Grouped the way the spec names the groups (learning, drop, tamper, replay,
//! general rules, throttle) plus a per-ID override map. Unknown keys are
//! rejected at load (`serde(deny_unknown_fields)`), matching the source
//! pattern's redesign flag in spec §9: "unknown config keys are rejected at
//! load."

use std::collections::HashMap;
use std::io::Read;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlcLearningMode {
    StrictWhitelist,
    /// Open question (spec §9): no adaptation algorithm was supplied upstream;
    /// treated as equivalent to `StrictWhitelist` until one is.
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneralRulesLearningMode {
    Strict,
    Shadow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LearningConfig {
    pub initial_learning_window_sec: u64,
    pub min_samples_for_stable_baseline: u64,
    pub min_entropy_samples: u64,
    pub min_counter_samples: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            initial_learning_window_sec: 300,
            min_samples_for_stable_baseline: 100,
            min_entropy_samples: 100,
            min_counter_samples: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropConfig {
    pub missing_frame_sigma: f64,
    pub consecutive_missing_allowed: u32,
    pub max_iat_factor: f64,
    pub treat_dlc_zero_as_special: bool,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            missing_frame_sigma: 3.5,
            consecutive_missing_allowed: 2,
            max_iat_factor: 2.5,
            treat_dlc_zero_as_special: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterByteParams {
    pub detect_simple_counters: bool,
    pub max_value_before_rollover_guess: u8,
    pub allowed_counter_skips: u32,
}

impl Default for CounterByteParams {
    fn default() -> Self {
        Self {
            detect_simple_counters: true,
            max_value_before_rollover_guess: 255,
            allowed_counter_skips: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ByteBehaviorParams {
    pub enabled: bool,
    pub static_byte_mismatch_threshold: u32,
    pub counter_byte_params: CounterByteParams,
}

impl Default for ByteBehaviorParams {
    fn default() -> Self {
        Self {
            enabled: true,
            static_byte_mismatch_threshold: 1,
            counter_byte_params: CounterByteParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntropyParams {
    pub enabled: bool,
    pub sigma_threshold: f64,
}

impl Default for EntropyParams {
    fn default() -> Self {
        Self {
            enabled: true,
            sigma_threshold: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TamperConfig {
    pub dlc_learning_mode: DlcLearningMode,
    pub payload_analysis_min_dlc: u8,
    pub entropy_params: EntropyParams,
    pub byte_behavior_params: ByteBehaviorParams,
}

impl Default for TamperConfig {
    fn default() -> Self {
        Self {
            dlc_learning_mode: DlcLearningMode::StrictWhitelist,
            payload_analysis_min_dlc: 2,
            entropy_params: EntropyParams::default(),
            byte_behavior_params: ByteBehaviorParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdenticalPayloadParams {
    pub enabled: bool,
    pub time_window_ms: u64,
    pub repetition_threshold: u32,
}

impl Default for IdenticalPayloadParams {
    fn default() -> Self {
        Self {
            enabled: true,
            time_window_ms: 1000,
            repetition_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceReplayParams {
    pub enabled: bool,
    pub sequence_length: usize,
    pub max_sequence_age_sec: f64,
    pub min_interval_between_sequences_sec: f64,
}

impl Default for SequenceReplayParams {
    fn default() -> Self {
        Self {
            enabled: true,
            sequence_length: 20,
            max_sequence_age_sec: 3600.0,
            min_interval_between_sequences_sec: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    pub min_iat_factor_for_fast_replay: f64,
    pub absolute_min_iat_ms: f64,
    pub identical_payload_params: IdenticalPayloadParams,
    pub sequence_replay_params: SequenceReplayParams,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            min_iat_factor_for_fast_replay: 0.3,
            absolute_min_iat_ms: 1.0,
            identical_payload_params: IdenticalPayloadParams::default(),
            sequence_replay_params: SequenceReplayParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectUnknownId {
    pub enabled: bool,
    pub learning_mode: GeneralRulesLearningMode,
    pub shadow_duration_sec: f64,
    pub auto_add_to_baseline: bool,
}

impl Default for DetectUnknownId {
    fn default() -> Self {
        Self {
            enabled: true,
            learning_mode: GeneralRulesLearningMode::Shadow,
            shadow_duration_sec: 60.0,
            auto_add_to_baseline: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GeneralRulesConfig {
    pub detect_unknown_id: DetectUnknownId,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    pub max_alerts_per_id_per_sec: u32,
    pub global_max_alerts_per_sec: u32,
    pub cooldown_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_alerts_per_id_per_sec: 5,
            global_max_alerts_per_sec: 50,
            cooldown_ms: 5000,
        }
    }
}

/// Memory-pressure / eviction cadence (spec §3 "Memory pressure", §5
/// resource policy). Not one of spec §6's named option groups, but
/// `memory_limit_mb` and `eviction_age_sec` are referenced by those exact
/// names in the spec body, so they are validated config here rather than
/// hardcoded constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    /// Soft ceiling on total tracked IDs (spec §3); exceeding it triggers
    /// `StateManager::cleanup_if_pressure`.
    pub soft_limit_ids: usize,
    /// Per-process resident-size ceiling in MB (spec §5); 0 disables the
    /// OS-level check entirely.
    pub memory_limit_mb: u64,
    /// IDs unseen for longer than this are evicted by
    /// `StateManager::evict_stale` (spec §4.1).
    pub eviction_age_sec: f64,
    /// How often (in frame-clock seconds) the orchestrator runs its
    /// between-frames maintenance pass (spec §5: "a separate low-priority
    /// task... consumed between frames").
    pub maintenance_interval_sec: f64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            soft_limit_ids: 10_000,
            memory_limit_mb: 512,
            eviction_age_sec: 3600.0,
            maintenance_interval_sec: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub drop: DropConfig,
    #[serde(default)]
    pub tamper: TamperConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub general_rules: GeneralRulesConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    /// `ids[can_id]` JSON Merge Patch (RFC 7386) applied over the global
    /// sections above; resolution is ID-specific-then-global (spec §6).
    #[serde(default)]
    pub ids: HashMap<u32, Value>,
}

impl Config {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CoreError> {
        let config: Config = serde_json::from_reader(reader)
            .map_err(|e| CoreError::ConfigError(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.learning.initial_learning_window_sec == 0 {
            return Err(CoreError::ConfigError(
                "learning.initial_learning_window_sec must be > 0".into(),
            ));
        }
        if self.drop.missing_frame_sigma <= 0.0 {
            return Err(CoreError::ConfigError(
                "drop.missing_frame_sigma must be > 0".into(),
            ));
        }
        if self.drop.max_iat_factor <= 0.0 {
            return Err(CoreError::ConfigError(
                "drop.max_iat_factor must be > 0".into(),
            ));
        }
        if self.tamper.payload_analysis_min_dlc as usize > crate::frame::MAX_PAYLOAD_LEN {
            return Err(CoreError::ConfigError(
                "tamper.payload_analysis_min_dlc exceeds max payload length".into(),
            ));
        }
        if self.replay.sequence_replay_params.sequence_length == 0 {
            return Err(CoreError::ConfigError(
                "replay.sequence_replay_params.sequence_length must be > 0".into(),
            ));
        }
        if self.throttle.max_alerts_per_id_per_sec == 0 {
            return Err(CoreError::ConfigError(
                "throttle.max_alerts_per_id_per_sec must be > 0".into(),
            ));
        }
        if self.resources.soft_limit_ids == 0 {
            return Err(CoreError::ConfigError(
                "resources.soft_limit_ids must be > 0".into(),
            ));
        }
        if self.resources.maintenance_interval_sec <= 0.0 {
            return Err(CoreError::ConfigError(
                "resources.maintenance_interval_sec must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the effective configuration for a given ID: global config with
    /// any per-ID override merge-patched on top.
    pub fn resolved_for(&self, can_id: u32) -> Config {
        match self.ids.get(&can_id) {
            None => self.clone(),
            Some(patch) => {
                let mut base = serde_json::to_value(self.without_ids())
                    .expect("Config always serializes");
                deep_merge(&mut base, patch);
                serde_json::from_value(base).unwrap_or_else(|_| self.without_ids())
            }
        }
    }

    fn without_ids(&self) -> Config {
        let mut c = self.clone();
        c.ids.clear();
        c
    }
}

/// RFC 7386 JSON Merge Patch: `patch` fields overwrite `target` fields
/// recursively; a `null` in `patch` deletes the key; non-object values replace.
fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                if v.is_null() {
                    target_map.remove(k);
                } else {
                    deep_merge(target_map.entry(k.clone()).or_insert(Value::Null), v);
                }
            }
        }
        (target_slot, patch_value) => {
            *target_slot = patch_value.clone();
        }
    }
}
