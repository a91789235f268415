//! Orchestrator (spec §5, §9): wires State Manager → Baseline Engine →
//! Detector Chain → Alert Manager in the fixed dependency order, and owns the
//! `GlobalState` mode machine. Per the redesign flag in spec §9, there is no
//! module-level global here — every collaborator is an explicit field on this
//! struct, constructed once and threaded through `run`/`process_frame`.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::alert::AlertManager;
use crate::baseline::BaselineEngine;
use crate::config::{Config, GeneralRulesLearningMode};
use crate::detectors::DetectorChain;
use crate::error::CoreResult;
use crate::frame::Frame;
use crate::memory::{MemoryLevel, MemoryMonitor};
use crate::source::FrameSource;
use crate::state::{StateCaps, StateManager};

/// Externally selected runtime mode (spec §6).
#[derive(Debug, Clone, Copy)]
pub enum RuntimeMode {
    /// Run the source to end-of-window, freeze the baseline, and stop.
    Learn,
    /// Detect only; the baseline must already be frozen (loaded via
    /// `Orchestrator::with_frozen_baseline`).
    Detect,
    /// Learn for `learning_duration_sec`, then detect for the remainder of
    /// the stream.
    Auto { learning_duration_sec: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Learning,
    /// Baseline is frozen; the general-rules detector still withholds
    /// unknown-ID alerts for any ID inside its own shadow window.
    Shadow,
    Detecting,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalState {
    pub learning_start_timestamp: Option<f64>,
    pub learning_end_timestamp: Option<f64>,
    /// One-way flag: becomes true exactly when learning ends (spec §3).
    pub baseline_ready: bool,
    mode: Option<Mode>,
    shadow_until: Option<f64>,
}

impl GlobalState {
    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or(Mode::Learning)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorStats {
    pub frames_processed: u64,
    pub malformed_frames: u64,
    pub alerts_emitted: u64,
    pub alerts_dropped_throttled: u64,
    pub alerts_dropped_cooldown: u64,
    pub sink_errors: u64,
}

pub struct Orchestrator {
    config: Config,
    runtime_mode: RuntimeMode,
    state_manager: StateManager,
    baseline_engine: BaselineEngine,
    detectors: DetectorChain,
    alert_manager: AlertManager,
    global: GlobalState,
    malformed_frames: u64,
    frames_processed: u64,
    last_timestamp: Option<f64>,
    memory_monitor: MemoryMonitor,
    last_maintenance_timestamp: Option<f64>,
}

impl Orchestrator {
    pub fn new(config: Config, runtime_mode: RuntimeMode, alert_manager: AlertManager) -> Self {
        let state_manager = StateManager::new(StateCaps::default());
        let memory_monitor = MemoryMonitor::new(config.resources.memory_limit_mb);
        let mut global = GlobalState::default();
        if matches!(runtime_mode, RuntimeMode::Detect) {
            // detect-mode expects a baseline to be installed via
            // `with_frozen_baseline` before `run`; mark it ready up front so
            // detectors are live from the first frame.
            global.baseline_ready = true;
            global.mode = Some(Mode::Detecting);
        }

        Self {
            config,
            runtime_mode,
            state_manager,
            baseline_engine: BaselineEngine::new(),
            detectors: DetectorChain::new(),
            alert_manager,
            global,
            malformed_frames: 0,
            frames_processed: 0,
            last_timestamp: None,
            memory_monitor,
            last_maintenance_timestamp: None,
        }
    }

    /// Installs a baseline frozen in a prior run (spec §6 persistence
    /// interface). Only meaningful for `RuntimeMode::Detect`.
    pub fn with_frozen_baseline(mut self, ids: std::collections::HashMap<u32, crate::baseline::IdBaseline>) -> Self {
        self.baseline_engine.load_frozen(ids);
        self
    }

    pub fn global_state(&self) -> &GlobalState {
        &self.global
    }

    pub fn baseline(&self) -> &BaselineEngine {
        &self.baseline_engine
    }

    pub fn alert_manager(&self) -> &AlertManager {
        &self.alert_manager
    }

    fn learning_window_elapsed(&self, now: f64) -> bool {
        let window = match self.runtime_mode {
            RuntimeMode::Learn => self.config.learning.initial_learning_window_sec as f64,
            RuntimeMode::Auto { learning_duration_sec } => learning_duration_sec,
            RuntimeMode::Detect => return true,
        };
        match self.global.learning_start_timestamp {
            Some(start) => now - start >= window,
            None => false,
        }
    }

    fn freeze_baseline(&mut self, now: f64) {
        self.baseline_engine.freeze(&self.config);
        self.global.baseline_ready = true;
        self.global.learning_end_timestamp = Some(now);

        let shadow_cfg = &self.config.general_rules.detect_unknown_id;
        self.global.mode = Some(if shadow_cfg.learning_mode == GeneralRulesLearningMode::Shadow {
            self.global.shadow_until = Some(now + shadow_cfg.shadow_duration_sec);
            Mode::Shadow
        } else {
            Mode::Detecting
        });
        info!("learning complete at t={now:.3}, baseline frozen");
    }

    fn maybe_close_shadow_window(&mut self, now: f64) {
        if self.global.mode() == Mode::Shadow {
            if let Some(until) = self.global.shadow_until {
                if now >= until {
                    self.global.mode = Some(Mode::Detecting);
                    info!("shadow window closed at t={now:.3}");
                }
            }
        }
    }

    /// Process one already-validated frame through the full pipeline,
    /// returning `true` if the frame was accepted (as opposed to the source
    /// having nothing left, which callers detect separately).
    pub fn process_frame(&mut self, frame: Frame) {
        self.frames_processed += 1;
        self.last_timestamp = Some(frame.timestamp);

        if self.global.learning_start_timestamp.is_none() && !self.global.baseline_ready {
            self.global.learning_start_timestamp = Some(frame.timestamp);
        }

        if !self.global.baseline_ready && self.learning_window_elapsed(frame.timestamp) {
            self.freeze_baseline(frame.timestamp);
        }
        self.maybe_close_shadow_window(frame.timestamp);

        let can_id = frame.can_id;
        let mut add_to_baseline = Vec::new();
        // Resolved per-ID so a `treat_dlc_zero_as_special` override in
        // `config.ids[can_id]` applies to this ID's heartbeat handling, not
        // just to the global default (spec §6: "resolution is ID-specific-
        // then-global").
        let resolved = self.config.resolved_for(can_id);

        {
            let state = self
                .state_manager
                .update(&frame, resolved.drop.treat_dlc_zero_as_special);

            if self.global.baseline_ready {
                let (alerts, general) = self.detectors.run(
                    &frame,
                    state,
                    &self.baseline_engine,
                    self.global.baseline_ready,
                    &self.config,
                );
                add_to_baseline = general.add_to_baseline;
                let mut alerts = alerts;
                alerts.extend(general.alerts);
                self.dispatch(alerts, can_id);
            } else {
                if let Err(e) = self.baseline_engine.observe(&frame, state, &resolved) {
                    log::error!("baseline observe failed unexpectedly: {e}");
                }
                // shadow bookkeeping never runs before the first freeze;
                // general rules has nothing to check against yet.
            }
        }

        for id in add_to_baseline {
            self.baseline_engine.add_untrained_id(id);
        }
    }

    fn dispatch(&mut self, alerts: Vec<crate::alert::Alert>, can_id: u32) {
        if alerts.is_empty() {
            return;
        }
        let Some(state) = self.state_manager.get_mut(can_id) else {
            return;
        };
        for alert in alerts {
            self.alert_manager.process(alert, state);
        }
    }

    /// Eviction and memory-pressure handling, run between frames on a cadence
    /// rather than on every frame (spec §5: "a separate low-priority task...
    /// interacts with the core only via message-passed commands ['evict',
    /// 'report'] consumed between frames"). Single-threaded here, so
    /// "message-passed" collapses to a plain cadence check.
    fn maintain(&mut self, now: f64) -> CoreResult<()> {
        let due = match self.last_maintenance_timestamp {
            Some(last) => now - last >= self.config.resources.maintenance_interval_sec,
            None => true,
        };
        if !due {
            return Ok(());
        }
        self.last_maintenance_timestamp = Some(now);

        self.state_manager.evict_stale(now, self.config.resources.eviction_age_sec);
        if self.state_manager.len() > self.config.resources.soft_limit_ids {
            self.state_manager.cleanup_if_pressure(now, self.config.resources.soft_limit_ids);
        }

        match self.memory_monitor.level() {
            MemoryLevel::Normal => {}
            MemoryLevel::Soft => {
                warn!("memory pressure: resident size at soft threshold (80%)");
            }
            MemoryLevel::Aggressive => {
                warn!("memory pressure: resident size at aggressive threshold (95%), evicting oldest quarter");
                self.state_manager.cleanup_if_pressure(now, self.state_manager.len().saturating_sub(1));
            }
            MemoryLevel::Fatal => {
                return Err(self.memory_monitor.fatal_error());
            }
        }

        let stats = self.stats();
        info!(
            "stats tick: {} frame(s), {} tracked id(s), {} alert(s) emitted ({} throttled, {} cooled down, {} sink error(s))",
            stats.frames_processed,
            self.state_manager.len(),
            stats.alerts_emitted,
            stats.alerts_dropped_throttled,
            stats.alerts_dropped_cooldown,
            stats.sink_errors,
        );
        Ok(())
    }

    /// Drive the pipeline from `source` until exhaustion or `running` is
    /// cleared. `running` is checked once per frame — an explicit context
    /// rather than a module-level flag (spec §9's redesign flag on shared
    /// mutable state), so a caller can wire it to a signal handler itself.
    pub fn run(&mut self, source: &mut dyn FrameSource, running: &AtomicBool) -> CoreResult<OrchestratorStats> {
        while running.load(Ordering::SeqCst) {
            let frame = match source.next_frame()? {
                Some(f) => f,
                None => break,
            };

            if let Err(e) = frame.validate() {
                self.malformed_frames += 1;
                log::warn!("dropping malformed frame: {e}");
                continue;
            }

            let timestamp = frame.timestamp;
            self.process_frame(frame);
            self.maintain(timestamp)?;

            if matches!(self.runtime_mode, RuntimeMode::Learn) && self.global.baseline_ready {
                break;
            }
        }

        if !self.global.baseline_ready && matches!(self.runtime_mode, RuntimeMode::Learn | RuntimeMode::Auto { .. }) {
            // source exhausted before the window elapsed; freeze on the last
            // timestamp observed (or 0.0 if the source was empty).
            let now = self.last_timestamp.or(self.global.learning_start_timestamp).unwrap_or(0.0);
            self.freeze_baseline(now);
        }

        Ok(self.stats())
    }

    pub fn stats(&self) -> OrchestratorStats {
        let s = &self.alert_manager.stats;
        OrchestratorStats {
            frames_processed: self.frames_processed,
            malformed_frames: self.malformed_frames,
            alerts_emitted: s.emitted,
            alerts_dropped_throttled: s.dropped_throttled,
            alerts_dropped_cooldown: s.dropped_cooldown,
            sink_errors: s.sink_errors,
        }
    }
}
