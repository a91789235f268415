//! End-to-end scenario tests driving the full `Orchestrator` over a
//! `VecFrameSource`, one per concrete scenario.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;

use can_ids_core::alert::AlertManager;
use can_ids_core::baseline::{ByteBehavior, IdBaseline};
use can_ids_core::config::{Config, DlcLearningMode};
use can_ids_core::source::VecFrameSource;
use can_ids_core::{Frame, Orchestrator, RuntimeMode};

fn frame(ts: f64, id: u32, dlc: u8, payload: Vec<u8>) -> Frame {
    Frame::new(ts, id, dlc, payload).unwrap()
}

fn trained(overrides: impl FnOnce(&mut IdBaseline)) -> IdBaseline {
    let mut b = IdBaseline {
        iat_mean: 0.0,
        iat_sigma: 0.0,
        iat_samples: 1000,
        learned_dlcs: [8].into_iter().collect(),
        entropy_mean: 0.0,
        entropy_sigma: 0.0,
        entropy_samples: 500,
        byte_behavior: [ByteBehavior::Rare; 8],
        static_byte_values: [None; 8],
        frame_count: 1000,
        learned_period: 0.0,
        untrained: false,
    };
    overrides(&mut b);
    b
}

fn detect_orchestrator(ids: HashMap<u32, IdBaseline>, config: Config) -> Orchestrator {
    Orchestrator::new(config, RuntimeMode::Detect, AlertManager::new(Default::default()))
        .with_frozen_baseline(ids)
}

#[test]
fn unknown_id_scenario() {
    let mut ids = HashMap::new();
    ids.insert(0x100, trained(|_| {}));
    ids.insert(0x200, trained(|_| {}));

    let mut config = Config::default();
    config.general_rules.detect_unknown_id.learning_mode =
        can_ids_core::config::GeneralRulesLearningMode::Strict;

    let mut orch = detect_orchestrator(ids, config);
    orch.process_frame(frame(1.0, 0x999, 8, vec![0; 8]));

    assert_eq!(orch.alert_manager().stats.emitted, 1);
}

#[test]
fn fast_replay_scenario() {
    let mut ids = HashMap::new();
    ids.insert(
        0x316,
        trained(|b| {
            b.iat_mean = 0.01;
            b.iat_sigma = 0.001;
            b.learned_dlcs = [3].into_iter().collect();
            // untrained entropy stats so only the replay rule under test fires
            b.entropy_samples = 0;
        }),
    );

    let orch_config = Config::default();
    let mut orch = detect_orchestrator(ids, orch_config);
    let running = AtomicBool::new(true);
    let mut source = VecFrameSource::new(vec![
        frame(100.000, 0x316, 3, vec![1, 2, 3]),
        frame(100.002, 0x316, 3, vec![1, 2, 3]),
    ]);
    let stats = orch.run(&mut source, &running).unwrap();
    assert!(stats.alerts_emitted >= 1);
}

#[test]
fn dlc_whitelist_scenario() {
    let mut ids = HashMap::new();
    ids.insert(
        0x316,
        trained(|b| {
            b.learned_dlcs = [8].into_iter().collect();
            // untrained entropy stats so only the DLC rule under test fires
            b.entropy_samples = 0;
        }),
    );

    let mut config = Config::default();
    config.tamper.dlc_learning_mode = DlcLearningMode::StrictWhitelist;

    let mut orch = detect_orchestrator(ids, config);
    orch.process_frame(frame(0.3, 0x316, 4, vec![0x05, 0x20, 0xea, 0x0a]));

    assert_eq!(orch.alert_manager().stats.emitted, 1);
}

#[test]
fn entropy_anomaly_scenario() {
    let mut ids = HashMap::new();
    ids.insert(
        0x100,
        trained(|b| {
            b.learned_dlcs = [4].into_iter().collect();
            b.entropy_mean = 2.79;
            b.entropy_sigma = 0.18;
            b.entropy_samples = 500;
        }),
    );

    let mut config = Config::default();
    config.tamper.entropy_params.sigma_threshold = 3.0;
    config.tamper.payload_analysis_min_dlc = 1;

    let mut orch = detect_orchestrator(ids, config);
    // entropy of [0,1,2,3] is exactly 2.0 bits: |2.0-2.79|=0.79 > 3*0.18=0.54
    orch.process_frame(frame(1.0, 0x100, 4, vec![0, 1, 2, 3]));

    assert_eq!(orch.alert_manager().stats.emitted, 1);
}

#[test]
fn static_byte_scenario() {
    let mut ids = HashMap::new();
    ids.insert(
        0x153,
        trained(|b| {
            b.byte_behavior[0] = ByteBehavior::Static(0x00);
            // untrained entropy stats so only the static-byte rule under test fires
            b.entropy_samples = 0;
        }),
    );

    let config = Config::default();
    let mut orch = detect_orchestrator(ids, config);
    orch.process_frame(frame(1.0, 0x153, 8, vec![0xFF, 0, 0, 0, 0, 0, 0, 0]));

    assert_eq!(orch.alert_manager().stats.emitted, 1);
}

#[test]
fn missing_frame_scenario() {
    let mut ids = HashMap::new();
    ids.insert(
        0x100,
        trained(|b| {
            b.iat_mean = 0.01;
            b.iat_sigma = 0.001;
        }),
    );

    let mut config = Config::default();
    config.drop.max_iat_factor = 2.5;
    config.drop.missing_frame_sigma = 3.5;

    let mut orch = detect_orchestrator(ids, config);
    let running = AtomicBool::new(true);
    let mut source = VecFrameSource::new(vec![
        frame(1.0, 0x100, 8, vec![0; 8]),
        frame(1.05, 0x100, 8, vec![0; 8]),
    ]);
    orch.run(&mut source, &running).unwrap();

    assert_eq!(orch.alert_manager().stats.emitted, 1);
}

#[test]
fn no_alerts_leak_before_baseline_ready() {
    let mut config = Config::default();
    config.learning.initial_learning_window_sec = 3600;
    config.learning.min_samples_for_stable_baseline = 1;

    let mut orch = Orchestrator::new(config, RuntimeMode::Learn, AlertManager::new(Default::default()));
    let running = AtomicBool::new(true);

    let mut frames = Vec::new();
    for i in 0..50 {
        // deliberately malformed-looking tamper-ish payload for an
        // undertrained ID: if this leaked through as a detection alert
        // instead of training data, the no-learning-leakage invariant
        // would be violated.
        frames.push(frame(i as f64 * 0.01, 0x400, 8, vec![i as u8; 8]));
    }
    let mut source = VecFrameSource::new(frames);
    let stats = orch.run(&mut source, &running).unwrap();

    // the window (3600s) never elapses over this short trace, so every frame
    // in the run is training data; freezing only happens once the source is
    // exhausted, after the last detector invocation could have occurred.
    assert_eq!(stats.alerts_emitted, 0);
    assert!(orch.global_state().baseline_ready);
}
