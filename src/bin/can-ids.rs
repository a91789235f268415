//! Minimal demonstration binary: reads newline-delimited JSON frames from
//! stdin, runs them through the detection core in `auto` mode, and writes
//! alerts to the console and a rolling JSON log. CLI argument parsing and
//! multi-file config layering are out of scope for the core itself; this is
//! the thinnest wiring that exercises it end to end.

use std::io;
use std::sync::atomic::AtomicBool;

use can_ids_core::alert::{AlertManager, ConsoleSink, JsonLogSink};
use can_ids_core::source::OfflineFrameSource;
use can_ids_core::{Config, Orchestrator, RuntimeMode};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let file = std::fs::File::open(&path).unwrap_or_else(|e| {
                log::error!("cannot open config {path}: {e}");
                std::process::exit(1);
            });
            Config::from_reader(file).unwrap_or_else(|e| {
                log::error!("invalid config: {e}");
                std::process::exit(1);
            })
        }
        None => Config::default(),
    };

    let learning_duration_sec = config.learning.initial_learning_window_sec as f64;

    let alert_manager = AlertManager::new(config.throttle)
        .with_console_sink(Box::new(ConsoleSink))
        .with_json_sink(Box::new(
            JsonLogSink::new("alerts.jsonl", 10 * 1024 * 1024)
                .expect("failed to open alerts.jsonl"),
        ));

    let mut orchestrator = Orchestrator::new(
        config,
        RuntimeMode::Auto { learning_duration_sec },
        alert_manager,
    );

    let mut source = OfflineFrameSource::new(io::stdin().lock());
    let running = AtomicBool::new(true);

    match orchestrator.run(&mut source, &running) {
        Ok(stats) => {
            log::info!(
                "done: {} frame(s) processed, {} malformed, {} alert(s) emitted ({} throttled, {} cooled down, {} sink error(s))",
                stats.frames_processed,
                stats.malformed_frames,
                stats.alerts_emitted,
                stats.alerts_dropped_throttled,
                stats.alerts_dropped_cooldown,
                stats.sink_errors,
            );
        }
        Err(e) => {
            log::error!("pipeline aborted: {e}");
            std::process::exit(1);
        }
    }
}
