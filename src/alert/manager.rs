//! Alert Manager (spec §4.4): severity routing, per-ID and global throttling,
//! cooldown deduplication, and multi-sink fan-out.

use std::collections::HashMap;

use log::warn;

use super::sinks::AlertSink;
use super::types::{Alert, AlertType, Severity};
use crate::config::ThrottleConfig;
use crate::state::PerIdState;

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertManagerStats {
    pub emitted: u64,
    pub dropped_throttled: u64,
    pub dropped_cooldown: u64,
    pub sink_errors: u64,
}

/// Which sinks a severity routes to. Default matches spec §4.4: low -> JSON
/// only; medium -> JSON + text; high/critical -> all sinks plus console.
#[derive(Debug, Clone, Copy)]
pub struct SeverityRouting {
    pub console: bool,
    pub text: bool,
    pub json: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RoutingTable {
    low: SeverityRouting,
    medium: SeverityRouting,
    high: SeverityRouting,
    critical: SeverityRouting,
}

impl Default for RoutingTable {
    fn default() -> Self {
        let all = SeverityRouting {
            console: true,
            text: true,
            json: true,
        };
        Self {
            low: SeverityRouting {
                console: false,
                text: false,
                json: true,
            },
            medium: SeverityRouting {
                console: false,
                text: true,
                json: true,
            },
            high: all,
            critical: all,
        }
    }
}

impl RoutingTable {
    fn route(&self, severity: Severity) -> SeverityRouting {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }
}

/// Second-aligned counting window (spec §4.4: "throttle buckets are
/// second-aligned").
#[derive(Debug, Default)]
struct Bucket {
    second: i64,
    count: u32,
}

impl Bucket {
    fn hit(&mut self, now: f64) -> u32 {
        let second = now.floor() as i64;
        if second != self.second {
            self.second = second;
            self.count = 0;
        }
        self.count += 1;
        self.count
    }
}

pub struct AlertManager {
    throttle: ThrottleConfig,
    routing: RoutingTable,
    per_id_buckets: HashMap<(u32, AlertType), Bucket>,
    global_bucket: Bucket,
    console: Option<Box<dyn AlertSink>>,
    text: Option<Box<dyn AlertSink>>,
    json: Option<Box<dyn AlertSink>>,
    pub stats: AlertManagerStats,
}

impl AlertManager {
    pub fn new(throttle: ThrottleConfig) -> Self {
        Self {
            throttle,
            routing: RoutingTable::default(),
            per_id_buckets: HashMap::new(),
            global_bucket: Bucket::default(),
            console: None,
            text: None,
            json: None,
            stats: AlertManagerStats::default(),
        }
    }

    pub fn with_console_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.console = Some(sink);
        self
    }

    pub fn with_text_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.text = Some(sink);
        self
    }

    pub fn with_json_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.json = Some(sink);
        self
    }

    pub fn with_routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }

    /// Apply cooldown, throttling, severity routing, and sink fan-out for one
    /// alert. `state` is the emitting ID's `PerIdState`, used only for the
    /// per-(id, alert_type) cooldown bookkeeping (spec §3's
    /// `last_alert_times`) — the Alert Manager is the sole writer of that
    /// field, never a detector.
    pub fn process(&mut self, alert: Alert, state: &mut PerIdState) {
        if let Some(last) = state.last_alert_time(alert.alert_type) {
            let elapsed_ms = (alert.timestamp - last) * 1000.0;
            if elapsed_ms < self.throttle.cooldown_ms as f64 {
                self.stats.dropped_cooldown += 1;
                return;
            }
        }

        let per_id_count = self
            .per_id_buckets
            .entry((alert.can_id, alert.alert_type))
            .or_default()
            .hit(alert.timestamp);
        let global_count = self.global_bucket.hit(alert.timestamp);

        if per_id_count > self.throttle.max_alerts_per_id_per_sec
            || global_count > self.throttle.global_max_alerts_per_sec
        {
            self.stats.dropped_throttled += 1;
            return;
        }

        state.record_alert(alert.alert_type, alert.timestamp);
        self.stats.emitted += 1;

        let routing = self.routing.route(alert.severity);
        if routing.console {
            Self::write_to(self.console.as_deref(), &alert, &mut self.stats);
        }
        if routing.text {
            Self::write_to(self.text.as_deref(), &alert, &mut self.stats);
        }
        if routing.json {
            Self::write_to(self.json.as_deref(), &alert, &mut self.stats);
        }
    }

    /// Associated rather than `&mut self` so the `sink` borrow (taken from
    /// `self.console`/`self.text`/`self.json`) and the `stats` borrow don't
    /// alias the same `self` at the call site.
    fn write_to(sink: Option<&dyn AlertSink>, alert: &Alert, stats: &mut AlertManagerStats) {
        let Some(sink) = sink else { return };
        if let Err(e) = sink.write(alert) {
            warn!("alert sink failure: {e}");
            stats.sink_errors += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateCaps;

    fn alert(ts: f64, can_id: u32, alert_type: AlertType) -> Alert {
        Alert::new(ts, can_id, alert_type, Severity::High, "test")
    }

    #[test]
    fn cooldown_suppresses_repeat_within_window() {
        let mut mgr = AlertManager::new(ThrottleConfig {
            cooldown_ms: 5000,
            ..ThrottleConfig::default()
        });
        let mut state = PerIdState::new(0x100, StateCaps::default());

        mgr.process(alert(1.0, 0x100, AlertType::TamperDlcAnomaly), &mut state);
        mgr.process(alert(2.0, 0x100, AlertType::TamperDlcAnomaly), &mut state);

        assert_eq!(mgr.stats.emitted, 1);
        assert_eq!(mgr.stats.dropped_cooldown, 1);
    }

    #[test]
    fn cooldown_allows_after_window_elapses() {
        let mut mgr = AlertManager::new(ThrottleConfig {
            cooldown_ms: 1000,
            ..ThrottleConfig::default()
        });
        let mut state = PerIdState::new(0x100, StateCaps::default());

        mgr.process(alert(1.0, 0x100, AlertType::TamperDlcAnomaly), &mut state);
        mgr.process(alert(3.0, 0x100, AlertType::TamperDlcAnomaly), &mut state);

        assert_eq!(mgr.stats.emitted, 2);
    }

    #[test]
    fn per_id_throttle_caps_emission_rate() {
        let mut mgr = AlertManager::new(ThrottleConfig {
            max_alerts_per_id_per_sec: 2,
            cooldown_ms: 0,
            ..ThrottleConfig::default()
        });
        let mut state = PerIdState::new(0x100, StateCaps::default());

        for i in 0..5 {
            mgr.process(alert(1.0, 0x100, AlertType::TamperDlcAnomaly), &mut state);
            let _ = i;
        }
        assert_eq!(mgr.stats.emitted, 2);
        assert_eq!(mgr.stats.dropped_throttled, 3);
    }

    #[test]
    fn global_throttle_caps_across_ids() {
        let mut mgr = AlertManager::new(ThrottleConfig {
            max_alerts_per_id_per_sec: 100,
            global_max_alerts_per_sec: 1,
            cooldown_ms: 0,
            ..ThrottleConfig::default()
        });
        let mut s1 = PerIdState::new(0x100, StateCaps::default());
        let mut s2 = PerIdState::new(0x200, StateCaps::default());

        mgr.process(alert(1.0, 0x100, AlertType::TamperDlcAnomaly), &mut s1);
        mgr.process(alert(1.0, 0x200, AlertType::EntropyAnomaly), &mut s2);

        assert_eq!(mgr.stats.emitted, 1);
        assert_eq!(mgr.stats.dropped_throttled, 1);
    }
}
