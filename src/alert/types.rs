//! Alert — the value-typed unit emitted by detectors (spec §3, §6).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of alert types (spec §6). A closed enum rather than string keys so
/// throttle buckets and test assertions can key on it without string comparison
/// (spec §9, "string-keyed alert types become a closed enumeration").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    IatMaxFactorViolation,
    MissingFrameSigma,
    ConsecutiveMissing,
    TamperDlcAnomaly,
    EntropyAnomaly,
    StaticByteMismatch,
    ByteBehaviorAnomaly,
    NonPeriodicFastReplay,
    IdenticalPayloadRepetition,
    SequenceReplay,
    UnknownIdDetected,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::IatMaxFactorViolation => "iat_max_factor_violation",
            AlertType::MissingFrameSigma => "missing_frame_sigma",
            AlertType::ConsecutiveMissing => "consecutive_missing",
            AlertType::TamperDlcAnomaly => "tamper_dlc_anomaly",
            AlertType::EntropyAnomaly => "entropy_anomaly",
            AlertType::StaticByteMismatch => "static_byte_mismatch",
            AlertType::ByteBehaviorAnomaly => "byte_behavior_anomaly",
            AlertType::NonPeriodicFastReplay => "non_periodic_fast_replay",
            AlertType::IdenticalPayloadRepetition => "identical_payload_repetition",
            AlertType::SequenceReplay => "sequence_replay",
            AlertType::UnknownIdDetected => "unknown_id_detected",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: f64,
    pub can_id: u32,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub details: String,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl Alert {
    pub fn new(
        timestamp: f64,
        can_id: u32,
        alert_type: AlertType,
        severity: Severity,
        details: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            can_id,
            alert_type,
            severity,
            details: details.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn can_id_hex(&self) -> String {
        format!("0x{:X}", self.can_id)
    }

    /// JSON sink wire format (spec §6).
    pub fn to_wire_json(&self) -> Value {
        serde_json::json!({
            "alert_type": self.alert_type.as_str(),
            "can_id": self.can_id_hex(),
            "timestamp": self.timestamp,
            "severity": match self.severity {
                Severity::Low => "low",
                Severity::Medium => "medium",
                Severity::High => "high",
                Severity::Critical => "critical",
            },
            "details": self.details,
            "context": self.context,
        })
    }
}
