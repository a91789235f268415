//! `PerIdState` — the bounded-memory record tracked for one observed `can_id` (spec §3).

use std::collections::HashMap;

use crate::alert::AlertType;
use crate::frame::Frame;
use crate::hash::{hash_payload, PayloadHash};
use crate::ring::RingBuffer;
use crate::welford::RunningStats;

/// Ring buffer capacities, all overridable at `StateManager` construction.
#[derive(Debug, Clone, Copy)]
pub struct StateCaps {
    pub iat_history: usize,
    pub payload_hash_history: usize,
    pub payload_byte_history: usize,
    pub sequence_buffer: usize,
}

impl Default for StateCaps {
    fn default() -> Self {
        Self {
            iat_history: 1000,
            payload_hash_history: 100,
            payload_byte_history: 50,
            sequence_buffer: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerIdState {
    pub can_id: u32,
    pub last_timestamp: Option<f64>,
    pub iat_history: RingBuffer<f64>,
    pub iat_stats: RunningStats,
    pub payload_hash_history: RingBuffer<(f64, PayloadHash)>,
    pub payload_byte_history: [RingBuffer<u8>; 8],
    pub sequence_buffer: RingBuffer<PayloadHash>,
    pub frame_count: u64,
    last_alert_times: HashMap<AlertType, f64>,
}

impl PerIdState {
    pub fn new(can_id: u32, caps: StateCaps) -> Self {
        Self {
            can_id,
            last_timestamp: None,
            iat_history: RingBuffer::new(caps.iat_history),
            iat_stats: RunningStats::new(),
            payload_hash_history: RingBuffer::new(caps.payload_hash_history),
            payload_byte_history: std::array::from_fn(|_| RingBuffer::new(caps.payload_byte_history)),
            sequence_buffer: RingBuffer::new(caps.sequence_buffer),
            frame_count: 0,
            last_alert_times: HashMap::new(),
        }
    }

    /// Fold a newly-arrived frame into this record. Never fails (spec §4.1
    /// failure semantics): the memory-pressure path is handled by the
    /// `StateManager`, not here.
    pub fn update(&mut self, frame: &Frame, treat_dlc_zero_as_special: bool) {
        let treat_as_heartbeat = treat_dlc_zero_as_special && frame.dlc == 0;

        if let Some(last) = self.last_timestamp {
            if !treat_as_heartbeat {
                let iat = (frame.timestamp - last).max(0.0);
                self.iat_history.push(iat);
                self.iat_stats.update(iat);
            }
        }

        let hash = hash_payload(frame.dlc, &frame.payload);
        self.payload_hash_history.push((frame.timestamp, hash));
        self.sequence_buffer.push(hash);

        for (i, ring) in self.payload_byte_history.iter_mut().enumerate() {
            if let Some(&b) = frame.payload.get(i) {
                ring.push(b);
            }
        }

        self.frame_count += 1;
        if !treat_as_heartbeat {
            self.last_timestamp = Some(frame.timestamp);
        } else if self.last_timestamp.is_none() {
            self.last_timestamp = Some(frame.timestamp);
        }
    }

    /// The inter-arrival time of the most recently observed frame, if any.
    pub fn current_iat(&self) -> Option<f64> {
        self.iat_history.last().copied()
    }

    pub fn record_alert(&mut self, alert_type: AlertType, timestamp: f64) {
        self.last_alert_times.insert(alert_type, timestamp);
    }

    pub fn last_alert_time(&self, alert_type: AlertType) -> Option<f64> {
        self.last_alert_times.get(&alert_type).copied()
    }
}
