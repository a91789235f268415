//! Frame — the immutable, value-typed unit the whole pipeline is built on (spec §3).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum classical-CAN payload length.
pub const MAX_PAYLOAD_LEN: usize = 8;

/// Maximum 29-bit (extended) arbitration ID.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Seconds, double precision, monotonically non-decreasing across the stream.
    pub timestamp: f64,
    /// 11- or 29-bit unsigned arbitration ID.
    pub can_id: u32,
    /// Declared data-length code, 0-8.
    pub dlc: u8,
    /// Up to 8 payload bytes. May differ in length from `dlc` only when the
    /// caller is running with `treat_dlc_zero_as_special`.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Construct and validate a frame, per §7 `MalformedFrame`.
    pub fn new(timestamp: f64, can_id: u32, dlc: u8, payload: Vec<u8>) -> Result<Self, CoreError> {
        let frame = Self {
            timestamp,
            can_id,
            dlc,
            payload,
        };
        frame.validate()?;
        Ok(frame)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.can_id > MAX_EXTENDED_ID {
            return Err(CoreError::MalformedFrame(format!(
                "can_id 0x{:X} exceeds 29-bit range",
                self.can_id
            )));
        }
        if self.dlc as usize > MAX_PAYLOAD_LEN {
            return Err(CoreError::MalformedFrame(format!(
                "dlc {} exceeds classical-CAN max of {}",
                self.dlc, MAX_PAYLOAD_LEN
            )));
        }
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(CoreError::MalformedFrame(format!(
                "payload length {} exceeds {}",
                self.payload.len(),
                MAX_PAYLOAD_LEN
            )));
        }
        if self.payload.len() != self.dlc as usize && self.dlc != 0 {
            return Err(CoreError::MalformedFrame(format!(
                "payload length {} does not match dlc {}",
                self.payload.len(),
                self.dlc
            )));
        }
        Ok(())
    }

    /// Formats `can_id` the way the JSON alert sink does: "0xNNN".
    pub fn can_id_hex(&self) -> String {
        format!("0x{:X}", self.can_id)
    }
}
