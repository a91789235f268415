//! Baseline persistence (spec §6): JSON-encoded snapshot of all `IdBaseline`
//! fields plus `meta.version`. Grounded on the teacher's
//! `baseline/storage.rs` validated save/load pair.

use std::collections::HashMap;
use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use super::types::IdBaseline;
use crate::error::CoreError;

const BASELINE_FORMAT_VERSION: &str = "4.0";

#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct BaselineSnapshot {
    meta: Meta,
    ids: HashMap<u32, IdBaseline>,
}

pub fn save<W: Write>(writer: W, ids: &HashMap<u32, IdBaseline>) -> Result<(), CoreError> {
    let snapshot = BaselineSnapshot {
        meta: Meta {
            version: BASELINE_FORMAT_VERSION.to_string(),
        },
        ids: ids.clone(),
    };
    serde_json::to_writer_pretty(writer, &snapshot)?;
    Ok(())
}

pub fn load<R: Read>(reader: R) -> Result<HashMap<u32, IdBaseline>, CoreError> {
    let snapshot: BaselineSnapshot = serde_json::from_reader(reader)?;
    if snapshot.meta.version != BASELINE_FORMAT_VERSION {
        return Err(CoreError::ConfigError(format!(
            "unsupported baseline format version {} (expected {})",
            snapshot.meta.version, BASELINE_FORMAT_VERSION
        )));
    }
    Ok(snapshot.ids)
}
