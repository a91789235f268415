//! Alert sinks (spec §4.4 supplement): console, rolling text log, rolling
//! JSON-lines log. Every sink error is reported back to the Alert Manager as
//! `CoreError::SinkError` and never propagated past the frame boundary.

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{CoreError, CoreResult};

use super::types::Alert;

pub trait AlertSink: Send + Sync {
    fn write(&self, alert: &Alert) -> CoreResult<()>;
}

/// Human-readable line to stdout. Used for high/critical severities only by
/// default (spec §4.4 routing table).
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl AlertSink for ConsoleSink {
    fn write(&self, alert: &Alert) -> CoreResult<()> {
        println!(
            "[{:>8}] t={:.3} id={} {}: {}",
            format!("{:?}", alert.severity).to_uppercase(),
            alert.timestamp,
            alert.can_id_hex(),
            alert.alert_type,
            alert.details
        );
        Ok(())
    }
}

/// Shared state behind a size-triggered rolling file sink: once `path`
/// exceeds `max_bytes`, it is renamed to `path.1` (clobbering any previous
/// `path.1`) and a fresh file is opened in its place.
struct RollingFile {
    path: PathBuf,
    max_bytes: u64,
    file: File,
}

impl RollingFile {
    fn open(path: impl Into<PathBuf>, max_bytes: u64) -> CoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            max_bytes,
            file,
        })
    }

    fn roll_if_needed(&mut self) -> CoreResult<()> {
        let size = self.file.metadata()?.len();
        if size < self.max_bytes {
            return Ok(());
        }
        let rotated = rotated_path(&self.path);
        fs::rename(&self.path, &rotated)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> CoreResult<()> {
        self.roll_if_needed()?;
        writeln!(self.file, "{line}")?;
        Ok(())
    }
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut rotated = path.as_os_str().to_owned();
    rotated.push(".1");
    PathBuf::from(rotated)
}

/// Plain-text rolling sink, one line per alert.
pub struct TextLogSink {
    inner: Mutex<RollingFile>,
}

impl TextLogSink {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> CoreResult<Self> {
        Ok(Self {
            inner: Mutex::new(RollingFile::open(path, max_bytes)?),
        })
    }
}

impl AlertSink for TextLogSink {
    fn write(&self, alert: &Alert) -> CoreResult<()> {
        // alert.timestamp is the frame clock (seconds since capture start);
        // logged_at is the wall-clock moment the sink actually wrote the line,
        // useful when correlating a log against other host timestamps.
        let line = format!(
            "{}\t{:.3}\t{}\t{}\t{:?}\t{}",
            chrono::Utc::now().to_rfc3339(),
            alert.timestamp,
            alert.can_id_hex(),
            alert.alert_type,
            alert.severity,
            alert.details
        );
        self.inner
            .lock()
            .map_err(|_| CoreError::SinkError("text log sink lock poisoned".into()))?
            .write_line(&line)
    }
}

/// JSON-lines rolling sink: one `Alert::to_wire_json()` object per line.
pub struct JsonLogSink {
    inner: Mutex<RollingFile>,
}

impl JsonLogSink {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> CoreResult<Self> {
        Ok(Self {
            inner: Mutex::new(RollingFile::open(path, max_bytes)?),
        })
    }
}

impl AlertSink for JsonLogSink {
    fn write(&self, alert: &Alert) -> CoreResult<()> {
        let line = serde_json::to_string(&alert.to_wire_json())?;
        self.inner
            .lock()
            .map_err(|_| CoreError::SinkError("json log sink lock poisoned".into()))?
            .write_line(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::types::{AlertType, Severity};
    use std::io::Read as _;

    fn alert() -> Alert {
        Alert::new(1.0, 0x100, AlertType::TamperDlcAnomaly, Severity::High, "bad dlc")
    }

    #[test]
    fn json_sink_writes_one_line_per_alert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let sink = JsonLogSink::new(&path, 1024 * 1024).unwrap();
        sink.write(&alert()).unwrap();
        sink.write(&alert()).unwrap();

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let parsed: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["can_id"], "0x100");
    }

    #[test]
    fn text_sink_rolls_over_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.log");
        let sink = TextLogSink::new(&path, 10).unwrap();
        sink.write(&alert()).unwrap();
        sink.write(&alert()).unwrap();

        assert!(dir.path().join("alerts.log.1").exists());
    }
}
