//! Frame sources (spec §5 supplement): the pipeline's input boundary.
//! `FrameSource` abstracts over offline replay and in-memory test fixtures;
//! a live bus adapter is out of scope (spec Non-goals) but would implement
//! the same trait.

use std::io::{BufRead, BufReader, Read};

use crate::error::{CoreError, CoreResult};
use crate::frame::Frame;

pub trait FrameSource {
    /// Returns the next frame, or `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> CoreResult<Option<Frame>>;
}

/// Newline-delimited JSON frame source, one `Frame` per line.
pub struct OfflineFrameSource<R> {
    lines: std::io::Lines<BufReader<R>>,
}

impl<R: Read> OfflineFrameSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }
}

impl<R: Read> FrameSource for OfflineFrameSource<R> {
    fn next_frame(&mut self) -> CoreResult<Option<Frame>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let frame: Frame = serde_json::from_str(&line)
                .map_err(|e| CoreError::SourceError(format!("malformed frame record: {e}")))?;
            frame.validate()?;
            return Ok(Some(frame));
        }
    }
}

/// In-memory frame source driven from a `Vec`, used in tests and for
/// bootstrapping learn-mode runs from a fixed corpus.
#[derive(Debug, Default)]
pub struct VecFrameSource {
    frames: std::collections::VecDeque<Frame>,
}

impl VecFrameSource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> CoreResult<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_source_reads_ndjson_lines() {
        let input = "{\"timestamp\":1.0,\"can_id\":256,\"dlc\":2,\"payload\":[1,2]}\n\
                      {\"timestamp\":2.0,\"can_id\":256,\"dlc\":2,\"payload\":[3,4]}\n";
        let mut source = OfflineFrameSource::new(input.as_bytes());
        let f1 = source.next_frame().unwrap().unwrap();
        assert_eq!(f1.can_id, 256);
        let f2 = source.next_frame().unwrap().unwrap();
        assert_eq!(f2.payload, vec![3, 4]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn offline_source_skips_blank_lines() {
        let input = "{\"timestamp\":1.0,\"can_id\":1,\"dlc\":0,\"payload\":[]}\n\n";
        let mut source = OfflineFrameSource::new(input.as_bytes());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn offline_source_rejects_malformed_record() {
        let input = "not json\n";
        let mut source = OfflineFrameSource::new(input.as_bytes());
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn vec_source_yields_in_order_then_none() {
        let frames = vec![
            Frame::new(1.0, 0x100, 0, vec![]).unwrap(),
            Frame::new(2.0, 0x100, 0, vec![]).unwrap(),
        ];
        let mut source = VecFrameSource::new(frames);
        assert_eq!(source.next_frame().unwrap().unwrap().timestamp, 1.0);
        assert_eq!(source.next_frame().unwrap().unwrap().timestamp, 2.0);
        assert!(source.next_frame().unwrap().is_none());
    }
}
