// THEORY:
// The `source` module is the seam between the engine and whatever produces
// landmarks: a live pose model, a recording, a test fixture. The engine only
// ever pulls one `PoseFrame` at a time through the `PoseSource` trait, so the
// capture device and the model stay replaceable collaborators.
//
// The bundled `JsonLinesSource` replays recordings with one frame per line:
//     {"timestamp_ms": 1200, "landmarks": {"left_shoulder": {"x": 0.4, ...}, ...}}
// A `null` or absent `landmarks` means the model saw nobody in that frame.

use crate::core_modules::landmarks::LandmarkFrame;
use crate::error::FrameSourceError;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::time::Duration;

/// One frame's worth of pose-model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    /// Milliseconds since the start of capture.
    pub timestamp_ms: u64,
    #[serde(default)]
    pub landmarks: Option<LandmarkFrame>,
}

impl PoseFrame {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.timestamp_ms)
    }
}

pub trait PoseSource {
    /// The next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<PoseFrame>, FrameSourceError>;
}

/// Reads newline-delimited JSON frames from any buffered reader.
pub struct JsonLinesSource<R> {
    reader: R,
    line_number: usize,
    buffer: Vec<u8>,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buffer: Vec::new(),
        }
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

impl<R: BufRead> PoseSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<PoseFrame>, FrameSourceError> {
        loop {
            self.buffer.clear();
            if self.reader.read_until(b'\n', &mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            // Undecodable bytes surface as `Malformed`, never as an I/O failure.
            let line = self.buffer.trim_ascii();
            if line.is_empty() {
                continue;
            }
            return serde_json::from_slice(line)
                .map(Some)
                .map_err(|source| FrameSourceError::Malformed {
                    line: self.line_number,
                    source,
                });
        }
    }
}

/// Replays an in-memory list of frames.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    frames: std::collections::VecDeque<PoseFrame>,
}

impl VecSource {
    pub fn new(frames: impl IntoIterator<Item = PoseFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl PoseSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<PoseFrame>, FrameSourceError> {
        Ok(self.frames.pop_front())
    }
}
