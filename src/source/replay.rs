//! JSON Lines landmark replay.
//!
//! One frame per line:
//! - `null` → no face
//! - `[[x, y], [x, y], ...]` → landmark set of the first face
//!
//! Blank lines are ignored. This lets any external landmark provider drive the
//! monitor through a pipe (`provider | breath-monitor`) or a recorded file.

use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use crate::detection::LandmarkSet;
use crate::source::{Frame, LandmarkSource, SourceError};

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

pub struct ReplaySource {
    lines: Lines<BufReader<BoxedReader>>,
    line_no: u64,
}

impl ReplaySource {
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let boxed: BoxedReader = Box::new(reader);
        Self {
            lines: BufReader::new(boxed).lines(),
            line_no: 0,
        }
    }

    pub fn stdin() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    /// `-` selects stdin, anything else is opened as a file.
    pub async fn open(path: &str) -> Result<Self, SourceError> {
        if path.trim() == "-" {
            return Ok(Self::stdin());
        }
        let file = tokio::fs::File::open(Path::new(path)).await?;
        Ok(Self::from_reader(file))
    }

    pub fn lines_read(&self) -> u64 {
        self.line_no
    }

    fn parse_line(&self, line: &str) -> Result<Frame, SourceError> {
        let parsed: Option<Vec<[f64; 2]>> =
            serde_json::from_str(line).map_err(|e| SourceError::Malformed {
                line: self.line_no,
                message: e.to_string(),
            })?;

        Ok(match parsed {
            Some(points) => Frame::Face(LandmarkSet::from(points)),
            None => Frame::NoFace,
        })
    }
}

impl LandmarkSource for ReplaySource {
    async fn next_frame(&mut self) -> Result<Frame, SourceError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(Frame::EndOfStream);
            };
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return self.parse_line(trimmed);
        }
    }
}
