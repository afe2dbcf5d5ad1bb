//! Landmark source port.
//!
//! The face-landmark provider (camera + model) lives outside this crate. It is
//! consumed through [`LandmarkSource`], called once per sampling tick.

pub mod replay;

use std::future::Future;
use std::time::Duration;

use crate::detection::LandmarkSet;

pub use replay::ReplaySource;

/// One read from the landmark provider.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// First detected face.
    Face(LandmarkSet),
    /// Frame was read but no face was found.
    NoFace,
    /// The provider has no more frames (replay finished).
    EndOfStream,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no frame available: {0}")]
    Unavailable(String),
    #[error("malformed frame at line {line}: {message}")]
    Malformed { line: u64, message: String },
    #[error("frame read timed out after {0:?}")]
    Timeout(Duration),
    #[error("landmark source closed")]
    Closed,
    #[error("landmark source io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Port for the external landmark provider.
///
/// `next_frame` may block on a camera read or model inference; it is the only
/// suspension point inside a tick.
pub trait LandmarkSource: Send {
    fn next_frame(&mut self) -> impl Future<Output = Result<Frame, SourceError>> + Send;
}
