//! Mouth-breathing monitor.
//!
//! Turns a per-frame stream of face landmarks into a debounced
//! "mouth breathing detected" notification:
//! landmarks → openness (MAR) → hysteresis classifier → alert → dispatcher → sink.

pub mod config;
pub mod constants;
pub mod detection;
pub mod logging;
pub mod notify;
pub mod response;
pub mod routes;
pub mod sampler;
pub mod source;
pub mod state;
