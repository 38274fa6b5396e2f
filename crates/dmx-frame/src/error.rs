//! Error types for frame encoding and decoding

use thiserror::Error;

/// Errors that can occur while building a wire frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Payload exceeds the widget's maximum message size
    #[error("payload too large: {len} bytes exceeds maximum of {max}")]
    PayloadTooLarge { len: usize, max: usize },
}
