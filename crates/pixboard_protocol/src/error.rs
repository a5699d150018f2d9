//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame is not valid JSON or does not match any message shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame exceeds the size limit for its direction.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// Frame length.
        len: usize,
        /// Limit that was exceeded.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_display() {
        let err = ProtocolError::FrameTooLarge { len: 9000, max: 4096 };
        assert_eq!(err.to_string(), "frame too large: 9000 bytes (max 4096)");
    }
}
