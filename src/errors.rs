// SPDX-License-Identifier: MPL-2.0

//! Error types for the streaming core

use std::fmt;

/// Result type alias using StreamError
pub type StreamResult<T> = Result<T, StreamError>;

/// Main error type for the streaming core
#[derive(Debug)]
pub enum StreamError {
    /// Frame transform errors
    Transform(TransformError),
    /// Container serialization errors
    Container(ContainerError),
    /// Configuration errors
    Config(String),
    /// Generic error with message
    Other(String),
}

/// Frame transform errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// Pixel format is not handled by the transform kernels
    UnsupportedFormat(String),
    /// Compressed output would overrun the backing buffer
    CapacityExceeded {
        /// Byte offset the write would have reached
        needed: usize,
        /// First byte the write must not touch
        limit: usize,
    },
    /// Buffer dimensions violate the packing invariants
    InvalidDimensions(String),
    /// Payload bytes do not form a valid BNZP16 stream
    CorruptStream(String),
}

/// Container serialization errors
#[derive(Debug)]
pub enum ContainerError {
    /// Underlying file write failed; the shard stops appending
    Io(std::io::Error),
    /// Metadata blob could not be serialized
    Metadata(String),
    /// The shard already failed and no longer accepts frames
    ShardDead,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Transform(e) => write!(f, "Transform error: {}", e),
            StreamError::Container(e) => write!(f, "Container error: {}", e),
            StreamError::Config(msg) => write!(f, "Configuration error: {}", msg),
            StreamError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            TransformError::CapacityExceeded { needed, limit } => write!(
                f,
                "Compressed output overruns backing buffer: needs {} bytes, limit {}",
                needed, limit
            ),
            TransformError::InvalidDimensions(msg) => write!(f, "Invalid dimensions: {}", msg),
            TransformError::CorruptStream(msg) => write!(f, "Corrupt stream: {}", msg),
        }
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::Io(e) => write!(f, "I/O error: {}", e),
            ContainerError::Metadata(msg) => write!(f, "Metadata error: {}", msg),
            ContainerError::ShardDead => write!(f, "Shard is no longer writable"),
        }
    }
}

impl std::error::Error for StreamError {}
impl std::error::Error for TransformError {}
impl std::error::Error for ContainerError {}

impl From<TransformError> for StreamError {
    fn from(err: TransformError) -> Self {
        StreamError::Transform(err)
    }
}

impl From<ContainerError> for StreamError {
    fn from(err: ContainerError) -> Self {
        StreamError::Container(err)
    }
}

impl From<std::io::Error> for ContainerError {
    fn from(err: std::io::Error) -> Self {
        ContainerError::Io(err)
    }
}

impl From<String> for StreamError {
    fn from(msg: String) -> Self {
        StreamError::Other(msg)
    }
}
