// SPDX-License-Identifier: MPL-2.0

//! rawstream - real-time RAW Bayer video capture streaming core
//!
//! This library ingests Bayer-mosaic RAW frames from a camera sensor at
//! video rates, transforms each frame on the CPU (crop, optional 2x2
//! binning, optional lossless compression, bit-depth repacking), and
//! persists the frames plus a synchronized audio track into append-only
//! container files spread over a set of pre-opened file descriptors.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`streamer`]: Lifecycle orchestrator and worker thread cohorts
//! - [`transform`]: Per-frame crop / bin / compress kernels
//! - [`codec`]: Packed Bayer sample accessors and the BNZP16 row codec
//! - [`container`]: Append-only shard serialization and recovery scan
//! - [`buffer`]: Frame buffers and the shared buffer pool
//! - [`audio`]: Audio capture contract and WAVE output
//! - [`queue`]: Bounded-wait MPMC frame queues
//! - [`config`]: Streamer settings
//!
//! # Example
//!
//! ```no_run
//! use rawstream::{RawBufferPool, RawBufferStreamer, StartOptions};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(RawBufferPool::new());
//! let streamer = RawBufferStreamer::new(Arc::clone(&pool));
//! streamer.set_crop_amount(10, 10);
//! streamer.start(StartOptions {
//!     video_fds: vec![/* pre-opened shard fds */],
//!     audio_fd: None,
//!     audio: None,
//!     compression: true,
//!     process_threads: 4,
//!     camera_metadata: Default::default(),
//! });
//! // camera layer calls streamer.add(frame) per captured frame
//! streamer.stop();
//! ```

pub mod audio;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod constants;
pub mod container;
pub mod errors;
pub mod metadata;
pub mod queue;
pub mod streamer;
pub mod transform;

// Re-export commonly used types
pub use buffer::{BufferData, CompressionType, PixelFormat, RawBufferPool, RawImageBuffer};
pub use config::StreamSettings;
pub use container::{scan_container, ContainerWriter};
pub use errors::{ContainerError, StreamError, StreamResult, TransformError};
pub use metadata::{CameraMetadata, FrameMetadata};
pub use streamer::{RawBufferStreamer, StartOptions};
pub use transform::Transformer;
