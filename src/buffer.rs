// SPDX-License-Identifier: MPL-2.0

//! Frame buffers and the shared buffer pool
//!
//! A [`RawImageBuffer`] is the unit of work moving through the pipeline.
//! Ownership transfers through the queues, so whichever stage holds the
//! buffer has exclusive access to its backing bytes; there is no lock.

use crate::errors::TransformError;
use crate::metadata::FrameMetadata;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

/// Bayer packing of a frame's backing bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 10-bit packed: 4 samples in 5 bytes
    Raw10,
    /// 12-bit packed: 2 samples in 3 bytes
    Raw12,
    /// 16-bit little-endian, 2 bytes per sample
    Raw16,
    /// Planar YUV from the preview path; not handled by the transform kernels
    Yuv420,
}

impl PixelFormat {
    /// Whether the transform kernels handle this packing
    pub fn is_raw(self) -> bool {
        matches!(self, Self::Raw10 | Self::Raw12 | Self::Raw16)
    }

    /// Packed row stride in bytes for a row of `width` samples.
    ///
    /// Returns an error when `width` violates the packing alignment
    /// (multiple of 4 for RAW10, multiple of 2 for RAW12) so the bit
    /// divisions below are always exact.
    pub fn packed_row_stride(self, width: usize) -> Result<usize, TransformError> {
        match self {
            Self::Raw10 => {
                if width % 4 != 0 {
                    return Err(TransformError::InvalidDimensions(format!(
                        "RAW10 width {} is not a multiple of 4",
                        width
                    )));
                }
                Ok(10 * width / 8)
            }
            Self::Raw12 => {
                if width % 2 != 0 {
                    return Err(TransformError::InvalidDimensions(format!(
                        "RAW12 width {} is not a multiple of 2",
                        width
                    )));
                }
                Ok(12 * width / 8)
            }
            Self::Raw16 => Ok(2 * width),
            Self::Yuv420 => Err(TransformError::UnsupportedFormat(
                "YUV420 has no packed Bayer stride".into(),
            )),
        }
    }
}

/// Payload compression applied by the transform stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionType {
    Uncompressed,
    /// BNZP16 per-row entropy coding of 16-bit samples
    Bnzp16,
}

/// Backing byte region of a frame plus the live subrange within it.
///
/// The allocation never shrinks while a frame is in flight; transforms
/// rewrite the front of the region and narrow the valid range to the bytes
/// they produced.
#[derive(Debug)]
pub struct BufferData {
    bytes: Vec<u8>,
    valid_start: usize,
    valid_end: usize,
}

impl BufferData {
    /// Allocate a zeroed region of `capacity` bytes with an empty valid range
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            valid_start: 0,
            valid_end: 0,
        }
    }

    /// Wrap an existing allocation; the whole region starts out valid
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            bytes,
            valid_start: 0,
            valid_end: len,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// The live subrange of the allocation
    pub fn valid_range(&self) -> (usize, usize) {
        (self.valid_start, self.valid_end)
    }

    pub fn valid_len(&self) -> usize {
        self.valid_end - self.valid_start
    }

    /// The live bytes
    pub fn valid(&self) -> &[u8] {
        &self.bytes[self.valid_start..self.valid_end]
    }

    pub fn set_valid_range(&mut self, start: usize, end: usize) {
        debug_assert!(start <= end && end <= self.bytes.len());
        self.valid_start = start;
        self.valid_end = end;
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

/// A single frame moving through the pipeline
#[derive(Debug)]
pub struct RawImageBuffer {
    /// Width in samples of the image currently packed in `data`
    pub width: usize,
    /// Height in rows
    pub height: usize,
    /// Bytes per packed row
    pub row_stride: usize,
    /// Packing of `data`
    pub pixel_format: PixelFormat,
    /// Whether a 2x2 bin has been applied
    pub is_binned: bool,
    /// Whether the payload is entropy coded
    pub is_compressed: bool,
    /// Codec used for the payload
    pub compression_type: CompressionType,
    /// Capture metadata forwarded to the container
    pub metadata: FrameMetadata,
    /// Backing bytes
    pub data: BufferData,
}

impl RawImageBuffer {
    /// Build a frame over an existing allocation, validating the packing
    /// invariants and marking the packed image bytes valid.
    pub fn new(
        width: usize,
        height: usize,
        pixel_format: PixelFormat,
        metadata: FrameMetadata,
        mut data: BufferData,
    ) -> Result<Self, TransformError> {
        let row_stride = pixel_format.packed_row_stride(width)?;
        let packed_len = row_stride * height;
        if data.capacity() < packed_len {
            return Err(TransformError::InvalidDimensions(format!(
                "backing capacity {} is below the packed size {}",
                data.capacity(),
                packed_len
            )));
        }
        data.set_valid_range(0, packed_len);
        Ok(Self {
            width,
            height,
            row_stride,
            pixel_format,
            is_binned: false,
            is_compressed: false,
            compression_type: CompressionType::Uncompressed,
            metadata,
            data,
        })
    }
}

struct PoolInner {
    buffers: Vec<Vec<u8>>,
    pooled_bytes: usize,
}

/// Thread-safe free list of backing allocations.
///
/// Injected into the streamer as an explicit dependency; buffers returned
/// through [`RawBufferPool::recycle`] are handed back out by
/// [`RawBufferPool::acquire`]. Allocations are dropped instead of retained
/// once the pooled total would pass the memory ceiling, so an idle pool
/// does not pin the high-water mark of a long recording.
pub struct RawBufferPool {
    inner: Mutex<PoolInner>,
    memory_limit: usize,
}

/// Default ceiling on idle pooled memory
const DEFAULT_POOL_MEMORY_LIMIT: usize = 512 * 1024 * 1024;

impl RawBufferPool {
    pub fn new() -> Self {
        Self::with_memory_limit(DEFAULT_POOL_MEMORY_LIMIT)
    }

    pub fn with_memory_limit(memory_limit: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                buffers: Vec::new(),
                pooled_bytes: 0,
            }),
            memory_limit,
        }
    }

    /// Hand out a pooled allocation of at least `capacity` bytes, or a
    /// fresh one when nothing suitable is pooled.
    pub fn acquire(&self, capacity: usize) -> BufferData {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = inner.buffers.iter().position(|b| b.len() >= capacity) {
            let bytes = inner.buffers.swap_remove(pos);
            inner.pooled_bytes -= bytes.len();
            return BufferData::from_vec(bytes);
        }
        drop(inner);
        BufferData::with_capacity(capacity)
    }

    /// Return a frame's backing allocation for reuse
    pub fn recycle(&self, buffer: RawImageBuffer) {
        self.recycle_data(buffer.data);
    }

    /// Return a bare allocation for reuse
    pub fn recycle_data(&self, data: BufferData) {
        let bytes = data.into_vec();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.pooled_bytes + bytes.len() > self.memory_limit {
            debug!(
                pooled = inner.pooled_bytes,
                dropped = bytes.len(),
                "Pool at memory ceiling, releasing allocation"
            );
            return;
        }
        inner.pooled_bytes += bytes.len();
        inner.buffers.push(bytes);
    }

    /// Total bytes currently held idle in the pool
    pub fn pooled_bytes(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pooled_bytes
    }
}

impl Default for RawBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_row_stride() {
        assert_eq!(PixelFormat::Raw10.packed_row_stride(1920).unwrap(), 2400);
        assert_eq!(PixelFormat::Raw12.packed_row_stride(4000).unwrap(), 6000);
        assert_eq!(PixelFormat::Raw16.packed_row_stride(100).unwrap(), 200);
        assert!(PixelFormat::Raw10.packed_row_stride(1922).is_err());
        assert!(PixelFormat::Raw12.packed_row_stride(4001).is_err());
    }

    #[test]
    fn test_buffer_validates_capacity() {
        let data = BufferData::with_capacity(10);
        let err = RawImageBuffer::new(8, 8, PixelFormat::Raw10, FrameMetadata::default(), data);
        assert!(err.is_err());

        let data = BufferData::with_capacity(8 * 8 * 2);
        let buf =
            RawImageBuffer::new(8, 8, PixelFormat::Raw10, FrameMetadata::default(), data).unwrap();
        assert_eq!(buf.row_stride, 10);
        assert_eq!(buf.data.valid_range(), (0, 80));
    }

    #[test]
    fn test_pool_reuses_allocations() {
        let pool = RawBufferPool::new();
        let data = pool.acquire(1024);
        assert_eq!(data.capacity(), 1024);
        pool.recycle_data(data);
        assert_eq!(pool.pooled_bytes(), 1024);

        // A smaller request is served from the pooled allocation
        let again = pool.acquire(512);
        assert_eq!(again.capacity(), 1024);
        assert_eq!(pool.pooled_bytes(), 0);
    }

    #[test]
    fn test_pool_memory_ceiling() {
        let pool = RawBufferPool::with_memory_limit(1000);
        pool.recycle_data(BufferData::with_capacity(600));
        pool.recycle_data(BufferData::with_capacity(600));
        // The second return would pass the ceiling and is dropped
        assert_eq!(pool.pooled_bytes(), 600);
    }
}
