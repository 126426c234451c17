// SPDX-License-Identifier: MPL-2.0

//! Append-only container shards
//!
//! Each output file descriptor gets one [`ContainerWriter`]. A shard is a
//! header, a run of length-prefixed frame records, and a footer carrying an
//! offset index for random access. Length prefixes are network order, so a
//! shard that never received its footer (crash, power loss) stays
//! recoverable by forward linear scan — [`scan_container`] implements that
//! walk.

use crate::buffer::{CompressionType, PixelFormat, RawImageBuffer};
use crate::constants::{CONTAINER_END_MAGIC, CONTAINER_MAGIC, CONTAINER_VERSION};
use crate::errors::ContainerError;
use crate::metadata::{CameraMetadata, FrameMetadata};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use tracing::{debug, error, info, warn};

/// Frame layout and capture metadata serialized ahead of every payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecordMeta {
    pub width: usize,
    pub height: usize,
    pub row_stride: usize,
    pub pixel_format: PixelFormat,
    pub compression_type: CompressionType,
    pub is_binned: bool,
    pub is_compressed: bool,
    pub capture: FrameMetadata,
}

impl FrameRecordMeta {
    fn from_buffer(buffer: &RawImageBuffer) -> Self {
        Self {
            width: buffer.width,
            height: buffer.height,
            row_stride: buffer.row_stride,
            pixel_format: buffer.pixel_format,
            compression_type: buffer.compression_type,
            is_binned: buffer.is_binned,
            is_compressed: buffer.is_compressed,
            capture: buffer.metadata,
        }
    }
}

/// Serializer for one output shard
pub struct ContainerWriter {
    writer: BufWriter<File>,
    position: u64,
    offsets: Vec<u64>,
    frames_written: u64,
    bytes_written: u64,
    dead: bool,
    shard_index: u16,
}

impl ContainerWriter {
    /// Write the shard header and return a writer ready for frames
    pub fn create(
        file: File,
        camera: &CameraMetadata,
        shard_index: u16,
        shard_count: u16,
    ) -> Result<Self, ContainerError> {
        let meta = serde_json::to_vec(camera).map_err(|e| ContainerError::Metadata(e.to_string()))?;

        let mut writer = BufWriter::with_capacity(4 * 1024 * 1024, file);
        writer.write_all(CONTAINER_MAGIC)?;
        writer.write_u16::<BigEndian>(CONTAINER_VERSION)?;
        writer.write_u16::<BigEndian>(shard_index)?;
        writer.write_u16::<BigEndian>(shard_count)?;
        writer.write_u32::<BigEndian>(meta.len() as u32)?;
        writer.write_all(&meta)?;

        let position = (CONTAINER_MAGIC.len() + 2 + 2 + 2 + 4 + meta.len()) as u64;
        info!(shard = shard_index, of = shard_count, "Container shard opened");

        Ok(Self {
            writer,
            position,
            offsets: Vec::new(),
            frames_written: 0,
            bytes_written: 0,
            dead: false,
            shard_index,
        })
    }

    /// Append one frame record. Returns the payload bytes written; 0 when
    /// the frame was skipped by the format check. When `release_data` the
    /// buffer's valid range is cleared after serialization.
    ///
    /// A failed write kills the shard: it stops appending but keeps its
    /// index so `commit` can still leave the file scannable.
    pub fn add(
        &mut self,
        buffer: &mut RawImageBuffer,
        release_data: bool,
    ) -> Result<u64, ContainerError> {
        if self.dead {
            return Err(ContainerError::ShardDead);
        }
        if !buffer.pixel_format.is_raw() {
            warn!(
                shard = self.shard_index,
                format = ?buffer.pixel_format,
                "Skipping frame with unsupported pixel format"
            );
            return Ok(0);
        }

        let meta = serde_json::to_vec(&FrameRecordMeta::from_buffer(buffer))
            .map_err(|e| ContainerError::Metadata(e.to_string()))?;
        let payload = buffer.data.valid();
        let record_len = 4 + meta.len() + payload.len();

        let result = (|| -> std::io::Result<()> {
            self.writer.write_u32::<BigEndian>(record_len as u32)?;
            self.writer.write_u32::<BigEndian>(meta.len() as u32)?;
            self.writer.write_all(&meta)?;
            self.writer.write_all(payload)?;
            Ok(())
        })();

        if let Err(e) = result {
            error!(shard = self.shard_index, error = %e, "Shard write failed, no longer appending");
            self.dead = true;
            return Err(ContainerError::Io(e));
        }

        self.offsets.push(self.position);
        self.position += 4 + record_len as u64;
        self.frames_written += 1;
        let payload_len = payload.len() as u64;
        self.bytes_written += payload_len;

        if release_data {
            buffer.data.set_valid_range(0, 0);
        }
        Ok(payload_len)
    }

    /// Finalize the shard: end-of-records sentinel, offset index, trailing
    /// magic, flush. Attempted even after a write failure so the index that
    /// did accumulate reaches disk when possible.
    pub fn commit(mut self) -> Result<(), ContainerError> {
        let result = (|| -> std::io::Result<()> {
            self.writer.write_u32::<BigEndian>(0)?;
            for &offset in &self.offsets {
                self.writer.write_u64::<BigEndian>(offset)?;
            }
            self.writer.write_u32::<BigEndian>(self.offsets.len() as u32)?;
            self.writer.write_all(CONTAINER_END_MAGIC)?;
            self.writer.flush()?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                debug!(
                    shard = self.shard_index,
                    frames = self.frames_written,
                    bytes = self.bytes_written,
                    "Container shard committed"
                );
                Ok(())
            }
            Err(e) => {
                error!(shard = self.shard_index, error = %e, "Shard commit failed");
                Err(ContainerError::Io(e))
            }
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// One frame recovered by [`scan_container`]
#[derive(Debug)]
pub struct ScannedFrame {
    pub meta: FrameRecordMeta,
    pub payload: Vec<u8>,
}

/// Result of a forward scan over one shard
#[derive(Debug)]
pub struct ContainerSummary {
    pub version: u16,
    pub shard_index: u16,
    pub shard_count: u16,
    pub camera: CameraMetadata,
    pub frames: Vec<ScannedFrame>,
    /// Whether the footer with its offset index and end magic was found
    pub committed: bool,
}

/// Walk a shard front to back using the length prefixes, recovering every
/// complete frame record. Works on partial files: a truncated record or a
/// missing footer ends the scan with `committed == false` instead of an
/// error.
pub fn scan_container<R: Read>(reader: &mut R) -> Result<ContainerSummary, ContainerError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != CONTAINER_MAGIC {
        return Err(ContainerError::Metadata("bad container magic".into()));
    }
    let version = reader.read_u16::<BigEndian>()?;
    let shard_index = reader.read_u16::<BigEndian>()?;
    let shard_count = reader.read_u16::<BigEndian>()?;
    let meta_len = reader.read_u32::<BigEndian>()? as usize;
    let mut meta = vec![0u8; meta_len];
    reader.read_exact(&mut meta)?;
    let camera: CameraMetadata =
        serde_json::from_slice(&meta).map_err(|e| ContainerError::Metadata(e.to_string()))?;

    let mut frames = Vec::new();
    let mut committed = false;

    loop {
        let record_len = match reader.read_u32::<BigEndian>() {
            Ok(len) => len as usize,
            Err(_) => break, // truncated before the next prefix
        };
        if record_len == 0 {
            // End-of-records sentinel; the footer follows
            let mut index = Vec::new();
            if reader.read_to_end(&mut index).is_ok() && index.len() >= 4 + 4 {
                committed = index.ends_with(CONTAINER_END_MAGIC);
            }
            break;
        }

        let mut record = vec![0u8; record_len];
        if reader.read_exact(&mut record).is_err() {
            break; // truncated record, keep what we have
        }
        let frame_meta_len = u32::from_be_bytes([record[0], record[1], record[2], record[3]]) as usize;
        if 4 + frame_meta_len > record.len() {
            break;
        }
        let meta: FrameRecordMeta = match serde_json::from_slice(&record[4..4 + frame_meta_len]) {
            Ok(m) => m,
            Err(e) => return Err(ContainerError::Metadata(e.to_string())),
        };
        let payload = record[4 + frame_meta_len..].to_vec();
        frames.push(ScannedFrame { meta, payload });
    }

    Ok(ContainerSummary {
        version,
        shard_index,
        shard_count,
        camera,
        frames,
        committed,
    })
}
