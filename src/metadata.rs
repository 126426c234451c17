// SPDX-License-Identifier: MPL-2.0

//! Capture metadata forwarded into the container
//!
//! These types are opaque to the pipeline: the camera layer fills them in,
//! the container serializes them verbatim as JSON blobs. Players use them
//! to sort and develop frames; nothing in this crate interprets the values.

use serde::{Deserialize, Serialize};

/// Sensor color filter arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorArrangement {
    Rggb,
    Grbg,
    Gbrg,
    Bggr,
}

impl Default for SensorArrangement {
    fn default() -> Self {
        Self::Rggb
    }
}

/// Static sensor description written once into every shard header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraMetadata {
    /// Bayer pattern of the sensor
    pub sensor_arrangement: SensorArrangement,
    /// Per-channel black levels (R, Gr, Gb, B)
    pub black_levels: [u16; 4],
    /// Sensor saturation level
    pub white_level: u16,
    /// Color matrix, row-major
    pub color_matrix: Vec<f32>,
    /// Forward matrix, row-major
    pub forward_matrix: Vec<f32>,
    /// Dimensions of the lens shading correction map (width, height)
    pub lens_shading_map_size: (u32, u32),
}

impl Default for CameraMetadata {
    fn default() -> Self {
        Self {
            sensor_arrangement: SensorArrangement::default(),
            black_levels: [64, 64, 64, 64],
            white_level: 1023,
            color_matrix: Vec::new(),
            forward_matrix: Vec::new(),
            lens_shading_map_size: (0, 0),
        }
    }
}

/// Per-frame capture metadata, forwarded verbatim
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct FrameMetadata {
    /// Sensor timestamp in nanoseconds
    pub timestamp_ns: i64,
    /// ISO sensitivity the frame was captured at
    pub iso: u32,
    /// Exposure time in nanoseconds
    pub exposure_time_ns: i64,
    /// White balance gains (R, G, B)
    pub white_balance: [f32; 3],
    /// Whether lens shading correction was already applied by the sensor
    pub lens_shading_applied: bool,
    /// Screen orientation at capture time, degrees clockwise
    pub orientation: u16,
}
