// SPDX-License-Identifier: MPL-2.0

//! Streamer configuration types

use serde::{Deserialize, Serialize};

/// Settings applied to every frame passing through the streamer.
///
/// Crop percentages are in `0..=100` and describe how much of each axis to
/// remove in total; the transform rounds the resulting pixel counts so the
/// Bayer phase of the remaining image is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Horizontal crop in percent of the frame width
    pub crop_width_pct: u32,
    /// Vertical crop in percent of the frame height
    pub crop_height_pct: u32,
    /// Reduce frames to half resolution with a Bayer-aware 2x2 bin
    pub bin: bool,
    /// Compress frame payloads with the BNZP16 row codec
    pub compression: bool,
    /// Number of processor threads consuming the unprocessed queue
    pub process_threads: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            crop_width_pct: 0,
            crop_height_pct: 0,
            bin: false,
            compression: false,
            process_threads: 1,
        }
    }
}

impl StreamSettings {
    /// Clamp percentages into the accepted range
    pub fn clamped(mut self) -> Self {
        self.crop_width_pct = self.crop_width_pct.min(100);
        self.crop_height_pct = self.crop_height_pct.min(100);
        self
    }
}
