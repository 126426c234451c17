// SPDX-License-Identifier: MPL-2.0

//! Audio side-channel contract and WAVE serialization
//!
//! The streamer never touches audio hardware. It starts an
//! [`AudioInterface`] when recording begins and pulls the captured span
//! once on stop, writing it out as a canonical RIFF/WAVE file of
//! interleaved signed 16-bit PCM.

use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{self, Write};

/// Pull-based contract of the audio capture layer
pub trait AudioInterface: Send + Sync {
    /// Begin capturing at the given rate and channel count
    fn start(&self, sample_rate: u32, channels: u16);
    /// Stop capturing; the accumulated samples stay available
    fn stop(&self);
    /// Hand over everything captured since `start`, interleaved
    fn take_samples(&self) -> Vec<i16>;
    fn sample_rate(&self) -> u32;
    fn channels(&self) -> u16;
}

/// Serialize interleaved 16-bit PCM samples as a WAVE file
pub fn write_wav<W: Write>(
    mut out: W,
    samples: &[i16],
    sample_rate: u32,
    channels: u16,
) -> io::Result<()> {
    let data_len = (samples.len() * 2) as u32;
    let block_align = channels * 2;
    let byte_rate = sample_rate * block_align as u32;

    out.write_all(b"RIFF")?;
    out.write_u32::<LittleEndian>(36 + data_len)?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_u32::<LittleEndian>(16)?;
    out.write_u16::<LittleEndian>(1)?; // PCM
    out.write_u16::<LittleEndian>(channels)?;
    out.write_u32::<LittleEndian>(sample_rate)?;
    out.write_u32::<LittleEndian>(byte_rate)?;
    out.write_u16::<LittleEndian>(block_align)?;
    out.write_u16::<LittleEndian>(16)?; // bits per sample

    out.write_all(b"data")?;
    out.write_u32::<LittleEndian>(data_len)?;
    for &s in samples {
        out.write_i16::<LittleEndian>(s)?;
    }
    out.flush()
}
