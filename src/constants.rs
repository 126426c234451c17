// SPDX-License-Identifier: MPL-2.0

//! Crate-wide constants

use std::time::Duration;

/// Audio capture sample rate in Hz
pub const SOUND_SAMPLE_RATE_HZ: u32 = 48_000;

/// Audio capture channel count (stereo, interleaved)
pub const SOUND_CHANNEL_COUNT: u16 = 2;

/// How long a processor thread blocks on the unprocessed queue before
/// re-checking the running flag
pub const PROCESS_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(67);

/// How long a writer thread blocks on the ready queue before re-checking
/// the running flag
pub const WRITE_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Magic bytes opening every container shard
pub const CONTAINER_MAGIC: &[u8; 4] = b"RCNT";

/// Magic bytes terminating a committed container shard
pub const CONTAINER_END_MAGIC: &[u8; 4] = b"REND";

/// Container layout version written into the header
pub const CONTAINER_VERSION: u16 = 1;

/// Values per bit-packed block in the BNZP16 row codec
pub const BNZP_BLOCK_LEN: usize = 32;
