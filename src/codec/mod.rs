// SPDX-License-Identifier: MPL-2.0

//! Bit-level codecs for packed Bayer data

pub mod bayer;
pub mod bnzp;
