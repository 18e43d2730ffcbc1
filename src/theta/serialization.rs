// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Binary layout of compact Theta sketches.
//!
//! ## Preamble Layout (Little Endian)
//!
//! | Byte | Field | Description |
//! |------|-------|-------------|
//! | 0 | preamble_longs | Number of 8-byte longs in preamble (1, 2, or 3), low 6 bits |
//! | 1 | serial_version | Serialization version (currently 3) |
//! | 2 | family_id | Family ID (3 for compact Theta) |
//! | 3-4 | unused | Zero in the compact format |
//! | 5 | flags | Bit flags (see below) |
//! | 6-7 | seed_hash | 16-bit hash of the seed |
//!
//! If preamble_longs >= 2:
//! | Byte 8-11 | retained_entries | Number of hash values stored |
//! | Byte 12-15 | p | Sampling probability as float (unused in compact, set to 1.0) |
//!
//! If preamble_longs >= 3:
//! | Byte 16-23 | theta | Theta value as 64-bit integer |
//!
//! The cache follows at byte `preamble_longs * 8`, one u64 per retained entry.
//!
//! ## Flags (Byte 5)
//!
//! | Bit | Name | Description |
//! |-----|------|-------------|
//! | 0 | BIG_ENDIAN | Not used (always 0 for little endian) |
//! | 1 | READ_ONLY | Sketch is read-only (always 1 for compact) |
//! | 2 | EMPTY | Sketch is empty |
//! | 3 | COMPACT | Sketch is in compact form |
//! | 4 | ORDERED | Hash values are sorted ascending |

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::insufficient_data;
use crate::error::Error;

/// Maximum theta value (signed max for compatibility with Java)
pub const MAX_THETA: u64 = i64::MAX as u64;

pub const THETA_FAMILY_ID: u8 = 3;
pub const SERIAL_VERSION: u8 = 3;

pub const FLAG_READ_ONLY: u8 = 1 << 1;
pub const FLAG_EMPTY: u8 = 1 << 2;
pub const FLAG_COMPACT: u8 = 1 << 3;
pub const FLAG_ORDERED: u8 = 1 << 4;

pub const PREAMBLE_LONGS_EMPTY: u8 = 1;
pub const PREAMBLE_LONGS_EXACT: u8 = 2;
pub const PREAMBLE_LONGS_ESTIMATION: u8 = 3;

const PREAMBLE_LONGS_MASK: u8 = 0x3F;

pub const HASH_SIZE_BYTES: usize = 8;
pub const DEFAULT_P_FLOAT_BITS: u32 = 0x3F80_0000;

/// The fixed header preceding the cache of a compact Theta sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Preamble {
    pub preamble_longs: u8,
    pub serial_version: u8,
    pub family_id: u8,
    pub flags: u8,
    pub seed_hash: u16,
    pub retained_entries: u32,
    pub theta: u64,
}

impl Preamble {
    /// Builds the smallest header that preserves the given state.
    pub fn for_compact(
        retained_entries: u32,
        theta: u64,
        seed_hash: u16,
        is_empty: bool,
        is_ordered: bool,
    ) -> Self {
        let mut flags = FLAG_READ_ONLY | FLAG_COMPACT;
        if is_ordered {
            flags |= FLAG_ORDERED;
        }
        if is_empty {
            flags |= FLAG_EMPTY;
        }
        Self {
            preamble_longs: preamble_longs_needed(retained_entries, theta),
            serial_version: SERIAL_VERSION,
            family_id: THETA_FAMILY_ID,
            flags,
            seed_hash,
            retained_entries,
            theta,
        }
    }

    /// Decodes the header at the start of `bytes`.
    ///
    /// Only the lengths are checked here; family, version, seed hash and flags are
    /// validated by the callers that care about them.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let preamble_longs =
            cursor.read_u8().map_err(insufficient_data("preamble_longs"))? & PREAMBLE_LONGS_MASK;
        let serial_version = cursor.read_u8().map_err(insufficient_data("serial_version"))?;
        let family_id = cursor.read_u8().map_err(insufficient_data("family_id"))?;
        cursor.skip(2).map_err(insufficient_data("unused"))?;
        let flags = cursor.read_u8().map_err(insufficient_data("flags"))?;
        let seed_hash = cursor.read_u16_le().map_err(insufficient_data("seed_hash"))?;

        if !(PREAMBLE_LONGS_EMPTY..=PREAMBLE_LONGS_ESTIMATION).contains(&preamble_longs) {
            return Err(Error::deserial(format!(
                "invalid preamble longs: expected [{PREAMBLE_LONGS_EMPTY}, {PREAMBLE_LONGS_ESTIMATION}], got {preamble_longs}"
            )));
        }

        let retained_entries = if preamble_longs > PREAMBLE_LONGS_EMPTY {
            let n = cursor
                .read_u32_le()
                .map_err(insufficient_data("retained_entries"))?;
            let _p = cursor.read_u32_le().map_err(insufficient_data("p"))?;
            n
        } else {
            0
        };

        let theta = if preamble_longs > PREAMBLE_LONGS_EXACT {
            cursor.read_u64_le().map_err(insufficient_data("theta"))?
        } else {
            MAX_THETA
        };

        Ok(Self {
            preamble_longs,
            serial_version,
            family_id,
            flags,
            seed_hash,
            retained_entries,
            theta,
        })
    }

    /// Writes exactly `preamble_longs * 8` bytes.
    pub fn encode(&self, bytes: &mut SketchBytes) {
        bytes.write_u8(self.preamble_longs);
        bytes.write_u8(self.serial_version);
        bytes.write_u8(self.family_id);
        bytes.write_u8(0);
        bytes.write_u8(0);
        bytes.write_u8(self.flags);
        bytes.write_u16_le(self.seed_hash);

        if self.preamble_longs >= PREAMBLE_LONGS_EXACT {
            bytes.write_u32_le(self.retained_entries);
            bytes.write_u32_le(DEFAULT_P_FLOAT_BITS);
        }

        if self.preamble_longs >= PREAMBLE_LONGS_ESTIMATION {
            bytes.write_u64_le(self.theta);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.flags & FLAG_EMPTY != 0
    }

    pub fn is_compact(&self) -> bool {
        self.flags & FLAG_COMPACT != 0
    }

    pub fn is_ordered(&self) -> bool {
        self.flags & FLAG_ORDERED != 0
    }

    /// Byte offset of the first cache entry.
    pub fn cache_offset(&self) -> usize {
        self.preamble_longs as usize * 8
    }

    /// Total length of the serialized sketch described by this header.
    pub fn total_bytes(&self) -> usize {
        self.cache_offset() + self.retained_entries as usize * HASH_SIZE_BYTES
    }
}

/// Number of preamble longs needed to losslessly record a compact sketch.
///
/// Theta is only written when it is below [`MAX_THETA`]; the entry count only when there are
/// entries to count.
pub(crate) fn preamble_longs_needed(retained_entries: u32, theta: u64) -> u8 {
    if theta < MAX_THETA {
        PREAMBLE_LONGS_ESTIMATION
    } else if retained_entries == 0 {
        PREAMBLE_LONGS_EMPTY
    } else {
        PREAMBLE_LONGS_EXACT
    }
}

/// Serialized size in bytes of a compact sketch with the given state.
pub(crate) fn required_bytes(retained_entries: u32, theta: u64) -> usize {
    preamble_longs_needed(retained_entries, theta) as usize * 8
        + retained_entries as usize * HASH_SIZE_BYTES
}
