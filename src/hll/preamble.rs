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

//! The configuration header shared by every bucket-fields variant.
//!
//! ## Layout (Little Endian, 8 bytes)
//!
//! | Byte | Field |
//! |------|-------|
//! | 0 | preamble size in longs (1) |
//! | 1 | serial version |
//! | 2 | family id (7, HLL) |
//! | 3 | lg_config_k |
//! | 4 | unused |
//! | 5 | flags |
//! | 6-7 | seed_hash |

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::codec::insufficient_data;
use crate::error::Error;
use crate::error::ErrorKind;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;

/// Minimum log2 of the number of buckets
pub const MIN_LG_K: u8 = 4;

/// Maximum log2 of the number of buckets
pub const MAX_LG_K: u8 = 21;

const PREAMBLE_SIZE_LONGS: u8 = 1;
const SERIAL_VERSION: u8 = 1;
const HLL_FAMILY_ID: u8 = 7;

/// Size of a serialized [`Preamble`] in bytes.
pub const PREAMBLE_BYTES: usize = 8;

/// Bucket-store configuration: number of buckets and the seed the keys were hashed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    lg_config_k: u8,
    flags: u8,
    seed_hash: u16,
}

impl Preamble {
    /// Create a new builder for Preamble
    ///
    /// # Examples
    ///
    /// ```
    /// # use compact_sketches::hll::Preamble;
    /// let preamble = Preamble::builder().lg_k(10).build().unwrap();
    /// assert_eq!(preamble.config_k(), 1024);
    /// ```
    pub fn builder() -> PreambleBuilder {
        PreambleBuilder::default()
    }

    /// A preamble for `2^lg_k` buckets with the default seed.
    pub fn from_lg_k(lg_k: u8) -> Result<Self, Error> {
        Self::builder().lg_k(lg_k).build()
    }

    pub fn lg_config_k(&self) -> u8 {
        self.lg_config_k
    }

    /// Number of buckets.
    pub fn config_k(&self) -> u32 {
        1 << self.lg_config_k
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = SketchBytes::with_capacity(PREAMBLE_BYTES);
        bytes.write_u8(PREAMBLE_SIZE_LONGS);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(HLL_FAMILY_ID);
        bytes.write_u8(self.lg_config_k);
        bytes.write_u8(0);
        bytes.write_u8(self.flags);
        bytes.write_u16_le(self.seed_hash);
        bytes.into_bytes()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let preamble_size = cursor.read_u8().map_err(insufficient_data("preamble_size"))?;
        let serial_version = cursor.read_u8().map_err(insufficient_data("serial_version"))?;
        let family_id = cursor.read_u8().map_err(insufficient_data("family_id"))?;
        let lg_config_k = cursor.read_u8().map_err(insufficient_data("lg_config_k"))?;
        cursor.skip(1).map_err(insufficient_data("unused"))?;
        let flags = cursor.read_u8().map_err(insufficient_data("flags"))?;
        let seed_hash = cursor.read_u16_le().map_err(insufficient_data("seed_hash"))?;

        if family_id != HLL_FAMILY_ID {
            return Err(Error::invalid_family(HLL_FAMILY_ID, family_id, "HLL"));
        }
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        if preamble_size != PREAMBLE_SIZE_LONGS {
            return Err(Error::deserial(format!(
                "invalid preamble size: expected {PREAMBLE_SIZE_LONGS}, got {preamble_size}"
            )));
        }
        if !(MIN_LG_K..=MAX_LG_K).contains(&lg_config_k) {
            return Err(Error::deserial(format!(
                "lg_config_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {lg_config_k}"
            )));
        }

        Ok(Self {
            lg_config_k,
            flags,
            seed_hash,
        })
    }
}

/// Builder for [`Preamble`]
#[derive(Debug)]
pub struct PreambleBuilder {
    lg_k: u8,
    seed: u64,
    flags: u8,
}

impl Default for PreambleBuilder {
    fn default() -> Self {
        Self {
            lg_k: 12,
            seed: DEFAULT_UPDATE_SEED,
            flags: 0,
        }
    }
}

impl PreambleBuilder {
    /// Set lg_k (log2 of the number of buckets), in `[4, 21]`.
    pub fn lg_k(mut self, lg_k: u8) -> Self {
        self.lg_k = lg_k;
        self
    }

    /// Set the seed whose hash is recorded.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the raw flags byte.
    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    /// Build the Preamble.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::ConfigInvalid`] if lg_k is out of range.
    pub fn build(self) -> Result<Preamble, Error> {
        if !(MIN_LG_K..=MAX_LG_K).contains(&self.lg_k) {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                format!(
                    "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {}",
                    self.lg_k
                ),
            ));
        }
        Ok(Preamble {
            lg_config_k: self.lg_k,
            flags: self.flags,
            seed_hash: compute_seed_hash(self.seed),
        })
    }
}
