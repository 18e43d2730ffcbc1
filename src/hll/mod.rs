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

//! HyperLogLog-style bucket storage and its compaction.
//!
//! A store maps bucket keys, below `2^lg_config_k`, to 8-bit values such as a leading-zero
//! count. Three shapes are supported:
//!
//! - [`HashFields`]: sparse and hash-addressed, suited to few set buckets
//! - [`DenseFields`]: one byte per bucket
//! - [`CompactFields`]: immutable packed pairs sorted by key
//!
//! # Pairs
//!
//! A pair is a 32-bit value encoding both a bucket key (high 24 bits) and its value (low 8 bits).
//!
//! # Example
//!
//! ```
//! use compact_sketches::hll::BucketIterator;
//! use compact_sketches::hll::Fields;
//! use compact_sketches::hll::HashFields;
//! use compact_sketches::hll::Preamble;
//! use compact_sketches::hll::ignore_update;
//!
//! let preamble = Preamble::from_lg_k(10).unwrap();
//! let mut fields = Fields::from(HashFields::new(preamble, 4));
//! fields.update_bucket(486, 1, ignore_update).unwrap();
//! fields.update_bucket(10, 27, ignore_update).unwrap();
//!
//! let compact = fields.to_compact();
//! assert_eq!(compact.num_bytes_to_serialize(), 9);
//!
//! let mut iter = compact.bucket_iterator();
//! assert!(iter.next());
//! assert_eq!((iter.key(), iter.value()), (10, 27));
//! ```

mod compact_fields;
mod dense_fields;
mod fields;
mod hash_fields;
mod preamble;

pub use self::compact_fields::CompactBucketIter;
pub use self::compact_fields::CompactFields;
pub use self::dense_fields::DenseBucketIter;
pub use self::dense_fields::DenseFields;
pub use self::fields::BucketIter;
pub use self::fields::BucketIterator;
pub use self::fields::COMPACT_FIELDS_TAG;
pub use self::fields::DENSE_FIELDS_TAG;
pub use self::fields::EXCEPTION_NIBBLE;
pub use self::fields::Fields;
pub use self::fields::HASH_FIELDS_TAG;
pub use self::fields::ignore_update;
pub use self::hash_fields::HashBucketIter;
pub use self::hash_fields::HashFields;
pub use self::preamble::MAX_LG_K;
pub use self::preamble::MIN_LG_K;
pub use self::preamble::PREAMBLE_BYTES;
pub use self::preamble::Preamble;
pub use self::preamble::PreambleBuilder;

const VALUE_BITS: u32 = 8;
const VALUE_MASK: u32 = (1 << VALUE_BITS) - 1;

/// Largest bucket key a pair can hold.
pub const MAX_PAIR_KEY: u32 = (1 << 24) - 1;

/// Pack bucket key and value into a pair
///
/// Format: [key (24 bits) << 8] | [value (8 bits)]
#[inline]
pub fn pack_pair(key: u32, value: u8) -> u32 {
    debug_assert!(key <= MAX_PAIR_KEY, "key {key} does not fit in 24 bits");
    (key << VALUE_BITS) | value as u32
}

/// Extract bucket key (high 24 bits) from a pair
#[inline]
pub fn key_of_pair(pair: u32) -> u32 {
    pair >> VALUE_BITS
}

/// Extract value (low 8 bits) from a pair
#[inline]
pub fn value_of_pair(pair: u32) -> u8 {
    (pair & VALUE_MASK) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_pair() {
        let pair = pack_pair(12345, 42);
        assert_eq!(key_of_pair(pair), 12345);
        assert_eq!(value_of_pair(pair), 42);
    }

    #[test]
    fn test_pair_extremes() {
        let pair = pack_pair(MAX_PAIR_KEY, u8::MAX);
        assert_eq!(pair, u32::MAX);
        assert_eq!(key_of_pair(pair), MAX_PAIR_KEY);
        assert_eq!(pack_pair(10, 27), (10 << 8) | 27);
    }
}
