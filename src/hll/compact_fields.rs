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

//! Immutable packed bucket storage
//!
//! Each bucket is one 32-bit pair, `(key << 8) | value`, and the pairs are kept in strictly
//! ascending key order. Once built a [`CompactFields`] never changes: updates and unions are
//! rejected with [`ErrorKind::UnsupportedOperation`](crate::error::ErrorKind::UnsupportedOperation).
//! A caller that needs to keep updating must do so on the mutable store it compacted from.

use byteorder::ByteOrder;
use byteorder::LittleEndian;
use log::debug;

use crate::error::Error;
use crate::hll::BucketIterator;
use crate::hll::Fields;
use crate::hll::HashFields;
use crate::hll::Preamble;
use crate::hll::fields::COMPACT_FIELDS_TAG;
use crate::hll::fields::check_dest;
use crate::hll::key_of_pair;
use crate::hll::pack_pair;
use crate::hll::value_of_pair;

/// Compact, immutable bucket storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactFields {
    preamble: Preamble,
    pairs: Box<[u32]>,
}

impl CompactFields {
    /// Wraps packed pairs that are already sorted by strictly ascending key.
    pub(crate) fn new(preamble: Preamble, pairs: Vec<u32>) -> Self {
        debug_assert!(
            pairs
                .windows(2)
                .all(|w| key_of_pair(w[0]) < key_of_pair(w[1])),
            "pairs must be sorted by strictly ascending key"
        );
        Self {
            preamble,
            pairs: pairs.into_boxed_slice(),
        }
    }

    /// Compacts any store.
    ///
    /// The source iterator is drained, its buckets sorted by key and packed. Whatever order the
    /// source stores its buckets in, the result is ascending by key.
    pub fn from_fields(source: &Fields) -> Self {
        let mut buckets = Vec::new();
        let mut iter = source.bucket_iterator();
        while iter.next() {
            buckets.push((iter.key(), iter.value()));
        }

        buckets.sort_unstable_by_key(|&(key, _)| key);
        buckets.dedup_by(|next, prev| {
            if next.0 == prev.0 {
                prev.1 = prev.1.max(next.1);
                true
            } else {
                false
            }
        });

        let pairs: Vec<u32> = buckets
            .into_iter()
            .map(|(key, value)| pack_pair(key, value))
            .collect();
        debug!("compacted {} buckets", pairs.len());
        Self::new(*source.preamble(), pairs)
    }

    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    /// Number of stored buckets.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The packed pairs, ascending by key.
    pub fn pairs(&self) -> &[u32] {
        &self.pairs
    }

    /// Value of bucket `key`, if present.
    pub fn get(&self, key: u32) -> Option<u8> {
        self.pairs
            .binary_search_by_key(&key, |&pair| key_of_pair(pair))
            .ok()
            .map(|index| value_of_pair(self.pairs[index]))
    }

    /// A compact store is its own compact form.
    pub fn to_compact(&self) -> &Self {
        self
    }

    pub fn bucket_iterator(&self) -> CompactBucketIter<'_> {
        CompactBucketIter {
            pairs: &self.pairs,
            pos: 0,
        }
    }

    /// Tag byte followed by four bytes per bucket.
    pub fn num_bytes_to_serialize(&self) -> usize {
        1 + 4 * self.pairs.len()
    }

    pub fn serialize_into(&self, dest: &mut [u8], offset: usize) -> Result<usize, Error> {
        let n = self.num_bytes_to_serialize();
        check_dest(dest, offset, n)?;
        self.write_to(&mut dest[offset..offset + n]);
        Ok(n)
    }

    /// `dest` must be exactly [`CompactFields::num_bytes_to_serialize`] long.
    pub(crate) fn write_to(&self, dest: &mut [u8]) {
        dest[0] = COMPACT_FIELDS_TAG;
        LittleEndian::write_u32_into(&self.pairs, &mut dest[1..]);
    }

    /// Reads a compact store that spans all of `bytes`.
    pub fn deserialize(preamble: Preamble, bytes: &[u8]) -> Result<Self, Error> {
        let Some((&tag, payload)) = bytes.split_first() else {
            return Err(Error::insufficient_data("fields_tag"));
        };
        if tag != COMPACT_FIELDS_TAG {
            return Err(Error::deserial(format!(
                "expected compact fields tag {COMPACT_FIELDS_TAG:#x}, got {tag:#x}"
            )));
        }
        if payload.len() % 4 != 0 {
            return Err(Error::insufficient_data(format!(
                "compact fields payload of {} bytes is not a whole number of pairs",
                payload.len()
            )));
        }

        let mut pairs = vec![0u32; payload.len() / 4];
        LittleEndian::read_u32_into(payload, &mut pairs);

        let config_k = preamble.config_k();
        if let Some(&last) = pairs.last() {
            if key_of_pair(last) >= config_k {
                return Err(Error::deserial(format!(
                    "bucket key {} out of range [0, {config_k})",
                    key_of_pair(last)
                )));
            }
        }
        if let Some(w) = pairs
            .windows(2)
            .find(|w| key_of_pair(w[0]) >= key_of_pair(w[1]))
        {
            return Err(Error::deserial(format!(
                "compact fields keys must be strictly ascending, found {} before {}",
                key_of_pair(w[0]),
                key_of_pair(w[1])
            )));
        }

        Ok(Self {
            preamble,
            pairs: pairs.into_boxed_slice(),
        })
    }

    /// Always fails: compact fields cannot be updated.
    pub fn update_bucket<F>(&self, _key: u32, _value: u8, _on_update: F) -> Result<(), Error>
    where
        F: FnMut(u32, u8, u8),
    {
        Err(Error::unsupported_operation("update_bucket"))
    }

    /// Always fails: compact fields cannot be merged into.
    pub fn union_bucket_iterator<I, F>(&self, _iter: I, _on_update: F) -> Result<(), Error>
    where
        I: BucketIterator,
        F: FnMut(u32, u8, u8),
    {
        Err(Error::unsupported_operation("union_bucket_iterator"))
    }

    /// Always fails: compact fields cannot be merged into.
    pub fn union_compressed_and_exceptions<F>(
        &self,
        _compressed: &[u8],
        _min_val: u8,
        _exceptions: &HashFields,
        _on_update: F,
    ) -> Result<(), Error>
    where
        F: FnMut(u32, u8, u8),
    {
        Err(Error::unsupported_operation(
            "union_compressed_and_exceptions",
        ))
    }
}

/// Iterates the buckets of a [`CompactFields`] by ascending key.
#[derive(Debug, Clone)]
pub struct CompactBucketIter<'a> {
    pairs: &'a [u32],
    /// One past the current pair.
    pos: usize,
}

impl BucketIterator for CompactBucketIter<'_> {
    fn next(&mut self) -> bool {
        if self.pos < self.pairs.len() {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn key(&self) -> u32 {
        key_of_pair(self.current())
    }

    fn value(&self) -> u8 {
        value_of_pair(self.current())
    }
}

impl CompactBucketIter<'_> {
    fn current(&self) -> u32 {
        self.pos
            .checked_sub(1)
            .and_then(|index| self.pairs.get(index))
            .copied()
            .unwrap_or(0)
    }
}
