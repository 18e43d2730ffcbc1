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

//! Polymorphic bucket storage.
//!
//! [`Fields`] maps bucket keys to 8-bit values through one of three stores:
//!
//! - [`HashFields`]: sparse, open-addressed, mutable
//! - [`DenseFields`]: one byte per bucket, mutable
//! - [`CompactFields`]: sorted packed pairs, immutable
//!
//! Every store is read through the single-pass [`BucketIterator`] protocol. Mutation and union
//! calls on the compact store fail with
//! [`ErrorKind::UnsupportedOperation`](crate::error::ErrorKind::UnsupportedOperation) and leave
//! it untouched.

use log::trace;

use crate::error::Error;
use crate::hll::Preamble;
use crate::hll::compact_fields::CompactBucketIter;
use crate::hll::compact_fields::CompactFields;
use crate::hll::dense_fields::DenseBucketIter;
use crate::hll::dense_fields::DenseFields;
use crate::hll::hash_fields::HashBucketIter;
use crate::hll::hash_fields::HashFields;

/// Leading byte of a serialized [`DenseFields`].
pub const DENSE_FIELDS_TAG: u8 = 0x0;
/// Leading byte of a serialized [`HashFields`].
pub const HASH_FIELDS_TAG: u8 = 0x1;
/// Leading byte of a serialized [`CompactFields`].
pub const COMPACT_FIELDS_TAG: u8 = 0x2;

/// Nibble of a compressed dense array whose value lives in the exceptions store.
pub const EXCEPTION_NIBBLE: u8 = 0xF;

/// A single-pass cursor over the non-empty buckets of a store.
///
/// [`BucketIterator::key`] and [`BucketIterator::value`] describe the bucket reached by the last
/// call to [`BucketIterator::next`] that returned `true`; before that call, or after `next`
/// returned `false`, their result is unspecified. The cursor cannot be rewound: ask the store for
/// a new one to iterate again.
pub trait BucketIterator {
    /// Advances to the next bucket, returning whether there is one.
    fn next(&mut self) -> bool;

    fn key(&self) -> u32;

    fn value(&self) -> u8;
}

impl<I: BucketIterator + ?Sized> BucketIterator for &mut I {
    fn next(&mut self) -> bool {
        (**self).next()
    }

    fn key(&self) -> u32 {
        (**self).key()
    }

    fn value(&self) -> u8 {
        (**self).value()
    }
}

/// An update callback that ignores every notification.
pub fn ignore_update(_bucket: u32, _old_value: u8, _new_value: u8) {}

/// Bucket storage in one of its three shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Fields {
    Hash(HashFields),
    Dense(DenseFields),
    Compact(CompactFields),
}

impl Fields {
    pub fn preamble(&self) -> &Preamble {
        match self {
            Fields::Hash(fields) => fields.preamble(),
            Fields::Dense(fields) => fields.preamble(),
            Fields::Compact(fields) => fields.preamble(),
        }
    }

    pub fn is_compact(&self) -> bool {
        matches!(self, Fields::Compact(_))
    }

    /// Exact number of bytes [`Fields::serialize_into`] writes.
    pub fn num_bytes_to_serialize(&self) -> usize {
        match self {
            Fields::Hash(fields) => fields.num_bytes_to_serialize(),
            Fields::Dense(fields) => fields.num_bytes_to_serialize(),
            Fields::Compact(fields) => fields.num_bytes_to_serialize(),
        }
    }

    /// Writes the store into `dest` starting at `offset`, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::InvalidArgument`](crate::error::ErrorKind::InvalidArgument),
    /// writing nothing, if fewer than [`Fields::num_bytes_to_serialize`] bytes are available.
    pub fn serialize_into(&self, dest: &mut [u8], offset: usize) -> Result<usize, Error> {
        match self {
            Fields::Hash(fields) => fields.serialize_into(dest, offset),
            Fields::Dense(fields) => fields.serialize_into(dest, offset),
            Fields::Compact(fields) => fields.serialize_into(dest, offset),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.num_bytes_to_serialize()];
        match self {
            Fields::Hash(fields) => fields.write_to(&mut bytes),
            Fields::Dense(fields) => fields.write_to(&mut bytes),
            Fields::Compact(fields) => fields.write_to(&mut bytes),
        }
        bytes
    }

    /// Reads any of the three layouts, dispatching on the leading tag byte.
    pub fn deserialize(preamble: Preamble, bytes: &[u8]) -> Result<Self, Error> {
        match bytes.first() {
            Some(&DENSE_FIELDS_TAG) => DenseFields::deserialize(preamble, bytes).map(Fields::Dense),
            Some(&HASH_FIELDS_TAG) => HashFields::deserialize(preamble, bytes).map(Fields::Hash),
            Some(&COMPACT_FIELDS_TAG) => {
                CompactFields::deserialize(preamble, bytes).map(Fields::Compact)
            }
            Some(tag) => Err(Error::deserial(format!("unknown fields tag: {tag:#x}"))),
            None => Err(Error::insufficient_data("fields_tag")),
        }
    }

    /// The compact form of this store; a compact store returns a copy of itself.
    pub fn to_compact(&self) -> CompactFields {
        match self {
            Fields::Compact(fields) => fields.clone(),
            _ => CompactFields::from_fields(self),
        }
    }

    pub fn bucket_iterator(&self) -> BucketIter<'_> {
        match self {
            Fields::Hash(fields) => BucketIter::Hash(fields.bucket_iterator()),
            Fields::Dense(fields) => BucketIter::Dense(fields.bucket_iterator()),
            Fields::Compact(fields) => BucketIter::Compact(fields.bucket_iterator()),
        }
    }

    /// Raises bucket `key` to `value` if `value` is larger than what the bucket holds.
    ///
    /// `on_update(key, old_value, new_value)` is called once when the bucket changes and not at
    /// all otherwise.
    pub fn update_bucket<F>(&mut self, key: u32, value: u8, on_update: F) -> Result<(), Error>
    where
        F: FnMut(u32, u8, u8),
    {
        match self {
            Fields::Hash(fields) => fields.update_bucket(key, value, on_update),
            Fields::Dense(fields) => fields.update_bucket(key, value, on_update),
            Fields::Compact(fields) => fields.update_bucket(key, value, on_update),
        }
    }

    /// Applies every bucket of `iter` through [`Fields::update_bucket`].
    ///
    /// The iterator is drained and its keys checked before anything is applied, so a bad key
    /// leaves this store unchanged.
    pub fn union_bucket_iterator<I, F>(&mut self, mut iter: I, mut on_update: F) -> Result<(), Error>
    where
        I: BucketIterator,
        F: FnMut(u32, u8, u8),
    {
        if self.is_compact() {
            return Err(Error::unsupported_operation("union_bucket_iterator"));
        }

        let config_k = self.preamble().config_k();
        let mut buckets = Vec::new();
        while iter.next() {
            let key = iter.key();
            if key >= config_k {
                return Err(key_out_of_range(key, config_k));
            }
            buckets.push((key, iter.value()));
        }
        trace!("union of {} buckets", buckets.len());

        for (key, value) in buckets {
            self.update_bucket(key, value, &mut on_update)?;
        }
        Ok(())
    }

    /// Merges a compressed dense array into this store.
    ///
    /// Bucket `i` is stored in the nibble `(compressed[i / 2] >> (4 * (i % 2))) & 0xF`, as an
    /// offset from `min_val`. The nibble [`EXCEPTION_NIBBLE`] marks a bucket whose value is
    /// held in `exceptions` instead. Zero-valued buckets are skipped.
    pub fn union_compressed_and_exceptions<F>(
        &mut self,
        compressed: &[u8],
        min_val: u8,
        exceptions: &HashFields,
        mut on_update: F,
    ) -> Result<(), Error>
    where
        F: FnMut(u32, u8, u8),
    {
        if self.is_compact() {
            return Err(Error::unsupported_operation(
                "union_compressed_and_exceptions",
            ));
        }

        let config_k = self.preamble().config_k();
        let needed = config_k.div_ceil(2) as usize;
        if compressed.len() < needed {
            return Err(Error::invalid_argument(format!(
                "compressed array too short: expected {needed} bytes, got {}",
                compressed.len()
            )));
        }

        for key in 0..config_k {
            let nibble = (compressed[(key >> 1) as usize] >> ((key & 1) << 2)) & 0xF;
            let value = if nibble == EXCEPTION_NIBBLE {
                match exceptions.get(key) {
                    Some(value) => value,
                    None => continue,
                }
            } else {
                min_val.saturating_add(nibble)
            };
            if value > 0 {
                self.update_bucket(key, value, &mut on_update)?;
            }
        }
        Ok(())
    }
}

impl From<HashFields> for Fields {
    fn from(fields: HashFields) -> Self {
        Fields::Hash(fields)
    }
}

impl From<DenseFields> for Fields {
    fn from(fields: DenseFields) -> Self {
        Fields::Dense(fields)
    }
}

impl From<CompactFields> for Fields {
    fn from(fields: CompactFields) -> Self {
        Fields::Compact(fields)
    }
}

/// The [`BucketIterator`] of a [`Fields`].
#[derive(Debug, Clone)]
pub enum BucketIter<'a> {
    Hash(HashBucketIter<'a>),
    Dense(DenseBucketIter<'a>),
    Compact(CompactBucketIter<'a>),
}

impl BucketIterator for BucketIter<'_> {
    fn next(&mut self) -> bool {
        match self {
            BucketIter::Hash(iter) => iter.next(),
            BucketIter::Dense(iter) => iter.next(),
            BucketIter::Compact(iter) => iter.next(),
        }
    }

    fn key(&self) -> u32 {
        match self {
            BucketIter::Hash(iter) => iter.key(),
            BucketIter::Dense(iter) => iter.key(),
            BucketIter::Compact(iter) => iter.key(),
        }
    }

    fn value(&self) -> u8 {
        match self {
            BucketIter::Hash(iter) => iter.value(),
            BucketIter::Dense(iter) => iter.value(),
            BucketIter::Compact(iter) => iter.value(),
        }
    }
}

pub(crate) fn key_out_of_range(key: u32, config_k: u32) -> Error {
    Error::invalid_argument(format!("bucket key {key} out of range [0, {config_k})"))
        .with_context("key", key)
}

/// Fails unless `dest[offset..]` can hold `needed` bytes.
pub(crate) fn check_dest(dest: &[u8], offset: usize, needed: usize) -> Result<(), Error> {
    let available = dest.len().saturating_sub(offset);
    if available < needed {
        return Err(Error::invalid_argument(format!(
            "destination too small: need {needed} bytes at offset {offset}, {available} available"
        )));
    }
    Ok(())
}
