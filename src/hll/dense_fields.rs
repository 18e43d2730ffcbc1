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

//! Dense bucket storage, one byte per bucket
//!
//! The simplest store: `values[key]` is the value of bucket `key`, zero meaning unset.

use log::trace;

use crate::codec::SketchSlice;
use crate::codec::insufficient_data;
use crate::error::Error;
use crate::hll::BucketIterator;
use crate::hll::Preamble;
use crate::hll::fields::DENSE_FIELDS_TAG;
use crate::hll::fields::check_dest;
use crate::hll::fields::key_out_of_range;

/// Dense, mutable bucket storage.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseFields {
    preamble: Preamble,
    /// Direct byte array: values[key] = value
    values: Box<[u8]>,
}

impl DenseFields {
    pub fn new(preamble: Preamble) -> Self {
        Self {
            values: vec![0u8; preamble.config_k() as usize].into_boxed_slice(),
            preamble,
        }
    }

    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    /// Get value from a bucket
    ///
    /// # Panics
    ///
    /// Panics if `key` is not below `config_k`.
    #[inline]
    pub fn get(&self, key: u32) -> u8 {
        self.values[key as usize]
    }

    #[inline]
    pub(crate) fn put(&mut self, key: u32, value: u8) {
        self.values[key as usize] = value;
    }

    /// Raises bucket `key` to `value` if `value` is larger, then calls `on_update`.
    pub fn update_bucket<F>(&mut self, key: u32, value: u8, mut on_update: F) -> Result<(), Error>
    where
        F: FnMut(u32, u8, u8),
    {
        let config_k = self.preamble.config_k();
        if key >= config_k {
            return Err(key_out_of_range(key, config_k));
        }

        let old_value = self.get(key);
        if value > old_value {
            self.put(key, value);
            on_update(key, old_value, value);
        }
        Ok(())
    }

    /// Number of buckets holding a non-zero value.
    pub fn num_nonzero(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0).count()
    }

    pub fn bucket_iterator(&self) -> DenseBucketIter<'_> {
        DenseBucketIter {
            values: &self.values,
            pos: 0,
        }
    }

    /// Tag byte followed by every bucket.
    pub fn num_bytes_to_serialize(&self) -> usize {
        1 + self.values.len()
    }

    pub fn serialize_into(&self, dest: &mut [u8], offset: usize) -> Result<usize, Error> {
        let n = self.num_bytes_to_serialize();
        check_dest(dest, offset, n)?;
        self.write_to(&mut dest[offset..offset + n]);
        Ok(n)
    }

    /// `dest` must be exactly [`DenseFields::num_bytes_to_serialize`] long.
    pub(crate) fn write_to(&self, dest: &mut [u8]) {
        dest[0] = DENSE_FIELDS_TAG;
        dest[1..].copy_from_slice(&self.values);
    }

    pub fn deserialize(preamble: Preamble, bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let tag = cursor.read_u8().map_err(insufficient_data("fields_tag"))?;
        if tag != DENSE_FIELDS_TAG {
            return Err(Error::deserial(format!(
                "expected dense fields tag {DENSE_FIELDS_TAG:#x}, got {tag:#x}"
            )));
        }

        let mut values = vec![0u8; preamble.config_k() as usize];
        cursor
            .read_exact(&mut values)
            .map_err(insufficient_data("buckets"))?;
        trace!("read {} dense buckets", values.len());
        Ok(Self {
            preamble,
            values: values.into_boxed_slice(),
        })
    }
}

/// Iterates the non-zero buckets of a [`DenseFields`] by ascending key.
#[derive(Debug, Clone)]
pub struct DenseBucketIter<'a> {
    values: &'a [u8],
    /// One past the current bucket.
    pos: usize,
}

impl BucketIterator for DenseBucketIter<'_> {
    fn next(&mut self) -> bool {
        while let Some(&value) = self.values.get(self.pos) {
            self.pos += 1;
            if value != 0 {
                return true;
            }
        }
        false
    }

    fn key(&self) -> u32 {
        self.pos.saturating_sub(1) as u32
    }

    fn value(&self) -> u8 {
        self.values
            .get(self.pos.saturating_sub(1))
            .copied()
            .unwrap_or(0)
    }
}
