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

//! Sparse bucket storage with open addressing
//!
//! Buckets are stored as packed `(key, value)` pairs in a power-of-two table. Collisions are
//! resolved with an odd stride derived from the key's high bits, so every slot is eventually
//! probed.

use byteorder::ByteOrder;
use byteorder::LittleEndian;
use log::trace;

use crate::codec::SketchSlice;
use crate::codec::insufficient_data;
use crate::error::Error;
use crate::hll::BucketIterator;
use crate::hll::DenseFields;
use crate::hll::Preamble;
use crate::hll::fields::HASH_FIELDS_TAG;
use crate::hll::fields::check_dest;
use crate::hll::fields::key_out_of_range;
use crate::hll::key_of_pair;
use crate::hll::pack_pair;
use crate::hll::value_of_pair;

/// Marker of an unused slot. Its key bits exceed every valid bucket key.
pub(crate) const EMPTY_SLOT: u32 = u32::MAX;

const MIN_LG_SIZE: u8 = 2;

// Grow at 3/4 = 75% load factor
const RESIZE_NUMER: usize = 3;
const RESIZE_DENOM: usize = 4;

/// Sparse, mutable bucket storage.
#[derive(Debug, Clone, PartialEq)]
pub struct HashFields {
    preamble: Preamble,
    lg_size: u8,
    slots: Box<[u32]>,
    len: usize,
}

impl HashFields {
    /// Creates an empty store with `2^lg_start_size` slots (at least 4).
    pub fn new(preamble: Preamble, lg_start_size: u8) -> Self {
        let lg_size = lg_start_size.max(MIN_LG_SIZE);
        Self {
            preamble,
            lg_size,
            slots: vec![EMPTY_SLOT; 1 << lg_size].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn preamble(&self) -> &Preamble {
        &self.preamble
    }

    /// Number of non-empty buckets.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots in the table.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Value of bucket `key`, if it has been set.
    pub fn get(&self, key: u32) -> Option<u8> {
        let slot = self.slots[probe(&self.slots, self.lg_size, key)];
        (slot != EMPTY_SLOT).then(|| value_of_pair(slot))
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

        let index = probe(&self.slots, self.lg_size, key);
        let slot = self.slots[index];
        let old_value = if slot == EMPTY_SLOT {
            0
        } else {
            value_of_pair(slot)
        };
        if value <= old_value {
            return Ok(());
        }

        self.slots[index] = pack_pair(key, value);
        if slot == EMPTY_SLOT {
            self.len += 1;
            if self.len * RESIZE_DENOM > self.slots.len() * RESIZE_NUMER {
                self.grow();
            }
        }
        on_update(key, old_value, value);
        Ok(())
    }

    /// Doubles the table, re-probing every pair.
    fn grow(&mut self) {
        let lg_size = self.lg_size + 1;
        let mut slots = vec![EMPTY_SLOT; 1 << lg_size].into_boxed_slice();
        for &pair in self.slots.iter().filter(|&&pair| pair != EMPTY_SLOT) {
            let index = probe(&slots, lg_size, key_of_pair(pair));
            slots[index] = pair;
        }
        trace!(
            "hash fields grown from {} to {} slots",
            self.slots.len(),
            slots.len()
        );
        self.slots = slots;
        self.lg_size = lg_size;
    }

    /// Copies every bucket into a dense store with the same preamble.
    pub fn to_dense(&self) -> DenseFields {
        let mut dense = DenseFields::new(self.preamble);
        for &pair in self.slots.iter().filter(|&&pair| pair != EMPTY_SLOT) {
            dense.put(key_of_pair(pair), value_of_pair(pair));
        }
        dense
    }

    pub fn bucket_iterator(&self) -> HashBucketIter<'_> {
        HashBucketIter {
            slots: &self.slots,
            pos: 0,
            current: EMPTY_SLOT,
        }
    }

    /// Tag byte, slot count, then every slot including the empty ones.
    pub fn num_bytes_to_serialize(&self) -> usize {
        1 + 4 + 4 * self.slots.len()
    }

    pub fn serialize_into(&self, dest: &mut [u8], offset: usize) -> Result<usize, Error> {
        let n = self.num_bytes_to_serialize();
        check_dest(dest, offset, n)?;
        self.write_to(&mut dest[offset..offset + n]);
        Ok(n)
    }

    /// `dest` must be exactly [`HashFields::num_bytes_to_serialize`] long.
    pub(crate) fn write_to(&self, dest: &mut [u8]) {
        dest[0] = HASH_FIELDS_TAG;
        LittleEndian::write_u32(&mut dest[1..5], self.slots.len() as u32);
        LittleEndian::write_u32_into(&self.slots, &mut dest[5..]);
    }

    pub fn deserialize(preamble: Preamble, bytes: &[u8]) -> Result<Self, Error> {
        let mut cursor = SketchSlice::new(bytes);
        let tag = cursor.read_u8().map_err(insufficient_data("fields_tag"))?;
        if tag != HASH_FIELDS_TAG {
            return Err(Error::deserial(format!(
                "expected hash fields tag {HASH_FIELDS_TAG:#x}, got {tag:#x}"
            )));
        }

        let num_slots = cursor.read_u32_le().map_err(insufficient_data("num_slots"))?;
        if !num_slots.is_power_of_two() || num_slots < 1 << MIN_LG_SIZE {
            return Err(Error::deserial(format!(
                "hash fields size must be a power of two of at least {}, got {num_slots}",
                1 << MIN_LG_SIZE
            )));
        }
        let needed = 5 + 4 * num_slots as u64;
        if (bytes.len() as u64) < needed {
            return Err(Error::insufficient_data(format!(
                "hash fields of {num_slots} slots need {needed} bytes, got {}",
                bytes.len()
            )));
        }
        let lg_size = num_slots.trailing_zeros() as u8;

        let mut slots = Vec::with_capacity(num_slots as usize);
        for _ in 0..num_slots {
            slots.push(cursor.read_u32_le().map_err(insufficient_data("slots"))?);
        }

        let config_k = preamble.config_k();
        let mut len = 0;
        for (index, &pair) in slots.iter().enumerate() {
            if pair == EMPTY_SLOT {
                continue;
            }
            let key = key_of_pair(pair);
            if key >= config_k {
                return Err(Error::deserial(format!(
                    "bucket key {key} out of range [0, {config_k})"
                )));
            }
            if probe(&slots, lg_size, key) != index {
                return Err(Error::deserial(format!(
                    "bucket key {key} is misplaced or duplicated in hash fields"
                )));
            }
            len += 1;
        }
        if len == slots.len() {
            return Err(Error::deserial("hash fields has no free slot"));
        }

        Ok(Self {
            preamble,
            lg_size,
            slots: slots.into_boxed_slice(),
            len,
        })
    }
}

/// Returns the slot holding `key`, or the empty slot where it belongs.
///
/// The table must contain at least one empty slot.
fn probe(slots: &[u32], lg_size: u8, key: u32) -> usize {
    let mask = (1u32 << lg_size) - 1;
    // Stride is always odd to ensure all slots are visited
    let stride = (key >> lg_size) | 1;
    let mut index = key & mask;
    loop {
        let slot = slots[index as usize];
        if slot == EMPTY_SLOT || key_of_pair(slot) == key {
            return index as usize;
        }
        index = (index + stride) & mask;
    }
}

/// Iterates the buckets of a [`HashFields`] in slot order.
#[derive(Debug, Clone)]
pub struct HashBucketIter<'a> {
    slots: &'a [u32],
    pos: usize,
    current: u32,
}

impl BucketIterator for HashBucketIter<'_> {
    fn next(&mut self) -> bool {
        while let Some(&slot) = self.slots.get(self.pos) {
            self.pos += 1;
            if slot != EMPTY_SLOT {
                self.current = slot;
                return true;
            }
        }
        false
    }

    fn key(&self) -> u32 {
        key_of_pair(self.current)
    }

    fn value(&self) -> u8 {
        value_of_pair(self.current)
    }
}
