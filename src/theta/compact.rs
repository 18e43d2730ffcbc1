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

//! Compact Theta sketch implementation
//!
//! A [`CompactSketch`] is the immutable, serialized-ready form of a Theta sketch. It stores only
//! the essential state:
//! - Theta value (sampling threshold)
//! - Retained hash values, each strictly below theta, optionally sorted ascending
//! - Seed hash for validation
//!
//! The cache either lives on the heap or is read in place from a borrowed byte buffer, see
//! [`CompactSketch::wrap`].

use std::borrow::Cow;
use std::slice::ChunksExact;
use std::slice::Iter;

use byteorder::ByteOrder;
use byteorder::LittleEndian;
use log::debug;

use crate::codec::SketchBytes;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::theta::UpdatableSketch;
use crate::theta::cache::compact_cache;
use crate::theta::serialization::*;

#[derive(Debug, Clone)]
enum Cache<'a> {
    Heap(Vec<u64>),
    /// Little-endian cache words, exactly `8 * num_retained` bytes.
    Direct(&'a [u8]),
}

/// A compact, immutable Theta sketch.
///
/// There are two shapes, ordered and unordered, and two locations: heap-owned, or a direct view
/// over serialized bytes. Every combination shares the same read-only API and serializes to the
/// same layout.
///
/// Invariants, established by whichever constructor produced the sketch:
/// - no hash value appears twice in the cache
/// - every hash value is strictly less than theta
/// - an ordered sketch keeps its cache sorted ascending
/// - an empty sketch has no entries and theta equal to [`MAX_THETA`]
///
/// # Example
///
/// ```
/// use compact_sketches::theta::CompactSketch;
/// use compact_sketches::theta::MAX_THETA;
///
/// let compact = CompactSketch::from_validated_components(
///     vec![3, 5, 8],
///     false,
///     compact_sketches::hash::compute_seed_hash(9001),
///     3,
///     MAX_THETA,
///     true,
/// );
/// let bytes = compact.serialize();
/// let restored = CompactSketch::deserialize(&bytes).unwrap();
/// assert_eq!(restored.num_retained(), 3);
/// assert!(restored.is_ordered());
/// ```
#[derive(Debug, Clone)]
pub struct CompactSketch<'a> {
    theta: u64,
    seed_hash: u16,
    is_empty: bool,
    is_ordered: bool,
    cache: Cache<'a>,
}

impl CompactSketch<'static> {
    /// Compacts a live updatable sketch.
    ///
    /// The entries at or above the sketch's theta and the empty slots of its hash table are
    /// dropped. With `ordered` set the cache is sorted ascending.
    pub fn from_updatable<S: UpdatableSketch + ?Sized>(sketch: &S, ordered: bool) -> Self {
        let cur_count = sketch.num_retained();
        let theta = sketch.theta64();
        let cache = compact_cache(sketch.cache(), cur_count, theta, ordered);
        debug!(
            "compacted updatable sketch: {} entries, theta {theta}, ordered {ordered}",
            cache.len()
        );
        Self {
            theta,
            seed_hash: sketch.seed_hash(),
            is_empty: sketch.is_empty(),
            is_ordered: ordered,
            cache: Cache::Heap(cache),
        }
    }

    /// Constructs a sketch from components the caller has already validated.
    ///
    /// Nothing is checked. The caller guarantees that `cache.len() == cur_count`, that the cache
    /// holds no duplicates and only values below `theta`, that it is sorted ascending when
    /// `ordered` is set, and that an empty sketch has theta [`MAX_THETA`]. Breaking any of these
    /// yields a sketch that is silently corrupt. Use [`CompactSketch::heapify`] for untrusted
    /// input.
    ///
    /// When `cur_count` is zero the given cache is discarded.
    pub fn from_validated_components(
        cache: Vec<u64>,
        is_empty: bool,
        seed_hash: u16,
        cur_count: usize,
        theta: u64,
        ordered: bool,
    ) -> Self {
        let cache = if cur_count == 0 { Vec::new() } else { cache };
        Self {
            theta,
            seed_hash,
            is_empty,
            is_ordered: ordered,
            cache: Cache::Heap(cache),
        }
    }

    /// Deserializes a compact sketch using the default seed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserializes a compact sketch with a specific seed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data is too short
    /// - The family ID or serial version is not the compact Theta one
    /// - The compact flag is not set
    /// - The seed hash doesn't match
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let preamble = Preamble::decode(bytes)?;
        check_compact_preamble(&preamble)?;
        Self::heapify_preamble(bytes, &preamble, seed)
    }

    /// Reads a compact sketch into heap memory.
    ///
    /// The caller must already have checked that `bytes` hold a compact sketch; the ordered flag
    /// recorded in the header is trusted as-is. [`CompactSketch::deserialize_with_seed`] performs
    /// those checks first.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::SeedMismatch`](crate::error::ErrorKind::SeedMismatch) when the
    /// recorded seed hash disagrees with `seed`, and with
    /// [`ErrorKind::MalformedDeserializeData`](crate::error::ErrorKind::MalformedDeserializeData)
    /// when `bytes` is shorter than the header claims.
    pub fn heapify(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let preamble = Preamble::decode(bytes)?;
        Self::heapify_preamble(bytes, &preamble, seed)
    }

    fn heapify_preamble(bytes: &[u8], preamble: &Preamble, seed: u64) -> Result<Self, Error> {
        let raw = cache_bytes(bytes, preamble, seed)?;
        let cache = raw.chunks_exact(HASH_SIZE_BYTES).map(LittleEndian::read_u64).collect();
        debug!(
            "heapified compact sketch: {} entries, preamble longs {}",
            preamble.retained_entries, preamble.preamble_longs
        );
        Ok(Self {
            theta: preamble.theta,
            seed_hash: preamble.seed_hash,
            is_empty: preamble.is_empty(),
            is_ordered: preamble.is_ordered(),
            cache: Cache::Heap(cache),
        })
    }
}

impl<'a> CompactSketch<'a> {
    /// Wraps serialized bytes without copying the cache.
    ///
    /// The header is validated exactly as by [`CompactSketch::deserialize_with_seed`]; the
    /// cache entries are read from `bytes` whenever they are accessed.
    pub fn wrap(bytes: &'a [u8], seed: u64) -> Result<Self, Error> {
        let preamble = Preamble::decode(bytes)?;
        check_compact_preamble(&preamble)?;
        let raw = cache_bytes(bytes, &preamble, seed)?;
        debug!(
            "wrapped compact sketch: {} entries, preamble longs {}",
            preamble.retained_entries, preamble.preamble_longs
        );
        Ok(Self {
            theta: preamble.theta,
            seed_hash: preamble.seed_hash,
            is_empty: preamble.is_empty(),
            is_ordered: preamble.is_ordered(),
            cache: Cache::Direct(raw),
        })
    }

    /// Check if the sketch is empty (no values have been added)
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Whether the cache is sorted ascending.
    pub fn is_ordered(&self) -> bool {
        self.is_ordered
    }

    /// Whether the cache is read in place from borrowed bytes.
    pub fn is_direct(&self) -> bool {
        matches!(self.cache, Cache::Direct(_))
    }

    /// Return theta as a fraction (0.0 to 1.0)
    pub fn theta(&self) -> f64 {
        self.theta as f64 / MAX_THETA as f64
    }

    /// Return theta as u64
    pub fn theta64(&self) -> u64 {
        self.theta
    }

    /// Check if sketch is in estimation mode
    pub fn is_estimation_mode(&self) -> bool {
        self.theta < MAX_THETA
    }

    /// Get the seed hash
    pub fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    /// Return number of retained entries
    pub fn num_retained(&self) -> usize {
        match &self.cache {
            Cache::Heap(cache) => cache.len(),
            Cache::Direct(raw) => raw.len() / HASH_SIZE_BYTES,
        }
    }

    /// Return iterator over hash values
    pub fn iter(&self) -> CacheIter<'_> {
        match &self.cache {
            Cache::Heap(cache) => CacheIter::Heap(cache.iter()),
            Cache::Direct(raw) => CacheIter::Direct(raw.chunks_exact(HASH_SIZE_BYTES)),
        }
    }

    /// The retained hash values; borrowed for heap sketches, decoded for direct ones.
    pub fn cache(&self) -> Cow<'_, [u64]> {
        match &self.cache {
            Cache::Heap(cache) => Cow::Borrowed(cache.as_slice()),
            Cache::Direct(_) => Cow::Owned(self.iter().collect()),
        }
    }

    /// Copies this sketch into heap memory.
    pub fn to_heap(&self) -> CompactSketch<'static> {
        CompactSketch {
            theta: self.theta,
            seed_hash: self.seed_hash,
            is_empty: self.is_empty,
            is_ordered: self.is_ordered,
            cache: Cache::Heap(self.iter().collect()),
        }
    }

    /// The serialized cache words of a direct sketch.
    pub(crate) fn direct_bytes(&self) -> Option<&'a [u8]> {
        match self.cache {
            Cache::Heap(_) => None,
            Cache::Direct(raw) => Some(raw),
        }
    }

    /// Exact length of [`CompactSketch::serialize`]'s output.
    pub fn serialized_size(&self) -> usize {
        required_bytes(self.num_retained() as u32, self.theta)
    }

    /// Serialize the compact sketch to bytes
    ///
    /// The output uses the smallest preamble that preserves the sketch's state: one long when
    /// there are no entries and theta is [`MAX_THETA`], two when there are entries, three when
    /// theta must be recorded.
    pub fn serialize(&self) -> Vec<u8> {
        let preamble = Preamble::for_compact(
            self.num_retained() as u32,
            self.theta,
            self.seed_hash,
            self.is_empty,
            self.is_ordered,
        );
        let mut bytes = SketchBytes::with_capacity(preamble.total_bytes());
        preamble.encode(&mut bytes);
        match self.direct_bytes() {
            Some(raw) => bytes.write(raw),
            None => {
                for hash in self.iter() {
                    bytes.write_u64_le(hash);
                }
            }
        }
        debug_assert_eq!(bytes.len(), self.serialized_size());
        bytes.into_bytes()
    }
}

/// Iterator over the hash values of a [`CompactSketch`].
#[derive(Debug, Clone)]
pub enum CacheIter<'s> {
    #[doc(hidden)]
    Heap(Iter<'s, u64>),
    #[doc(hidden)]
    Direct(ChunksExact<'s, u8>),
}

impl Iterator for CacheIter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        match self {
            CacheIter::Heap(iter) => iter.next().copied(),
            CacheIter::Direct(chunks) => chunks.next().map(LittleEndian::read_u64),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            CacheIter::Heap(iter) => iter.size_hint(),
            CacheIter::Direct(chunks) => chunks.size_hint(),
        }
    }
}

impl ExactSizeIterator for CacheIter<'_> {}

fn check_compact_preamble(preamble: &Preamble) -> Result<(), Error> {
    if preamble.family_id != THETA_FAMILY_ID {
        return Err(Error::invalid_family(
            THETA_FAMILY_ID,
            preamble.family_id,
            "Theta",
        ));
    }
    if preamble.serial_version != SERIAL_VERSION {
        return Err(Error::unsupported_serial_version(
            SERIAL_VERSION,
            preamble.serial_version,
        ));
    }
    if !preamble.is_compact() {
        return Err(Error::deserial(
            "corrupted format: compact flag is not set".to_string(),
        ));
    }
    Ok(())
}

/// Checks the seed hash and the buffer length, returning the cache words.
fn cache_bytes<'a>(bytes: &'a [u8], preamble: &Preamble, seed: u64) -> Result<&'a [u8], Error> {
    let expected_seed_hash = compute_seed_hash(seed);
    if preamble.seed_hash != expected_seed_hash {
        return Err(
            Error::seed_hash_mismatch(expected_seed_hash, preamble.seed_hash)
                .with_context("seed", seed),
        );
    }

    let start = preamble.cache_offset();
    let end = preamble.total_bytes();
    if bytes.len() < end {
        return Err(Error::insufficient_data(format!(
            "expected {} entries ({end} bytes), got {} bytes",
            preamble.retained_entries,
            bytes.len()
        )));
    }
    Ok(&bytes[start..end])
}
