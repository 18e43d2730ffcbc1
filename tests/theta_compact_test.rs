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

use compact_sketches::error::ErrorKind;
use compact_sketches::hash::DEFAULT_UPDATE_SEED;
use compact_sketches::hash::compute_seed_hash;
use compact_sketches::theta::CompactSketch;
use compact_sketches::theta::FLAG_COMPACT;
use compact_sketches::theta::FLAG_EMPTY;
use compact_sketches::theta::FLAG_ORDERED;
use compact_sketches::theta::FLAG_READ_ONLY;
use compact_sketches::theta::MAX_THETA;
use compact_sketches::theta::UpdatableSketch;
use googletest::assert_that;
use googletest::prelude::contains_substring;
use googletest::prelude::eq;

/// A hash table as left behind by an update path: zero marks a free slot.
struct TableSketch {
    is_empty: bool,
    seed: u64,
    theta: u64,
    table: Vec<u64>,
}

impl TableSketch {
    fn new(num_values: usize, table_size: usize, theta: u64) -> Self {
        let mut table = vec![0u64; table_size];
        let mut state = 0x9e3779b97f4a7c15u64;
        for _ in 0..num_values {
            state = state.wrapping_add(0x9e3779b97f4a7c15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
            let hash = (z ^ (z >> 31)) >> 1;
            let mut index = hash as usize % table_size;
            while table[index] != 0 && table[index] != hash {
                index = (index + 1) % table_size;
            }
            table[index] = hash;
        }
        Self {
            is_empty: num_values == 0,
            seed: DEFAULT_UPDATE_SEED,
            theta,
            table,
        }
    }
}

impl UpdatableSketch for TableSketch {
    fn is_empty(&self) -> bool {
        self.is_empty
    }

    fn seed_hash(&self) -> u16 {
        compute_seed_hash(self.seed)
    }

    fn num_retained(&self) -> usize {
        self.table
            .iter()
            .filter(|&&hash| hash != 0 && hash < self.theta)
            .count()
    }

    fn theta64(&self) -> u64 {
        self.theta
    }

    fn cache(&self) -> &[u64] {
        &self.table
    }
}

fn assert_compact_invariants(sketch: &CompactSketch<'_>) {
    let cache = sketch.cache();
    assert!(cache.iter().all(|&hash| hash < sketch.theta64()));
    let mut sorted = cache.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), cache.len(), "cache holds duplicates");
    if sketch.is_ordered() {
        assert!(cache.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_from_updatable_ordered() {
    let source = TableSketch::new(500, 1024, MAX_THETA);
    let compact = CompactSketch::from_updatable(&source, true);

    assert!(!compact.is_empty());
    assert!(compact.is_ordered());
    assert!(!compact.is_direct());
    assert_that!(compact.num_retained(), eq(500));
    assert_that!(compact.seed_hash(), eq(compute_seed_hash(DEFAULT_UPDATE_SEED)));
    assert_compact_invariants(&compact);
}

#[test]
fn test_from_updatable_unordered_keeps_table_order() {
    let source = TableSketch::new(50, 128, MAX_THETA);
    let compact = CompactSketch::from_updatable(&source, false);

    let expected: Vec<u64> = source.table.iter().copied().filter(|&h| h != 0).collect();
    assert!(!compact.is_ordered());
    assert_eq!(compact.cache().as_ref(), expected.as_slice());
}

#[test]
fn test_from_updatable_filters_by_theta() {
    let theta = MAX_THETA / 4;
    let source = TableSketch::new(1000, 2048, theta);
    let compact = CompactSketch::from_updatable(&source, true);

    assert!(compact.is_estimation_mode());
    assert_that!(compact.num_retained(), eq(source.num_retained()));
    assert!(compact.num_retained() < 1000);
    assert_compact_invariants(&compact);
}

#[test]
fn test_round_trip_exact_mode() {
    let source = TableSketch::new(100, 256, MAX_THETA);
    let compact = CompactSketch::from_updatable(&source, true);
    let bytes = compact.serialize();

    assert_eq!(bytes.len(), 16 + 100 * 8);
    assert_eq!(bytes.len(), compact.serialized_size());
    assert_eq!(bytes[0], 2, "PreLongs should be 2 for exact mode");
    assert_eq!(bytes[2], 3, "FamilyID should be 3");
    assert_eq!(
        bytes[5],
        FLAG_READ_ONLY | FLAG_COMPACT | FLAG_ORDERED,
        "flags"
    );
    assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 100);

    let restored = CompactSketch::heapify(&bytes, DEFAULT_UPDATE_SEED).unwrap();
    assert_eq!(restored.is_empty(), compact.is_empty());
    assert_eq!(restored.seed_hash(), compact.seed_hash());
    assert_eq!(restored.num_retained(), compact.num_retained());
    assert_eq!(restored.theta64(), compact.theta64());
    assert_eq!(restored.cache(), compact.cache());
    assert_eq!(restored.serialize(), bytes);
}

#[test]
fn test_round_trip_estimation_mode() {
    let theta = MAX_THETA / 3;
    let source = TableSketch::new(300, 1024, theta);
    let compact = CompactSketch::from_updatable(&source, true);
    let bytes = compact.serialize();

    assert_eq!(bytes[0], 3, "PreLongs should be 3 for estimation mode");
    assert_eq!(bytes.len(), 24 + compact.num_retained() * 8);
    assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), theta);

    let restored = CompactSketch::deserialize(&bytes).unwrap();
    assert_eq!(restored.theta64(), theta);
    assert_eq!(restored.cache(), compact.cache());
    assert_compact_invariants(&restored);
}

#[test]
fn test_round_trip_empty() {
    let source = TableSketch::new(0, 32, MAX_THETA);
    let compact = CompactSketch::from_updatable(&source, true);
    let bytes = compact.serialize();

    assert_eq!(bytes.len(), 8, "Empty sketch should be 8 bytes");
    assert_eq!(bytes[0], 1);
    assert_ne!(bytes[5] & FLAG_EMPTY, 0);

    let restored = CompactSketch::deserialize(&bytes).unwrap();
    assert!(restored.is_empty());
    assert_eq!(restored.num_retained(), 0);
    assert_eq!(restored.theta64(), MAX_THETA);
}

#[test]
fn test_round_trip_no_entries_below_theta() {
    // every value was screened out by theta, which must survive serialization
    let compact = CompactSketch::from_validated_components(
        vec![],
        false,
        compute_seed_hash(DEFAULT_UPDATE_SEED),
        0,
        1 << 20,
        true,
    );
    let bytes = compact.serialize();
    assert_eq!(bytes.len(), 24);

    let restored = CompactSketch::deserialize(&bytes).unwrap();
    assert!(!restored.is_empty());
    assert_eq!(restored.num_retained(), 0);
    assert_eq!(restored.theta64(), 1 << 20);
}

#[test]
fn test_wrap_matches_heapify() {
    let source = TableSketch::new(64, 128, MAX_THETA / 2);
    let bytes = CompactSketch::from_updatable(&source, true).serialize();

    let direct = CompactSketch::wrap(&bytes, DEFAULT_UPDATE_SEED).unwrap();
    let heap = CompactSketch::heapify(&bytes, DEFAULT_UPDATE_SEED).unwrap();
    assert!(direct.is_direct());
    assert_eq!(direct.num_retained(), heap.num_retained());
    assert!(direct.iter().eq(heap.iter()));
    assert_eq!(direct.serialize(), heap.serialize());
}

#[test]
fn test_heapify_with_wrong_seed() {
    let source = TableSketch::new(10, 32, MAX_THETA);
    let bytes = CompactSketch::from_updatable(&source, true).serialize();

    let err = CompactSketch::heapify(&bytes, 9000).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));
    assert_that!(err.message(), contains_substring("incompatible seed hash"));

    let err = CompactSketch::wrap(&bytes, 9000).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::SeedMismatch));
}

#[test]
fn test_deserialize_rejects_non_compact() {
    let source = TableSketch::new(10, 32, MAX_THETA);
    let mut bytes = CompactSketch::from_updatable(&source, true).serialize();
    bytes[5] &= !FLAG_COMPACT;

    let err = CompactSketch::deserialize(&bytes).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));
    assert_that!(err.message(), contains_substring("compact flag"));
}

#[test]
fn test_deserialize_truncated() {
    let source = TableSketch::new(10, 32, MAX_THETA);
    let bytes = CompactSketch::from_updatable(&source, true).serialize();

    for len in [0, 4, 12, bytes.len() - 8] {
        let err = CompactSketch::deserialize(&bytes[..len]).unwrap_err();
        assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));
    }
}

#[test]
fn test_compact_sketch_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CompactSketch<'static>>();

    let source = TableSketch::new(200, 512, MAX_THETA);
    let compact = CompactSketch::from_updatable(&source, true);
    let expected = compact.serialize();
    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| assert_eq!(compact.serialize(), expected));
        }
    });
}
