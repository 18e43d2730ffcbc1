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
use compact_sketches::hll::BucketIterator;
use compact_sketches::hll::COMPACT_FIELDS_TAG;
use compact_sketches::hll::CompactFields;
use compact_sketches::hll::DenseFields;
use compact_sketches::hll::Fields;
use compact_sketches::hll::HashFields;
use compact_sketches::hll::Preamble;
use compact_sketches::hll::ignore_update;
use compact_sketches::hll::pack_pair;
use googletest::assert_that;
use googletest::prelude::contains_substring;
use googletest::prelude::eq;

fn collect<I: BucketIterator>(mut iter: I) -> Vec<(u32, u8)> {
    let mut buckets = vec![];
    while iter.next() {
        buckets.push((iter.key(), iter.value()));
    }
    buckets
}

fn hash_fields_with(lg_k: u8, lg_size: u8, buckets: &[(u32, u8)]) -> Fields {
    let preamble = Preamble::from_lg_k(lg_k).unwrap();
    let mut fields = HashFields::new(preamble, lg_size);
    for &(key, value) in buckets {
        fields.update_bucket(key, value, ignore_update).unwrap();
    }
    Fields::Hash(fields)
}

#[test]
fn test_compaction_scenario() {
    let fields = hash_fields_with(10, 4, &[(10, 27), (486, 1)]);

    // the hash layout keeps table order, which here is not key order
    let stored = collect(fields.bucket_iterator());
    assert_eq!(stored.len(), 2);
    assert_ne!(stored, vec![(10, 27), (486, 1)]);

    let compact = fields.to_compact();
    assert_that!(compact.num_bytes_to_serialize(), eq(9));

    let mut too_small = [0u8; 8];
    let err = compact.serialize_into(&mut too_small, 0).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::InvalidArgument));
    assert_eq!(too_small, [0u8; 8]);

    let mut dest = [0u8; 9];
    assert_eq!(compact.serialize_into(&mut dest, 0).unwrap(), 9);
    let mut expected = vec![COMPACT_FIELDS_TAG];
    expected.extend_from_slice(&pack_pair(10, 27).to_le_bytes());
    expected.extend_from_slice(&pack_pair(486, 1).to_le_bytes());
    assert_eq!(dest.to_vec(), expected);

    assert_eq!(
        collect(compact.bucket_iterator()),
        vec![(10, 27), (486, 1)]
    );
}

#[test]
fn test_compact_fields_reject_mutation() {
    let compact = Fields::Compact(hash_fields_with(10, 4, &[(10, 27), (486, 1)]).to_compact());
    let before = compact.serialize();
    let mut target = compact.clone();

    let err = target.update_bucket(1, 5, ignore_update).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::UnsupportedOperation));
    assert_that!(err.message(), contains_substring("update_bucket"));

    let other = hash_fields_with(10, 4, &[(3, 4)]);
    let err = target
        .union_bucket_iterator(other.bucket_iterator(), ignore_update)
        .unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::UnsupportedOperation));

    let exceptions = HashFields::new(*target.preamble(), 4);
    let compressed = vec![0x11u8; 512];
    let err = target
        .union_compressed_and_exceptions(&compressed, 1, &exceptions, ignore_update)
        .unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::UnsupportedOperation));

    assert_eq!(target.serialize(), before);
    assert_eq!(target, compact);
}

#[test]
fn test_compaction_preserves_buckets() {
    let lg_k = 12;
    let preamble = Preamble::from_lg_k(lg_k).unwrap();
    let mut hash = HashFields::new(preamble, 4);
    let mut dense = DenseFields::new(preamble);
    let mut expected = std::collections::BTreeMap::new();
    for i in 0..700u32 {
        let key = i.wrapping_mul(2654435761) % preamble.config_k();
        let value = (i % 60 + 1) as u8;
        hash.update_bucket(key, value, ignore_update).unwrap();
        dense.update_bucket(key, value, ignore_update).unwrap();
        let entry = expected.entry(key).or_insert(0u8);
        *entry = (*entry).max(value);
    }
    let expected: Vec<(u32, u8)> = expected.into_iter().collect();

    for source in [Fields::Hash(hash), Fields::Dense(dense)] {
        let compact = source.to_compact();
        assert_eq!(collect(compact.bucket_iterator()), expected);
        assert_that!(compact.num_bytes_to_serialize(), eq(1 + 4 * expected.len()));
        assert_eq!(compact.serialize().len(), compact.num_bytes_to_serialize());

        let restored = Fields::deserialize(preamble, &Fields::Compact(compact.clone()).serialize())
            .unwrap();
        assert_eq!(restored, Fields::Compact(compact));
    }
}

#[test]
fn test_compact_of_compact_is_identity() {
    let compact = hash_fields_with(8, 4, &[(200, 3), (7, 9), (100, 1)]).to_compact();
    let again = Fields::Compact(compact.clone()).to_compact();
    assert_eq!(again, compact);
    assert_eq!(compact.to_compact(), &compact);
}

#[test]
fn test_serialize_at_offset() {
    let compact = hash_fields_with(10, 4, &[(1, 1)]).to_compact();
    let size = compact.num_bytes_to_serialize();

    let mut dest = vec![0xAAu8; 3 + size];
    assert_eq!(compact.serialize_into(&mut dest, 3).unwrap(), size);
    assert_eq!(&dest[..3], &[0xAA, 0xAA, 0xAA]);
    assert_eq!(dest[3], COMPACT_FIELDS_TAG);

    let err = compact.serialize_into(&mut dest, 4).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::InvalidArgument));
}

#[test]
fn test_deserialize_malformed_compact() {
    let preamble = Preamble::from_lg_k(10).unwrap();

    // payload not a whole number of pairs
    let err = CompactFields::deserialize(preamble, &[COMPACT_FIELDS_TAG, 1, 2, 3]).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));

    // keys out of order
    let mut bytes = vec![COMPACT_FIELDS_TAG];
    bytes.extend_from_slice(&pack_pair(486, 1).to_le_bytes());
    bytes.extend_from_slice(&pack_pair(10, 27).to_le_bytes());
    let err = CompactFields::deserialize(preamble, &bytes).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));

    // key beyond the configured bucket count
    let mut bytes = vec![COMPACT_FIELDS_TAG];
    bytes.extend_from_slice(&pack_pair(1024, 1).to_le_bytes());
    let err = CompactFields::deserialize(preamble, &bytes).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));

    let err = Fields::deserialize(preamble, &[0x7]).unwrap_err();
    assert_that!(err.kind(), eq(ErrorKind::MalformedDeserializeData));
}

#[test]
fn test_union_into_hash_then_compact() {
    let lg_k = 6;
    let preamble = Preamble::from_lg_k(lg_k).unwrap();
    let mut target = Fields::Hash(HashFields::new(preamble, 2));
    let source = hash_fields_with(lg_k, 4, &[(5, 2), (60, 7), (33, 1)]);

    let mut updates = vec![];
    target
        .union_bucket_iterator(source.bucket_iterator(), |key, old, new| {
            updates.push((key, old, new))
        })
        .unwrap();
    updates.sort_unstable();
    assert_eq!(updates, vec![(5, 0, 2), (33, 0, 1), (60, 0, 7)]);

    assert_eq!(
        collect(target.to_compact().bucket_iterator()),
        vec![(5, 2), (33, 1), (60, 7)]
    );
}
