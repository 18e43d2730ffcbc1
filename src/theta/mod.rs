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

//! Compact Theta sketches.
//!
//! A Theta sketch retains the hash values that fall below a threshold, theta. This module holds
//! the immutable end-state of such a sketch, [`CompactSketch`], together with the binary layout
//! it is stored in. The mutable sketch that feeds it is described by [`UpdatableSketch`].

mod cache;
mod compact;
mod serialization;

pub use self::compact::CacheIter;
pub use self::compact::CompactSketch;
pub use self::serialization::FLAG_COMPACT;
pub use self::serialization::FLAG_EMPTY;
pub use self::serialization::FLAG_ORDERED;
pub use self::serialization::FLAG_READ_ONLY;
pub use self::serialization::MAX_THETA;

/// The view of a live, updatable Theta sketch that compaction needs.
///
/// The sketch owns a hash table whose empty slots hold zero; [`UpdatableSketch::cache`] exposes
/// that table as-is.
pub trait UpdatableSketch {
    /// Whether no value has ever been presented to the sketch.
    fn is_empty(&self) -> bool;

    /// The 16-bit hash of the seed the sketch hashes its input with.
    fn seed_hash(&self) -> u16;

    /// Number of valid hash values currently in the table.
    fn num_retained(&self) -> usize;

    /// The current threshold as u64.
    fn theta64(&self) -> u64;

    /// The raw hash table, including empty slots.
    fn cache(&self) -> &[u64];
}
