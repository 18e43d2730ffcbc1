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

//! Seed hashing shared by the Theta and HLL layouts.

/// The seed used by default when hashing input values.
pub const DEFAULT_UPDATE_SEED: u64 = 9001;

/// Computes the 16-bit fingerprint of an update seed.
///
/// Serialized sketches record this value so that sketches built with different seeds are
/// detected before they are merged.
///
/// # Examples
///
/// ```
/// use compact_sketches::hash::DEFAULT_UPDATE_SEED;
/// use compact_sketches::hash::compute_seed_hash;
///
/// assert_eq!(compute_seed_hash(DEFAULT_UPDATE_SEED), 0x93CC);
/// ```
pub fn compute_seed_hash(seed: u64) -> u16 {
    let (h1, _) = mur3::murmurhash3_x64_128(&seed.to_le_bytes(), 0);
    (h1 & 0xffff) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_seed_hash() {
        assert_eq!(compute_seed_hash(DEFAULT_UPDATE_SEED), 0x93CC);
    }

    #[test]
    fn test_distinct_seeds_distinct_hashes() {
        assert_ne!(compute_seed_hash(9001), compute_seed_hash(9000));
    }
}
