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

//! Building the cache array stored inside a compact Theta sketch.

use log::trace;

/// Copies the live entries of a raw hash-table cache into a compact cache.
///
/// Entries equal to zero mark empty slots of the source table and are skipped, as are entries
/// at or above `theta`. When `ordered` is set, the result is sorted ascending.
///
/// Duplicates are not removed: the update path that filled `raw` is expected to have kept its
/// keys unique.
pub(crate) fn compact_cache(raw: &[u64], cur_count: usize, theta: u64, ordered: bool) -> Vec<u64> {
    if cur_count == 0 {
        return Vec::new();
    }

    let mut cache = Vec::with_capacity(cur_count);
    cache.extend(raw.iter().copied().filter(|&hash| hash != 0 && hash < theta));
    debug_assert_eq!(
        cache.len(),
        cur_count,
        "retained entry count disagrees with the raw cache"
    );

    if ordered {
        cache.sort_unstable();
    }
    trace!(
        "compacted {} of {} raw slots (ordered: {ordered})",
        cache.len(),
        raw.len()
    );
    cache
}
