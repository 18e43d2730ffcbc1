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

//! Compaction and binary serialization for cardinality sketches.
//!
//! This crate turns the live, mutable state of a cardinality sketch into its immutable,
//! space-minimal form, and reads that form back:
//!
//! - [`theta`]: compact Theta sketches, a filtered and optionally sorted cache of hash values
//!   below a threshold, with their preamble codec.
//! - [`hll`]: HyperLogLog-style bucket storage in sparse, dense and compact shapes, the
//!   single-pass bucket iteration protocol, and compaction into the packed shape.
//!
//! Deciding when to compact, updating sketches with new input and computing estimates are left
//! to the callers.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub(crate) mod codec;
pub mod error;
pub mod hash;
pub mod hll;
pub mod theta;
