// Copyright 2024-2025 Tree xie.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Request dispatch core for reverse proxies.
//!
//! Feed route entries to a [`RouteTableBuilder`] during configuration load,
//! freeze them with `build` and serve `match_route`/`find_all` lookups from
//! the immutable table for the lifetime of one configuration snapshot. On
//! config change build a replacement, swap it in and dispose the old table
//! once drained; a disposed table fails soft. [`TwoLevelRouteTable`] composes
//! two dimensions, host then path being the usual pair.

pub use routegate_core::{
    CaseMode, MergeFn, PriorityBuckets, RadixTrie, Search,
};
pub use routegate_table::{
    Candidates, Error, ListStage, Result, RouteKind, RouteTable,
    RouteTableBuilder, SecondStage, StageKey, TableConfig, TableStage,
    TableStats, TwoLevelRouteTable, TwoLevelRouteTableBuilder,
    WinnerRouteTable, DEFAULT_CACHE_CAPACITY, DEFAULT_POPULATE_TIMEOUT,
};
