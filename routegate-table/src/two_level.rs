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

use super::table::{RouteKind, RouteTable, RouteTableBuilder, TableStats};
use super::{Result, TableConfig, LOG_CATEGORY};
use std::sync::Arc;
use tracing::error;

/// Matching capability of the values stored in the first level of a
/// [`TwoLevelRouteTable`]: registration during build, one freeze fixing the
/// nested cache size, then read-only matching against the second key.
///
/// The implementation is chosen at build time through the table's generic
/// parameter; the second dimension's algorithm is whatever the stage brings,
/// a flat scan, a nested prefix table, anything exposing this trait.
pub trait SecondStage: Default + Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    /// Registers one value during build.
    fn add(&mut self, value: Self::Value);

    /// Freezes the stage; `cache_capacity` bounds whatever cache the stage
    /// keeps for its own dimension.
    fn freeze(&mut self, cache_capacity: usize);

    /// First value the predicate accepts for `key`, `None` when nothing
    /// matches or the stage was never frozen.
    fn find<D>(
        &self,
        key: &str,
        data: &D,
        predicate: impl Fn(&Self::Value, &D) -> bool,
    ) -> Option<Self::Value>;

    /// Asynchronous [`find`](SecondStage::find).
    #[allow(async_fn_in_trait)]
    async fn find_async<D>(
        &self,
        key: &str,
        data: &D,
        predicate: impl Fn(&Self::Value, &D) -> bool,
    ) -> Option<Self::Value>;
}

/// Flat second stage scanning its values in insertion order; the second key
/// is ignored, any second-dimension logic lives in the predicate.
pub struct ListStage<V> {
    values: Vec<V>,
}

impl<V> Default for ListStage<V> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<V> SecondStage for ListStage<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Value = V;

    fn add(&mut self, value: V) {
        self.values.push(value);
    }

    fn freeze(&mut self, _cache_capacity: usize) {}

    fn find<D>(
        &self,
        _key: &str,
        data: &D,
        predicate: impl Fn(&V, &D) -> bool,
    ) -> Option<V> {
        self.values
            .iter()
            .find(|value| predicate(value, data))
            .cloned()
    }

    async fn find_async<D>(
        &self,
        key: &str,
        data: &D,
        predicate: impl Fn(&V, &D) -> bool,
    ) -> Option<V> {
        self.find(key, data, predicate)
    }
}

/// Second-dimension routing key carried by a value stored in a
/// [`TableStage`].
pub trait StageKey {
    fn stage_key(&self) -> &str;
    fn stage_kind(&self) -> RouteKind {
        RouteKind::Prefix
    }
    fn stage_priority(&self) -> i32 {
        0
    }
}

enum StageState<V> {
    Building(RouteTableBuilder<V>),
    Built(RouteTable<V>),
}

/// Second stage backed by a nested [`RouteTable`] built from each value's
/// declared stage key, so the second dimension gets exact-over-prefix
/// semantics and its own bounded cache.
pub struct TableStage<V> {
    state: StageState<V>,
}

impl<V> Default for TableStage<V> {
    fn default() -> Self {
        Self {
            state: StageState::Building(RouteTableBuilder::default()),
        }
    }
}

impl<V> SecondStage for TableStage<V>
where
    V: StageKey + Clone + Send + Sync + 'static,
{
    type Value = V;

    fn add(&mut self, value: V) {
        match &mut self.state {
            StageState::Building(builder) => {
                let key = value.stage_key().to_string();
                let kind = value.stage_kind();
                let priority = value.stage_priority();
                builder.add(&key, value, kind, priority);
            },
            StageState::Built(_) => {
                error!(
                    category = LOG_CATEGORY,
                    "stage already frozen, route dropped"
                );
            },
        }
    }

    fn freeze(&mut self, cache_capacity: usize) {
        let state = std::mem::replace(
            &mut self.state,
            StageState::Building(RouteTableBuilder::default()),
        );
        self.state = match state {
            StageState::Building(mut builder) => {
                builder.set_cache_capacity(cache_capacity);
                StageState::Built(builder.build())
            },
            built => built,
        };
    }

    fn find<D>(
        &self,
        key: &str,
        data: &D,
        predicate: impl Fn(&V, &D) -> bool,
    ) -> Option<V> {
        match &self.state {
            StageState::Built(table) => table.match_route(key, data, predicate),
            StageState::Building(_) => None,
        }
    }

    async fn find_async<D>(
        &self,
        key: &str,
        data: &D,
        predicate: impl Fn(&V, &D) -> bool,
    ) -> Option<V> {
        match &self.state {
            StageState::Built(table) => {
                table.match_route_async(key, data, predicate).await
            },
            StageState::Building(_) => None,
        }
    }
}

struct StageSlot {
    kind: RouteKind,
    key: String,
    priority: i32,
}

/// Builder of a [`TwoLevelRouteTable`]. Values registered at the same
/// first-level slot, the same key, kind and priority, accumulate into one
/// stage; slots keep their insertion order into the first-level table.
pub struct TwoLevelRouteTableBuilder<M: SecondStage> {
    conf: TableConfig,
    stage_cache_capacity: usize,
    pending: Vec<(StageSlot, M)>,
}

impl<M: SecondStage> TwoLevelRouteTableBuilder<M> {
    /// Creates a builder; `stage_cache_capacity` is the cache size every
    /// stage is frozen with.
    pub fn new(
        conf: TableConfig,
        stage_cache_capacity: usize,
    ) -> Result<Self> {
        conf.validate()?;
        if stage_cache_capacity == 0 {
            return Err(super::Error::Invalid {
                message: "stage cache capacity must be greater than zero"
                    .to_string(),
            });
        }
        Ok(Self {
            conf,
            stage_cache_capacity,
            pending: Vec::new(),
        })
    }

    /// Registers one value under its first-level key.
    pub fn add(
        &mut self,
        key: &str,
        kind: RouteKind,
        priority: i32,
        value: M::Value,
    ) {
        let folded = self.conf.case_mode.fold(key).into_owned();
        let position = self.pending.iter().position(|(slot, _)| {
            slot.kind == kind && slot.priority == priority && slot.key == folded
        });
        let index = match position {
            Some(index) => index,
            None => {
                self.pending.push((
                    StageSlot {
                        kind,
                        key: folded,
                        priority,
                    },
                    M::default(),
                ));
                self.pending.len() - 1
            },
        };
        if let Some((_, stage)) = self.pending.get_mut(index) {
            stage.add(value);
        }
    }

    /// Freezes every stage, then the first-level table.
    pub fn build(self) -> TwoLevelRouteTable<M> {
        let mut builder = RouteTableBuilder::with_conf(self.conf);
        for (slot, mut stage) in self.pending {
            stage.freeze(self.stage_cache_capacity);
            builder.add(&slot.key, Arc::new(stage), slot.kind, slot.priority);
        }
        TwoLevelRouteTable {
            table: builder.build(),
        }
    }
}

/// Route table over compound keys, host then path being the canonical pair.
///
/// The first key resolves exactly like a [`RouteTable`] lookup, exact over
/// prefix with its own cache, yielding second-level matchers in first-level
/// order; the first matcher producing a value wins.
pub struct TwoLevelRouteTable<M: SecondStage> {
    table: RouteTable<Arc<M>>,
}

impl<M: SecondStage> TwoLevelRouteTable<M> {
    /// Matches `key` in the first dimension and `key2` within each matched
    /// stage in order, returning the first accepted value.
    pub fn match_route<D>(
        &self,
        key: &str,
        key2: &str,
        data: &D,
        predicate: impl Fn(&M::Value, &D) -> bool,
    ) -> Option<M::Value> {
        let stages = self.table.find_all(key);
        for stage in stages.iter() {
            if let Some(found) = stage.find(key2, data, &predicate) {
                return Some(found);
            }
        }
        None
    }

    /// Asynchronous [`match_route`](TwoLevelRouteTable::match_route).
    pub async fn match_route_async<D>(
        &self,
        key: &str,
        key2: &str,
        data: &D,
        predicate: impl Fn(&M::Value, &D) -> bool,
    ) -> Option<M::Value> {
        let stages = self.table.find_all_async(key).await;
        for stage in stages.iter() {
            if let Some(found) = stage.find_async(key2, data, &predicate).await
            {
                return Some(found);
            }
        }
        None
    }

    /// Second-level matchers resolved for `key`, in first-level order.
    pub fn find_all(&self, key: &str) -> super::Candidates<Arc<M>> {
        self.table.find_all(key)
    }

    pub fn dispose(&self) {
        self.table.dispose()
    }

    /// First-level counters; stages keep their own.
    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct TestRoute {
        name: &'static str,
        path: &'static str,
        method: &'static str,
    }

    impl StageKey for TestRoute {
        fn stage_key(&self) -> &str {
            self.path
        }
    }

    fn by_method(route: &TestRoute, method: &&str) -> bool {
        route.method.is_empty() || route.method == *method
    }

    fn new_host_path_table() -> TwoLevelRouteTable<TableStage<TestRoute>> {
        let mut builder = TwoLevelRouteTableBuilder::new(
            TableConfig::default(),
            128,
        )
        .unwrap();
        builder.add(
            "example.com",
            RouteKind::Exact,
            0,
            TestRoute {
                name: "api",
                path: "/api",
                method: "",
            },
        );
        builder.add(
            "example.com",
            RouteKind::Exact,
            0,
            TestRoute {
                name: "root",
                path: "/",
                method: "",
            },
        );
        builder.add(
            "svc.",
            RouteKind::Prefix,
            0,
            TestRoute {
                name: "svc-fallback",
                path: "/",
                method: "",
            },
        );
        builder.build()
    }

    #[test]
    fn test_host_then_path() {
        let table = new_host_path_table();

        let found = table
            .match_route("example.com", "/api/users", &"GET", by_method)
            .unwrap();
        assert_eq!("api", found.name);

        let found = table
            .match_route("example.com", "/public", &"GET", by_method)
            .unwrap();
        assert_eq!("root", found.name);

        let found = table
            .match_route("svc.other", "/anything", &"GET", by_method)
            .unwrap();
        assert_eq!("svc-fallback", found.name);

        assert_eq!(
            None,
            table.match_route("unknown", "/api", &"GET", by_method)
        );
    }

    #[test]
    fn test_predicate_filters_within_stage() {
        let mut builder: TwoLevelRouteTableBuilder<TableStage<TestRoute>> =
            TwoLevelRouteTableBuilder::new(TableConfig::default(), 128)
                .unwrap();
        builder.add(
            "example.com",
            RouteKind::Exact,
            0,
            TestRoute {
                name: "write",
                path: "/api",
                method: "POST",
            },
        );
        builder.add(
            "example.com",
            RouteKind::Exact,
            0,
            TestRoute {
                name: "read",
                path: "/api",
                method: "GET",
            },
        );
        let table = builder.build();

        let found = table
            .match_route("example.com", "/api/users", &"GET", by_method)
            .unwrap();
        assert_eq!("read", found.name);

        let found = table
            .match_route("example.com", "/api/users", &"POST", by_method)
            .unwrap();
        assert_eq!("write", found.name);

        assert_eq!(
            None,
            table.match_route("example.com", "/api", &"DELETE", by_method)
        );
    }

    #[test]
    fn test_list_stage_scans_in_insertion_order() {
        let mut builder: TwoLevelRouteTableBuilder<ListStage<TestRoute>> =
            TwoLevelRouteTableBuilder::new(TableConfig::default(), 128)
                .unwrap();
        builder.add(
            "example.com",
            RouteKind::Exact,
            0,
            TestRoute {
                name: "first",
                path: "/a",
                method: "",
            },
        );
        builder.add(
            "example.com",
            RouteKind::Exact,
            0,
            TestRoute {
                name: "second",
                path: "/b",
                method: "",
            },
        );
        let table = builder.build();

        // a list stage ignores the second key, the first predicate hit wins
        let found = table
            .match_route("example.com", "/whatever", &"GET", by_method)
            .unwrap();
        assert_eq!("first", found.name);
    }

    #[test]
    fn test_first_level_priority_order() {
        let mut builder: TwoLevelRouteTableBuilder<TableStage<TestRoute>> =
            TwoLevelRouteTableBuilder::new(TableConfig::default(), 128)
                .unwrap();
        builder.add(
            "svc.",
            RouteKind::Prefix,
            1,
            TestRoute {
                name: "preferred",
                path: "/",
                method: "",
            },
        );
        builder.add(
            "svc.",
            RouteKind::Prefix,
            0,
            TestRoute {
                name: "fallback",
                path: "/",
                method: "",
            },
        );
        let table = builder.build();

        let found = table
            .match_route("svc.local", "/x", &"GET", by_method)
            .unwrap();
        assert_eq!("preferred", found.name);
        // both stages were resolved for the key, in priority order
        assert_eq!(2, table.find_all("svc.local").len());
    }

    #[tokio::test]
    async fn test_async_host_then_path() {
        let table = new_host_path_table();

        let found = table
            .match_route_async("example.com", "/api/users", &"GET", by_method)
            .await
            .unwrap();
        assert_eq!("api", found.name);

        assert_eq!(
            None,
            table
                .match_route_async("unknown", "/api", &"GET", by_method)
                .await
        );
    }

    #[test]
    fn test_dispose_fails_soft() {
        let table = new_host_path_table();
        table.dispose();

        assert_eq!(
            None,
            table.match_route("example.com", "/api", &"GET", by_method)
        );
        assert_eq!(0, table.find_all("example.com").len());
    }

    #[test]
    fn test_invalid_stage_capacity() {
        let result = TwoLevelRouteTableBuilder::<ListStage<TestRoute>>::new(
            TableConfig::default(),
            0,
        );
        assert_eq!(
            "Invalid error stage cache capacity must be greater than zero",
            result.err().unwrap().to_string()
        );
    }
}
