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

use super::cache::SingleFlight;
use super::winner::{WinnerInner, WinnerRouteTable};
use super::{
    empty_candidates, Candidates, Result, TableConfig, LOG_CATEGORY,
};
use ahash::AHashMap;
use arc_swap::ArcSwapOption;
use routegate_core::{CaseMode, PriorityBuckets, RadixTrie};
use tracing::debug;

/// How a registered key is matched against a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// Full string equality.
    Exact,
    /// The registered key is a prefix of the lookup key.
    Prefix,
}

/// Counters of one table instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Trie traversals since the table was built. Stays flat while lookups
    /// are served from the exact map or the cache.
    pub trie_searches: u64,
}

/// The frozen routing index shared by both table variants: an exact map with
/// pre-flattened candidate arrays plus the prefix trie. Immutable after
/// `build`, read concurrently without synchronization.
pub(crate) struct RouteIndex<T> {
    case_mode: CaseMode,
    exact: AHashMap<String, Candidates<T>>,
    trie: RadixTrie<PriorityBuckets<T>>,
}

impl<T> RouteIndex<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[inline]
    pub(crate) fn fold<'a>(
        &self,
        key: &'a str,
    ) -> std::borrow::Cow<'a, str> {
        self.case_mode.fold(key)
    }

    #[inline]
    pub(crate) fn exact_candidates(
        &self,
        folded: &str,
    ) -> Option<Candidates<T>> {
        self.exact.get(folded).cloned()
    }

    /// Walks the trie for `folded` and flattens every matched bucket list in
    /// search order: deepest prefix first, priority order within one node.
    pub(crate) fn resolve_prefix(&self, folded: &str) -> Candidates<T> {
        let mut out = Vec::new();
        for buckets in self.trie.search(folded) {
            buckets.append_to(&mut out);
        }
        out.into()
    }

    /// Exact-over-prefix resolution without touching any cache.
    pub(crate) fn resolve_uncached(&self, folded: &str) -> Candidates<T> {
        match self.exact_candidates(folded) {
            Some(found) => found,
            None => self.resolve_prefix(folded),
        }
    }

    pub(crate) fn trie_searches(&self) -> u64 {
        self.trie.search_count()
    }
}

/// Single-writer accumulator for route entries, frozen into an immutable
/// table by `build`. The builder is consumed by `build`, so it cannot be
/// reused for the next configuration snapshot; create a new one instead.
pub struct RouteTableBuilder<T> {
    conf: TableConfig,
    exact: AHashMap<String, PriorityBuckets<T>>,
    trie: RadixTrie<PriorityBuckets<T>>,
}

impl<T> Default for RouteTableBuilder<T> {
    fn default() -> Self {
        Self::with_conf(TableConfig::default())
    }
}

impl<T> RouteTableBuilder<T> {
    /// Creates a builder after validating the configuration.
    pub fn new(conf: TableConfig) -> Result<Self> {
        conf.validate()?;
        Ok(Self::with_conf(conf))
    }

    pub(crate) fn with_conf(conf: TableConfig) -> Self {
        let trie = RadixTrie::new(conf.case_mode);
        Self {
            conf,
            exact: AHashMap::new(),
            trie,
        }
    }

    /// Overrides the cache capacity the table is frozen with. Zero is
    /// ignored.
    pub fn set_cache_capacity(&mut self, capacity: usize) {
        if capacity > 0 {
            self.conf.cache_capacity = capacity;
        }
    }
}

impl<T> RouteTableBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Registers one route entry.
    ///
    /// Duplicate exact entries at the same key and priority are retained in
    /// insertion order, rejecting genuinely duplicated route configuration
    /// is the config pipeline's job. An empty prefix key becomes the
    /// catch-all entry matching every lookup.
    pub fn add(
        &mut self,
        key: &str,
        value: T,
        kind: RouteKind,
        priority: i32,
    ) {
        match kind {
            RouteKind::Exact => {
                let key = self.conf.case_mode.fold(key).into_owned();
                self.exact.entry(key).or_default().push(priority, value);
            },
            RouteKind::Prefix => {
                self.trie.add(
                    key,
                    PriorityBuckets::single(priority, value),
                    PriorityBuckets::merge,
                );
            },
        }
    }

    fn into_index(self) -> (RouteIndex<T>, TableConfig) {
        let conf = self.conf;
        debug!(
            category = LOG_CATEGORY,
            exact = self.exact.len(),
            prefix_nodes = self.trie.node_count(),
            cache_capacity = conf.cache_capacity,
            "build route table"
        );
        let exact = self
            .exact
            .into_iter()
            .map(|(key, buckets)| {
                let mut flat = Vec::with_capacity(buckets.len());
                buckets.append_to(&mut flat);
                (key, Candidates::from(flat))
            })
            .collect();
        (
            RouteIndex {
                case_mode: conf.case_mode,
                exact,
                trie: self.trie,
            },
            conf,
        )
    }

    /// Freezes the builder into a table caching full candidate arrays.
    pub fn build(self) -> RouteTable<T> {
        let (index, conf) = self.into_index();
        RouteTable {
            inner: ArcSwapOption::from_pointee(TableInner {
                cache: SingleFlight::new(
                    conf.cache_capacity,
                    conf.populate_timeout,
                    |_| true,
                ),
                index,
            }),
        }
    }

    /// Freezes the builder into the winner-caching variant.
    ///
    /// Only sound when the match predicate is effectively a pure function of
    /// the key, see [`WinnerRouteTable`].
    pub fn build_winner_cached(self) -> WinnerRouteTable<T> {
        let (index, conf) = self.into_index();
        WinnerRouteTable::new(WinnerInner::new(
            index,
            SingleFlight::new(
                conf.cache_capacity,
                conf.populate_timeout,
                |winner| winner.is_some(),
            ),
        ))
    }
}

pub(crate) struct TableInner<T> {
    index: RouteIndex<T>,
    cache: SingleFlight<Candidates<T>>,
}

impl<T> TableInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn find_all_sync(&self, key: &str) -> Candidates<T> {
        let folded = self.index.fold(key);
        if let Some(found) = self.index.exact_candidates(&folded) {
            return found;
        }
        self.cache.get_or_populate_sync(&folded, || {
            self.index.resolve_prefix(&folded)
        })
    }

    async fn find_all(&self, key: &str) -> Candidates<T> {
        let folded = self.index.fold(key);
        if let Some(found) = self.index.exact_candidates(&folded) {
            return found;
        }
        self.cache
            .get_or_populate(&folded, || self.index.resolve_prefix(&folded))
            .await
    }
}

/// Immutable query-only route table: exact map, prefix trie and a bounded
/// single-flight candidate cache.
///
/// An exact entry beats every prefix entry for its key, the trie is not even
/// consulted. Prefix resolutions are flattened once and cached under the
/// folded key only; the match predicate is evaluated per call against the
/// cached array and is never itself cached.
///
/// The table lives for exactly one configuration snapshot. On config change
/// the owner builds a replacement, swaps it in for new lookups and calls
/// [`dispose`](RouteTable::dispose) once drained; a disposed table answers
/// every query with an empty result instead of panicking, so lookups racing
/// a hot swap fail soft.
pub struct RouteTable<T> {
    pub(crate) inner: ArcSwapOption<TableInner<T>>,
}

impl<T> RouteTable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Returns the raw ordered candidate array for `key`: exact-map
    /// candidates, or every matched prefix flattened deepest-first.
    pub fn find_all(&self, key: &str) -> Candidates<T> {
        match self.inner.load_full() {
            Some(inner) => inner.find_all_sync(key),
            None => empty_candidates(),
        }
    }

    /// Asynchronous [`find_all`](RouteTable::find_all); a caller racing an
    /// in-flight cache population awaits it instead of backing off.
    pub async fn find_all_async(&self, key: &str) -> Candidates<T> {
        match self.inner.load_full() {
            Some(inner) => inner.find_all(key).await,
            None => empty_candidates(),
        }
    }

    /// Scans the candidates of `key` in order and returns the first one the
    /// predicate accepts, `None` when nothing matches.
    pub fn match_route<D, F>(
        &self,
        key: &str,
        data: &D,
        predicate: F,
    ) -> Option<T>
    where
        F: Fn(&T, &D) -> bool,
    {
        self.find_all(key)
            .iter()
            .find(|candidate| predicate(candidate, data))
            .cloned()
    }

    /// Asynchronous [`match_route`](RouteTable::match_route).
    pub async fn match_route_async<D, F>(
        &self,
        key: &str,
        data: &D,
        predicate: F,
    ) -> Option<T>
    where
        F: Fn(&T, &D) -> bool,
    {
        self.find_all_async(key)
            .await
            .iter()
            .find(|candidate| predicate(candidate, data))
            .cloned()
    }

    /// Best candidate for `key` regardless of any predicate.
    pub fn first(&self, key: &str) -> Option<T> {
        self.find_all(key).first().cloned()
    }

    /// Drops the exact map, trie and cache. In-flight lookups that already
    /// captured the state finish normally; every later query returns an
    /// empty result.
    pub fn dispose(&self) {
        debug!(category = LOG_CATEGORY, "dispose route table");
        self.inner.store(None);
    }

    pub fn stats(&self) -> TableStats {
        match self.inner.load_full() {
            Some(inner) => TableStats {
                trie_searches: inner.index.trie_searches(),
            },
            None => TableStats::default(),
        }
    }
}
