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
use super::table::{RouteIndex, TableStats};
use super::{empty_candidates, Candidates, LOG_CATEGORY};
use arc_swap::ArcSwapOption;
use tracing::debug;

pub(crate) struct WinnerInner<T> {
    index: RouteIndex<T>,
    cache: SingleFlight<Option<T>>,
}

impl<T> WinnerInner<T> {
    pub(crate) fn new(
        index: RouteIndex<T>,
        cache: SingleFlight<Option<T>>,
    ) -> Self {
        Self { index, cache }
    }
}

/// Route table memoizing a single winning value per key instead of the
/// candidate array.
///
/// The cache key is the folded lookup key only, never `data`: the first
/// caller to resolve a key supplies the predicate, and the winner chosen for
/// that call is replayed for every later caller of the same key, whatever
/// `data` they pass. This is a deliberate shortcut for predicates whose
/// outcome is a pure function of the key; a predicate that legitimately
/// varies with `data` (request method, headers, ...) will be answered with a
/// stale winner. Callers needing per-`data` matching must use the default
/// array-caching [`RouteTable`](crate::RouteTable); this variant only exists
/// behind the explicit
/// [`build_winner_cached`](crate::RouteTableBuilder::build_winner_cached)
/// opt-in.
///
/// "No winner" is not memoized, a later call with different `data` may still
/// find one.
pub struct WinnerRouteTable<T> {
    inner: ArcSwapOption<WinnerInner<T>>,
}

impl<T> WinnerRouteTable<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(inner: WinnerInner<T>) -> Self {
        Self {
            inner: ArcSwapOption::from_pointee(inner),
        }
    }

    /// Returns the memoized winner for `key`, or resolves the candidates
    /// (exact map over trie) and memoizes the first one the predicate
    /// accepts. Racing callers of one unseen key share a single resolution.
    pub fn match_route<D, F>(
        &self,
        key: &str,
        data: &D,
        predicate: F,
    ) -> Option<T>
    where
        F: Fn(&T, &D) -> bool,
    {
        let Some(inner) = self.inner.load_full() else {
            return None;
        };
        let folded = inner.index.fold(key);
        inner.cache.get_or_populate_sync(&folded, || {
            inner
                .index
                .resolve_uncached(&folded)
                .iter()
                .find(|candidate| predicate(candidate, data))
                .cloned()
        })
    }

    /// Asynchronous [`match_route`](WinnerRouteTable::match_route).
    pub async fn match_route_async<D, F>(
        &self,
        key: &str,
        data: &D,
        predicate: F,
    ) -> Option<T>
    where
        F: Fn(&T, &D) -> bool,
    {
        let Some(inner) = self.inner.load_full() else {
            return None;
        };
        let folded = inner.index.fold(key);
        inner
            .cache
            .get_or_populate(&folded, || {
                inner
                    .index
                    .resolve_uncached(&folded)
                    .iter()
                    .find(|candidate| predicate(candidate, data))
                    .cloned()
            })
            .await
    }

    /// Raw ordered candidate array for `key`, resolved on every call; this
    /// variant keeps no array cache.
    pub fn find_all(&self, key: &str) -> Candidates<T> {
        match self.inner.load_full() {
            Some(inner) => {
                let folded = inner.index.fold(key);
                inner.index.resolve_uncached(&folded)
            },
            None => empty_candidates(),
        }
    }

    /// Memoizes and returns the first candidate for `key`.
    pub fn first(&self, key: &str) -> Option<T> {
        self.match_route(key, &(), |_, _| true)
    }

    pub fn dispose(&self) {
        debug!(category = LOG_CATEGORY, "dispose winner route table");
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
