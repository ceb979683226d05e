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

use super::CaseMode;
use std::sync::atomic::{AtomicU64, Ordering};

/// Binary combinator applied when an insertion lands on a slot that already
/// holds a value.
pub type MergeFn<V> = fn(V, V) -> V;

const ROOT: usize = 0;

#[derive(Debug)]
struct Node<V> {
    /// Edge label leading from the parent to this node. Empty for the root.
    label: String,
    value: Option<V>,
    children: Vec<usize>,
}

/// Compressed prefix index over strings.
///
/// Edges carry multi-character labels which are split and merged on insert to
/// keep the node count minimal. Nodes live in an arena and reference each
/// other by index, so the whole graph is torn down by dropping the trie; no
/// per-node cleanup exists.
///
/// The trie is mutable only while an index is being built. After that it is
/// read concurrently without synchronization, `search` being the only hot
/// path.
#[derive(Debug)]
pub struct RadixTrie<V> {
    mode: CaseMode,
    nodes: Vec<Node<V>>,
    /// Value registered under the empty key, matching every lookup.
    catch_all: Option<V>,
    searches: AtomicU64,
}

impl<V> Default for RadixTrie<V> {
    fn default() -> Self {
        Self::new(CaseMode::default())
    }
}

impl<V> RadixTrie<V> {
    pub fn new(mode: CaseMode) -> Self {
        Self {
            mode,
            nodes: vec![Node {
                label: String::new(),
                value: None,
                children: Vec::new(),
            }],
            catch_all: None,
            searches: AtomicU64::new(0),
        }
    }

    fn alloc(&mut self, label: String, value: Option<V>) -> usize {
        self.nodes.push(Node {
            label,
            value,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn combine(slot: &mut Option<V>, value: V, merge: MergeFn<V>) {
        *slot = Some(match slot.take() {
            Some(existing) => merge(existing, value),
            None => value,
        });
    }

    /// Inserts `value` at `key`, combining with an already stored value via
    /// `merge`. The empty key goes to the catch-all slot.
    pub fn add(&mut self, key: &str, value: V, merge: MergeFn<V>) {
        let key = self.mode.fold(key);
        if key.is_empty() {
            Self::combine(&mut self.catch_all, value, merge);
            return;
        }
        let mut current = ROOT;
        let mut rest: &str = &key;
        loop {
            // at most one child can share a prefix with the remaining key,
            // edge labels of siblings start with distinct bytes
            let mut found = None;
            for (slot, &child) in
                self.nodes[current].children.iter().enumerate()
            {
                let common = common_prefix(&self.nodes[child].label, rest);
                if common > 0 {
                    found = Some((slot, child, common));
                    break;
                }
            }
            let Some((slot, child, common)) = found else {
                // no shared prefix anywhere, append a new leaf
                let leaf = self.alloc(rest.to_string(), Some(value));
                self.nodes[current].children.push(leaf);
                return;
            };

            let label_len = self.nodes[child].label.len();
            if common == label_len && common == rest.len() {
                // exact edge match, combine values
                let node = &mut self.nodes[child];
                Self::combine(&mut node.value, value, merge);
                return;
            }
            if common == label_len {
                // edge label is a prefix of the key, descend
                rest = &rest[common..];
                current = child;
                continue;
            }

            // the existing edge must be split at `common`
            let suffix = self.nodes[child].label.split_off(common);
            let head =
                std::mem::replace(&mut self.nodes[child].label, suffix);
            if common == rest.len() {
                // the new key ends inside the edge, the intermediate node
                // carries its value and demotes the old child
                let inter = self.alloc(head, Some(value));
                self.nodes[inter].children.push(child);
                self.nodes[current].children[slot] = inter;
            } else {
                // diverging suffixes, the intermediate node is synthetic
                let inter = self.alloc(head, None);
                let leaf =
                    self.alloc(rest[common..].to_string(), Some(value));
                self.nodes[inter].children.push(child);
                self.nodes[inter].children.push(leaf);
                self.nodes[current].children[slot] = inter;
            }
            return;
        }
    }

    /// Walks the trie along `key` and returns a lazy iterator over the stored
    /// values whose keys prefix it, longest prefix first. The catch-all
    /// value, if any, is yielded last.
    ///
    /// Every call bumps the traversal counter, which callers use to verify
    /// their caching actually short-circuits repeated walks.
    pub fn search(&self, key: &str) -> Search<'_, V> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        let key = self.mode.fold(key);
        let mut matched = Vec::new();
        let mut current = ROOT;
        let mut rest: &str = &key;
        'walk: while !rest.is_empty() {
            let children = &self.nodes[current].children;
            for &child in children {
                if let Some(next) =
                    rest.strip_prefix(self.nodes[child].label.as_str())
                {
                    if self.nodes[child].value.is_some() {
                        matched.push(child);
                    }
                    rest = next;
                    current = child;
                    continue 'walk;
                }
            }
            break;
        }
        Search {
            trie: self,
            matched,
            catch_all: self.catch_all.is_some(),
        }
    }

    /// Number of `search` calls since the trie was built.
    pub fn search_count(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1 && self.catch_all.is_none()
    }

    /// Number of arena nodes, the root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Length of the shared prefix of `a` and `b`, clamped down to a character
/// boundary so edge splits never land inside a multi-byte character.
fn common_prefix(a: &str, b: &str) -> usize {
    let mut n = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while !a.is_char_boundary(n) {
        n -= 1;
    }
    n
}

/// Lazy result sequence of [`RadixTrie::search`], deepest match first.
pub struct Search<'a, V> {
    trie: &'a RadixTrie<V>,
    /// Value-carrying nodes along the matched path, shallowest first.
    matched: Vec<usize>,
    catch_all: bool,
}

impl<'a, V> Iterator for Search<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<&'a V> {
        if let Some(node) = self.matched.pop() {
            return self.trie.nodes[node].value.as_ref();
        }
        if self.catch_all {
            self.catch_all = false;
            return self.trie.catch_all.as_ref();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keep_first(a: &'static str, _b: &'static str) -> &'static str {
        a
    }

    fn collect(
        trie: &RadixTrie<&'static str>,
        key: &str,
    ) -> Vec<&'static str> {
        trie.search(key).copied().collect()
    }

    #[test]
    fn test_longest_prefix_first() {
        let mut trie = RadixTrie::new(CaseMode::Ordinal);
        trie.add("svc", "v1", keep_first);
        trie.add("svc.local", "v2", keep_first);

        assert_eq!(vec!["v2", "v1"], collect(&trie, "svc.local.example"));
        assert_eq!(vec!["v1"], collect(&trie, "svc.other"));
        assert_eq!(Vec::<&str>::new(), collect(&trie, "other"));
    }

    #[test]
    fn test_split_on_partial_prefix() {
        let mut trie = RadixTrie::new(CaseMode::Ordinal);
        trie.add("team", "team", keep_first);
        trie.add("test", "test", keep_first);

        // "te" became a synthetic intermediate without a value
        assert_eq!(4, trie.node_count());
        assert_eq!(vec!["team"], collect(&trie, "teammate"));
        assert_eq!(vec!["test"], collect(&trie, "tests"));
        assert_eq!(Vec::<&str>::new(), collect(&trie, "te"));
    }

    #[test]
    fn test_split_when_key_ends_inside_edge() {
        let mut trie = RadixTrie::new(CaseMode::Ordinal);
        trie.add("abcdef", "long", keep_first);
        trie.add("abc", "short", keep_first);

        assert_eq!(vec!["short"], collect(&trie, "abcx"));
        assert_eq!(vec!["long", "short"], collect(&trie, "abcdefg"));
    }

    #[test]
    fn test_exact_edge_merges() {
        fn concat(a: String, b: String) -> String {
            a + "," + &b
        }
        let mut trie: RadixTrie<String> = RadixTrie::new(CaseMode::Ordinal);
        trie.add("api", "a".to_string(), concat);
        trie.add("api", "b".to_string(), concat);

        let found: Vec<String> = trie.search("api/v1").cloned().collect();
        assert_eq!(vec!["a,b".to_string()], found);
    }

    #[test]
    fn test_catch_all_yielded_last() {
        let mut trie = RadixTrie::new(CaseMode::Ordinal);
        trie.add("", "fallback", keep_first);
        trie.add("svc", "svc", keep_first);

        assert_eq!(vec!["svc", "fallback"], collect(&trie, "svc.local"));
        assert_eq!(vec!["fallback"], collect(&trie, "unrelated"));
        assert_eq!(vec!["fallback"], collect(&trie, ""));
    }

    #[test]
    fn test_ignore_case_mode() {
        let mut trie = RadixTrie::new(CaseMode::IgnoreCase);
        trie.add("Svc.Local", "v", keep_first);

        assert_eq!(vec!["v"], collect(&trie, "svc.LOCAL.example"));
        assert_eq!(vec!["v"], collect(&trie, "SVC.local"));
    }

    #[test]
    fn test_search_counter() {
        let mut trie = RadixTrie::new(CaseMode::Ordinal);
        trie.add("svc", "v", keep_first);
        assert_eq!(0, trie.search_count());

        let _ = collect(&trie, "svc.local");
        let _ = collect(&trie, "svc.local");
        assert_eq!(2, trie.search_count());
    }

    #[test]
    fn test_multibyte_labels() {
        let mut trie = RadixTrie::new(CaseMode::Ordinal);
        trie.add("héllo", "a", keep_first);
        trie.add("héllp", "b", keep_first);

        assert_eq!(vec!["a"], collect(&trie, "héllo-world"));
        assert_eq!(vec!["b"], collect(&trie, "héllp"));
    }

    #[test]
    fn test_empty_trie() {
        let trie: RadixTrie<&'static str> = RadixTrie::default();
        assert_eq!(true, trie.is_empty());
        assert_eq!(Vec::<&str>::new(), collect(&trie, "anything"));
    }
}
