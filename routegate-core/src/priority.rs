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

/// Candidate values registered for one key, grouped by explicit priority.
///
/// Buckets are kept sorted from the highest priority down; values within one
/// bucket keep their insertion order. Iteration therefore yields candidates
/// in the order a dispatcher should try them.
#[derive(Debug, Clone)]
pub struct PriorityBuckets<T> {
    buckets: Vec<(i32, Vec<T>)>,
}

impl<T> Default for PriorityBuckets<T> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }
}

impl<T> PriorityBuckets<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a list holding one value at the given priority.
    pub fn single(priority: i32, value: T) -> Self {
        Self {
            buckets: vec![(priority, vec![value])],
        }
    }

    /// Appends a value to the bucket for `priority`, creating the bucket if
    /// it does not exist yet.
    pub fn push(&mut self, priority: i32, value: T) {
        // buckets are sorted descending, the comparator is inverted
        match self
            .buckets
            .binary_search_by(|(p, _)| priority.cmp(p))
        {
            Ok(i) => self.buckets[i].1.push(value),
            Err(i) => self.buckets.insert(i, (priority, vec![value])),
        }
    }

    /// Unions two lists bucket-by-bucket. Values of `b` land after values of
    /// `a` within a shared bucket, preserving insertion order across both.
    ///
    /// This is the merge combinator installed for every trie insertion, so
    /// repeated prefix registrations of the same key accumulate instead of
    /// overwriting each other.
    pub fn merge(mut a: Self, b: Self) -> Self {
        for (priority, values) in b.buckets {
            match a.buckets.binary_search_by(|(p, _)| priority.cmp(p)) {
                Ok(i) => a.buckets[i].1.extend(values),
                Err(i) => a.buckets.insert(i, (priority, values)),
            }
        }
        a
    }

    /// Iterates all values, highest priority first, insertion order within a
    /// priority.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buckets.iter().flat_map(|(_, values)| values.iter())
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|(_, values)| values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl<T: Clone> PriorityBuckets<T> {
    /// Flattens the list into `out` in priority order.
    pub fn append_to(&self, out: &mut Vec<T>) {
        for (_, values) in self.buckets.iter() {
            out.extend_from_slice(values);
        }
    }
}
