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

use super::LOG_CATEGORY;
use ahash::AHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tinyufo::TinyUfo;
use tokio::sync::Notify;
use tracing::debug;

/// Poll interval of synchronous callers waiting on a racing population.
const WAIT_POLL_INTERVAL: Duration = Duration::from_micros(50);

/// One in-flight population. The owner computes exactly once and completes
/// the cell; everyone else only observes it.
struct Flight<V> {
    value: OnceLock<V>,
    /// Set when the flight is over, value present or not. A finished flight
    /// with an empty cell means the owner unwound, waiters must resolve on
    /// their own.
    done: AtomicBool,
    notify: Notify,
}

impl<V> Flight<V> {
    fn new() -> Self {
        Self {
            value: OnceLock::new(),
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }
}

enum Role<V> {
    Owner(Arc<Flight<V>>),
    Waiter(Arc<Flight<V>>),
    /// The key was resolved between the caller's cache miss and its join.
    Resolved(V),
}

/// Bounded key/value cache with single-flight population.
///
/// Resolved keys are served from a TinyUfo without blocking. A missing key is
/// populated by exactly one caller; concurrent callers of the same key join
/// the in-flight computation and observe its value, while distinct keys
/// proceed independently. The computation itself is synchronous, so once
/// started it always runs to completion; cancelling an asynchronous waiter
/// aborts only that waiter.
pub(crate) struct SingleFlight<V> {
    resolved: TinyUfo<String, V>,
    pending: Mutex<AHashMap<String, Arc<Flight<V>>>>,
    /// Decides whether a computed value is worth keeping in `resolved`.
    admit: fn(&V) -> bool,
    populate_timeout: Duration,
}

impl<V> SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        capacity: usize,
        populate_timeout: Duration,
        admit: fn(&V) -> bool,
    ) -> Self {
        Self {
            resolved: TinyUfo::new(capacity, capacity),
            pending: Mutex::new(AHashMap::new()),
            admit,
            populate_timeout,
        }
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<V> {
        self.resolved.get(&key.to_string())
    }

    fn join(&self, key: &str) -> Option<Role<V>> {
        let mut pending = self.pending.lock().ok()?;
        if let Some(flight) = pending.get(key) {
            return Some(Role::Waiter(flight.clone()));
        }
        // an owner stores its value before releasing the flight, so a
        // re-check under the lock closes the window between the caller's
        // cache miss and its join
        if let Some(hit) = self.get(key) {
            return Some(Role::Resolved(hit));
        }
        let flight = Arc::new(Flight::new());
        pending.insert(key.to_string(), flight.clone());
        Some(Role::Owner(flight))
    }

    /// Runs the population as the flight owner. The guard releases the
    /// flight even if `compute` unwinds, so waiters never hang on a dead
    /// owner.
    fn run<F>(&self, key: &str, flight: &Flight<V>, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        let _cleanup = scopeguard::guard((), |_| {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(key);
            }
            flight.done.store(true, Ordering::Release);
            flight.notify.notify_waiters();
        });
        let value = compute();
        if (self.admit)(&value) {
            self.resolved.put(key.to_string(), value.clone(), 1);
        }
        let _ = flight.value.set(value.clone());
        value
    }

    /// Returns the cached value for `key`, or populates it via `compute`
    /// with at most one computation shared by all concurrent callers.
    pub async fn get_or_populate<F>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(hit) = self.get(key) {
            return hit;
        }
        match self.join(key) {
            // lock poisoned, resolve uncoordinated
            None => compute(),
            Some(Role::Resolved(value)) => value,
            Some(Role::Owner(flight)) => self.run(key, &flight, compute),
            Some(Role::Waiter(flight)) => loop {
                let mut wake = std::pin::pin!(flight.notify.notified());
                // register before checking, the owner may finish in between
                wake.as_mut().enable();
                if let Some(value) = flight.value.get() {
                    return value.clone();
                }
                if flight.done.load(Ordering::Acquire) {
                    return compute();
                }
                wake.await;
            },
        }
    }

    /// Synchronous counterpart of [`get_or_populate`]. A caller racing an
    /// in-flight population waits at most `populate_timeout`, then resolves
    /// uncached rather than blocking indefinitely.
    pub fn get_or_populate_sync<F>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(hit) = self.get(key) {
            return hit;
        }
        match self.join(key) {
            None => compute(),
            Some(Role::Resolved(value)) => value,
            Some(Role::Owner(flight)) => self.run(key, &flight, compute),
            Some(Role::Waiter(flight)) => {
                let deadline = Instant::now() + self.populate_timeout;
                loop {
                    if let Some(value) = flight.value.get() {
                        return value.clone();
                    }
                    if flight.done.load(Ordering::Acquire) {
                        return compute();
                    }
                    if Instant::now() >= deadline {
                        debug!(
                            category = LOG_CATEGORY,
                            key,
                            "population wait timed out, resolving uncached"
                        );
                        return compute();
                    }
                    std::thread::sleep(WAIT_POLL_INTERVAL);
                }
            },
        }
    }
}
