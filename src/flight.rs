//! Per-key single-flight.
//!
//! When several threads ask for the same key while a build is running, only
//! the first (the *leader*) runs the build closure. The others block on the
//! in-flight call and receive a clone of the leader's result, success or
//! error alike. Once the leader finishes, the key is forgotten: a later
//! request starts a fresh flight (normally it hits the response cache first).
//!
//! If the leader panics, waiters get [`Abandoned`] instead of blocking forever.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("in-flight build was abandoned by its leader")]
pub struct Abandoned;

/// How a caller obtained its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<V> {
    /// This caller ran the build.
    Led(V),
    /// This caller waited for another caller's build.
    Joined(V),
}

impl<V> Outcome<V> {
    pub fn into_inner(self) -> V {
        match self {
            Outcome::Led(v) | Outcome::Joined(v) => v,
        }
    }

    pub fn was_shared(&self) -> bool {
        matches!(self, Outcome::Joined(_))
    }
}

enum State<V> {
    Pending,
    Done(V),
    Abandoned,
}

struct Call<V> {
    state: Mutex<State<V>>,
    cv: Condvar,
}

impl<V: Clone> Call<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending),
            cv: Condvar::new(),
        }
    }

    fn finish(&self, state: State<V>) {
        *lock(&self.state) = state;
        self.cv.notify_all();
    }

    fn wait(&self) -> Result<V, Abandoned> {
        let mut guard = lock(&self.state);
        loop {
            match &*guard {
                State::Pending => {
                    guard = self.cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
                }
                State::Done(v) => return Ok(v.clone()),
                State::Abandoned => return Err(Abandoned),
            }
        }
    }
}

/// Deduplicates concurrent builds keyed by `K`.
pub struct SingleFlight<K, V> {
    calls: Mutex<HashMap<K, Arc<Call<V>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> SingleFlight<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `build` for `key` unless a build for it is already in flight, in
    /// which case wait for that one and return its value.
    pub fn run<F>(&self, key: &K, build: F) -> Result<Outcome<V>, Abandoned>
    where
        F: FnOnce() -> V,
    {
        let (call, leader) = {
            let mut calls = lock(&self.calls);
            match calls.get(key) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let call = Arc::new(Call::new());
                    calls.insert(key.clone(), Arc::clone(&call));
                    (call, true)
                }
            }
        };

        if !leader {
            return call.wait().map(Outcome::Joined);
        }

        let mut guard = LeaderGuard {
            flights: self,
            key,
            call: &call,
            finished: false,
        };
        let value = build();
        guard.complete(value.clone());
        Ok(Outcome::Led(value))
    }

    /// Number of keys with a build currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.calls).len()
    }

    fn forget(&self, key: &K) {
        lock(&self.calls).remove(key);
    }
}

/// Publishes the leader's result, or `Abandoned` if the leader unwinds.
struct LeaderGuard<'a, K: Eq + Hash + Clone, V: Clone> {
    flights: &'a SingleFlight<K, V>,
    key: &'a K,
    call: &'a Call<V>,
    finished: bool,
}

impl<K: Eq + Hash + Clone, V: Clone> LeaderGuard<'_, K, V> {
    fn complete(&mut self, value: V) {
        // Forget first so a caller arriving after this point starts a new
        // flight instead of joining a finished one.
        self.flights.forget(self.key);
        self.call.finish(State::Done(value));
        self.finished = true;
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        if !self.finished {
            self.flights.forget(self.key);
            self.call.finish(State::Abandoned);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn single_caller_leads() {
        let flights: SingleFlight<String, u32> = SingleFlight::new();
        let outcome = flights.run(&"k".to_string(), || 7).unwrap();
        assert_eq!(outcome, Outcome::Led(7));
        assert_eq!(flights.in_flight(), 0);
    }

    #[test]
    fn concurrent_callers_share_one_build() {
        const CALLERS: usize = 16;
        let flights: Arc<SingleFlight<String, Result<String, String>>> =
            Arc::new(SingleFlight::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(CALLERS));

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let flights = Arc::clone(&flights);
                let builds = Arc::clone(&builds);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    flights
                        .run(&"same".to_string(), || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(200));
                            Ok("bytes".to_string())
                        })
                        .unwrap()
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.iter().filter(|o| !o.was_shared()).count(), 1);
        for outcome in outcomes {
            assert_eq!(outcome.into_inner(), Ok("bytes".to_string()));
        }
    }

    #[test]
    fn errors_are_shared_too() {
        let flights: Arc<SingleFlight<u32, Result<(), String>>> = Arc::new(SingleFlight::new());
        let barrier = Arc::new(Barrier::new(2));

        let leader = {
            let flights = Arc::clone(&flights);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                flights
                    .run(&1, || {
                        barrier.wait();
                        thread::sleep(Duration::from_millis(200));
                        Err("tool failed".to_string())
                    })
                    .unwrap()
            })
        };

        barrier.wait();
        let joined = flights.run(&1, || Ok(())).unwrap();
        assert!(joined.was_shared());
        assert_eq!(joined.into_inner(), Err("tool failed".to_string()));
        assert_eq!(leader.join().unwrap().into_inner(), Err("tool failed".to_string()));
    }

    #[test]
    fn distinct_keys_do_not_block_each_other() {
        let flights: SingleFlight<u32, u32> = SingleFlight::new();
        let a = flights.run(&1, || flights.run(&2, || 2).unwrap().into_inner() + 1);
        assert_eq!(a.unwrap(), Outcome::Led(3));
    }

    #[test]
    fn key_is_released_after_completion() {
        let flights: SingleFlight<u32, u32> = SingleFlight::new();
        assert_eq!(flights.run(&1, || 1).unwrap(), Outcome::Led(1));
        assert_eq!(flights.run(&1, || 2).unwrap(), Outcome::Led(2));
    }

    #[test]
    fn panicking_leader_abandons_waiters() {
        let flights: Arc<SingleFlight<u32, u32>> = Arc::new(SingleFlight::new());
        let barrier = Arc::new(Barrier::new(2));

        let leader = {
            let flights = Arc::clone(&flights);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let _ = flights.run(&9, || -> u32 {
                    barrier.wait();
                    thread::sleep(Duration::from_millis(200));
                    panic!("leader died");
                });
            })
        };

        barrier.wait();
        assert_eq!(flights.run(&9, || 0), Err(Abandoned));
        assert!(leader.join().is_err());
        assert_eq!(flights.in_flight(), 0);
    }
}
