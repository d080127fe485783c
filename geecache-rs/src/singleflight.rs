//! Collapses concurrent identical operations into a single execution.
//!
//! When a popular key is missing in the cache, many requests for it arrive at nearly the same
//! time. Without coordination each of them would hit the data source (this is known as
//! **cache stampede**). A [SingleFlight] ensures that for a given key only one task is executed
//! at any time. All callers which arrive while the task is running simply await its result.
//!
//! Note that results are not kept once the task has completed. The next call for the same key
//! executes the task again. Therefore this doesn't help against requests for keys which never
//! exist (**cache penetration**).
//!
//! # Example
//! ```
//! # use geecache::singleflight::SingleFlight;
//! # #[tokio::main]
//! # async fn main() {
//! let flight = SingleFlight::new();
//!
//! let value = flight.work("Tom", || async { 630 }).await;
//! assert_eq!(value, 630);
//! # }
//! ```
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;

/// Keeps track of all operations which are currently in flight.
///
/// Each record is a watch channel which is completed with the result of the task. The lock only
/// protects the table of records and is never held while a task runs.
pub struct SingleFlight<T> {
    calls: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

/// Determines what a caller of [SingleFlight::work] has to do.
enum Role<T> {
    /// No task was in flight, the caller has to execute it and publish the result.
    Leader(watch::Sender<Option<T>>),
    /// Another caller is already executing the task, the result has to be awaited.
    Follower(watch::Receiver<Option<T>>),
}

/// Removes the record of a call once its leader completes or is dropped.
struct CallGuard<'a, T> {
    flight: &'a SingleFlight<T>,
    key: &'a str,
}

impl<T> Drop for CallGuard<'_, T> {
    fn drop(&mut self) {
        let _ = self.flight.calls.lock().unwrap().remove(self.key);
    }
}

impl<T: Clone> SingleFlight<T> {
    /// Creates a new and empty coordinator.
    pub fn new() -> Self {
        SingleFlight {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Executes the given task unless a task for the same key is already in flight.
    ///
    /// If another caller is currently executing a task for **key**, its result is awaited and a
    /// clone of it is returned. Otherwise the given task is executed by this caller and its
    /// result is handed to all callers which joined in the meantime.
    ///
    /// If the executing caller is dropped before its task completes, the callers which joined
    /// it retry and one of them executes its own task.
    pub async fn work<F, Fut>(&self, key: &str, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let sender = loop {
            let mut receiver = match self.join(key) {
                Role::Leader(sender) => break sender,
                Role::Follower(receiver) => receiver,
            };

            if let Ok(result) = receiver.wait_for(Option::is_some).await {
                if let Some(value) = result.as_ref() {
                    return value.clone();
                }
            }

            log::debug!(
                "The task computing '{}' was aborted. Re-attempting the operation...",
                key
            );
        };

        let _guard = CallGuard { flight: self, key };
        let value = task().await;
        let _ = sender.send_replace(Some(value.clone()));

        value
    }

    /// Either registers a new call record for the given key or joins the one in flight.
    fn join(&self, key: &str) -> Role<T> {
        let mut calls = self.calls.lock().unwrap();
        if let Some(receiver) = calls.get(key) {
            return Role::Follower(receiver.clone());
        }

        let (sender, receiver) = watch::channel(None);
        let _ = calls.insert(key.to_owned(), receiver);

        Role::Leader(sender)
    }

    /// Returns the number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        SingleFlight::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::singleflight::SingleFlight;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn concurrent_calls_are_collapsed() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let flight = Arc::new(SingleFlight::new());
            let counter = Arc::new(AtomicUsize::new(0));

            let mut tasks = Vec::new();
            for _ in 0..32 {
                let flight = flight.clone();
                let counter = counter.clone();
                tasks.push(tokio::spawn(async move {
                    flight
                        .work("Tom", || async move {
                            let invocation = counter.fetch_add(1, Ordering::SeqCst) + 1;
                            tokio::time::sleep(Duration::from_millis(250)).await;
                            format!("630 (invocation {})", invocation)
                        })
                        .await
                }));
            }

            for task in tasks {
                assert_eq!(task.await.unwrap(), "630 (invocation 1)");
            }

            assert_eq!(counter.load(Ordering::SeqCst), 1);
            assert_eq!(flight.in_flight(), 0);
        });
    }

    #[test]
    fn results_are_not_cached() {
        crate::testing::test_async(async {
            let flight = SingleFlight::new();
            let counter = AtomicUsize::new(0);

            for expected in 1..=3 {
                let value = flight
                    .work("Tom", || async { counter.fetch_add(1, Ordering::SeqCst) + 1 })
                    .await;
                assert_eq!(value, expected);
                assert_eq!(flight.in_flight(), 0);
            }
        });
    }

    #[test]
    fn errors_are_shared_by_all_callers() {
        crate::testing::test_async(async {
            let flight: Arc<SingleFlight<Result<String, String>>> = Arc::new(SingleFlight::new());

            let leader_flight = flight.clone();
            let leader = tokio::spawn(async move {
                leader_flight
                    .work("Jack", || async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Err("Jack not exist".to_owned())
                    })
                    .await
            });

            // Give the leader a chance to register its call...
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(flight.in_flight(), 1);

            let follower = flight
                .work("Jack", || async { Ok("unexpected".to_owned()) })
                .await;

            assert_eq!(follower, Err("Jack not exist".to_owned()));
            assert_eq!(leader.await.unwrap(), Err("Jack not exist".to_owned()));
        });
    }

    #[test]
    fn different_keys_run_in_parallel() {
        crate::testing::test_async(async {
            let flight = Arc::new(SingleFlight::new());
            let counter = Arc::new(AtomicUsize::new(0));

            let mut tasks = Vec::new();
            for key in ["Tom", "Jack", "Sam"] {
                let flight = flight.clone();
                let counter = counter.clone();
                tasks.push(tokio::spawn(async move {
                    flight
                        .work(key, || async move {
                            let _ = counter.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            key.len()
                        })
                        .await
                }));
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(flight.in_flight(), 3);

            for task in tasks {
                let _ = task.await.unwrap();
            }
            assert_eq!(counter.load(Ordering::SeqCst), 3);
        });
    }

    #[test]
    fn aborted_leaders_hand_over_to_their_followers() {
        crate::testing::test_async(async {
            let flight = Arc::new(SingleFlight::new());

            let leader_flight = flight.clone();
            let leader = tokio::spawn(async move {
                leader_flight
                    .work("Tom", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        "leader"
                    })
                    .await
            });
            tokio::time::sleep(Duration::from_millis(10)).await;

            let follower_flight = flight.clone();
            let follower = tokio::spawn(async move {
                follower_flight
                    .work("Tom", || async { "follower" })
                    .await
            });
            tokio::time::sleep(Duration::from_millis(10)).await;

            // Killing the leader removes its record and wakes up the follower which then
            // executes its own task...
            leader.abort();
            assert_eq!(follower.await.unwrap(), "follower");
            assert_eq!(flight.in_flight(), 0);
        });
    }
}
