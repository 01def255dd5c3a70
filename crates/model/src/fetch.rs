//! Memoized backend fetches
//!
//! A [`Memo`] holds the state of one cacheable slot on a tree node: nothing fetched yet, a fetch in
//! flight, or a resolved value. Callers that arrive while a fetch is in flight await the same shared
//! future, so a node never has more than one outstanding request. Clearing the slot does not cancel
//! an in-flight fetch; its result is discarded when it arrives.
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::{self, BoxFuture, FutureExt, Shared};

/// Lock a mutex, recovering the guard if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) type SharedFetch<T> = Shared<BoxFuture<'static, T>>;

enum FetchState<T: Clone> {
    Unfetched,
    Pending { id: u64, fetch: SharedFetch<T> },
    Resolved(T),
}

struct Slot<T: Clone> {
    state: FetchState<T>,
    /// Last value a current fetch resolved to, kept while an extension is in flight
    last_resolved: Option<T>,
    /// Bumped on every clear
    generation: u64,
    next_fetch_id: u64,
}

impl<T: Clone> Slot<T> {
    fn start(&mut self, fetch: BoxFuture<'static, T>) -> (u64, SharedFetch<T>) {
        let id = self.next_fetch_id;
        self.next_fetch_id += 1;
        let fetch = fetch.shared();
        self.state = FetchState::Pending {
            id,
            fetch: fetch.clone(),
        };
        (id, fetch)
    }
}

pub(crate) struct Memo<T: Clone> {
    slot: Mutex<Slot<T>>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                state: FetchState::Unfetched,
                last_resolved: None,
                generation: 0,
                next_fetch_id: 0,
            }),
        }
    }

    /// Incremented each time the slot is cleared; fetches compare it before writing side state
    pub(crate) fn generation(&self) -> u64 {
        lock(&self.slot).generation
    }

    pub(crate) fn cached(&self) -> Option<T> {
        lock(&self.slot).last_resolved.clone()
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        matches!(lock(&self.slot).state, FetchState::Pending { .. })
    }

    pub(crate) fn clear(&self) {
        let mut slot = lock(&self.slot);
        slot.generation += 1;
        slot.state = FetchState::Unfetched;
        slot.last_resolved = None;
    }

    /// Return the cached value, join the fetch in flight, or start `fetch`.
    ///
    /// `fetch` receives the slot generation it was started under.
    pub(crate) async fn get_or_fetch<F>(&self, fetch: F) -> T
    where
        F: FnOnce(u64) -> BoxFuture<'static, T>,
    {
        let (id, pending) = {
            let mut slot = lock(&self.slot);
            if let FetchState::Resolved(value) = &slot.state {
                tracing::trace!("serving cached value");
                return value.clone();
            }
            if let FetchState::Pending { id, fetch } = &slot.state {
                tracing::trace!(fetch = id, "joining fetch in flight");
                (*id, fetch.clone())
            } else {
                let generation = slot.generation;
                slot.start(fetch(generation))
            }
        };

        self.settle(id, pending).await
    }

    /// Chain `extend` after the current (pending or resolved) value, or start `fetch` when the slot
    /// is empty. The chained future replaces the slot's pending fetch.
    pub(crate) async fn extend<F, E>(&self, fetch: F, extend: E) -> T
    where
        F: FnOnce(u64) -> BoxFuture<'static, T>,
        E: FnOnce(BoxFuture<'static, T>, u64) -> BoxFuture<'static, T>,
    {
        let (id, pending) = {
            let mut slot = lock(&self.slot);
            let generation = slot.generation;
            let previous = match std::mem::replace(&mut slot.state, FetchState::Unfetched) {
                FetchState::Unfetched => None,
                FetchState::Pending { fetch, .. } => Some(fetch.boxed()),
                FetchState::Resolved(value) => Some(future::ready(value).boxed()),
            };
            let next = match previous {
                Some(previous) => extend(previous, generation),
                None => fetch(generation),
            };
            slot.start(next)
        };

        self.settle(id, pending).await
    }

    async fn settle(&self, id: u64, pending: SharedFetch<T>) -> T {
        let value = pending.await;

        let mut slot = lock(&self.slot);
        let current = matches!(&slot.state, FetchState::Pending { id: current, .. } if *current == id);
        if current {
            slot.state = FetchState::Resolved(value.clone());
            slot.last_resolved = Some(value.clone());
        } else if !matches!(slot.state, FetchState::Resolved(_)) {
            tracing::debug!(fetch = id, "discarding stale fetch result");
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use futures::FutureExt;
    use tokio::sync::oneshot;

    use super::*;

    fn counted(calls: &Arc<AtomicUsize>, value: u32) -> BoxFuture<'static, u32> {
        calls.fetch_add(1, Ordering::SeqCst);
        future::ready(value).boxed()
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let memo = Memo::new();
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(memo.get_or_fetch(|_| counted(&calls, 1)).await, 1);
        assert_eq!(memo.get_or_fetch(|_| counted(&calls, 2)).await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.cached(), Some(1));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let memo = Memo::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<u32>();

        let first = memo.get_or_fetch(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            rx.map(|r| r.unwrap_or_default()).boxed()
        });
        let second = memo.get_or_fetch(|_| counted(&calls, 99));
        let release = async move {
            tokio::task::yield_now().await;
            let _ = tx.send(5);
        };

        let (a, b, ()) = tokio::join!(first, second, release);
        assert_eq!((a, b), (5, 5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cleared_slot_discards_late_result() {
        let memo = Arc::new(Memo::new());
        let (tx, rx) = oneshot::channel::<u32>();

        let task = {
            let memo = Arc::clone(&memo);
            tokio::spawn(async move {
                memo.get_or_fetch(|_| rx.map(|r| r.unwrap_or_default()).boxed())
                    .await
            })
        };
        while !memo.is_pending() {
            tokio::task::yield_now().await;
        }

        memo.clear();
        tx.send(3).unwrap();
        assert_eq!(task.await.unwrap(), 3);
        assert_eq!(memo.cached(), None);
        assert_eq!(memo.generation(), 1);
    }

    #[tokio::test]
    async fn extend_chains_after_cached_value() {
        let memo: Memo<Vec<u32>> = Memo::new();
        memo.get_or_fetch(|_| future::ready(vec![1, 2]).boxed()).await;

        let extended = memo
            .extend(
                |_| future::ready(vec![]).boxed(),
                |previous, _| {
                    async move {
                        let mut values = previous.await;
                        values.push(3);
                        values
                    }
                    .boxed()
                },
            )
            .await;
        assert_eq!(extended, vec![1, 2, 3]);
        assert_eq!(memo.cached(), Some(vec![1, 2, 3]));
    }
}
