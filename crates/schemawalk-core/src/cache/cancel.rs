//! Cooperative cancellation token.
//!
//! Cancelling is a one-way latch: once [`CancellationToken::cancel`] has
//! been called, [`CancellationToken::is_cancelled`] stays `true` and every
//! pending [`Cancelled`] future completes. Clones share the latch.
//!
//! Each [`Cancelled`] future owns one waiter slot on the latch. The slot is
//! released when the future is dropped, so a long-lived token shared by many
//! short waits only holds wakers for the waits still in progress.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

#[derive(Debug, Default)]
struct Latch {
    cancelled: AtomicBool,
    next_slot: AtomicU64,
    waiters: Mutex<HashMap<u64, Waker>>,
}

impl Latch {
    fn waiters(&self) -> MutexGuard<'_, HashMap<u64, Waker>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared cancellation flag with async notification.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    latch: Arc<Latch>,
}

impl CancellationToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch and wake every waiter.
    pub fn cancel(&self) {
        if self.latch.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let waiters = std::mem::take(&mut *self.latch.waiters());
        for waker in waiters.into_values() {
            waker.wake();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.latch.cancelled.load(Ordering::SeqCst)
    }

    /// A future that completes once the token is cancelled.
    #[must_use]
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            token: self.clone(),
            slot: None,
        }
    }

    /// Wakers currently registered by pending [`Cancelled`] futures.
    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.latch.waiters().len()
    }
}

/// Future returned by [`CancellationToken::cancelled`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Cancelled {
    token: CancellationToken,
    /// Waiter slot, taken on first pending poll.
    slot: Option<u64>,
}

impl Future for Cancelled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.token.is_cancelled() {
            return Poll::Ready(());
        }

        let latch = &this.token.latch;
        let slot = *this
            .slot
            .get_or_insert_with(|| latch.next_slot.fetch_add(1, Ordering::Relaxed));
        latch
            .waiters()
            .entry(slot)
            .and_modify(|waker| waker.clone_from(cx.waker()))
            .or_insert_with(|| cx.waker().clone());

        // cancel() may have run between the first check and registration.
        if this.token.is_cancelled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for Cancelled {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.token.latch.waiters().remove(&slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancelled().now_or_never().is_none());
    }

    #[test]
    fn clones_share_the_latch() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(token.cancelled().now_or_never().is_some());
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn dropped_wait_releases_its_waker() {
        let token = CancellationToken::new();
        let mut pending = token.cancelled();
        assert!((&mut pending).now_or_never().is_none());
        assert!((&mut pending).now_or_never().is_none());
        assert_eq!(token.waiter_count(), 1);

        drop(pending);
        assert_eq!(token.waiter_count(), 0);
    }

    #[tokio::test]
    async fn pending_waiter_is_woken() {
        let token = CancellationToken::new();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.cancelled().await }
        });
        tokio::task::yield_now().await;
        token.cancel();
        waiter.await.unwrap();
        assert_eq!(token.waiter_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn timed_out_waits_do_not_accumulate() {
        let token = CancellationToken::new();
        let mut handles = Vec::new();
        for _ in 0..200 {
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                tokio::time::timeout(Duration::from_millis(5), token.cancelled()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        assert_eq!(token.waiter_count(), 0);
        assert!(!token.is_cancelled());
    }
}
