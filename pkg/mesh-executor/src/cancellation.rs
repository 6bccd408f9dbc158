//! Cancellation primitives, adapted from the teacher's
//! `executor::cancellation` module onto `event-listener` (the notification
//! primitive `async-std` itself is built on) instead of the teacher's custom
//! raw-waker executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use event_listener::Event;

#[async_trait::async_trait]
pub trait CancellationToken: Send + Sync + 'static {
    async fn is_cancelled(&self) -> bool;
    async fn wait_for_cancellation(&self);
}

/// A token that can be triggered exactly once, waking every waiter.
pub struct TriggerableCancellationToken {
    cancelled: AtomicBool,
    event: Event,
}

impl Default for TriggerableCancellationToken {
    fn default() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            event: Event::new(),
        }
    }
}

impl TriggerableCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn trigger(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.event.notify(usize::MAX);
    }
}

#[async_trait::async_trait]
impl CancellationToken for TriggerableCancellationToken {
    async fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn wait_for_cancellation(&self) {
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return;
            }
            let listener = self.event.listen();
            if self.cancelled.load(Ordering::SeqCst) {
                return;
            }
            listener.await;
        }
    }
}

/// A token which is already cancelled, used when a resource is dropped
/// without ever wiring up a real cancellation source (mirrors the teacher's
/// `AlreadyCancelledToken`).
#[derive(Default)]
pub struct AlreadyCancelledToken;

#[async_trait::async_trait]
impl CancellationToken for AlreadyCancelledToken {
    async fn is_cancelled(&self) -> bool {
        true
    }

    async fn wait_for_cancellation(&self) {}
}

/// Collection of tokens which must ALL be cancelled for the set itself to be
/// considered cancelled (mirrors `CancellationTokenSet`): used when a resource
/// has several independent shutdown triggers (parent group cancellation,
/// local error, operator-issued stop) and should only stop once every trigger
/// has fired.
#[derive(Default)]
pub struct CancellationTokenSet {
    inner: async_std::sync::Mutex<Vec<Arc<dyn CancellationToken>>>,
    event: Event,
}

impl CancellationTokenSet {
    pub async fn add(&self, token: Arc<dyn CancellationToken>) {
        let mut list = self.inner.lock().await;
        list.push(token);
        self.event.notify(usize::MAX);
    }
}

#[async_trait::async_trait]
impl CancellationToken for CancellationTokenSet {
    async fn is_cancelled(&self) -> bool {
        let list = self.inner.lock().await;
        if list.is_empty() {
            return false;
        }
        for token in list.iter() {
            if !token.is_cancelled().await {
                return false;
            }
        }
        true
    }

    async fn wait_for_cancellation(&self) {
        loop {
            let tokens: Vec<_> = {
                let list = self.inner.lock().await;
                if list.is_empty() {
                    None
                } else {
                    Some(list.clone())
                }
            }
            .unwrap_or_default();

            if tokens.is_empty() {
                let listener = self.event.listen();
                if !self.inner.lock().await.is_empty() {
                    continue;
                }
                listener.await;
                continue;
            }

            for token in &tokens {
                token.wait_for_cancellation().await;
            }
            return;
        }
    }
}
