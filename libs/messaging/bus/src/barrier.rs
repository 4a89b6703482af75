//! # Barrier - Fan-In Synchronizer
//!
//! ## Purpose
//!
//! Collects responses from a fan-out ("ask every live node, wait up to T for
//! whichever subset replies") and runs a completion closure exactly once,
//! when either the expected number of calls has arrived or the timeout
//! elapses.
//!
//! ```text
//!             call(a) ─┐
//!             call(b) ─┼─► responses [a, b, c] ─► on_complete(vec)   (once)
//!             call(c) ─┘          ▲
//!   timer (optional) ─────────────┘
//! ```
//!
//! Responses are delivered in arrival order. Calls after completion are
//! accepted and ignored. When the count path fires first the timer task is
//! aborted.
//!
//! A barrier must be created inside a tokio runtime when it has a timeout.

use crate::error::{BusError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Completion condition. At least one of the two must be set.
///
/// `callbacks == Some(0)` fires on the first call (or the timeout).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarrierConfig {
    pub timeout: Option<Duration>,
    pub callbacks: Option<usize>,
}

impl BarrierConfig {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            callbacks: None,
        }
    }

    pub fn callbacks(callbacks: usize) -> Self {
        Self {
            timeout: None,
            callbacks: Some(callbacks),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_callbacks(mut self, callbacks: usize) -> Self {
        self.callbacks = Some(callbacks);
        self
    }
}

type Completion<T> = Box<dyn FnOnce(Vec<T>) + Send>;

struct State<T> {
    remaining: Option<usize>,
    responses: Vec<T>,
    completion: Option<Completion<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T> Inner<T> {
    /// Take the completion and the responses if the barrier has not fired
    fn take(&self) -> Option<(Completion<T>, Vec<T>)> {
        let mut state = self.state.lock();
        let completion = state.completion.take()?;
        Some((completion, std::mem::take(&mut state.responses)))
    }
}

pub struct Barrier<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Barrier<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Barrier<T> {
    pub fn new<F>(config: BarrierConfig, on_complete: F) -> Result<Self>
    where
        F: FnOnce(Vec<T>) + Send + 'static,
    {
        if config.timeout.is_none() && config.callbacks.is_none() {
            return Err(BusError::InvalidBarrier(
                "either a timeout or a callback count is required".to_string(),
            ));
        }

        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                remaining: config.callbacks,
                responses: Vec::new(),
                completion: Some(Box::new(on_complete)),
            }),
            timer: Mutex::new(None),
        });

        if let Some(timeout) = config.timeout {
            let timer_inner = inner.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some((completion, responses)) = timer_inner.take() {
                    debug!(?timeout, responses = responses.len(), "Barrier fired on timeout");
                    completion(responses);
                }
                timer_inner.timer.lock().take();
            });
            *inner.timer.lock() = Some(handle);
        }

        Ok(Self { inner })
    }

    /// Barrier whose collected responses arrive on a oneshot receiver
    pub fn channel(config: BarrierConfig) -> Result<(Self, oneshot::Receiver<Vec<T>>)> {
        let (tx, rx) = oneshot::channel();
        let barrier = Self::new(config, move |responses| {
            let _ = tx.send(responses);
        })?;
        Ok((barrier, rx))
    }

    /// Record one response. Ignored once the barrier has fired.
    pub fn call(&self, value: T) {
        let fired = {
            let mut state = self.inner.state.lock();
            if state.completion.is_none() {
                return;
            }
            state.responses.push(value);
            match state.remaining.as_mut() {
                Some(remaining) => {
                    *remaining = remaining.saturating_sub(1);
                    if *remaining == 0 {
                        let completion = state.completion.take();
                        let responses = std::mem::take(&mut state.responses);
                        completion.map(|c| (c, responses))
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some((completion, responses)) = fired {
            if let Some(timer) = self.inner.timer.lock().take() {
                timer.abort();
            }
            debug!(responses = responses.len(), "Barrier fired on count");
            completion(responses);
        }
    }

    pub fn is_fired(&self) -> bool {
        self.inner.state.lock().completion.is_none()
    }

    /// Responses accumulated so far (zero once fired)
    pub fn pending_responses(&self) -> usize {
        self.inner.state.lock().responses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_pending, assert_ready};

    fn counting<T: Send + 'static>(
        config: BarrierConfig,
    ) -> (Barrier<T>, Arc<AtomicUsize>, Arc<Mutex<Vec<T>>>) {
        let fires = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (f, s) = (fires.clone(), seen.clone());
        let barrier = Barrier::new(config, move |responses| {
            f.fetch_add(1, Ordering::SeqCst);
            *s.lock() = responses;
        })
        .unwrap();
        (barrier, fires, seen)
    }

    #[test]
    fn test_requires_timeout_or_count() {
        let result = Barrier::<u32>::new(BarrierConfig::default(), |_| {});
        assert!(matches!(result, Err(BusError::InvalidBarrier(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_on_count_in_arrival_order() {
        let config = BarrierConfig::callbacks(3).with_timeout(Duration::from_secs(2));
        let (barrier, fires, seen) = counting(config);

        barrier.call("b");
        barrier.call("a");
        assert!(!barrier.is_fired());
        barrier.call("c");
        barrier.call("late");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec!["b", "a", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_on_timeout_with_partial_responses() {
        let config = BarrierConfig::callbacks(3).with_timeout(Duration::from_secs(2));
        let (barrier, fires, seen) = counting(config);

        barrier.call(1);
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![1]);

        barrier.call(2);
        barrier.call(3);
        assert_eq!(fires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_only_collects_everything() {
        let (barrier, rx) = Barrier::channel(BarrierConfig::timeout(Duration::from_secs(1))).unwrap();
        for i in 0..5 {
            barrier.call(i);
        }
        assert_eq!(rx.await.unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_no_calls_delivers_empty_list() {
        let (_barrier, rx) = Barrier::<u8>::channel(BarrierConfig::timeout(Duration::from_millis(10))).unwrap();
        assert!(rx.await.unwrap().is_empty());
    }

    #[test]
    fn test_zero_callbacks_fires_on_first_call() {
        let (barrier, fires, seen) = counting(BarrierConfig::callbacks(0));
        barrier.call(7);
        barrier.call(8);
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn test_channel_stays_pending_until_count_reached() {
        let (barrier, rx) = Barrier::channel(BarrierConfig::callbacks(2)).unwrap();
        let mut responses = tokio_test::task::spawn(rx);
        assert_pending!(responses.poll());

        barrier.call("n1");
        assert_pending!(responses.poll());

        barrier.call("n2");
        assert!(responses.is_woken());
        assert_eq!(assert_ready!(responses.poll()).unwrap(), vec!["n1", "n2"]);
    }

    #[tokio::test]
    async fn test_concurrent_calls_fire_exactly_once() {
        let (barrier, fires, seen) = counting(BarrierConfig::callbacks(50));
        let mut handles = Vec::new();
        for i in 0..100 {
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move { barrier.call(i) }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(fires.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().len(), 50);
    }
}
