//! uniflow-stream: channel-backed state streams over a uniflow store.
//!
//! [`states`] bridges a store's listener callback into a cancellable
//! stream of state values: every state the subscription observes is
//! cloned into an unbounded channel, and the returned [`StateStream`]
//! iterates over them. Because [`Store::subscribe`] delivers the current
//! state synchronously, the first element of the stream is always the
//! state at subscription time.
//!
//! The store side stays synchronous; this crate only moves values across
//! a channel. Cancellation unsubscribes from the store exactly once, no
//! matter how many times it runs or which thread runs it: the stream,
//! its [`CancelHandle`] clones, and `Drop` all race on one atomic flag.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use uniflow_store::Store;
//! use uniflow_stream::states;
//!
//! let store = Arc::new(Store::new(0));
//! let mut stream = states(&store).unwrap();
//!
//! store.dispatch(|state: &i32| state + 1).unwrap();
//! store.dispatch(|state: &i32| state + 1).unwrap();
//!
//! assert_eq!(stream.next(), Some(0));
//! assert_eq!(stream.next(), Some(1));
//! assert_eq!(stream.next(), Some(2));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use uniflow_store::{ListenerId, Store, StoreError};

/// Subscribe to `store` and return its states as a stream.
///
/// The stream's first element is the state current at subscription time;
/// after that, one element per applied action, in application order.
///
/// # Errors
///
/// Propagates a [`StoreError`] from [`Store::subscribe`]; the
/// forwarding listener itself never dispatches, so this only fails if
/// flushing actions queued by other callers hits a broken middleware.
pub fn states<S>(store: &Arc<Store<S>>) -> Result<StateStream<S>, StoreError>
where
    S: Clone + Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let listener = store.subscribe(move |state: &S| {
        // The receiver may already be gone; a failed send just means
        // nobody is listening anymore.
        let _ = sender.send(state.clone());
    })?;

    Ok(StateStream {
        receiver,
        handle: CancelHandle {
            store: Arc::clone(store),
            listener,
            cancelled: Arc::new(AtomicBool::new(false)),
        },
    })
}

/// A cancellable stream of state values from one store subscription.
///
/// Iteration blocks until the next state arrives; it ends (`None`) once
/// the subscription is cancelled and the buffered states are drained.
/// States observed before cancellation are never lost.
pub struct StateStream<S> {
    receiver: Receiver<S>,
    handle: CancelHandle<S>,
}

impl<S> StateStream<S> {
    /// Stop observing the store. Idempotent; see [`CancelHandle::cancel`].
    pub fn cancel(&self) {
        self.handle.cancel()
    }

    /// Whether this subscription has been cancelled, by whichever party.
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// A handle that can cancel this stream from another thread.
    pub fn cancel_handle(&self) -> CancelHandle<S> {
        self.handle.clone()
    }

    /// A buffered state, if one is ready; never blocks.
    pub fn try_next(&self) -> Option<S> {
        self.receiver.try_recv().ok()
    }
}

impl<S> Iterator for StateStream<S> {
    type Item = S;

    fn next(&mut self) -> Option<S> {
        self.receiver.recv().ok()
    }
}

impl<S> Drop for StateStream<S> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Cancels one stream's store subscription.
///
/// Clones share a single cancellation flag with their stream, so the
/// underlying [`Store::unsubscribe`] runs exactly once across duplicate
/// and concurrent cancellation, including the stream being dropped.
pub struct CancelHandle<S> {
    store: Arc<Store<S>>,
    listener: ListenerId,
    cancelled: Arc<AtomicBool>,
}

// Manual impl: `S` itself need not be `Clone` to clone the handle.
impl<S> Clone for CancelHandle<S> {
    fn clone(&self) -> Self {
        CancelHandle {
            store: Arc::clone(&self.store),
            listener: self.listener,
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl<S> CancelHandle<S> {
    /// Remove the stream's listener from the store.
    ///
    /// Exactly one caller wins the atomic swap and performs the
    /// unsubscribe; every other call is a no-op.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.store.unsubscribe(self.listener);
            log::trace!("state stream cancelled, listener removed");
        }
    }

    /// Whether the subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_element_is_the_current_state() {
        let store = Arc::new(Store::new(42));
        let mut stream = states(&store).unwrap();
        assert_eq!(stream.next(), Some(42));
    }

    #[test]
    fn stream_sees_each_applied_state_in_order() {
        let store = Arc::new(Store::new(0));
        let mut stream = states(&store).unwrap();

        for _ in 0..3 {
            store.dispatch(|state: &i32| state + 1).unwrap();
        }

        assert_eq!(stream.next(), Some(0));
        assert_eq!(stream.next(), Some(1));
        assert_eq!(stream.next(), Some(2));
        assert_eq!(stream.next(), Some(3));
    }

    #[test]
    fn cancel_is_idempotent_and_keeps_buffered_states() {
        let store = Arc::new(Store::new(0));
        let mut stream = states(&store).unwrap();

        store.dispatch(|state: &i32| state + 1).unwrap();
        stream.cancel();
        stream.cancel();
        assert!(stream.is_cancelled());

        // Applied after cancellation: not observed.
        store.dispatch(|state: &i32| state + 1).unwrap();

        assert_eq!(stream.next(), Some(0));
        assert_eq!(stream.next(), Some(1));
        assert_eq!(stream.next(), None);
        assert_eq!(store.state(), 2);
    }

    #[test]
    fn handle_and_stream_cancel_only_once() {
        let store = Arc::new(Store::new(0));
        let stream = states(&store).unwrap();
        let handle = stream.cancel_handle();

        handle.cancel();
        stream.cancel();
        drop(stream);
        assert!(handle.is_cancelled());

        store.dispatch(|state: &i32| state + 1).unwrap();
        assert_eq!(store.state(), 1);
    }

    #[test]
    fn drop_unsubscribes_from_the_store() {
        let store = Arc::new(Store::new(0));
        let stream = states(&store).unwrap();
        drop(stream);

        // No listener left behind; dispatch proceeds normally.
        store.dispatch(|state: &i32| state + 1).unwrap();
        assert_eq!(store.state(), 1);
    }
}
