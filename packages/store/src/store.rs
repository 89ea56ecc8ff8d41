//! The store: state cell, dispatch queue, drain loop, and listeners.
//!
//! `dispatch` enqueues unconditionally and starts a drain loop only if
//! none is active, so dispatching from a listener callback or from a
//! middleware is deferred rather than reentrant. The queue and the
//! in-progress flag live under a single mutex; the drain loop releases
//! that mutex while an action runs its pipeline, so the store can be
//! called back into from any depth without deadlocking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::action::{Action, DynAction};
use crate::error::StoreError;
use crate::middleware::{Chain, Middleware, Slot};

/// A listener that is notified of every state change in a store.
///
/// Any `Fn(&S)` closure is a listener.
///
/// Listeners are not unsubscribed automatically; keep the
/// [`ListenerId`] returned by [`Store::subscribe`] and call
/// [`Store::unsubscribe`] when done.
pub trait StateChangeListener<S> {
    /// Called with the state after each applied action, and once with
    /// the current state at subscription time.
    fn on_state_changed(&self, new_state: &S);
}

impl<S, F> StateChangeListener<S> for F
where
    F: Fn(&S),
{
    fn on_state_changed(&self, new_state: &S) {
        self(new_state)
    }
}

/// Handle identifying one subscription on one store.
///
/// Ids are assigned per store and never reused, so the same closure
/// subscribed twice gets two independent handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Registration<S> = (ListenerId, Arc<dyn StateChangeListener<S> + Send + Sync>);

/// Pending work, guarded by a single mutex: the FIFO action queue plus
/// the flag that marks a drain loop as active.
struct Pending<S> {
    queue: VecDeque<DynAction<S>>,
    dispatching: bool,
}

/// A single mutable state cell, mutated only through serialized, ordered
/// application of dispatched [`Action`]s.
///
/// - The store holds the state; the state itself is immutable and is
///   replaced wholesale by the reducer.
/// - Actions flow through the middleware chain fixed at construction,
///   bookended by the built-in notify and reducer steps.
/// - [`StateChangeListener`]s are notified exactly once per applied
///   action, in application order, and once immediately on subscribe.
/// - `dispatch` is safe from multiple threads; the order actions are
///   applied is the order they were enqueued, globally per store.
pub struct Store<S> {
    state: Mutex<S>,
    slots: Vec<Slot<S>>,
    pending: Mutex<Pending<S>>,
    listeners: Mutex<Vec<Registration<S>>>,
    next_listener_id: AtomicU64,
}

impl<S: Clone> Store<S> {
    /// Create a store with no user middleware.
    pub fn new(initial_state: S) -> Self {
        Self::with_middleware(initial_state, Vec::new())
    }

    /// Create a store whose dispatched actions flow through
    /// `middlewares`, in order, between the built-in bookends.
    pub fn with_middleware(
        initial_state: S,
        middlewares: Vec<Box<dyn Middleware<S> + Send + Sync>>,
    ) -> Self {
        let mut slots = Vec::with_capacity(middlewares.len() + 2);
        slots.push(Slot::Notify);
        slots.extend(middlewares.into_iter().map(Slot::User));
        slots.push(Slot::Reduce);

        Store {
            state: Mutex::new(initial_state),
            slots,
            pending: Mutex::new(Pending {
                queue: VecDeque::new(),
                dispatching: false,
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// A snapshot of the current state: the result of the most recently
    /// fully-applied action.
    pub fn state(&self) -> S {
        lock_recover(&self.state).clone()
    }

    /// Dispatch an action through the middleware chain, apply it, and
    /// notify listeners - all synchronously on this thread, unless a
    /// drain loop is already active, in which case the action is queued
    /// for that loop and this call returns immediately.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if a middleware violates the
    /// proceed-exactly-once protocol while this call is draining. The
    /// store stays usable: the flag is released and queued actions wait
    /// for the next dispatch.
    pub fn dispatch<A>(&self, action: A) -> Result<(), StoreError>
    where
        A: Action<S> + Send + Sync + 'static,
    {
        {
            let mut pending = lock_recover(&self.pending);
            pending.queue.push_back(Arc::new(action));
            if pending.dispatching {
                log::trace!("dispatch deferred to the active drain loop");
                return Ok(());
            }
            pending.dispatching = true;
        }

        ActiveDrain::new(self).run()
    }

    /// Register a listener and synchronously deliver the current state
    /// to it once, so every subscriber sees an initial value even if no
    /// action has fired yet.
    ///
    /// The initial delivery happens outside the queue and the middleware
    /// pipeline, but with the dispatching flag held: a dispatch from
    /// inside the callback is queued and drained right after the
    /// callback returns, never run reentrantly.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if draining actions queued by the
    /// initial callback hits a middleware protocol violation. The
    /// listener stays registered either way.
    pub fn subscribe<L>(&self, listener: L) -> Result<ListenerId, StoreError>
    where
        L: StateChangeListener<S> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        let registration: Arc<dyn StateChangeListener<S> + Send + Sync> = Arc::new(listener);
        lock_recover(&self.listeners).push((id, Arc::clone(&registration)));

        let claimed = {
            let mut pending = lock_recover(&self.pending);
            if pending.dispatching {
                false
            } else {
                pending.dispatching = true;
                true
            }
        };

        if claimed {
            let mut drain = ActiveDrain::new(self);
            registration.on_state_changed(&self.state());
            drain.run()?;
        } else {
            // A drain loop is already active (subscribe was called from
            // a listener or a middleware); it owns any deferred work.
            registration.on_state_changed(&self.state());
        }

        Ok(id)
    }

    /// The bookended middleware list.
    pub(crate) fn slots(&self) -> &[Slot<S>] {
        &self.slots
    }

    /// Reducer step: compute the next state, then install it.
    ///
    /// The next value is computed outside the state lock, so an action
    /// that reads `state()` cannot deadlock and a panicking action
    /// leaves the current state untouched.
    pub(crate) fn apply(&self, action: &dyn Action<S>) {
        let old_state = self.state();
        let new_state = action.new_state(&old_state);
        *lock_recover(&self.state) = new_state;
        log::trace!("action applied, state replaced");
    }

    /// Notify step: fan the new state out to every listener.
    ///
    /// Iterates a snapshot of the listener list taken under the lock, so
    /// callbacks are free to subscribe or unsubscribe mid-fan-out.
    pub(crate) fn notify_listeners(&self) {
        let snapshot: Vec<Registration<S>> = lock_recover(&self.listeners).clone();
        if snapshot.is_empty() {
            return;
        }

        let state = self.state();
        log::trace!("notifying {} listener(s)", snapshot.len());
        for (_, listener) in &snapshot {
            listener.on_state_changed(&state);
        }
    }
}

impl<S> Store<S> {
    /// Remove a previously registered listener.
    ///
    /// Idempotent: returns `false` when the id is not present. A
    /// listener removed while a notification fan-out is in progress may
    /// still receive that in-flight notification.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock_recover(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }
}

/// A claimed drain loop over the pending queue.
///
/// The caller must have set the dispatching flag before constructing
/// one. Dropping an armed `ActiveDrain` - on an error return or a panic
/// unwinding out of an action - releases the flag so the store cannot be
/// left permanently locked.
struct ActiveDrain<'a, S: Clone> {
    store: &'a Store<S>,
    armed: bool,
}

impl<'a, S: Clone> ActiveDrain<'a, S> {
    fn new(store: &'a Store<S>) -> Self {
        ActiveDrain { store, armed: true }
    }

    /// Dequeue and run actions until the queue is empty.
    ///
    /// The empty-check and the flag-clear happen under the same lock
    /// acquisition, so an action enqueued concurrently either is seen by
    /// this loop or finds the flag already cleared and starts its own.
    fn run(&mut self) -> Result<(), StoreError> {
        loop {
            let next = {
                let mut pending = lock_recover(&self.store.pending);
                match pending.queue.pop_front() {
                    Some(action) => action,
                    None => {
                        pending.dispatching = false;
                        self.armed = false;
                        return Ok(());
                    }
                }
            };
            Chain::run(self.store, next)?;
        }
    }
}

impl<S: Clone> Drop for ActiveDrain<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            lock_recover(&self.store.pending).dispatching = false;
            log::trace!("drain loop released after error or panic");
        }
    }
}

/// Lock, recovering from poisoning.
///
/// Every critical section in the store contains only internal
/// bookkeeping - user code (actions, listeners, middleware) always runs
/// with the locks released. A poisoned lock therefore implies no broken
/// invariant, and recovering keeps the store usable after a panicking
/// action.
fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
