//! Middleware: interception of actions on their way to the reducer.
//!
//! Middleware are handed a [`Chain`] and must drive it forward exactly
//! once, optionally substituting a different action. The chain is an
//! index cursor over the store's middleware list; a fresh chain step is
//! created per middleware per dispatched action and is never shared
//! across actions. Two built-in steps bookend the user middleware: the
//! notify step first (fans out to listeners after everything inside it
//! has run) and the reducer step last (applies the action to the state).

use crate::action::{Action, DynAction};
use crate::error::StoreError;
use crate::store::Store;
use std::sync::Arc;

/// Intercepts actions as they are dispatched through a store.
///
/// A middleware *must call [`Chain::proceed`] (or
/// [`Chain::proceed_with`]) exactly once* per intercepted action. The
/// call runs the remaining middleware and ultimately the reducer, so a
/// middleware can act both before the action executes (before the call)
/// and after the new state is installed (after the call). Returning
/// without proceeding, or proceeding twice, fails the whole dispatch
/// with a [`StoreError`].
///
/// Middleware are fixed at store construction, see
/// [`Store::with_middleware`]. They are meant for cross-cutting behavior
/// such as logging, crash reporting, or undo - not for asynchronous
/// work, which belongs to whoever produces actions.
///
/// # Object Safety
///
/// This trait is object-safe: the store holds
/// `Box<dyn Middleware<S> + Send + Sync>`.
pub trait Middleware<S> {
    /// Intercept the action currently flowing through `chain`.
    fn intercept(&self, chain: &mut Chain<'_, S>) -> Result<(), StoreError>;
}

/// One step of the store's middleware list.
///
/// The bookends are variants rather than `Middleware` impls so the
/// store's own steps are a closed set: user code cannot construct,
/// reorder, or imitate them.
pub(crate) enum Slot<S> {
    /// Built-in first step: proceed, then notify listeners.
    Notify,
    /// A user-supplied middleware.
    User(Box<dyn Middleware<S> + Send + Sync>),
    /// Built-in terminal step: apply the action to the state.
    Reduce,
}

/// A single-use cursor over the middleware list for one in-flight action.
///
/// A chain step starts with zero `proceed` calls and is finished after
/// exactly one; a second call is an error. When a middleware's
/// `intercept` returns, the step that invoked it verifies that the
/// downstream step was driven exactly once.
pub struct Chain<'a, S> {
    store: &'a Store<S>,
    action: DynAction<S>,
    index: usize,
    calls: u32,
}

impl<'a, S: Clone> Chain<'a, S> {
    /// Run `action` through the full middleware list of `store`.
    ///
    /// Entry point used by the store's drain loop: builds the step at
    /// index 0 and proceeds once.
    pub(crate) fn run(store: &'a Store<S>, action: DynAction<S>) -> Result<(), StoreError> {
        let mut chain = Chain {
            store,
            action,
            index: 0,
            calls: 0,
        };
        chain.advance_with(None)
    }

    /// The action currently flowing through the chain.
    pub fn action(&self) -> &dyn Action<S> {
        self.action.as_ref()
    }

    /// A snapshot of the store's current state.
    ///
    /// Observably different before and after [`proceed`](Self::proceed):
    /// proceeding synchronously runs the rest of the pipeline, including
    /// the reducer.
    pub fn state(&self) -> S {
        self.store.state()
    }

    /// Run the rest of the chain with the current action.
    pub fn proceed(&mut self) -> Result<(), StoreError> {
        self.advance_with(None)
    }

    /// Run the rest of the chain with a substituted action.
    ///
    /// All downstream middleware and the reducer see `action` instead of
    /// the one this step was reached with. Queue bookkeeping is
    /// unaffected: substitution is local to this action's pipeline run.
    pub fn proceed_with<A>(&mut self, action: A) -> Result<(), StoreError>
    where
        A: Action<S> + Send + Sync + 'static,
    {
        self.advance_with(Some(Arc::new(action)))
    }

    fn advance_with(&mut self, substitute: Option<DynAction<S>>) -> Result<(), StoreError> {
        let store = self.store;
        let slots = store.slots();
        if self.index >= slots.len() {
            return Err(StoreError::ChainExhausted {
                index: self.index,
                len: slots.len(),
            });
        }

        self.calls += 1;
        // The step at index i was handed to the middleware at i - 1.
        if self.calls > 1 {
            return Err(StoreError::ProceedCalledTwice {
                middleware: self.index.saturating_sub(1),
            });
        }

        let action = substitute.unwrap_or_else(|| Arc::clone(&self.action));
        let mut next = Chain {
            store,
            action,
            index: self.index + 1,
            calls: 0,
        };

        match &slots[self.index] {
            Slot::Notify => {
                next.proceed()?;
                store.notify_listeners();
            }
            Slot::User(middleware) => middleware.intercept(&mut next)?,
            // Terminal: the reducer never proceeds further.
            Slot::Reduce => store.apply(next.action.as_ref()),
        }

        // The reducer has no downstream step to verify.
        if self.index + 1 < slots.len() && next.calls != 1 {
            return Err(StoreError::ProceedNotCalled {
                middleware: self.index,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Forwards the current action untouched.
    struct Forwarding;

    impl Middleware<i32> for Forwarding {
        fn intercept(&self, chain: &mut Chain<'_, i32>) -> Result<(), StoreError> {
            chain.proceed()
        }
    }

    /// Never drives the chain forward.
    struct Swallowing;

    impl Middleware<i32> for Swallowing {
        fn intercept(&self, _chain: &mut Chain<'_, i32>) -> Result<(), StoreError> {
            Ok(())
        }
    }

    /// Calls proceed twice, propagating the second call's error.
    struct DoubleProceed;

    impl Middleware<i32> for DoubleProceed {
        fn intercept(&self, chain: &mut Chain<'_, i32>) -> Result<(), StoreError> {
            chain.proceed()?;
            chain.proceed()
        }
    }

    /// Records the chain state before and after proceeding.
    struct StateProbe {
        seen: Arc<Mutex<Vec<i32>>>,
    }

    impl Middleware<i32> for StateProbe {
        fn intercept(&self, chain: &mut Chain<'_, i32>) -> Result<(), StoreError> {
            self.seen.lock().unwrap().push(chain.state());
            chain.proceed()?;
            self.seen.lock().unwrap().push(chain.state());
            Ok(())
        }
    }

    #[test]
    fn forwarding_middleware_lets_action_through() {
        let store = Store::with_middleware(0, vec![Box::new(Forwarding)]);
        store.dispatch(|state: &i32| state + 1).unwrap();
        assert_eq!(store.state(), 1);
    }

    #[test]
    fn many_forwarding_middleware_run_reducer_exactly_once() {
        for k in 0..5 {
            let middlewares: Vec<Box<dyn Middleware<i32> + Send + Sync>> =
                (0..k).map(|_| Box::new(Forwarding) as _).collect();
            let store = Store::with_middleware(0, middlewares);

            let applied = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&applied);
            store
                .dispatch(move |state: &i32| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    state + 1
                })
                .unwrap();

            assert_eq!(applied.load(Ordering::SeqCst), 1, "chain length {}", k);
            assert_eq!(store.state(), 1, "chain length {}", k);
        }
    }

    #[test]
    fn substituted_action_reaches_reducer() {
        struct Substituting;
        impl Middleware<i32> for Substituting {
            fn intercept(&self, chain: &mut Chain<'_, i32>) -> Result<(), StoreError> {
                chain.proceed_with(|state: &i32| state - 1)
            }
        }

        let store = Store::with_middleware(0, vec![Box::new(Substituting)]);
        // Dispatch an increment; the middleware swaps in a decrement.
        store.dispatch(|state: &i32| state + 1).unwrap();
        assert_eq!(store.state(), -1);
    }

    #[test]
    fn swallowing_middleware_fails_dispatch_and_leaves_state() {
        let store = Store::with_middleware(7, vec![Box::new(Swallowing)]);
        let err = store.dispatch(|state: &i32| state + 1).unwrap_err();
        // The swallowing middleware sits after the notify bookend.
        assert_eq!(err, StoreError::ProceedNotCalled { middleware: 1 });
        assert_eq!(store.state(), 7);
    }

    #[test]
    fn double_proceed_fails_dispatch_and_leaves_state() {
        let store = Store::with_middleware(7, vec![Box::new(DoubleProceed)]);
        let err = store.dispatch(|state: &i32| state + 1).unwrap_err();
        assert_eq!(err, StoreError::ProceedCalledTwice { middleware: 1 });
        // The second proceed failed after the action had already been
        // applied by the first; the reducer's work stands.
        assert_eq!(store.state(), 8);
    }

    #[test]
    fn chain_state_differs_before_and_after_proceed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let store = Store::with_middleware(
            0,
            vec![Box::new(StateProbe {
                seen: Arc::clone(&seen),
            })],
        );
        store.dispatch(|state: &i32| state + 1).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn chain_exposes_the_in_flight_action() {
        /// Evaluates the pending action against the current state before
        /// letting it through.
        struct Peeking {
            previewed: Arc<Mutex<Vec<i32>>>,
        }
        impl Middleware<i32> for Peeking {
            fn intercept(&self, chain: &mut Chain<'_, i32>) -> Result<(), StoreError> {
                let preview = chain.action().new_state(&chain.state());
                self.previewed.lock().unwrap().push(preview);
                chain.proceed()
            }
        }

        let previewed = Arc::new(Mutex::new(Vec::new()));
        let store = Store::with_middleware(
            10,
            vec![Box::new(Peeking {
                previewed: Arc::clone(&previewed),
            })],
        );
        store.dispatch(|state: &i32| state + 5).unwrap();

        // The preview matched what the reducer went on to apply.
        assert_eq!(*previewed.lock().unwrap(), vec![15]);
        assert_eq!(store.state(), 15);
    }

    #[test]
    fn failing_middleware_does_not_wedge_the_store() {
        /// Swallows the action only while armed.
        struct FailOnce {
            armed: AtomicUsize,
        }
        impl Middleware<i32> for FailOnce {
            fn intercept(&self, chain: &mut Chain<'_, i32>) -> Result<(), StoreError> {
                if self.armed.swap(0, Ordering::SeqCst) == 1 {
                    return Ok(());
                }
                chain.proceed()
            }
        }

        let store = Store::with_middleware(
            0,
            vec![Box::new(FailOnce {
                armed: AtomicUsize::new(1),
            })],
        );

        assert!(store.dispatch(|state: &i32| state + 1).is_err());
        assert_eq!(store.state(), 0);

        // The dispatching flag was released; the next dispatch drains.
        store.dispatch(|state: &i32| state + 1).unwrap();
        assert_eq!(store.state(), 1);
    }
}
