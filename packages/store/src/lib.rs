//! uniflow-store: a minimal unidirectional state container.
//!
//! A [`Store`] holds a single immutable state value. The only way to change
//! it is to [`dispatch`](Store::dispatch) an [`Action`] - a pure function
//! from the old state to a new state. Every action flows through an ordered
//! [`Middleware`] chain before it is applied, and every applied action is
//! announced exactly once to each registered [`StateChangeListener`].
//!
//! Dispatch is fully synchronous: the calling thread runs the middleware
//! chain, applies the action, and fans out notifications before `dispatch`
//! returns. Actions dispatched while a dispatch is already in progress
//! (from a listener callback, from a middleware, or from another thread)
//! are queued and drained in FIFO order by the active loop - the pipeline
//! is never reentered.
//!
//! # Example
//!
//! ```rust
//! use uniflow_store::Store;
//!
//! let store = Store::new(0);
//! store.subscribe(|state: &i32| println!("state: {state}")).unwrap();
//! store.dispatch(|state: &i32| state + 1).unwrap();
//! assert_eq!(store.state(), 1);
//! ```

mod action;
mod error;
mod log_middleware;
mod middleware;
mod store;

pub use action::Action;
pub use error::StoreError;
pub use log_middleware::LogMiddleware;
pub use middleware::{Chain, Middleware};
pub use store::{ListenerId, StateChangeListener, Store};
