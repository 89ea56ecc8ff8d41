//! A ready-made middleware that logs state transitions.

use std::fmt::Debug;

use crate::error::StoreError;
use crate::middleware::{Chain, Middleware};

/// Logs the state before and after each dispatched action via the
/// [`log`] facade, at debug level.
///
/// The canonical example of a cross-cutting middleware: it observes the
/// pipeline without touching the action or the state.
///
/// # Example
///
/// ```rust
/// use uniflow_store::{LogMiddleware, Store};
///
/// let store = Store::with_middleware(0, vec![Box::new(LogMiddleware::new("counter"))]);
/// store.dispatch(|state: &i32| state + 1).unwrap();
/// assert_eq!(store.state(), 1);
/// ```
pub struct LogMiddleware {
    tag: &'static str,
}

impl LogMiddleware {
    /// Create a logging middleware; `tag` identifies the store in the
    /// log output.
    pub fn new(tag: &'static str) -> Self {
        LogMiddleware { tag }
    }
}

impl<S: Clone + Debug> Middleware<S> for LogMiddleware {
    fn intercept(&self, chain: &mut Chain<'_, S>) -> Result<(), StoreError> {
        log::debug!("[{}] state before action: {:?}", self.tag, chain.state());
        chain.proceed()?;
        log::debug!("[{}] state after action: {:?}", self.tag, chain.state());
        Ok(())
    }
}
