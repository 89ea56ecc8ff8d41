//! Error types for the dispatch pipeline.
//!
//! Everything here is a protocol violation: a middleware that did not
//! drive its chain exactly once, or a chain cursor that ran off the end
//! of the middleware list. These errors are fatal for the action being
//! dispatched and are returned synchronously to whoever triggered the
//! drain loop. They are never retried or swallowed by the store.

/// Errors surfaced by [`Store::dispatch`](crate::Store::dispatch) and
/// [`Store::subscribe`](crate::Store::subscribe).
///
/// Middleware positions index the full bookended chain: the built-in
/// notify middleware sits at position 0, user middleware follow in
/// construction order, and the built-in reducer sits last.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A middleware's `intercept` returned without ever calling `proceed`.
    ///
    /// Detected when control returns to the chain step that invoked the
    /// offending middleware.
    #[error("middleware at position {middleware} must call proceed() exactly once (proceed was never called)")]
    ProceedNotCalled {
        /// Position of the offending middleware in the bookended chain.
        middleware: usize,
    },

    /// A middleware called `proceed` more than once on the same chain.
    ///
    /// Detected immediately at the second call.
    #[error("middleware at position {middleware} must call proceed() exactly once (proceed was called again)")]
    ProceedCalledTwice {
        /// Position of the offending middleware in the bookended chain.
        middleware: usize,
    },

    /// The chain cursor advanced past the end of the middleware list.
    ///
    /// The built-in reducer terminates every chain, so this is unreachable
    /// unless an internal invariant is broken.
    #[error("middleware chain advanced past the end of the list (index {index}, len {len})")]
    ChainExhausted {
        /// The out-of-range chain index.
        index: usize,
        /// Length of the bookended middleware list.
        len: usize,
    },
}
