//! Middleware - composable interceptors wrapping dispatch
//!
//! A [`MiddlewareChain`] is an ordered list of [`Middleware`] links in front
//! of a terminal stage (the reducer application). Each link receives the
//! action together with a [`Next`] continuation standing for the rest of the
//! chain, and decides whether, when and how many times the rest runs:
//!
//! - pass through: `next.run(action)`
//! - transform: `next.run(rewrite(action))`
//! - short-circuit: return without calling `next`; the reducer does not run,
//!   state is not replaced and subscribers are not notified
//! - fan out: call `next.run` several times
//! - dispatch new actions through the whole chain via `store.dispatch(..)`
//!
//! The first link in the chain is outermost: it sees the incoming action
//! first and the outgoing result last.
//!
//! # Example
//!
//! ```ignore
//! use statehub_runtime::{middleware_fn, Store};
//!
//! let audit = middleware_fn(|store: &Store<AppState, AppAction>, action, next| {
//!     tracing::info!(kind = %action.kind(), "audit");
//!     next.run(action)
//! });
//!
//! let store = Store::builder(AppState::default(), AppReducer)
//!     .middleware(audit)
//!     .build();
//! ```

use crate::error::StoreError;
use crate::store::Store;
use std::borrow::Cow;
use std::sync::Arc;

/// A stage in the dispatch pipeline
///
/// Middleware is stateless with respect to the Store: it may hold external
/// facilities (a logger, a metrics handle, a report sink) but only changes
/// state by dispatching actions.
pub trait Middleware<S, A>: Send + Sync {
    /// Name used in logs
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }

    /// Intercept one action
    ///
    /// `store` is the Store this chain belongs to; `store.dispatch` re-enters
    /// the chain from the top, `store.get_state` reads the current snapshot.
    ///
    /// # Errors
    ///
    /// Whatever error this link raises, or lets through from `next`, is
    /// returned to the caller of `dispatch` unchanged.
    fn handle(&self, store: &Store<S, A>, action: A, next: Next<'_, S, A>) -> Result<A, StoreError>;
}

/// The rest of the chain after the current link
///
/// `Next` is `Copy`; [`Next::run`] may be invoked zero or more times.
pub struct Next<'a, S, A> {
    store: &'a Store<S, A>,
    links: &'a [Arc<dyn Middleware<S, A>>],
    terminal: &'a (dyn Fn(A) -> Result<A, StoreError> + 'a),
}

impl<S, A> Clone for Next<'_, S, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, A> Copy for Next<'_, S, A> {}

impl<S, A> Next<'_, S, A> {
    /// Hand `action` to the remaining links and finally the reducer
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a remaining link or by the
    /// terminal stage.
    pub fn run(&self, action: A) -> Result<A, StoreError> {
        match self.links.split_first() {
            Some((link, rest)) => {
                tracing::trace!(middleware = %link.name(), "Entering middleware");
                link.handle(
                    self.store,
                    action,
                    Next {
                        store: self.store,
                        links: rest,
                        terminal: self.terminal,
                    },
                )
            },
            None => (self.terminal)(action),
        }
    }

    /// Number of links still ahead of the terminal stage
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.links.len()
    }
}

/// An ordered list of middleware links
///
/// Links run in the order they were added; the first one added is the
/// outermost.
pub struct MiddlewareChain<S, A> {
    links: Vec<Arc<dyn Middleware<S, A>>>,
}

impl<S, A> MiddlewareChain<S, A> {
    /// Create an empty chain
    #[must_use]
    pub const fn new() -> Self {
        Self { links: Vec::new() }
    }

    /// Append a link (builder style)
    #[must_use]
    pub fn with<M>(mut self, middleware: M) -> Self
    where
        M: Middleware<S, A> + 'static,
    {
        self.push(middleware);
        self
    }

    /// Append a link
    pub fn push<M>(&mut self, middleware: M)
    where
        M: Middleware<S, A> + 'static,
    {
        self.links.push(Arc::new(middleware));
    }

    /// Append a shared link
    pub fn push_shared(&mut self, middleware: Arc<dyn Middleware<S, A>>) {
        self.links.push(middleware);
    }

    /// Number of links
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the chain has no links
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Names of the links, outermost first
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.links.iter().map(|link| link.name().into_owned()).collect()
    }

    /// Run `action` through every link and then `terminal`
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a link or by `terminal`.
    pub fn dispatch(
        &self,
        store: &Store<S, A>,
        action: A,
        terminal: &dyn Fn(A) -> Result<A, StoreError>,
    ) -> Result<A, StoreError> {
        Next {
            store,
            links: &self.links,
            terminal,
        }
        .run(action)
    }
}

impl<S, A> Clone for MiddlewareChain<S, A> {
    fn clone(&self) -> Self {
        Self {
            links: self.links.clone(),
        }
    }
}

impl<S, A> Default for MiddlewareChain<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, A> std::fmt::Debug for MiddlewareChain<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Build a middleware from a closure
///
/// ```ignore
/// let tagger = middleware_fn(|_store: &Store<State, Action>, action, next| {
///     next.run(action)
/// })
/// .named("tagger");
/// ```
pub fn middleware_fn<S, A, F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&Store<S, A>, A, Next<'_, S, A>) -> Result<A, StoreError> + Send + Sync,
{
    FnMiddleware {
        f,
        name: Cow::Borrowed("middleware_fn"),
    }
}

/// A middleware backed by a closure
///
/// Created by [`middleware_fn`].
pub struct FnMiddleware<F> {
    f: F,
    name: Cow<'static, str>,
}

impl<F> FnMiddleware<F> {
    /// Give the middleware a name for logs
    #[must_use]
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }
}

impl<S, A, F> Middleware<S, A> for FnMiddleware<F>
where
    F: Fn(&Store<S, A>, A, Next<'_, S, A>) -> Result<A, StoreError> + Send + Sync,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.name.as_ref())
    }

    fn handle(&self, store: &Store<S, A>, action: A, next: Next<'_, S, A>) -> Result<A, StoreError> {
        (self.f)(store, action, next)
    }
}
