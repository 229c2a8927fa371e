//! Handler type, naming and composition.
//!
//! # How handlers are stored
//!
//! Every route owns an ordered list of handlers of *different* closure types,
//! so each one is type-erased behind an `Arc<dyn Fn>` and paired with the
//! display name used for tracing. The name is fixed at registration; nothing
//! is looked up per request.
//!
//! ```text
//! fn auth(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> { … }   ← user writes this
//!        ↓ Handler::new(auth)
//! Handler { func: Arc<dyn Fn>, name: "my_app::auth" }                ← registration time
//!        ↓ App::build() prepends the global handlers
//! Arc<[Handler]>                                                      ← one chain per route
//!        ↓ ctx.next().await at request time
//! handler.call(ctx)                                                   ← one vtable dispatch
//! ```
//!
//! A handler advances the chain by awaiting [`Context::next`]. Not calling it
//! truncates the chain for that request.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::fmt;

use crate::context::Context;
use crate::error::Error;

/// A heap-allocated, type-erased future borrowing the request [`Context`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every handler resolves to.
pub type HandlerResult = Result<(), Error>;

/// Display name that opts a handler out of trace recording.
pub const SKIP_TRACE: &str = "-";

type HandlerFn =
    dyn for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static;

/// A registered handler: the function plus its display name.
///
/// Cloning is one atomic increment per field.
#[derive(Clone)]
pub struct Handler {
    func: Arc<HandlerFn>,
    name: Arc<str>,
}

impl Handler {
    /// Wraps `f`, naming it after its Rust type (the function path for `fn` items).
    ///
    /// ```rust
    /// use catena::{BoxFuture, Context, Handler, HandlerResult};
    ///
    /// fn hello(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
    ///     Box::pin(async move {
    ///         ctx.write(b"hello");
    ///         Ok(())
    ///     })
    /// }
    ///
    /// let h = Handler::new(hello);
    /// assert!(h.name().ends_with("hello"));
    /// ```
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self::named(std::any::type_name::<F>(), f)
    }

    /// Wraps `f` under an explicit display name. Use [`SKIP_TRACE`] to keep
    /// the handler out of trace records.
    pub fn named<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self { func: Arc::new(f), name: name.into() }
    }

    /// Replaces the display name.
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub(crate) fn shared_name(&self) -> &Arc<str> { &self.name }

    pub(crate) fn skips_trace(&self) -> bool { &*self.name == SKIP_TRACE }

    pub(crate) fn call<'a>(&self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Builds one handler that runs `handlers` as a private sub-chain.
///
/// Inside the sub-chain [`Context::next`] advances through `handlers`; once
/// they are exhausted the next call resumes the outer chain right after the
/// composite. Inner handlers are not traced individually.
///
/// # Panics
///
/// Panics if `handlers` is empty.
pub fn compose(handlers: impl IntoIterator<Item = Handler>) -> Handler {
    let handlers: Arc<[Handler]> = handlers.into_iter().collect();
    assert!(!handlers.is_empty(), "compose requires at least one handler");

    let names: Vec<&str> = handlers.iter().map(Handler::name).collect();
    let name = format!("compose({})", names.join(","));

    Handler::named(name, move |ctx| {
        let handlers = Arc::clone(&handlers);
        Box::pin(async move { ctx.run_sub_chain(handlers).await })
    })
}
