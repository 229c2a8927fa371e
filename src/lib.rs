//! # catena
//!
//! A request-lifecycle engine for hyper services: every request runs
//! through an ordered, short-circuitable chain of handlers, and its response
//! is finalized exactly once.
//!
//! ## The model
//!
//! - **Chains.** Global handlers run first, then the route's own. A handler
//!   continues the chain by awaiting [`Context::next`]; returning without it
//!   ends the chain there. Committing the response skips whatever is left.
//! - **Pooled contexts.** Each request borrows a [`Context`] from a pool. It
//!   is fully reset on the way in and on the way out.
//! - **One finalizer.** Whatever the chain left behind (an error, a buffered
//!   body, a reader to stream, a bare status) is written once, after the
//!   chain unwinds.
//! - **Traces.** With tracing on, each handler's self-time is recorded and
//!   handed to trace listeners, ready for a `Server-Timing` header.
//!
//! What catena leaves to the reverse proxy or to middleware: TLS, body size
//! limits, timeouts, compression, body parsing and panic recovery.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use catena::{App, BoxFuture, Context, Error, Handler, HandlerResult, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = App::new()
//!         .use_handler(Handler::new(timing))
//!         .enable_trace(true)
//!         .on_trace(|ctx, traces| ctx.server_timing(traces, "catena-"))
//!         .validator("id", |id| match id.parse::<u64>() {
//!             Ok(_) => Ok(()),
//!             Err(_) => Err(Error::invalid_param("id", "must be a number")),
//!         })
//!         .get("/users/:id", [Handler::new(get_user)]);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//!
//! fn timing(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
//!     Box::pin(async move { ctx.next().await })
//! }
//!
//! fn get_user(ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
//!     Box::pin(async move {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         ctx.write(format!(r#"{{"id":{id}}}"#).as_bytes());
//!         Ok(())
//!     })
//! }
//! ```

mod app;
mod context;
mod cookie;
mod dispatcher;
mod error;
mod handler;
mod method;
mod pool;
mod response;
mod router;
mod server;
mod signed_keys;
mod trace;

pub mod health;
pub mod ip;

pub use app::{
    App, ErrorHandler, ErrorListener, GenerateId, Group, NotFoundHandler, PreHandler, RouterInfo,
    TraceListener, Validator,
};
pub use context::{Body, Context};
pub use cookie::{Cookie, SameSite};
pub use dispatcher::{Dispatcher, Lifecycle};
pub use error::{BoxError, Error, HttpError};
pub use handler::{compose, BoxFuture, Handler, HandlerResult, SKIP_TRACE};
pub use method::Method;
pub use response::{ContentType, ResponseBody, ResponseWriter};
pub use router::Params;
pub use server::Server;
pub use signed_keys::{
    AtomicSignedKeys, Keygrip, RotateKeys, RwLockSignedKeys, SignedKeysGenerator, SimpleSignedKeys,
    SIGNED_COOKIE_SUFFIX,
};
pub use trace::{SERVER_TIMING, TraceInfo, TraceInfos};
