//! Request dispatch, response finalization and server lifecycle.
//!
//! ```text
//! request ─► status check ─► pre hooks ─► route lookup ─► pool.acquire()
//!                 │ not running               │ no match          │
//!                 ▼                           ▼                   ▼
//!                503                         404          ctx.next() … chain
//!                                                                 │
//!                       pool.release() ◄─ finalize ◄─ listeners ◄─┘
//! ```
//!
//! The finalizer runs only for contexts the chain left uncommitted and picks
//! exactly one outcome: the mapped error, the buffered body, the streamed
//! reader, or the bare status.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderValue};
use http::request::Parts;
use http::StatusCode;
use http_body_util::BodyExt;
use tokio::io::AsyncRead;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::app::{
    ErrorHandler, ErrorListener, GenerateId, NotFoundHandler, PreHandler, RouterInfo, TraceListener,
    Validator,
};
use crate::context::{Chain, Context};
use crate::error::{BoxError, Error};
use crate::handler::HandlerResult;
use crate::method::Method;
use crate::pool::ContextPool;
use crate::response::{ContentType, ReaderBody, ResponseBody};
use crate::router::{Params, Router};
use crate::signed_keys::SignedKeysGenerator;
use crate::trace::TraceInfos;

/// Server lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    Running = 0,
    Closing = 1,
    Closed = 2,
}

impl Lifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Running,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Parameter validators keyed by parameter name.
pub(crate) struct Validators {
    by_name: HashMap<String, Validator>,
}

impl Validators {
    pub(crate) fn new(by_name: HashMap<String, Validator>) -> Self {
        Self { by_name }
    }

    /// Runs the validator of every bound parameter, in route order, and
    /// returns the first failure.
    pub(crate) fn check(&self, params: &Params) -> Result<(), Error> {
        for (name, value) in params.iter() {
            if let Some(validate) = self.by_name.get(name) {
                validate(value)?;
            }
        }
        Ok(())
    }
}

/// The configuration [`App::build`](crate::App::build) freezes.
pub(crate) struct Shared {
    pub(crate) router: Router,
    pub(crate) routers: Vec<RouterInfo>,
    pub(crate) pre: Vec<PreHandler>,
    pub(crate) validators: Option<Arc<Validators>>,
    pub(crate) error_listeners: Vec<ErrorListener>,
    pub(crate) trace_listeners: Vec<TraceListener>,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) not_found: Option<NotFoundHandler>,
    pub(crate) generate_id: Option<GenerateId>,
    pub(crate) trace: bool,
    pub(crate) signed_keys: Option<Arc<dyn SignedKeysGenerator>>,
}

struct Inner {
    shared: Shared,
    status: AtomicU8,
    closed: Notify,
    pool: ContextPool,
}

/// A built application: routes every request through its handler chain.
///
/// Cloning is cheap; every clone serves the same routes and shares one
/// lifecycle status and one context pool.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub(crate) fn new(shared: Shared) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared,
                status: AtomicU8::new(Lifecycle::Running as u8),
                closed: Notify::new(),
                pool: ContextPool::default(),
            }),
        }
    }

    /// Every registered route, in registration order.
    pub fn routers(&self) -> &[RouterInfo] { &self.inner.shared.routers }

    /// The current signing keys, if a key store was configured.
    pub fn signed_keys(&self) -> Option<Arc<Vec<String>>> {
        self.inner.shared.signed_keys.as_ref().map(|keys| keys.get_keys())
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub fn status(&self) -> Lifecycle {
        Lifecycle::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    /// Stops taking requests: `Closing` for `delay`, so load balancers see
    /// 503s and drain, then `Closed`.
    pub async fn graceful_close(&self, delay: Duration) {
        self.inner.status.store(Lifecycle::Closing as u8, Ordering::Release);
        info!(delay_ms = delay.as_millis() as u64, "closing, rejecting new requests");
        tokio::time::sleep(delay).await;
        self.close();
    }

    /// Moves straight to `Closed` and wakes [`closed`](Self::closed) waiters.
    pub fn close(&self) {
        self.inner.status.store(Lifecycle::Closed as u8, Ordering::Release);
        self.inner.closed.notify_waiters();
    }

    /// Resolves once the dispatcher is `Closed`.
    pub async fn closed(&self) {
        let notified = self.inner.closed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.status() == Lifecycle::Closed {
            return;
        }
        notified.await;
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Serves one request.
    ///
    /// `peer` is the transport address used by the IP helpers; pass `None`
    /// when there is none, as in tests.
    pub async fn dispatch<B>(&self, req: http::Request<B>, peer: Option<SocketAddr>) -> http::Response<ResponseBody>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let status = self.status();
        if status != Lifecycle::Running {
            return text_response(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("service is not available, status is {}", status as u8),
            );
        }

        let shared = &self.inner.shared;
        let (mut parts, body) = req.into_parts();
        for pre in &shared.pre {
            pre(&mut parts);
        }

        let matched = Method::try_from(&parts.method)
            .ok()
            .and_then(|method| shared.router.lookup(method, parts.uri.path()));
        let Some((route, params)) = matched else {
            return self.not_found(&parts);
        };

        let body = body.map_err(|e| Error::Body(e.into())).boxed_unsync();
        let mut ctx = self.inner.pool.acquire();
        ctx.fill(parts, body, peer, self.clone());
        ctx.set_route(Arc::clone(&route.template), params);
        if let Some(generate) = &shared.generate_id {
            ctx.set_id(generate());
        }
        ctx.start_chain(Chain::new(Arc::clone(&route.handlers), shared.validators.clone()), shared.trace);

        let result = ctx.next().await;
        self.finish(ctx, result)
    }

    fn not_found(&self, parts: &Parts) -> http::Response<ResponseBody> {
        match &self.inner.shared.not_found {
            Some(handler) => handler(parts),
            None => text_response(StatusCode::NOT_FOUND, "Not found"),
        }
    }

    fn finish(&self, mut ctx: Box<Context>, result: HandlerResult) -> http::Response<ResponseBody> {
        let shared = &self.inner.shared;
        if let Some(records) = ctx.take_traces() {
            let infos = TraceInfos::from_cumulative(records);
            for listener in &shared.trace_listeners {
                listener(&mut *ctx, &infos);
            }
        }
        if let Err(err) = &result {
            self.emit_error(&ctx, err);
        }

        if !ctx.is_committed() {
            match result {
                Err(err) => self.respond_error(&mut ctx, &err),
                Ok(()) => {
                    if let Some(buf) = ctx.take_body_buffer() {
                        let status = ctx.status().unwrap_or(StatusCode::OK);
                        write_buffer(&mut ctx, status, buf);
                    } else if let Some(reader) = ctx.take_reader() {
                        return self.stream(ctx, reader);
                    } else if let Some(status) = ctx.status() {
                        ctx.response_mut().write_head(status);
                    }
                }
            }
        }

        ctx.commit();
        let response = ctx.take_response();
        self.inner.pool.release(ctx);
        response
    }

    /// Clears cache validators, lets the error mapper fill the context and
    /// writes the result.
    fn respond_error(&self, ctx: &mut Context, err: &Error) {
        let headers = ctx.headers_mut();
        for name in [header::ETAG, header::LAST_MODIFIED, header::CONTENT_ENCODING, header::CONTENT_LENGTH] {
            headers.remove(name);
        }
        ctx.clear_outcome();

        match &self.inner.shared.error_handler {
            Some(handler) => handler(ctx, err),
            None => {
                ctx.set_status(err.status());
                ctx.set_content_type(ContentType::Text);
                ctx.write(err.to_string().as_bytes());
            }
        }
        if ctx.is_committed() {
            return;
        }

        let status = ctx.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match ctx.take_body_buffer() {
            Some(buf) => write_buffer(ctx, status, buf),
            None => ctx.response_mut().write_head(status),
        }
    }

    /// Hands `reader` to the response body. The context travels with the
    /// body so a copy failure can still be reported against it, and it is
    /// never pooled.
    fn stream(&self, mut ctx: Box<Context>, reader: Box<dyn AsyncRead + Send + Unpin>) -> http::Response<ResponseBody> {
        ctx.commit();
        ctx.disable_reuse();
        let status = ctx.status().unwrap_or(StatusCode::OK);
        ctx.response_mut().write_head(status);
        let mut response = ctx.take_response();

        let dispatcher = self.clone();
        let body = ReaderBody::new(reader, move |err| dispatcher.emit_error(&ctx, err));
        *response.body_mut() = ResponseBody::stream(body);
        response
    }

    /// Broadcasts `err` to the error listeners in registration order.
    pub fn emit_error(&self, ctx: &Context, err: &Error) {
        let listeners = &self.inner.shared.error_listeners;
        if listeners.is_empty() {
            debug!(route = ctx.route(), id = ctx.id(), error = %err, "unobserved request error");
        }
        for listener in listeners {
            listener(ctx, err);
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("status", &self.status())
            .field("routes", &self.inner.shared.routers.len())
            .field("trace", &self.inner.shared.trace)
            .finish_non_exhaustive()
    }
}

fn write_buffer(ctx: &mut Context, status: StatusCode, buf: BytesMut) {
    ctx.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(buf.len()));
    let response = ctx.response_mut();
    response.write_head(status);
    response.write(&buf);
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> http::Response<ResponseBody> {
    let mut response = http::Response::new(ResponseBody::full(body));
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, ContentType::Text.header_value());
    response
}
