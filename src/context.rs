//! Per-request state and the chain continuation.
//!
//! # Lifecycle
//!
//! ```text
//! Acquired → Filled → Executing → Committed → Reset → Pooled | Discarded
//! ```
//!
//! A [`Context`] belongs to exactly one in-flight request. The dispatcher
//! takes one from its pool, fills it, drives the handler chain through
//! [`Context::next`], finalizes the response and hands it back. A context
//! whose reuse was disabled with [`Context::disable_reuse`] is dropped
//! instead of pooled.
//!
//! # Continuations
//!
//! The chain position lives in a small stack of frames. The root frame walks
//! the route's handlers (globals first); a composite handler pushes its own
//! frame, and once that frame runs out `next()` pops it and resumes the
//! frame underneath.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::request::Parts;
use http::{Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use http_body_util::combinators::UnsyncBoxBody;
use tokio::io::AsyncRead;

use crate::cookie::{self, Cookie};
use crate::dispatcher::{Dispatcher, Validators};
use crate::error::Error;
use crate::handler::{BoxFuture, Handler, HandlerResult};
use crate::ip;
use crate::response::{ContentType, ResponseBody, ResponseWriter};
use crate::router::Params;
use crate::signed_keys::{Keygrip, SIGNED_COOKIE_SUFFIX};
use crate::trace::{SERVER_TIMING, TraceInfo, TraceInfos};

/// Raw request body as it arrives from the transport.
pub(crate) type RequestBody = UnsyncBoxBody<Bytes, Error>;

// ── Body ──────────────────────────────────────────────────────────────────────

/// The response body value a handler produces.
///
/// A `Value` is opaque to catena: some response middleware is expected to
/// serialize it into the body buffer. A `Reader` is streamed to the client
/// when no body buffer was written.
pub enum Body {
    Value(Box<dyn Any + Send>),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl Body {
    pub fn value<T: Any + Send>(value: T) -> Self {
        Self::Value(Box::new(value))
    }

    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Value(v) => v.downcast_ref(),
            Self::Reader(_) => None,
        }
    }

    pub fn is_reader(&self) -> bool {
        matches!(self, Self::Reader(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Body::Value(..)"),
            Self::Reader(_) => f.write_str("Body::Reader(..)"),
        }
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

/// The route's chain: global handlers followed by the route's own.
pub(crate) struct Chain {
    handlers: Arc<[Handler]>,
    cursor: usize,
    validators: Option<Arc<Validators>>,
}

impl Chain {
    pub(crate) fn new(handlers: Arc<[Handler]>, validators: Option<Arc<Validators>>) -> Self {
        Self { handlers, cursor: 0, validators }
    }

    pub(crate) fn len(&self) -> usize { self.handlers.len() }
}

enum Frame {
    Root(Chain),
    Sub { handlers: Arc<[Handler]>, cursor: usize },
}

/// The handler `next()` decided to run.
struct Step {
    handler: Handler,
    traced: bool,
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Everything one request carries through its handler chain.
pub struct Context {
    request: Parts,
    raw_body: Option<RequestBody>,
    body_failed: bool,
    peer: Option<SocketAddr>,
    response: ResponseWriter,
    passed: Option<http::Response<ResponseBody>>,
    headers: HeaderMap,
    committed: bool,
    id: String,
    route: Option<Arc<str>>,
    frames: Vec<Frame>,
    params: Params,
    status: Option<StatusCode>,
    body: Option<Body>,
    body_buffer: Option<BytesMut>,
    request_body: Option<Bytes>,
    store: HashMap<String, Box<dyn Any + Send>>,
    real_ip: Option<String>,
    client_ip: Option<String>,
    dispatcher: Option<Dispatcher>,
    reuse_disabled: AtomicBool,
    query: Option<HashMap<String, Vec<String>>>,
    traces: Option<Vec<TraceInfo>>,
}

fn empty_parts() -> Parts {
    Request::new(()).into_parts().0
}

impl Context {
    /// A context in its zero state, not attached to any request.
    pub fn new() -> Self {
        Self {
            request: empty_parts(),
            raw_body: None,
            body_failed: false,
            peer: None,
            response: ResponseWriter::default(),
            passed: None,
            headers: HeaderMap::new(),
            committed: false,
            id: String::new(),
            route: None,
            frames: Vec::new(),
            params: Params::default(),
            status: None,
            body: None,
            body_buffer: None,
            request_body: None,
            store: HashMap::new(),
            real_ip: None,
            client_ip: None,
            dispatcher: None,
            reuse_disabled: AtomicBool::new(false),
            query: None,
            traces: None,
        }
    }

    /// A context wrapping `req`, for exercising handlers outside a server.
    pub fn from_request(req: Request<()>, peer: Option<SocketAddr>) -> Self {
        let mut ctx = Self::new();
        ctx.request = req.into_parts().0;
        ctx.peer = peer;
        ctx
    }

    /// Returns every field to its zero state. Allocations owned by the
    /// header map, id, params and store are kept for the next request.
    pub fn reset(&mut self) {
        self.request = empty_parts();
        self.raw_body = None;
        self.body_failed = false;
        self.peer = None;
        self.response.reset();
        self.passed = None;
        self.headers.clear();
        self.committed = false;
        self.id.clear();
        self.route = None;
        self.frames.clear();
        self.params.clear();
        self.status = None;
        self.body = None;
        self.body_buffer = None;
        self.request_body = None;
        self.store.clear();
        self.real_ip = None;
        self.client_ip = None;
        self.dispatcher = None;
        *self.reuse_disabled.get_mut() = false;
        self.query = None;
        self.traces = None;
    }

    pub(crate) fn fill(
        &mut self,
        request: Parts,
        body: RequestBody,
        peer: Option<SocketAddr>,
        dispatcher: Dispatcher,
    ) {
        self.request = request;
        self.raw_body = Some(body);
        self.peer = peer;
        self.dispatcher = Some(dispatcher);
    }

    pub(crate) fn set_route(&mut self, template: Arc<str>, params: Params) {
        self.route = Some(template);
        self.params = params;
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    /// Installs the root frame. With tracing on, the record buffer is sized
    /// for the whole chain up front.
    pub(crate) fn start_chain(&mut self, chain: Chain, trace: bool) {
        if trace {
            self.traces = Some(Vec::with_capacity(chain.len()));
        }
        self.frames.push(Frame::Root(chain));
    }

    pub(crate) fn take_traces(&mut self) -> Option<Vec<TraceInfo>> {
        self.traces.take()
    }

    pub(crate) fn take_response(&mut self) -> http::Response<ResponseBody> {
        if let Some(response) = self.passed.take() {
            self.headers.clear();
            return response;
        }
        let headers = std::mem::take(&mut self.headers);
        self.response.take(headers)
    }

    // ── Chain ────────────────────────────────────────────────────────────────

    /// Runs the next handler in the chain.
    ///
    /// A no-op once the response is committed or the chain is exhausted, so
    /// calling it more often than there are handlers is harmless. Before the
    /// route's final handler runs, every registered validator whose name
    /// matches a bound route parameter is checked; the first failure is
    /// returned and the final handler is skipped.
    ///
    /// Errors from downstream handlers come back unchanged.
    pub fn next(&mut self) -> BoxFuture<'_, HandlerResult> {
        Box::pin(self.run_next())
    }

    async fn run_next(&mut self) -> HandlerResult {
        let Some(step) = self.advance()? else {
            return Ok(());
        };
        if !step.traced || step.handler.skips_trace() {
            return step.handler.call(self).await;
        }
        let Some(traces) = self.traces.as_mut() else {
            return step.handler.call(self).await;
        };

        let slot = traces.len();
        traces.push(TraceInfo { name: Arc::clone(step.handler.shared_name()), duration: Duration::ZERO });
        let started = Instant::now();
        let result = step.handler.call(self).await;
        if let Some(record) = self.traces.as_mut().and_then(|t| t.get_mut(slot)) {
            record.duration = started.elapsed();
        }
        result
    }

    fn advance(&mut self) -> Result<Option<Step>, Error> {
        if self.committed {
            return Ok(None);
        }
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Ok(None);
            };
            match frame {
                Frame::Sub { handlers, cursor } => {
                    if let Some(handler) = handlers.get(*cursor) {
                        *cursor += 1;
                        return Ok(Some(Step { handler: handler.clone(), traced: false }));
                    }
                    // Sub-chain done: fall back to the frame it was pushed from.
                    self.frames.pop();
                }
                Frame::Root(chain) => {
                    let index = chain.cursor;
                    let Some(handler) = chain.handlers.get(index).cloned() else {
                        return Ok(None);
                    };
                    chain.cursor += 1;
                    if index + 1 == chain.handlers.len() {
                        if let Some(validators) = chain.validators.clone() {
                            validators.check(&self.params)?;
                        }
                    }
                    return Ok(Some(Step { handler, traced: true }));
                }
            }
        }
    }

    /// Runs `handlers` as a private chain, then gives control back to the
    /// frame that was current when this was called.
    pub(crate) async fn run_sub_chain(&mut self, handlers: Arc<[Handler]>) -> HandlerResult {
        let depth = self.frames.len();
        self.frames.push(Frame::Sub { handlers, cursor: 0 });
        let result = self.next().await;
        self.frames.truncate(depth);
        result
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub fn id(&self) -> &str { &self.id }

    /// The matched route template, e.g. `/users/:id`.
    pub fn route(&self) -> &str { self.route.as_deref().unwrap_or("") }

    pub fn is_committed(&self) -> bool { self.committed }

    /// Marks the response as sent. Remaining handlers are skipped and the
    /// finalizer leaves the response alone.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    /// Keeps this context out of the pool once the request completes.
    ///
    /// Idempotent, and safe to race with the dispatcher's release check.
    pub fn disable_reuse(&self) {
        self.reuse_disabled.store(true, Ordering::Release);
    }

    pub fn is_reusable(&self) -> bool {
        !self.reuse_disabled.load(Ordering::Acquire)
    }

    /// The dispatcher serving this request.
    pub fn dispatcher(&self) -> Option<&Dispatcher> { self.dispatcher.as_ref() }

    /// Direct access to the transport response, for handlers that answer on
    /// their own. Call [`commit`](Self::commit) afterwards.
    pub fn response_mut(&mut self) -> &mut ResponseWriter { &mut self.response }

    // ── Request ──────────────────────────────────────────────────────────────

    pub fn request(&self) -> &Parts { &self.request }
    pub fn method(&self) -> &http::Method { &self.request.method }
    pub fn uri(&self) -> &Uri { &self.request.uri }
    pub fn path(&self) -> &str { self.request.uri.path() }
    pub fn request_headers(&self) -> &HeaderMap { &self.request.headers }

    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replaces a request header; an empty value removes it.
    pub fn set_request_header(&mut self, name: HeaderName, value: &str) -> Result<(), Error> {
        if value.is_empty() {
            self.request.headers.remove(name);
            return Ok(());
        }
        self.request.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    pub fn add_request_header(&mut self, name: HeaderName, value: &str) -> Result<(), Error> {
        self.request.headers.append(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// A bound route parameter.
    ///
    /// For a route `/users/:id`, `ctx.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> { self.params.get(name) }

    pub fn params(&self) -> &Params { &self.params }

    fn cached_query(&mut self) -> &HashMap<String, Vec<String>> {
        let uri = &self.request.uri;
        self.query.get_or_insert_with(|| {
            let mut query: HashMap<String, Vec<String>> = HashMap::new();
            for (k, v) in url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes()) {
                query.entry(k.into_owned()).or_default().push(v.into_owned());
            }
            query
        })
    }

    /// First value of a query-string parameter. The query is parsed once.
    pub fn query_param(&mut self, name: &str) -> Option<&str> {
        self.cached_query().get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// The query string flattened to the first value of every key.
    pub fn query(&mut self) -> HashMap<String, String> {
        self.cached_query()
            .iter()
            .filter_map(|(k, v)| Some((k.clone(), v.first()?.clone())))
            .collect()
    }

    /// The transport peer's IP, without the port.
    pub fn remote_addr(&self) -> String { ip::remote_addr(self.peer) }

    /// The first `x-forwarded-for` hop, else `x-real-ip`, else the peer.
    pub fn real_ip(&mut self) -> &str {
        let (headers, peer) = (&self.request.headers, self.peer);
        self.real_ip.get_or_insert_with(|| ip::real_ip(headers, peer))
    }

    /// The first public address among the forwarding headers, else the peer.
    pub fn client_ip(&mut self) -> &str {
        let (headers, peer) = (&self.request.headers, self.peer);
        self.client_ip.get_or_insert_with(|| ip::client_ip(headers, peer))
    }

    /// Collects the raw request body into the request-body container.
    /// Later calls return the bytes read the first time. Once a read has
    /// failed, every later call fails with [`Error::BodyIncomplete`].
    pub async fn read_body(&mut self) -> Result<&Bytes, Error> {
        if self.body_failed {
            return Err(Error::BodyIncomplete);
        }
        if let Some(body) = self.raw_body.take() {
            match body.collect().await {
                Ok(collected) => self.request_body = Some(collected.to_bytes()),
                Err(err) => {
                    self.body_failed = true;
                    return Err(err);
                }
            }
        }
        Ok(self.request_body.get_or_insert_with(Bytes::new))
    }

    pub fn request_body(&self) -> Option<&Bytes> { self.request_body.as_ref() }

    pub fn set_request_body(&mut self, body: Bytes) {
        self.raw_body = None;
        self.body_failed = false;
        self.request_body = Some(body);
    }

    // ── Response ─────────────────────────────────────────────────────────────

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Replaces a response header; an empty value removes it.
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<(), Error> {
        if value.is_empty() {
            self.headers.remove(name);
            return Ok(());
        }
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    pub fn add_header(&mut self, name: HeaderName, value: &str) -> Result<(), Error> {
        self.headers.append(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    pub fn reset_headers(&mut self) {
        self.headers.clear();
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.headers.insert(header::CONTENT_TYPE, content_type.header_value());
    }

    /// Sets `Content-Type` from the extension of `path`. Unknown extensions
    /// leave the header as it was.
    pub fn set_content_type_by_ext(&mut self, path: &str) {
        if let Some(mime) = mime_guess::from_path(path).first_raw() {
            self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
        }
    }

    pub fn status(&self) -> Option<StatusCode> { self.status }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Appends to the buffered response body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.body_buffer.get_or_insert_with(BytesMut::new).extend_from_slice(bytes);
    }

    pub fn body_buffer(&self) -> Option<&BytesMut> { self.body_buffer.as_ref() }

    pub fn set_body_buffer(&mut self, buffer: Option<BytesMut>) {
        self.body_buffer = buffer;
    }

    pub fn take_body_buffer(&mut self) -> Option<BytesMut> { self.body_buffer.take() }

    pub fn body(&self) -> Option<&Body> { self.body.as_ref() }

    pub fn set_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    pub fn take_body(&mut self) -> Option<Body> { self.body.take() }

    /// Takes the body only if it is a reader.
    pub(crate) fn take_reader(&mut self) -> Option<Box<dyn AsyncRead + Send + Unpin>> {
        match self.body.take() {
            Some(Body::Reader(reader)) => Some(reader),
            other => {
                self.body = other;
                None
            }
        }
    }

    pub(crate) fn clear_outcome(&mut self) {
        self.status = None;
        self.body = None;
        self.body_buffer = None;
    }

    pub fn created(&mut self, body: Body) {
        self.status = Some(StatusCode::CREATED);
        self.body = Some(body);
    }

    pub fn no_content(&mut self) {
        self.status = Some(StatusCode::NO_CONTENT);
        self.body = None;
        self.body_buffer = None;
        for name in [header::CONTENT_TYPE, header::CONTENT_LENGTH, header::TRANSFER_ENCODING] {
            self.headers.remove(name);
        }
    }

    pub fn not_modified(&mut self) {
        self.status = Some(StatusCode::NOT_MODIFIED);
        self.body = None;
        self.body_buffer = None;
        for name in [header::CONTENT_TYPE, header::CONTENT_LENGTH, header::CONTENT_ENCODING] {
            self.headers.remove(name);
        }
    }

    pub fn no_cache(&mut self) {
        self.headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }

    pub fn no_store(&mut self) {
        self.headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    /// `Cache-Control: public, max-age=…[, s-maxage=…]` in whole seconds.
    pub fn cache_max_age(&mut self, max_age: Duration, s_maxage: Option<Duration>) {
        let mut value = format!("public, max-age={}", max_age.as_secs());
        if let Some(s) = s_maxage {
            value.push_str(&format!(", s-maxage={}", s.as_secs()));
        }
        if let Ok(value) = HeaderValue::from_str(&value) {
            self.headers.insert(header::CACHE_CONTROL, value);
        }
    }

    /// Answers with a redirect right away and commits.
    pub fn redirect(&mut self, status: StatusCode, location: &str) -> Result<(), Error> {
        if !(300..=308).contains(&status.as_u16()) {
            return Err(Error::InvalidRedirect(status.as_u16()));
        }
        let location = HeaderValue::from_str(location)?;
        self.status = Some(status);
        self.body = None;
        self.body_buffer = None;
        self.headers.insert(header::LOCATION, location);
        self.response.write_head(status);
        self.committed = true;
        Ok(())
    }

    /// Commits and serves the request through `other` instead: its response
    /// becomes this request's response, and headers set here are dropped.
    /// The request body travels unread, or as the bytes already read.
    pub async fn pass(&mut self, other: &Dispatcher) -> Result<(), Error> {
        if self.body_failed {
            return Err(Error::BodyIncomplete);
        }
        self.committed = true;
        let body: RequestBody = match self.raw_body.take() {
            Some(body) => body,
            None => {
                let bytes = self.request_body.clone().unwrap_or_default();
                Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
            }
        };
        let request = Request::from_parts(self.request.clone(), body);
        self.passed = Some(other.dispatch(request, self.peer).await);
        Ok(())
    }

    /// Sets `Server-Timing` from trace records; nothing happens for an empty trace.
    pub fn server_timing(&mut self, traces: &TraceInfos, prefix: &str) {
        let value = traces.server_timing(prefix);
        if value.is_empty() {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(&value) {
            self.headers.insert(SERVER_TIMING, value);
        }
    }

    // ── Cookies ──────────────────────────────────────────────────────────────

    /// A cookie sent with the request.
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        cookie::find(&self.request.headers, name).map(|value| Cookie::new(name, value))
    }

    /// Appends a `Set-Cookie` header. Names that are not tokens are
    /// rejected; the value is sanitized when rendered.
    pub fn add_cookie(&mut self, cookie: &Cookie) -> Result<(), Error> {
        if !cookie.has_valid_name() {
            return Err(Error::InvalidCookieName(cookie.name().to_owned()));
        }
        self.headers.append(header::SET_COOKIE, HeaderValue::from_str(&cookie.to_string())?);
        Ok(())
    }

    fn signed_keys(&self) -> Option<Arc<Vec<String>>> {
        self.dispatcher.as_ref()?.signed_keys()
    }

    /// Adds `cookie` plus its `<name>.sig` companion signed with the current
    /// preferred key. Without keys only the plain cookie is added.
    pub fn add_signed_cookie(&mut self, cookie: &Cookie) -> Result<(), Error> {
        self.add_cookie(cookie)?;
        let Some(keys) = self.signed_keys() else {
            return Ok(());
        };
        let Some(signature) = Keygrip::new(&keys).sign(cookie.wire_value().as_bytes()) else {
            return Ok(());
        };
        let mut sig = cookie.clone();
        sig.set_name(format!("{}{SIGNED_COOKIE_SUFFIX}", cookie.name()));
        sig.set_value(signature);
        self.add_cookie(&sig)
    }

    /// The request cookie and the index of the key that signed it.
    ///
    /// `Ok(None)` when the cookie or its signature is missing; an index of
    /// `None` means no current key matches.
    pub fn signed_cookie_index(&self, name: &str) -> Result<Option<(Cookie, Option<usize>)>, Error> {
        let Some(cookie) = self.cookie(name) else {
            return Ok(None);
        };
        let keys = match self.signed_keys() {
            Some(keys) if !keys.is_empty() => keys,
            _ => return Err(Error::MissingSignedKeys),
        };
        let sig_name = format!("{name}{SIGNED_COOKIE_SUFFIX}");
        let Some(signature) = cookie::find(&self.request.headers, &sig_name) else {
            return Ok(None);
        };
        let index = Keygrip::new(&keys).index(cookie.value().as_bytes(), signature);
        Ok(Some((cookie, index)))
    }

    /// The request cookie, only if its signature verifies against a current key.
    pub fn signed_cookie(&self, name: &str) -> Result<Option<Cookie>, Error> {
        Ok(match self.signed_cookie_index(name)? {
            Some((cookie, Some(_))) => Some(cookie),
            _ => None,
        })
    }

    // ── Store ────────────────────────────────────────────────────────────────

    pub fn set<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.store.insert(key.into(), Box::new(value));
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.store.get(key)?.downcast_ref()
    }

    pub fn get_string(&self, key: &str) -> &str {
        self.get::<String>(key).map(String::as_str).unwrap_or("")
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get::<bool>(key).copied().unwrap_or_default()
    }

    pub fn get_i64(&self, key: &str) -> i64 {
        self.get::<i64>(key).copied().unwrap_or_default()
    }

    pub fn get_duration(&self, key: &str) -> Duration {
        self.get::<Duration>(key).copied().unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn is_pristine(&self) -> bool {
        self.request.uri == "/"
            && self.request.method == http::Method::GET
            && self.request.headers.is_empty()
            && self.raw_body.is_none()
            && !self.body_failed
            && self.peer.is_none()
            && self.response.is_pristine()
            && self.passed.is_none()
            && self.headers.is_empty()
            && !self.committed
            && self.id.is_empty()
            && self.route.is_none()
            && self.frames.is_empty()
            && self.params.is_empty()
            && self.status.is_none()
            && self.body.is_none()
            && self.body_buffer.is_none()
            && self.request_body.is_none()
            && self.store.is_empty()
            && self.real_ip.is_none()
            && self.client_ip.is_none()
            && self.dispatcher.is_none()
            && self.is_reusable()
            && self.query.is_none()
            && self.traces.is_none()
    }
}

impl Default for Context {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("route", &self.route())
            .field("committed", &self.committed)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
