//! The transport-side response: what actually goes back to hyper.
//!
//! Handlers normally never touch this module. They set a status and a body
//! on the [`Context`](crate::Context) and the dispatcher's finalizer turns
//! that into bytes exactly once. A handler that needs to answer on its own
//! (a redirect, a proxy pass-through) writes through
//! [`Context::response_mut`](crate::Context::response_mut) and commits.

use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use bytes::{Bytes, BytesMut};
use http::header::{HeaderMap, HeaderValue};
use http::StatusCode;
use hyper::body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::warn;

use crate::error::Error;

const STREAM_CHUNK: usize = 8 * 1024;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for [`Context::set_content_type`](crate::Context::set_content_type).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    pub fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        })
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The per-request response handle.
///
/// The status is written at most once; later writes are ignored with a
/// warning, the same as a second `WriteHeader` on a real socket.
#[derive(Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    buf: BytesMut,
}

impl ResponseWriter {
    pub fn write_head(&mut self, status: StatusCode) {
        if let Some(written) = self.status {
            warn!(written = written.as_u16(), ignored = status.as_u16(), "superfluous status write");
            return;
        }
        self.status = Some(status);
    }

    /// Appends body bytes. Writing before [`write_head`](Self::write_head)
    /// implies `200 OK`.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn status(&self) -> Option<StatusCode> { self.status }

    pub fn written(&self) -> usize { self.buf.len() }

    pub(crate) fn reset(&mut self) {
        self.status = None;
        self.buf.clear();
    }

    #[cfg(test)]
    pub(crate) fn is_pristine(&self) -> bool {
        self.status.is_none() && self.buf.is_empty()
    }

    /// Moves everything written so far into an `http::Response`.
    pub(crate) fn take(&mut self, headers: HeaderMap) -> http::Response<ResponseBody> {
        let body = if self.buf.is_empty() {
            ResponseBody::empty()
        } else {
            ResponseBody::full(self.buf.split().freeze())
        };
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status.take().unwrap_or(StatusCode::OK);
        *response.headers_mut() = headers;
        response
    }
}

// ── ResponseBody ──────────────────────────────────────────────────────────────

/// Body type of every response catena produces.
pub struct ResponseBody {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Option<Bytes>),
    Stream(ReaderBody),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    pub fn full(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self { kind: Kind::Full(Some(bytes)) }
    }

    pub(crate) fn stream(body: ReaderBody) -> Self {
        Self { kind: Kind::Stream(body) }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Error>>> {
        match &mut self.get_mut().kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Full(bytes) => Poll::Ready(bytes.take().map(|b| Ok(Frame::data(b)))),
            Kind::Stream(stream) => Pin::new(stream).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Full(bytes) => bytes.is_none(),
            Kind::Stream(stream) => stream.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Full(bytes) => SizeHint::with_exact(bytes.as_ref().map_or(0, |b| b.len() as u64)),
            Kind::Stream(_) => SizeHint::default(),
        }
    }
}

// ── ReaderBody ────────────────────────────────────────────────────────────────

type ErrorCallback = Box<dyn FnOnce(&Error) + Send>;

/// Copies an `AsyncRead` into response frames.
///
/// The reader is dropped, and so closed, as soon as it reports end-of-stream
/// or an error. A read error is handed to `on_error` once before being
/// surfaced to hyper.
pub(crate) struct ReaderBody {
    reader: Option<Box<dyn AsyncRead + Send + Unpin>>,
    chunk: Box<[u8]>,
    on_error: Option<ErrorCallback>,
}

impl ReaderBody {
    pub(crate) fn new(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        on_error: impl FnOnce(&Error) + Send + 'static,
    ) -> Self {
        Self {
            reader: Some(reader),
            chunk: vec![0; STREAM_CHUNK].into_boxed_slice(),
            on_error: Some(Box::new(on_error)),
        }
    }
}

impl Body for ReaderBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Error>>> {
        let this = self.get_mut();
        let Some(reader) = this.reader.as_mut() else {
            return Poll::Ready(None);
        };

        let mut buf = ReadBuf::new(&mut this.chunk);
        match Pin::new(reader).poll_read(cx, &mut buf) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) if buf.filled().is_empty() => {
                this.reader = None;
                Poll::Ready(None)
            }
            Poll::Ready(Ok(())) => {
                Poll::Ready(Some(Ok(Frame::data(Bytes::copy_from_slice(buf.filled())))))
            }
            Poll::Ready(Err(e)) => {
                this.reader = None;
                let err = Error::Io(e);
                if let Some(on_error) = this.on_error.take() {
                    on_error(&err);
                }
                Poll::Ready(Some(Err(err)))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.reader.is_none()
    }
}
