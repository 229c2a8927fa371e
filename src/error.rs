//! Unified error type.

use std::fmt;

use http::StatusCode;

/// Boxed error used for failures coming from foreign body or I/O types.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by handlers and by catena's fallible operations.
///
/// The chain never wraps or rewrites an error a handler returns: whatever a
/// handler produces is exactly what error listeners and the error mapper see.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Application error that carries the response it suggests.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// A named route parameter failed its registered validator.
    #[error("invalid param `{name}`: {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("invalid redirect status {0}, expected 300..=308")]
    InvalidRedirect(u16),

    #[error("keys for signed cookies are not set")]
    MissingSignedKeys,

    #[error("invalid cookie name `{0}`")]
    InvalidCookieName(String),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("hyper: {0}")]
    Hyper(#[from] hyper::Error),

    /// Reading the request body or streaming the response body failed.
    #[error("body: {0}")]
    Body(#[source] BoxError),

    /// An earlier read of the request body failed part way; what arrived is
    /// not the whole body.
    #[error("request body is incomplete, an earlier read failed")]
    BodyIncomplete,

    #[error(transparent)]
    Other(BoxError),
}

impl Error {
    /// Shorthand for an [`HttpError`] with the given status and message.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http(HttpError::new(status, message))
    }

    pub fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam { name: name.into(), reason: reason.into() }
    }

    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    /// The status code the default error mapper answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http(e) => e.status(),
            Self::InvalidParam { .. } | Self::InvalidRedirect(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An error that declares its own HTTP status, category and message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    category: Option<String>,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, category: None, message: message.into() }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn category(&self) -> Option<&str> { self.category.as_deref() }
    pub fn message(&self) -> &str { &self.message }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.category {
            Some(category) => write!(f, "category={category}, message={}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for HttpError {}
