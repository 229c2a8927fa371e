//! HTTP method as a typed enum.
//!
//! Routes are registered per [`Method`]. Requests whose method has no variant
//! here never match a route and take the not-found path.

use std::fmt;
use std::str::FromStr;

/// A routable HTTP method (RFC 9110).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    /// The methods [`App::all`](crate::App::all) registers a route for.
    pub const ALL: [Method; 8] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Head,
        Self::Options,
        Self::Trace,
    ];

    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
        }
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            _         => Err(()),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = ();

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
