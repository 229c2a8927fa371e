//! Request cookie lookup and `Set-Cookie` rendering.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use http::header::{self, HeaderMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

/// A cookie read from a request or queued for `Set-Cookie`.
///
/// ```rust
/// use std::time::Duration;
/// use catena::Cookie;
///
/// let cookie = Cookie::new("session", "abc")
///     .path("/")
///     .max_age(Duration::from_secs(3600))
///     .http_only(true);
/// assert_eq!(cookie.to_string(), "session=abc; Path=/; Max-Age=3600; HttpOnly");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<Duration>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), ..Self::default() }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn value(&self) -> &str { &self.value }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Whether the name is an RFC 7230 token, the only names `Set-Cookie`
    /// can carry.
    pub fn has_valid_name(&self) -> bool {
        !self.name.is_empty() && self.name.bytes().all(is_token_byte)
    }

    /// The value as it goes on the wire: bytes outside the RFC 6265
    /// cookie-octet set are dropped. This is also what a client sends back.
    pub(crate) fn wire_value(&self) -> Cow<'_, str> {
        sanitize(&self.value, is_value_byte)
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn is_value_byte(b: u8) -> bool {
    (0x20..0x7f).contains(&b) && b != b'"' && b != b';' && b != b'\\'
}

fn is_attr_byte(b: u8) -> bool {
    (0x20..0x7f).contains(&b) && b != b';'
}

fn sanitize(s: &str, valid: fn(u8) -> bool) -> Cow<'_, str> {
    if s.bytes().all(valid) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| c.is_ascii() && valid(*c as u8)).collect())
}

/// The `Set-Cookie` value. Characters that would break out of the name,
/// value or path are dropped, values with spaces or commas are quoted, and
/// a malformed domain is left out.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.wire_value();
        if value.contains(|c| c == ' ' || c == ',') {
            write!(f, "{}=\"{value}\"", sanitize(&self.name, is_token_byte))?;
        } else {
            write!(f, "{}={value}", sanitize(&self.name, is_token_byte))?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={}", sanitize(path, is_attr_byte))?;
        }
        if let Some(domain) = &self.domain {
            let domain = domain.trim_start_matches('.');
            if !domain.is_empty() && domain.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.') {
                write!(f, "; Domain={domain}")?;
            }
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age.as_secs())?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={}", same_site.as_str())?;
        }
        Ok(())
    }
}

/// Value of the first request cookie called `name`, across every `Cookie` header.
pub(crate) fn find<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"'))
}
