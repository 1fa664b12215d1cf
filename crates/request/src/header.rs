//! Request line and header access.
//!
//! [`RequestHeader`] wraps the `http::Request<()>` the container parsed, and derives the
//! few header based values the facade needs: content type, content length and the
//! `Host` authority.

use std::str::FromStr;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use http::request::Parts;
use http::uri::Authority;
use http::{HeaderMap, Method, Request, Uri, Version};
use mime::Mime;

/// Length of the request body as announced by the client.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContentLength {
    /// No `Content-Length`, or the body is chunked.
    Unknown,
    Known(u64),
}

impl ContentLength {
    pub fn known(self) -> Option<u64> {
        match self {
            Self::Unknown => None,
            Self::Known(length) => Some(length),
        }
    }

    /// The length as a 32 bit value, `None` when unknown or too large to fit.
    pub fn as_i32(self) -> Option<i32> {
        self.known().and_then(|length| i32::try_from(length).ok())
    }
}

#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl RequestHeader {
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Protocol name and version, as in `HTTP/1.1`.
    pub fn protocol(&self) -> String {
        // http renders versions in their wire form
        format!("{:?}", self.version())
    }

    /// The parsed `Content-Type`, `None` when absent or not a valid media type.
    pub fn content_type(&self) -> Option<Mime> {
        self.headers().get(CONTENT_TYPE)?.to_str().ok()?.parse().ok()
    }

    /// The `charset` parameter of the `Content-Type`, spelled as the client sent it.
    pub fn declared_charset(&self) -> Option<String> {
        let content_type = self.headers().get(CONTENT_TYPE)?.to_str().ok()?;
        content_type.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("charset") {
                return None;
            }
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        })
    }

    pub fn content_length(&self) -> ContentLength {
        if self.headers().contains_key(TRANSFER_ENCODING) {
            return ContentLength::Unknown;
        }

        self.headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
            .map_or(ContentLength::Unknown, ContentLength::Known)
    }

    /// Authority the client addressed, from the request target or the `Host` header.
    pub fn authority(&self) -> Option<Authority> {
        if let Some(authority) = self.uri().authority() {
            return Some(authority.clone());
        }

        let host = self.headers().get(HOST)?.to_str().ok()?;
        Authority::from_str(host.trim()).ok()
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
