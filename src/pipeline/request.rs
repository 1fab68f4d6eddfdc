//! Read-only request view and upstream addressing.

use std::borrow::Cow;
use std::str::FromStr;

use axum::http::header::{HOST, USER_AGENT};
use axum::http::request::Parts;
use axum::http::uri::{Authority, InvalidUri, PathAndQuery, Scheme};
use axum::http::{HeaderMap, HeaderValue, Method, Uri, Version};

/// Borrowed view of a request as seen by the stages.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub version: Version,
    pub headers: &'a HeaderMap,
    pub body: Option<&'a [u8]>,
}

impl<'a> RequestView<'a> {
    pub fn from_parts(parts: &'a Parts) -> Self {
        Self {
            method: &parts.method,
            uri: &parts.uri,
            version: parts.version,
            headers: &parts.headers,
            body: None,
        }
    }

    pub fn with_body(self, body: &'a [u8]) -> Self {
        Self {
            body: Some(body),
            ..self
        }
    }

    /// Non-UTF-8 bytes are replaced rather than hiding the whole value.
    pub fn user_agent(&self) -> Option<Cow<'a, str>> {
        self.headers
            .get(USER_AGENT)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
    }

    /// Path plus query, as sent on the request line.
    pub fn target(&self) -> &'a str {
        self.uri
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/")
    }

    pub fn protocol(&self) -> &'static str {
        match self.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_2 => "HTTP/2.0",
            Version::HTTP_3 => "HTTP/3.0",
            _ => "HTTP/1.1",
        }
    }
}

/// Scheme and authority of the single origin.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    host: HeaderValue,
}

impl Upstream {
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Target URI on the origin for an inbound request URI.
    pub fn target_uri(&self, inbound: &Uri) -> Result<Uri, axum::http::Error> {
        let path = inbound
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path)
            .build()
    }

    /// Replace Host with the origin's authority so virtual hosting on the
    /// origin resolves correctly.
    pub fn rewrite_host(&self, headers: &mut HeaderMap) {
        headers.insert(HOST, self.host.clone());
    }
}

impl FromStr for Upstream {
    type Err = InvalidUri;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri: Uri = s.parse()?;
        let authority = match uri.authority() {
            Some(a) => a.clone(),
            // "http://" with no host; re-parse an empty authority to get an InvalidUri
            None => Authority::from_str("")?,
        };
        // authority bytes are always valid header bytes
        let host = HeaderValue::from_str(authority.as_str())
            .unwrap_or_else(|_| HeaderValue::from_static("localhost"));
        Ok(Self {
            scheme: uri.scheme().cloned().unwrap_or(Scheme::HTTP),
            authority,
            host,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn view_exposes_request_line() {
        let (parts, _) = Request::builder()
            .method("POST")
            .uri("/login?next=%2Fhome")
            .header("user-agent", "Mozilla/5.0")
            .body(())
            .unwrap()
            .into_parts();
        let view = RequestView::from_parts(&parts).with_body(b"a=1");

        assert_eq!(view.target(), "/login?next=%2Fhome");
        assert_eq!(view.user_agent().as_deref(), Some("Mozilla/5.0"));
        assert_eq!(view.protocol(), "HTTP/1.1");
        assert_eq!(view.body, Some(&b"a=1"[..]));
    }

    #[test]
    fn user_agent_with_invalid_utf8_is_decoded_lossily() {
        let (parts, _) = Request::builder()
            .header("user-agent", HeaderValue::from_bytes(b"go-http-client \xff\xfe").unwrap())
            .body(())
            .unwrap()
            .into_parts();
        let agent = RequestView::from_parts(&parts).user_agent().unwrap();
        assert!(agent.starts_with("go-http-client "));
    }

    #[test]
    fn upstream_rewrites_uri_and_host() {
        let upstream: Upstream = "http://origin.internal:3000".parse().unwrap();
        let uri = upstream.target_uri(&"/api/items?id=4".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "http://origin.internal:3000/api/items?id=4");

        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("shield.example.com"));
        upstream.rewrite_host(&mut headers);
        assert_eq!(headers[HOST], "origin.internal:3000");
    }

    #[test]
    fn upstream_requires_authority() {
        assert!("/relative/only".parse::<Upstream>().is_err());
    }
}
