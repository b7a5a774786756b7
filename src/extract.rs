//! Event extraction from inbound request metadata.
//!
//! [`extract`] reads a [`RequestContext`] and builds the [`Event`] shape named
//! by an [`EventKind`]. It never performs I/O and never mutates the request.
//!
//! [`HttpRequestContext`] is the context used by the axum middleware; any
//! other host can implement [`RequestContext`] directly.

use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::header::{HeaderMap, COOKIE};
use percent_encoding::percent_decode_str;
use std::net::SocketAddr;
use thiserror::Error;

use crate::event::{ApiEndpointLog, AuthLog, Event, EventKind};

/// Cookie carrying the caller's access token for API events.
pub const ACCESS_TOKEN_COOKIE: &str = "IFX-ACCESS-TOKEN";

/// Header carrying the client identifier for auth events.
pub const CLIENT_HEADER: &str = "IFX-CLIENT";

/// Errors that can occur while building an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// A cookie the event kind depends on was not sent
    #[error("named cookie not present: {0}")]
    MissingCookie(String),
}

/// Read-only view of the request being intercepted.
pub trait RequestContext {
    /// Client IP address, empty when it cannot be determined
    fn client_ip(&self) -> String;

    /// Matched route path, or the request path when no route matched
    fn path(&self) -> &str;

    /// HTTP method
    fn method(&self) -> &str;

    /// Decoded value of the named cookie, if sent
    fn cookie(&self, name: &str) -> Option<String>;

    /// Value of the named header, if sent and valid UTF-8
    fn header(&self, name: &str) -> Option<&str>;
}

/// Build the event of the given kind from a request context.
pub fn extract<C>(ctx: &C, kind: EventKind) -> Result<Event, ExtractionError>
where
    C: RequestContext + ?Sized,
{
    match kind {
        EventKind::Api => {
            let token = ctx
                .cookie(ACCESS_TOKEN_COOKIE)
                .ok_or_else(|| ExtractionError::MissingCookie(ACCESS_TOKEN_COOKIE.to_string()))?;

            Ok(Event::Api(ApiEndpointLog {
                ip: ctx.client_ip(),
                path: ctx.path().to_string(),
                method: ctx.method().to_string(),
                token,
            }))
        }
        EventKind::Auth => Ok(Event::Auth(AuthLog {
            ip: ctx.client_ip(),
            client: ctx.header(CLIENT_HEADER).unwrap_or_default().to_string(),
        })),
    }
}

/// Build the event of the given kind, never giving up on a missing cookie.
///
/// A missing access token still yields an API event, with an empty token,
/// alongside the extraction error so the caller can both forward the event
/// and report the failure.
pub fn extract_lenient<C>(ctx: &C, kind: EventKind) -> (Event, Option<ExtractionError>)
where
    C: RequestContext + ?Sized,
{
    match extract(ctx, kind) {
        Ok(event) => (event, None),
        Err(e) => {
            let event = Event::Api(ApiEndpointLog {
                ip: ctx.client_ip(),
                path: ctx.path().to_string(),
                method: ctx.method().to_string(),
                token: String::new(),
            });
            (event, Some(e))
        }
    }
}

/// Snapshot of the request metadata an axum handler chain exposes.
///
/// Taken before the request is handed to the next handler, so extraction
/// does not hold a borrow of the request.
#[derive(Debug, Clone)]
pub struct HttpRequestContext {
    peer: Option<SocketAddr>,
    path: String,
    method: String,
    headers: HeaderMap,
}

impl HttpRequestContext {
    /// Capture the context of an axum request.
    ///
    /// The path is the route template from [`MatchedPath`] when available.
    /// The peer address comes from [`ConnectInfo`], which is only present
    /// when the app is served with `into_make_service_with_connect_info`.
    pub fn from_request(req: &Request) -> Self {
        let path = req
            .extensions()
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());

        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            peer,
            path,
            method: req.method().as_str().to_string(),
            headers: req.headers().clone(),
        }
    }

    /// Build a context by hand, for hosts that are not axum.
    pub fn new(
        peer: Option<SocketAddr>,
        path: impl Into<String>,
        method: impl Into<String>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            peer,
            path: path.into(),
            method: method.into(),
            headers,
        }
    }
}

impl RequestContext for HttpRequestContext {
    fn client_ip(&self) -> String {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
                return first.to_string();
            }
        }

        if let Some(real_ip) = self.header("x-real-ip").map(str::trim) {
            if !real_ip.is_empty() {
                return real_ip.to_string();
            }
        }

        self.peer
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| key.trim() == name)
            .and_then(|(_, value)| query_unescape(unquote(value.trim())))
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Strip one pair of surrounding double quotes from a cookie value
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Decode a cookie value the way query strings are decoded: `+` is a space
/// and `%XX` is a byte. Malformed escapes or non UTF-8 results yield `None`.
fn query_unescape(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.5:51234".parse().unwrap())
    }

    #[test]
    fn test_extract_api_event() {
        let ctx = HttpRequestContext::new(
            peer(),
            "/orders",
            "GET",
            headers(&[("cookie", "theme=dark; IFX-ACCESS-TOKEN=tok123")]),
        );

        let event = extract(&ctx, EventKind::Api).unwrap();
        assert_eq!(event, Event::api("10.0.0.5", "/orders", "GET", "tok123"));
    }

    #[test]
    fn test_extract_api_missing_cookie() {
        let ctx = HttpRequestContext::new(peer(), "/orders", "GET", headers(&[("cookie", "a=b")]));

        let err = extract(&ctx, EventKind::Api).unwrap_err();
        assert_eq!(err, ExtractionError::MissingCookie("IFX-ACCESS-TOKEN".to_string()));
    }

    #[test]
    fn test_alternate_cookie_name_is_not_read() {
        let ctx = HttpRequestContext::new(peer(), "/", "GET", headers(&[("cookie", "ifx-at=tok")]));

        assert!(extract(&ctx, EventKind::Api).is_err());
    }

    #[test]
    fn test_extract_api_empty_cookie_value() {
        let ctx = HttpRequestContext::new(
            peer(),
            "/orders",
            "POST",
            headers(&[("cookie", "IFX-ACCESS-TOKEN=")]),
        );

        let event = extract(&ctx, EventKind::Api).unwrap();
        assert_eq!(event, Event::api("10.0.0.5", "/orders", "POST", ""));
    }

    #[test]
    fn test_extract_auth_event() {
        let ctx = HttpRequestContext::new(peer(), "/login", "POST", headers(&[("ifx-client", "web")]));

        let event = extract(&ctx, EventKind::Auth).unwrap();
        assert_eq!(event, Event::auth("10.0.0.5", "web"));
    }

    #[test]
    fn test_extract_auth_missing_header_is_empty() {
        let ctx = HttpRequestContext::new(peer(), "/login", "POST", HeaderMap::new());

        let event = extract(&ctx, EventKind::Auth).unwrap();
        assert_eq!(event, Event::auth("10.0.0.5", ""));
    }

    #[test]
    fn test_cookie_across_multiple_headers_and_quotes() {
        let ctx = HttpRequestContext::new(
            None,
            "/",
            "GET",
            headers(&[("cookie", "a=1"), ("cookie", "IFX-ACCESS-TOKEN=\"quoted\"")]),
        );

        assert_eq!(ctx.cookie("IFX-ACCESS-TOKEN").as_deref(), Some("quoted"));
        assert_eq!(ctx.cookie("a").as_deref(), Some("1"));
        assert_eq!(ctx.cookie("missing"), None);
    }

    #[test]
    fn test_cookie_value_is_query_unescaped() {
        let ctx = HttpRequestContext::new(
            peer(),
            "/orders",
            "GET",
            headers(&[("cookie", "IFX-ACCESS-TOKEN=a%20b%2Bc+d")]),
        );

        assert_eq!(ctx.cookie("IFX-ACCESS-TOKEN").as_deref(), Some("a b+c d"));

        let event = extract(&ctx, EventKind::Api).unwrap();
        assert_eq!(event, Event::api("10.0.0.5", "/orders", "GET", "a b+c d"));
    }

    #[test]
    fn test_malformed_escape_counts_as_absent() {
        for raw in ["IFX-ACCESS-TOKEN=bad%zz", "IFX-ACCESS-TOKEN=cut%2", "IFX-ACCESS-TOKEN=%ff"] {
            let ctx = HttpRequestContext::new(peer(), "/", "GET", headers(&[("cookie", raw)]));

            assert_eq!(ctx.cookie("IFX-ACCESS-TOKEN"), None, "{}", raw);
            assert!(matches!(
                extract(&ctx, EventKind::Api),
                Err(ExtractionError::MissingCookie(_))
            ));
        }
    }

    #[test]
    fn test_extract_lenient_blanks_missing_token() {
        let ctx = HttpRequestContext::new(peer(), "/orders", "GET", HeaderMap::new());

        let (event, error) = extract_lenient(&ctx, EventKind::Api);
        assert_eq!(event, Event::api("10.0.0.5", "/orders", "GET", ""));
        assert_eq!(error, Some(ExtractionError::MissingCookie("IFX-ACCESS-TOKEN".to_string())));

        let ctx = HttpRequestContext::new(peer(), "/login", "POST", HeaderMap::new());
        let (event, error) = extract_lenient(&ctx, EventKind::Auth);
        assert_eq!(event, Event::auth("10.0.0.5", ""));
        assert!(error.is_none());
    }

    #[test]
    fn test_client_ip_precedence() {
        let forwarded = HttpRequestContext::new(
            peer(),
            "/",
            "GET",
            headers(&[("x-forwarded-for", " 203.0.113.7, 10.0.0.1"), ("x-real-ip", "198.51.100.2")]),
        );
        assert_eq!(forwarded.client_ip(), "203.0.113.7");

        let real_ip =
            HttpRequestContext::new(peer(), "/", "GET", headers(&[("x-real-ip", "198.51.100.2")]));
        assert_eq!(real_ip.client_ip(), "198.51.100.2");

        let socket = HttpRequestContext::new(peer(), "/", "GET", HeaderMap::new());
        assert_eq!(socket.client_ip(), "10.0.0.5");

        let unknown = HttpRequestContext::new(None, "/", "GET", HeaderMap::new());
        assert_eq!(unknown.client_ip(), "");
    }

    #[test]
    fn test_from_request_falls_back_to_uri_path() {
        let req = Request::builder()
            .method("PUT")
            .uri("/raw/path?q=1")
            .body(axum::body::Body::empty())
            .unwrap();

        let ctx = HttpRequestContext::from_request(&req);
        assert_eq!(ctx.path(), "/raw/path");
        assert_eq!(ctx.method(), "PUT");
        assert_eq!(ctx.client_ip(), "");
    }
}
