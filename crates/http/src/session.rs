//! Visitor identification by cookie.
//!
//! Every request gets a [`VisitorId`] in its extensions. A visitor without a
//! valid cookie receives a fresh UUIDv7 and a `Set-Cookie` on the response.
//! What is stored per visitor is up to the application.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::{NoContext, Timestamp, Uuid};

/// Opaque per-visitor session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisitorId(Uuid);

impl VisitorId {
    pub fn generate() -> Self {
        Self(Uuid::new_v7(Timestamp::now(NoContext)))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Cookie configuration for the visitor middleware
#[derive(Debug, Clone)]
pub struct VisitorCookie {
    pub name: String,
}

impl VisitorCookie {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn find(&self, headers: &HeaderMap) -> Option<VisitorId> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .and_then(|(_, value)| VisitorId::parse(value))
    }

    fn set_cookie(&self, visitor: &VisitorId) -> Option<HeaderValue> {
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.name, visitor
        ))
        .ok()
    }
}

/// Middleware attaching a [`VisitorId`] to each request.
///
/// Mount with `axum::middleware::from_fn_with_state(Arc<VisitorCookie>, visitor_session)`.
pub async fn visitor_session(
    State(cookie): State<Arc<VisitorCookie>>,
    mut request: Request,
    next: Next,
) -> Response {
    let (visitor, issued) = match cookie.find(request.headers()) {
        Some(visitor) => (visitor, false),
        None => (VisitorId::generate(), true),
    };

    request.extensions_mut().insert(visitor.clone());
    let mut response = next.run(request).await;

    if issued {
        if let Some(value) = cookie.set_cookie(&visitor) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        tracing::debug!(visitor = %visitor, "issued visitor session");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_visitor_among_other_cookies() {
        let cookie = VisitorCookie::new("libris_session");
        let visitor = VisitorId::generate();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; libris_session={}; lang=es", visitor))
                .unwrap(),
        );

        assert_eq!(cookie.find(&headers), Some(visitor));
    }

    #[test]
    fn garbage_cookie_is_ignored() {
        let cookie = VisitorCookie::new("libris_session");
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("libris_session=not-a-uuid"),
        );

        assert_eq!(cookie.find(&headers), None);
    }

    #[test]
    fn set_cookie_is_scoped_to_root() {
        let cookie = VisitorCookie::new("libris_session");
        let visitor = VisitorId::generate();
        let value = cookie.set_cookie(&visitor).unwrap();
        let value = value.to_str().unwrap();

        assert!(value.starts_with(&format!("libris_session={}", visitor)));
        assert!(value.contains("Path=/"));
        assert!(value.contains("HttpOnly"));
    }
}
