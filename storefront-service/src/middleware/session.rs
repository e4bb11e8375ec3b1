use axum::http::{header::SET_COOKIE, HeaderValue};
use axum::{extract::Request, middleware::Next, response::Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::fmt;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "storefront_session";

/// Opaque per-browser key that carts are stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accepts only keys this service could have issued.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 64
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the session key from the `storefront_session` cookie, issuing a
/// new one when the browser has none.
pub async fn session_middleware(mut req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    let existing = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| SessionKey::parse(cookie.value()));

    let (session, issued) = match existing {
        Some(session) => (session, false),
        None => (SessionKey::generate(), true),
    };
    req.extensions_mut().insert(session.clone());

    let mut response = next.run(req).await;

    if issued {
        let cookie = Cookie::build((SESSION_COOKIE, session.0))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }

    response
}
