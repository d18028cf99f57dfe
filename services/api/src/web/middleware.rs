//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Pulls the auth session id out of the `Cookie` header, if any.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

/// Middleware that validates the auth session cookie and extracts the user_id.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If invalid, expired or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_session_id = session_id_from_headers(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let user_id = state
        .accounts
        .validate_auth_session(&auth_session_id)
        .await
        .map_err(|e| {
            warn!("Rejected auth session: {:?}", e);
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn finds_the_session_among_other_cookies() {
        let headers = with_cookie("theme=dark; session=abc-123; lang=en");
        assert_eq!(session_id_from_headers(&headers), Some("abc-123"));
    }

    #[test]
    fn ignores_lookalike_and_empty_cookies() {
        assert_eq!(session_id_from_headers(&with_cookie("mysession=abc")), None);
        assert_eq!(session_id_from_headers(&with_cookie("session=")), None);
        assert_eq!(session_id_from_headers(&HeaderMap::new()), None);
    }
}
