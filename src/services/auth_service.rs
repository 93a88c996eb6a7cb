use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::de::DeserializeOwned;

use crate::auth::AuthError;

const AUTH_COOKIE: &str = "auth_token";

// Get the auth token for a request.
// Browsers can't set headers on a WebSocket handshake, so the `token` query
// parameter comes first, then the Authorization header, then the cookie.
pub fn get_auth_token(query_token: Option<&str>, headers: &HeaderMap) -> Result<String, AuthError> {
    // 1. Query parameter
    if let Some(token) = query_token.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    // 2. Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| AuthError::MalformedHeader)?;
        let token = auth_str.strip_prefix("Bearer ").ok_or(AuthError::MalformedHeader)?;
        return Ok(token.to_string());
    }

    // 3. Cookie
    let cookie_header = headers
        .get(http::header::COOKIE)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    cookie::Cookie::split_parse(cookie_header)
        .flatten()
        .find(|c| c.name() == AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AuthError::MissingToken)
}

// Validate a JWT token and return the token data
pub fn validate_jwt<C: DeserializeOwned>(token: &str, secret: &str) -> Result<TokenData<C>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<C>(token, &decoding_key, &validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn query_parameter_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(get_auth_token(Some("from-query"), &headers).unwrap(), "from-query");
    }

    #[test]
    fn falls_back_to_bearer_header_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(get_auth_token(Some(""), &headers).unwrap(), "abc");

        let mut headers = HeaderMap::new();
        headers.insert(http::header::COOKIE, HeaderValue::from_static("theme=dark; auth_token=xyz"));
        assert_eq!(get_auth_token(None, &headers).unwrap(), "xyz");
    }

    #[test]
    fn rejects_missing_or_malformed_tokens() {
        assert!(matches!(get_auth_token(None, &HeaderMap::new()), Err(AuthError::MissingToken)));

        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(get_auth_token(None, &headers), Err(AuthError::MalformedHeader)));
    }
}
