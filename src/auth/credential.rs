//! Credential extraction from handshake metadata

use axum::http::{header, HeaderMap};

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "jwt";

/// Pull the session credential out of a handshake.
///
/// Looks at the `jwt` cookie first, then `Authorization: Bearer <token>`,
/// then the `token` query parameter.
pub fn extract_credential(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    cookie_token(headers)
        .or_else(|| bearer_token(headers))
        .or_else(|| {
            query_token
                .filter(|token| !token.is_empty())
                .map(str::to_string)
        })
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
        .map(|value| {
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_cookie_among_others() {
        let headers = headers_with(header::COOKIE, "theme=dark; jwt=abc.def.ghi; lang=en");
        assert_eq!(extract_credential(&headers, None), Some("abc.def.ghi".to_string()));
    }

    #[test]
    fn test_cookie_value_is_percent_decoded() {
        let headers = headers_with(header::COOKIE, "jwt=abc%2Edef");
        assert_eq!(extract_credential(&headers, None), Some("abc.def".to_string()));
    }

    #[test]
    fn test_cookie_prefix_name_is_not_matched() {
        let headers = headers_with(header::COOKIE, "xjwt=nope");
        assert_eq!(extract_credential(&headers, None), None);
    }

    #[test]
    fn test_bearer_header() {
        let headers = headers_with(header::AUTHORIZATION, "Bearer tok");
        assert_eq!(extract_credential(&headers, None), Some("tok".to_string()));
    }

    #[test]
    fn test_cookie_wins_over_query() {
        let headers = headers_with(header::COOKIE, "jwt=from-cookie");
        assert_eq!(
            extract_credential(&headers, Some("from-query")),
            Some("from-cookie".to_string())
        );
    }

    #[test]
    fn test_query_fallback_and_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_credential(&headers, Some("q")), Some("q".to_string()));
        assert_eq!(extract_credential(&headers, Some("")), None);
        assert_eq!(extract_credential(&headers, None), None);
    }
}
