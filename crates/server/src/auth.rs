use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// Decides whether a request comes from someone allowed to see previews,
/// statistics and cache controls.
pub trait ViewerAuth: Send + Sync {
    fn is_privileged(&self, headers: &HeaderMap) -> bool;
}

/// Privileged when the request carries `Authorization: Bearer <token>` with
/// the configured token. Without a configured token nobody is privileged.
#[derive(Clone, Debug, Default)]
pub struct TokenAuthorizer {
    token: Option<String>,
}

impl TokenAuthorizer {
    pub fn new(token: Option<String>) -> Self {
        Self { token: token.filter(|token| !token.is_empty()) }
    }
}

impl ViewerAuth for TokenAuthorizer {
    fn is_privileged(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.token else {
            return false;
        };
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|presented| presented.trim() == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    #[rstest]
    #[case(Some("s3cret"), Some("Bearer s3cret"), true)]
    #[case(Some("s3cret"), Some("Bearer wrong"), false)]
    #[case(Some("s3cret"), Some("Basic s3cret"), false)]
    #[case(Some("s3cret"), None, false)]
    #[case(None, Some("Bearer "), false)]
    #[case(Some(""), Some("Bearer "), false)]
    fn test_token_authorizer(#[case] token: Option<&str>, #[case] header: Option<&str>, #[case] expected: bool) {
        let auth = TokenAuthorizer::new(token.map(str::to_string));
        let mut headers = HeaderMap::new();
        if let Some(header) = header {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(header).unwrap());
        }
        assert_eq!(auth.is_privileged(&headers), expected);
    }
}
