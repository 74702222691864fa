use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{http_objects::RegistryAPIError, routes::RouteState};

/// Compares the raw `Authorization` header with the configured create key.
/// Runs before the request body is read.
pub async fn require_create_key(
    State(state): State<RouteState>,
    request: Request,
    next: Next,
) -> Result<Response, RegistryAPIError> {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .map(|value| key_matches(value.as_bytes(), state.create_key.as_bytes()))
        .unwrap_or(false);
    if !authorized {
        return Err(RegistryAPIError::unauthorized());
    }
    Ok(next.run(request).await)
}

fn key_matches(given: &[u8], expected: &[u8]) -> bool {
    !expected.is_empty() && bool::from(given.ct_eq(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_matches_byte_for_byte() {
        assert!(key_matches(b"secret", b"secret"));
        assert!(!key_matches(b"Secret", b"secret"));
        assert!(!key_matches(b"Bearer secret", b"secret"));
        assert!(!key_matches(b"secret ", b"secret"));
        assert!(!key_matches(b"", b""));
    }
}
