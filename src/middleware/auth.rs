use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError, state::AppState};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
}

/// Pull the raw token out of `Authorization: Bearer <t>` or `Authorization: Token <t>`.
/// `Ok(None)` means the header is absent.
fn token_from_headers(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthenticated("Invalid Authorization header".into()))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .or_else(|| auth_str.strip_prefix("Token "))
        .ok_or_else(|| AppError::Unauthenticated("Invalid Authorization scheme".into()))?
        .trim();

    if token.is_empty() {
        return Err(AppError::Unauthenticated("Empty token".into()));
    }
    Ok(Some(token))
}

pub fn decode_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthenticated("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthenticated("Invalid user id in token".into()))?;

    Ok(AuthUser {
        user_id,
        username: decoded.claims.username,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers)?.ok_or_else(|| {
            AppError::Unauthenticated("Authentication credentials were not provided".into())
        })?;
        decode_token(token, &state.config.jwt_secret)
    }
}

/// Anonymous callers extract as `None`; a present but invalid token is still rejected.
impl OptionalFromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        token_from_headers(&parts.headers)?
            .map(|token| decode_token(token, &state.config.jwt_secret))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_bearer_and_token_schemes() {
        assert_eq!(token_from_headers(&headers("Bearer abc")).unwrap(), Some("abc"));
        assert_eq!(token_from_headers(&headers("Token xyz")).unwrap(), Some("xyz"));
    }

    #[test]
    fn missing_header_is_anonymous() {
        assert_eq!(token_from_headers(&HeaderMap::new()).unwrap(), None);
    }

    #[test]
    fn unknown_scheme_is_unauthenticated() {
        assert!(matches!(
            token_from_headers(&headers("Basic Zm9vOmJhcg==")),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn garbage_token_is_unauthenticated() {
        assert!(matches!(
            decode_token("not-a-jwt", "secret"),
            Err(AppError::Unauthenticated(_))
        ));
    }
}
