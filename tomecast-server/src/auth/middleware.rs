use axum::{
    extract::{Query, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use super::{AuthError, AuthenticatedUser};
use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Resolve the caller and attach an [`AuthenticatedUser`] to the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request).ok_or(AuthError::MissingToken)?;
    let user = state.access_verifier.verify_access_token(&token).await?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Media access needs download permission and, for restricted users, the
/// book in their allowed set. Unknown books look the same as forbidden ones.
pub fn authorize_book(user: &AuthenticatedUser, book_id: &str) -> AppResult<()> {
    if !user.can_download {
        return Err(AppError::forbidden("download permission required"));
    }
    if !user.can_access_book(book_id) {
        return Err(AppError::not_found("book not found"));
    }
    Ok(())
}

/// Bearer header first, then the `token` query parameter for players that
/// cannot set headers on media requests.
fn extract_token(request: &Request) -> Option<String> {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
}
