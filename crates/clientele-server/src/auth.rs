use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use clientele_core::Caller;

use crate::error::ApiError;
use crate::state::AppState;

/// Guards `/customer/*` when `REQUIRE_AUTH` is on by delegating the bearer
/// token to the login service. Anything but an explicit "valid" is a 401.
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if !state.settings.require_auth || !req.uri().path().starts_with("/customer") {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_owned);

    let Some(token) = token else {
        return ApiError::Unauthorized.into_response();
    };

    let verdict = state.services.validate_token(&token).await;
    if !verdict.valid {
        tracing::warn!(path = %req.uri().path(), "rejected request with invalid token");
        return ApiError::Unauthorized.into_response();
    }

    req.extensions_mut().insert(Caller::from(verdict));
    next.run(req).await
}
