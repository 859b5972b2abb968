use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::auth::current_actor;
use crate::error::ApiError;
use crate::state::AppState;

/// Resolve the session cookie into an `Actor` request extension, or send the
/// visitor to the login page with the original path and query as `next`.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match current_actor(&state, &jar).await? {
        Some(actor) => {
            req.extensions_mut().insert(actor);
            Ok(next.run(req).await)
        }
        None => {
            let uri = req.uri();
            let next = uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| uri.path().to_string());
            debug!("Anonymous request to {}", next);
            Err(ApiError::Unauthenticated { next })
        }
    }
}
