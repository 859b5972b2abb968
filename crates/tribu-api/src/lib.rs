pub mod access;
pub mod auth;
pub mod echos;
pub mod error;
pub mod flash;
pub mod listing;
pub mod middleware;
pub mod pages;
pub mod redirect;
pub mod state;
pub mod storage;
pub mod users;
pub mod waves;

use axum::{Router, extract::DefaultBodyLimit, middleware::from_fn_with_state, routing::get};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;

/// Headroom on top of the avatar limit for the rest of a multipart body.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(pages::index))
        .route("/login/", get(auth::login_page).post(auth::login))
        .route("/logout/", get(auth::logout))
        .route("/signup/", get(auth::signup_page).post(auth::signup))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/echos/", get(echos::list))
        .route("/echos/add/", get(echos::add_page).post(echos::add))
        .route("/echos/{echo_id}/", get(echos::detail))
        .route("/echos/{echo_id}/waves/", get(echos::waves))
        .route("/echos/{echo_id}/waves/add/", get(waves::add_page).post(waves::add))
        .route("/echos/{echo_id}/edit/", get(echos::edit_page).post(echos::edit))
        .route("/echos/{echo_id}/delete/", get(echos::delete))
        .route("/waves/{wave_id}/edit/", get(waves::edit_page).post(waves::edit))
        .route("/waves/{wave_id}/delete/", get(waves::delete))
        .route("/users/", get(users::list))
        .route("/users/@me/", get(users::me))
        .route("/users/{username}/", get(users::detail))
        .route("/users/{username}/echos/", get(users::echos))
        .route("/users/{username}/edit/", get(users::edit_page).post(users::edit))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let body_limit = state.settings.max_avatar_bytes + FORM_OVERHEAD_BYTES;
    let media = ServeDir::new(state.media.root());

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/media", media)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health: liveness check (no auth).
async fn health() -> &'static str {
    "ok"
}
