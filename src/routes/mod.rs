use axum::Router;

use crate::state::SharedState;

pub mod admin;
pub mod auth;
pub mod docs;
pub mod games;
pub mod health;

/// Compose the public, account, admin and documentation routes over one shared state.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(games::router())
        .merge(auth::router())
        .merge(admin::router(state.clone()))
        .merge(docs::router());

    api_router.with_state(state)
}
