// Export route modules
pub mod index;
pub mod reply;
pub mod rooms;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(index::routes())
        .merge(reply::routes(state.clone()))
        .merge(rooms::routes(state))
        .layer(cors)
}
