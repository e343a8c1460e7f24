//! Application router configuration.

use axum::{
    Router,
    routing::{delete, get},
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::{
    AppState, endpoints,
    expense::{create_expense_endpoint, delete_expense_endpoint, get_expenses_endpoint},
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            endpoints::EXPENSES,
            get(get_expenses_endpoint).post(create_expense_endpoint),
        )
        .route(endpoints::EXPENSE, delete(delete_expense_endpoint))
        .layer(cors_layer())
        .with_state(state)
}

/// A CORS policy that accepts any origin, method, and header, with credentials.
///
/// tower-http panics on the literal wildcard combined with
/// `allow_credentials`, so the request's values are mirrored instead.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}
