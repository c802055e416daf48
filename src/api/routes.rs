use axum::{
    routing::{get, put},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api::{device_handlers, handlers, handlers::AppState};
use crate::store::AggregateStore;

pub fn create_router<S: AggregateStore + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Assets
        .route(
            "/api/assets",
            get(handlers::list_assets::<S>).post(handlers::create_asset::<S>),
        )
        .route(
            "/api/assets/:id",
            get(handlers::get_asset::<S>)
                .put(handlers::update_asset::<S>)
                .delete(handlers::delete_asset::<S>),
        )
        // Branches
        .route(
            "/api/branches",
            get(handlers::list_branches::<S>).post(handlers::create_branch::<S>),
        )
        .route(
            "/api/branches/:id",
            get(handlers::get_branch::<S>)
                .put(handlers::update_branch::<S>)
                .delete(handlers::delete_branch::<S>),
        )
        .route(
            "/api/branches/:id/infra",
            put(device_handlers::update_branch_infra::<S>),
        )
        // Branch device collections
        .route(
            "/api/branches/:id/:devices",
            get(device_handlers::list_devices::<S>).post(device_handlers::create_device::<S>),
        )
        .route(
            "/api/branches/:id/:devices/:row_id",
            put(device_handlers::update_device::<S>).delete(device_handlers::delete_device::<S>),
        )
        // Service stations
        .route(
            "/api/service-stations",
            get(handlers::list_service_stations::<S>),
        )
        .layer(CorsLayer::permissive())
}
