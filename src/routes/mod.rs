// ABOUTME: Route module organization for Threadline HTTP endpoints
// ABOUTME: Assembles domain routers and the shared middleware stack into one application router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Route module for the Threadline server
//!
//! Each domain module contains only route definitions and thin handler
//! functions that delegate to the service layer.

use std::sync::Arc;

use axum::Router;

use crate::middleware::{setup_cors, with_request_tracing};
use crate::resources::ServerResources;

/// Chat stream routes
pub mod chat;
/// Health check routes
pub mod health;

/// Chat route handlers
pub use chat::ChatRoutes;
/// Health route handlers
pub use health::HealthRoutes;

/// Build the application router with CORS and request tracing applied
pub fn build_router(resources: Arc<ServerResources>) -> Router {
    let cors = setup_cors(&resources.config);
    let router = Router::new()
        .merge(ChatRoutes::routes(Arc::clone(&resources)))
        .merge(HealthRoutes::routes(resources))
        .layer(cors);

    with_request_tracing(router)
}
