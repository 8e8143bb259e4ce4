// rest/mod.rs — HTTP REST API server.
//
// Axum server bridging HTTP calls to the task resource service.
//
// Endpoints:
//   GET    /health
//   GET    /tasks/                        list (search + ordering query params)
//   POST   /tasks/                        create
//   GET    /tasks/completed/             completed subset (raw array)
//   GET    /tasks/pending/               pending subset (raw array)
//   GET    /tasks/{id}/                  retrieve
//   PUT    /tasks/{id}/                  full update
//   PATCH  /tasks/{id}/                  partial update
//   DELETE /tasks/{id}/                  delete
//   POST   /tasks/{id}/toggle_complete/  flip completion flag

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route(
            "/tasks/",
            get(routes::tasks::list).post(routes::tasks::create),
        )
        .route("/tasks/completed/", get(routes::tasks::completed))
        .route("/tasks/pending/", get(routes::tasks::pending))
        .route(
            "/tasks/{id}/",
            get(routes::tasks::retrieve)
                .put(routes::tasks::update)
                .patch(routes::tasks::partial_update)
                .delete(routes::tasks::destroy),
        )
        .route(
            "/tasks/{id}/toggle_complete/",
            post(routes::tasks::toggle_complete),
        )
        // The original backend fronted a browser SPA; keep CORS open.
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
