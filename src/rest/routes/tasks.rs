// rest/routes/tasks.rs — Task resource routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::rest::error::ApiError;
use crate::storage::TaskRow;
use crate::tasks::{ListParams, TaskInput};
use crate::AppContext;

/// GET /tasks/ — paginated-style wrapper kept for client compatibility even
/// though taskd never paginates (`next`/`previous` are always null).
pub async fn list(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let tasks = ctx.tasks.list(&params).await?;
    Ok(Json(json!({
        "count": tasks.len(),
        "next": null,
        "previous": null,
        "results": tasks,
    })))
}

pub async fn create(
    State(ctx): State<Arc<AppContext>>,
    Json(input): Json<TaskInput>,
) -> Result<(StatusCode, Json<TaskRow>), ApiError> {
    let task = ctx.tasks.create(input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn retrieve(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<i64>,
) -> Result<Json<TaskRow>, ApiError> {
    Ok(Json(ctx.tasks.retrieve(id).await?))
}

pub async fn update(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<i64>,
    Json(input): Json<TaskInput>,
) -> Result<Json<TaskRow>, ApiError> {
    Ok(Json(ctx.tasks.update(id, input, false).await?))
}

pub async fn partial_update(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<i64>,
    Json(input): Json<TaskInput>,
) -> Result<Json<TaskRow>, ApiError> {
    Ok(Json(ctx.tasks.update(id, input, true).await?))
}

pub async fn destroy(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    ctx.tasks.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /tasks/completed/ — raw array, unlike the wrapped list endpoint.
pub async fn completed(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Vec<TaskRow>>, ApiError> {
    Ok(Json(ctx.tasks.list_completed().await?))
}

/// GET /tasks/pending/ — raw array, unlike the wrapped list endpoint.
pub async fn pending(State(ctx): State<Arc<AppContext>>) -> Result<Json<Vec<TaskRow>>, ApiError> {
    Ok(Json(ctx.tasks.list_pending().await?))
}

pub async fn toggle_complete(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<i64>,
) -> Result<Json<TaskRow>, ApiError> {
    Ok(Json(ctx.tasks.toggle_complete(id).await?))
}
