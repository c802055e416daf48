use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::logic::{Inventory, ListRequest, Page};
use crate::model::{
    tables, AggregateKind, AggregatePayload, ComposedDocument, Permission, Principal, Record, RowId,
};
use crate::store::AggregateStore;

pub type AppState<S> = Arc<Inventory<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: RowId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedResponse {
    pub success: bool,
    pub audit_entry_id: RowId,
    pub data: Record,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub success: bool,
    pub message: String,
}

impl DeletedResponse {
    pub fn new(message: String) -> Self {
        Self {
            success: true,
            message,
        }
    }
}

/// Reject the request unless the principal's role grants `permission`
pub(crate) fn require(principal: &Principal, permission: Permission) -> Result<(), ApiError> {
    if principal.can(permission) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "role '{}' may not perform this operation",
            principal.role
        )))
    }
}

pub(crate) fn body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

pub(crate) fn path<T>(path: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    path.map(|Path(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

async fn list_aggregates<S: AggregateStore>(
    inventory: &Inventory<S>,
    kind: AggregateKind,
    params: HashMap<String, String>,
) -> Result<Json<Page>, ApiError> {
    let request = ListRequest::from_params(params)?;
    Ok(Json(inventory.lister.list(kind, &request).await?))
}

async fn create_aggregate<S: AggregateStore>(
    inventory: &Inventory<S>,
    kind: AggregateKind,
    value: Value,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let payload = AggregatePayload::from_value(inventory.schema.aggregate(kind), value)?;
    let id = inventory.coordinator.create_aggregate(kind, payload).await?;
    log::info!("Created {} {}", kind.section(), id);
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

async fn update_aggregate<S: AggregateStore>(
    inventory: &Inventory<S>,
    kind: AggregateKind,
    id: RowId,
    payload: AggregatePayload,
    principal: &Principal,
) -> Result<Json<UpdatedResponse>, ApiError> {
    let outcome = inventory
        .coordinator
        .update_aggregate(kind, id, payload, Some(principal))
        .await?;
    Ok(Json(UpdatedResponse {
        success: true,
        audit_entry_id: outcome.audit_entry_id,
        data: outcome.parent,
    }))
}

async fn delete_aggregate<S: AggregateStore>(
    inventory: &Inventory<S>,
    kind: AggregateKind,
    id: RowId,
) -> Result<Json<DeletedResponse>, ApiError> {
    inventory.coordinator.delete_aggregate(kind, id).await?;
    Ok(Json(DeletedResponse::new(format!(
        "{} {} deleted",
        kind.entity(),
        id
    ))))
}

// Assets

pub async fn list_assets<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page>, ApiError> {
    require(&principal, Permission::Read)?;
    list_aggregates(&inventory, AggregateKind::Asset, params).await
}

pub async fn create_asset<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    require(&principal, Permission::Submit)?;
    create_aggregate(&inventory, AggregateKind::Asset, body(payload)?).await
}

pub async fn get_asset<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    id: Result<Path<RowId>, PathRejection>,
) -> Result<Json<ComposedDocument>, ApiError> {
    require(&principal, Permission::Read)?;
    let document = inventory
        .reader
        .read_aggregate(AggregateKind::Asset, path(id)?)
        .await?;
    Ok(Json(document))
}

pub async fn update_asset<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    id: Result<Path<RowId>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<UpdatedResponse>, ApiError> {
    require(&principal, Permission::Edit)?;
    let id = path(id)?;
    let payload = AggregatePayload::from_value(
        inventory.schema.aggregate(AggregateKind::Asset),
        body(payload)?,
    )?;
    update_aggregate(&inventory, AggregateKind::Asset, id, payload, &principal).await
}

pub async fn delete_asset<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    id: Result<Path<RowId>, PathRejection>,
) -> Result<Json<DeletedResponse>, ApiError> {
    require(&principal, Permission::Delete)?;
    delete_aggregate(&inventory, AggregateKind::Asset, path(id)?).await
}

// Branches

pub async fn list_branches<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Page>, ApiError> {
    require(&principal, Permission::Read)?;
    list_aggregates(&inventory, AggregateKind::Branch, params).await
}

pub async fn create_branch<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    require(&principal, Permission::Edit)?;
    create_aggregate(&inventory, AggregateKind::Branch, body(payload)?).await
}

pub async fn get_branch<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    id: Result<Path<RowId>, PathRejection>,
) -> Result<Json<ComposedDocument>, ApiError> {
    require(&principal, Permission::Read)?;
    let document = inventory
        .reader
        .read_aggregate(AggregateKind::Branch, path(id)?)
        .await?;
    Ok(Json(document))
}

pub async fn update_branch<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    id: Result<Path<RowId>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<UpdatedResponse>, ApiError> {
    require(&principal, Permission::Edit)?;
    let id = path(id)?;
    let payload = AggregatePayload::from_value(
        inventory.schema.aggregate(AggregateKind::Branch),
        body(payload)?,
    )?;
    update_aggregate(&inventory, AggregateKind::Branch, id, payload, &principal).await
}

pub async fn delete_branch<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
    id: Result<Path<RowId>, PathRejection>,
) -> Result<Json<DeletedResponse>, ApiError> {
    require(&principal, Permission::Delete)?;
    delete_aggregate(&inventory, AggregateKind::Branch, path(id)?).await
}

// Service stations

pub async fn list_service_stations<S: AggregateStore>(
    State(inventory): State<AppState<S>>,
    principal: Principal,
) -> Result<Json<Vec<Record>>, ApiError> {
    require(&principal, Permission::Read)?;
    let stations = inventory
        .lookups
        .list(tables::SERVICE_STATIONS.name)
        .await?;
    Ok(Json(stations))
}
