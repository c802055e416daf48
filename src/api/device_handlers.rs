use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::Value;

use crate::api::error::ApiError;
use crate::api::handlers::{body, path, require, AppState, DeletedResponse, UpdatedResponse};
use crate::model::{
    AggregateKind, AggregatePayload, Cardinality, ChildKind, Permission, Principal, Record, RowId,
    ACTOR_KEY, REMARK_KEY,
};
use crate::store::AggregateStore;

/// Resolve a `/api/branches/:id/:devices` segment to a branch collection
fn device_kind<S: AggregateStore>(
    state: &AppState<S>,
    segment: &str,
) -> Result<ChildKind, ApiError> {
    let unknown = || ApiError::NotFound(format!("unknown device collection '{}'", segment));
    let kind = ChildKind::from_label(segment).ok_or_else(unknown)?;
    match state.schema.owner_of(kind) {
        Some((aggregate, relation))
            if aggregate.kind == AggregateKind::Branch
                && relation.cardinality == Cardinality::Many =>
        {
            Ok(kind)
        }
        _ => Err(unknown()),
    }
}

fn object(value: Value) -> Result<Record, ApiError> {
    match value {
        Value::Object(record) => Ok(record),
        _ => Err(ApiError::BadRequest(
            "request body must be a JSON object".to_string(),
        )),
    }
}

pub async fn list_devices<S: AggregateStore>(
    State(state): State<AppState<S>>,
    principal: Principal,
    params: Result<Path<(RowId, String)>, PathRejection>,
) -> Result<Json<Vec<Record>>, ApiError> {
    require(&principal, Permission::Read)?;
    let (branch_id, segment) = path(params)?;
    let kind = device_kind(&state, &segment)?;
    Ok(Json(state.devices.list(kind, branch_id).await?))
}

pub async fn create_device<S: AggregateStore>(
    State(state): State<AppState<S>>,
    principal: Principal,
    params: Result<Path<(RowId, String)>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    require(&principal, Permission::Edit)?;
    let (branch_id, segment) = path(params)?;
    let kind = device_kind(&state, &segment)?;
    let record = object(body(payload)?)?;

    let row = state.devices.create(kind, branch_id, &record).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn update_device<S: AggregateStore>(
    State(state): State<AppState<S>>,
    principal: Principal,
    params: Result<Path<(RowId, String, RowId)>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Record>, ApiError> {
    require(&principal, Permission::Edit)?;
    let (branch_id, segment, row_id) = path(params)?;
    let kind = device_kind(&state, &segment)?;
    let record = object(body(payload)?)?;

    Ok(Json(
        state.devices.update(kind, branch_id, row_id, &record).await?,
    ))
}

pub async fn delete_device<S: AggregateStore>(
    State(state): State<AppState<S>>,
    principal: Principal,
    params: Result<Path<(RowId, String, RowId)>, PathRejection>,
) -> Result<Json<DeletedResponse>, ApiError> {
    require(&principal, Permission::Edit)?;
    let (branch_id, segment, row_id) = path(params)?;
    let kind = device_kind(&state, &segment)?;

    state.devices.delete(kind, branch_id, row_id).await?;
    Ok(Json(DeletedResponse::new(format!(
        "{} row {} deleted",
        kind, row_id
    ))))
}

/// Update only the branch's infra section, audited like any branch update.
///
/// Accepts either `{ "infra": {...}, "updateRemark": ... }` or the infra
/// fields at the top level next to `updateRemark`.
pub async fn update_branch_infra<S: AggregateStore>(
    State(state): State<AppState<S>>,
    principal: Principal,
    id: Result<Path<RowId>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<UpdatedResponse>, ApiError> {
    require(&principal, Permission::Edit)?;
    let branch_id = path(id)?;
    let mut fields = object(body(payload)?)?;

    let remark = take_text(&mut fields, REMARK_KEY)?;
    let updated_by = take_text(&mut fields, ACTOR_KEY)?;
    let infra = match fields.remove(ChildKind::Infra.label()) {
        Some(Value::Object(nested)) => nested,
        Some(_) => {
            return Err(ApiError::BadRequest(format!(
                "'{}' must be an object",
                ChildKind::Infra.label()
            )))
        }
        None => fields,
    };

    let mut payload = AggregatePayload::single_section(ChildKind::Infra, infra);
    payload.remark = remark;
    payload.updated_by = updated_by;

    let outcome = state
        .coordinator
        .update_aggregate(AggregateKind::Branch, branch_id, payload, Some(&principal))
        .await?;
    Ok(Json(UpdatedResponse {
        success: true,
        audit_entry_id: outcome.audit_entry_id,
        data: outcome.parent,
    }))
}

fn take_text(fields: &mut Record, key: &str) -> Result<Option<String>, ApiError> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ApiError::BadRequest(format!("'{}' must be a string", key))),
    }
}
