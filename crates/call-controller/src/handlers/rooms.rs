//! Room and participant endpoints.
//!
//! Request bodies are deserialised manually so malformed JSON yields the
//! localised 400 "invalid parameters" response rather than the framework
//! default.

use crate::errors::ApiError;
use crate::middleware::Language;
use crate::models::{
    CreateRoomRequest, InviteRequest, JoinRoomRequest, LeaveRoomRequest, ParticipantDetail,
    RoomDetail, RoomEnvelope,
};
use crate::routes::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

fn parse_body<T: DeserializeOwned>(body: &Bytes, lang: &str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(target: "cc.handlers", error = %e, "Invalid request body");
        ApiError::invalid_parameters(lang)
    })
}

fn success_body() -> Json<Value> {
    Json(json!({ "code": "success", "message": "ok", "data": Value::Null }))
}

/// `POST /api/v1/rooms`
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Language(lang): Language,
    body: Bytes,
) -> Result<(StatusCode, Json<RoomEnvelope>), ApiError> {
    let req: CreateRoomRequest = parse_body(&body, &lang)?;

    if req.creator.is_empty() || req.source_channel_id.is_empty() {
        return Err(ApiError::invalid_parameters(&lang));
    }
    if req.max_participants.is_some_and(|m| m < 2) {
        return Err(ApiError::invalid_parameters(&lang));
    }

    let envelope = state
        .service
        .create_room(req)
        .await
        .map_err(|e| e.into_api_error(&lang))?;

    Ok((StatusCode::CREATED, Json(envelope)))
}

/// `POST /api/v1/rooms/{room_id}/join`
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Language(lang): Language,
    Path(room_id): Path<String>,
    body: Bytes,
) -> Result<Json<RoomEnvelope>, ApiError> {
    let req: JoinRoomRequest = parse_body(&body, &lang)?;
    if req.uid.is_empty() {
        return Err(ApiError::invalid_parameters(&lang));
    }

    let envelope = state
        .service
        .join_room(&room_id, &req)
        .await
        .map_err(|e| e.into_api_error(&lang))?;

    Ok(Json(envelope))
}

/// `POST /api/v1/rooms/{room_id}/leave`
pub async fn leave_room(
    State(state): State<Arc<AppState>>,
    Language(lang): Language,
    Path(room_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: LeaveRoomRequest = parse_body(&body, &lang)?;
    if req.uid.is_empty() {
        return Err(ApiError::invalid_parameters(&lang));
    }

    state
        .service
        .leave_room(&room_id, &req.uid)
        .await
        .map_err(|e| e.into_api_error(&lang))?;

    Ok(success_body())
}

/// `POST /api/v1/rooms/{room_id}/invite`
pub async fn invite(
    State(state): State<Arc<AppState>>,
    Language(lang): Language,
    Path(room_id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: InviteRequest = parse_body(&body, &lang)?;

    state
        .service
        .invite(&room_id, &req.uids)
        .await
        .map_err(|e| e.into_api_error(&lang))?;

    Ok(success_body())
}

/// `GET /api/v1/rooms/sync?uid=&device_type=`
pub async fn sync(
    State(state): State<Arc<AppState>>,
    Language(lang): Language,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<RoomEnvelope>>, ApiError> {
    let uid = params
        .get("uid")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::invalid_parameters(&lang))?;
    let device_type = params.get("device_type").map_or("", String::as_str);

    let rooms = state
        .service
        .user_available_rooms(uid, device_type)
        .await
        .map_err(|e| e.into_api_error(&lang))?;

    Ok(Json(rooms))
}

/// `GET /api/v1/rooms/{room_id}`
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Language(lang): Language,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDetail>, ApiError> {
    let room = state
        .service
        .get_room(&room_id)
        .await
        .map_err(|e| e.into_api_error(&lang))?;

    Ok(Json(RoomDetail::from(&room)))
}

/// `GET /api/v1/rooms/{room_id}/participants`
pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    Language(lang): Language,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<ParticipantDetail>>, ApiError> {
    let participants = state
        .service
        .list_participants(&room_id)
        .await
        .map_err(|e| e.into_api_error(&lang))?;

    Ok(Json(
        participants.iter().map(ParticipantDetail::from).collect(),
    ))
}
