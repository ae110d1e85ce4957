use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{AddMemberRequest, CreateSpaceRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_name;

pub async fn list_spaces(auth: RequireUser, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let spaces = state.service().list_user_spaces(&auth.user.id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(spaces)))
}

pub async fn create_space(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSpaceRequest>,
) -> impl IntoResponse {
    validate_name(&req.name, "Space")?;

    let space = state.service().create_space(&auth.user.id, req.name.trim())?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(space))))
}

pub async fn add_member(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(space_id): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> impl IntoResponse {
    let member = state
        .service()
        .add_space_member(&auth.user.id, &space_id, &req.user_id, req.role)?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(member))))
}
