use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::CreateBranchRequest;
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_branch_name;

pub async fn list_branches(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let branches = state.service().list_branches(&auth.user.id, &project_id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(branches)))
}

pub async fn create_branch(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateBranchRequest>,
) -> impl IntoResponse {
    validate_branch_name(&req.name)?;

    let branch = state.service().create_branch(
        &auth.user.id,
        &project_id,
        &req.name,
        &req.source_branch_id,
    )?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(branch))))
}

pub async fn delete_branch(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((project_id, branch_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .service()
        .delete_branch(&auth.user.id, &project_id, &branch_id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn lock_branch(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((project_id, branch_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let branch = state
        .service()
        .set_branch_locked(&auth.user.id, &project_id, &branch_id, true)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(branch)))
}

pub async fn unlock_branch(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((project_id, branch_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let branch = state
        .service()
        .set_branch_locked(&auth.user.id, &project_id, &branch_id, false)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(branch)))
}
