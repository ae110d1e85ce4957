use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{CreateLanguageRequest, CreateProjectRequest, UpdateSettingsRequest};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_name;

pub async fn create_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(space_id): Path<String>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    validate_name(&req.name, "Project")?;

    let project = state
        .service()
        .create_project(&auth.user.id, &space_id, req.name.trim())?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

pub async fn get_settings(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let settings = state.service().get_project_settings(&auth.user.id, &project_id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(settings)))
}

pub async fn update_settings(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<UpdateSettingsRequest>,
) -> impl IntoResponse {
    let settings =
        state
            .service()
            .update_project_settings(&auth.user.id, &project_id, req.edit_main_role)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(settings)))
}

pub async fn list_languages(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let languages = state.service().list_languages(&auth.user.id, &project_id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(languages)))
}

pub async fn create_language(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateLanguageRequest>,
) -> impl IntoResponse {
    validate_name(&req.name, "Language")?;

    let language = state
        .service()
        .create_language(&auth.user.id, &project_id, req.name.trim())?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(language))))
}
