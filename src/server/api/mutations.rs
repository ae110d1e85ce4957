use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::{
    BranchParams, CreateMutationRequest, CreateValueRequest, SearchMutationsRequest, SimpleMutation,
    SimpleMutationValue, UpdateMutationRequest, UpdateValueRequest, simplify,
};
use crate::server::response::{ApiError, ApiResponse};
use crate::server::validation::validate_mutation_key;

pub async fn list_mutations(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(params): Query<BranchParams>,
) -> impl IntoResponse {
    let mutations = state.service().list_mutations_by_branch(
        &auth.user.id,
        &project_id,
        &params.branch_ref(),
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(simplify(mutations))))
}

pub async fn search_mutations(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<SearchMutationsRequest>,
) -> impl IntoResponse {
    let (branch, query) = req.into_parts();
    let mutations = state
        .service()
        .search_mutations(&auth.user.id, &project_id, &branch, query)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(simplify(mutations))))
}

pub async fn create_mutation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateMutationRequest>,
) -> impl IntoResponse {
    validate_mutation_key(&req.key)?;

    let (branch, input) = req.into_parts();
    let mutation = state
        .service()
        .create_mutation(&auth.user.id, &project_id, &branch, &input)?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(SimpleMutation::from(mutation))),
    ))
}

pub async fn get_mutation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((project_id, mutation_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let mutation = state
        .service()
        .get_mutation(&auth.user.id, &project_id, &mutation_id)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(SimpleMutation::from(mutation))))
}

pub async fn update_mutation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((project_id, mutation_id)): Path<(String, String)>,
    Json(req): Json<UpdateMutationRequest>,
) -> impl IntoResponse {
    if let Some(key) = &req.key {
        validate_mutation_key(key)?;
    }

    let mutation = state.service().update_mutation(
        &auth.user.id,
        &project_id,
        &mutation_id,
        &req.into(),
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(SimpleMutation::from(mutation))))
}

pub async fn delete_mutation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((project_id, mutation_id)): Path<(String, String)>,
) -> impl IntoResponse {
    state
        .service()
        .delete_mutation(&auth.user.id, &project_id, &mutation_id)?;

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn create_value(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((project_id, mutation_id)): Path<(String, String)>,
    Json(req): Json<CreateValueRequest>,
) -> impl IntoResponse {
    let value = state.service().create_mutation_value(
        &auth.user.id,
        &project_id,
        &mutation_id,
        &req.language_id,
        &req.value,
        req.status.as_deref(),
    )?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(SimpleMutationValue::from(value))),
    ))
}

pub async fn update_value(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path((project_id, value_id)): Path<(String, String)>,
    Json(req): Json<UpdateValueRequest>,
) -> impl IntoResponse {
    let value =
        state
            .service()
            .update_mutation_value(&auth.user.id, &project_id, &value_id, &req.into())?;

    Ok::<_, ApiError>(Json(ApiResponse::success(SimpleMutationValue::from(value))))
}
