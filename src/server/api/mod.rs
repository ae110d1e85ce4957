mod branches;
mod mutations;
mod projects;
mod spaces;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::server::AppState;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Spaces
        .route("/spaces", get(spaces::list_spaces).post(spaces::create_space))
        .route("/spaces/{space_id}/members", post(spaces::add_member))
        .route("/spaces/{space_id}/projects", post(projects::create_project))
        // Project settings and languages
        .route(
            "/projects/{project_id}/settings",
            get(projects::get_settings).patch(projects::update_settings),
        )
        .route(
            "/projects/{project_id}/languages",
            get(projects::list_languages).post(projects::create_language),
        )
        // Branches
        .route(
            "/projects/{project_id}/branches",
            get(branches::list_branches).post(branches::create_branch),
        )
        .route(
            "/projects/{project_id}/branches/{branch_id}",
            delete(branches::delete_branch),
        )
        .route(
            "/projects/{project_id}/branches/{branch_id}/lock",
            post(branches::lock_branch).delete(branches::unlock_branch),
        )
        // Mutations
        .route(
            "/projects/{project_id}/mutations",
            get(mutations::list_mutations).post(mutations::create_mutation),
        )
        .route(
            "/projects/{project_id}/mutations/search",
            post(mutations::search_mutations),
        )
        .route(
            "/projects/{project_id}/mutations/{mutation_id}",
            get(mutations::get_mutation)
                .patch(mutations::update_mutation)
                .delete(mutations::delete_mutation),
        )
        .route(
            "/projects/{project_id}/mutations/{mutation_id}/values",
            post(mutations::create_value),
        )
        .route(
            "/projects/{project_id}/values/{value_id}",
            patch(mutations::update_value),
        )
}
