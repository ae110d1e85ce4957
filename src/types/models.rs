use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BranchRef, Role};

/// Status assigned to mutations and values created without one.
pub const DEFAULT_STATUS: &str = "NEEDS_TRANSLATION";

#[must_use]
pub fn status_or_default(status: Option<&str>) -> String {
    match status.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => DEFAULT_STATUS.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceMember {
    pub user_id: String,
    pub space_id: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub space_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-project settings, created together with the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    pub project_id: String,
    /// Minimum role allowed to write to the main line. `None` freezes main.
    pub edit_main_role: Option<Role>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub created_by: String,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mutation {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "branch_id")]
    pub branch: BranchRef,
    pub key: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationValue {
    pub id: String,
    pub mutation_id: String,
    pub language_id: String,
    pub value: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationWithValues {
    #[serde(flatten)]
    pub mutation: Mutation,
    pub values: Vec<MutationValue>,
}

/// Filter on the values of one language, used by mutation search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageFilter {
    pub language_id: String,
    pub search: String,
}

/// Criteria for listing the mutations of one branch scope.
#[derive(Debug, Clone, Default)]
pub struct MutationQuery {
    pub key_contains: Option<String>,
    pub status: Option<String>,
    /// OR'd together; an empty list means no value filter.
    pub languages: Vec<LanguageFilter>,
    pub limit: usize,
}
