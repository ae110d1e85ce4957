use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::branching::{MutationUpdate, NewMutation, ValueUpdate};
use crate::types::{BranchRef, LanguageFilter, MutationQuery, MutationValue, MutationWithValues, Role};

#[derive(Debug, Deserialize)]
pub struct CreateSpaceRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    /// `null` or missing freezes the main branch.
    #[serde(default)]
    pub edit_main_role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLanguageRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
    pub name: String,
    /// Scope to copy from; main when missing.
    #[serde(default)]
    pub source_branch_id: BranchRef,
}

/// `?branch=<id>`; missing, `main` and `latest` select the main branch.
#[derive(Debug, Default, Deserialize)]
pub struct BranchParams {
    #[serde(default)]
    pub branch: Option<String>,
}

impl BranchParams {
    #[must_use]
    pub fn branch_ref(&self) -> BranchRef {
        BranchRef::from_option(self.branch.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMutationRequest {
    pub key: String,
    #[serde(default)]
    pub branch_id: BranchRef,
    #[serde(default)]
    pub status: Option<String>,
    /// Values keyed by language id.
    #[serde(default)]
    pub values: HashMap<String, String>,
}

impl CreateMutationRequest {
    pub fn into_parts(self) -> (BranchRef, NewMutation) {
        (
            self.branch_id,
            NewMutation {
                key: self.key,
                status: self.status,
                values: self.values,
            },
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateMutationRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl From<UpdateMutationRequest> for MutationUpdate {
    fn from(req: UpdateMutationRequest) -> Self {
        MutationUpdate {
            key: req.key,
            status: req.status,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchMutationsRequest {
    #[serde(default)]
    pub branch_id: BranchRef,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub languages: Vec<LanguageFilter>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchMutationsRequest {
    pub fn into_parts(self) -> (BranchRef, MutationQuery) {
        (
            self.branch_id,
            MutationQuery {
                key_contains: self.key,
                status: self.status,
                languages: self.languages,
                limit: self.limit.unwrap_or_default(),
            },
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateValueRequest {
    pub language_id: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateValueRequest {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl From<UpdateValueRequest> for ValueUpdate {
    fn from(req: UpdateValueRequest) -> Self {
        ValueUpdate {
            value: req.value,
            status: req.status,
        }
    }
}

/// Mutation as returned to clients, without audit fields.
#[derive(Debug, Serialize)]
pub struct SimpleMutation {
    pub id: String,
    pub key: String,
    pub branch_id: Option<String>,
    pub status: String,
    pub values: Vec<SimpleMutationValue>,
}

#[derive(Debug, Serialize)]
pub struct SimpleMutationValue {
    pub id: String,
    pub language_id: String,
    pub value: String,
    pub status: String,
}

impl From<MutationValue> for SimpleMutationValue {
    fn from(v: MutationValue) -> Self {
        Self {
            id: v.id,
            language_id: v.language_id,
            value: v.value,
            status: v.status,
        }
    }
}

impl From<MutationWithValues> for SimpleMutation {
    fn from(m: MutationWithValues) -> Self {
        Self {
            branch_id: m.mutation.branch.branch_id().map(str::to_string),
            id: m.mutation.id,
            key: m.mutation.key,
            status: m.mutation.status,
            values: m.values.into_iter().map(SimpleMutationValue::from).collect(),
        }
    }
}

pub fn simplify(mutations: Vec<MutationWithValues>) -> Vec<SimpleMutation> {
    mutations.into_iter().map(SimpleMutation::from).collect()
}
