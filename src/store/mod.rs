mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashSet;

use crate::error::Result;
use crate::types::*;

/// Rows inserted per statement when copying mutations in bulk.
pub const BATCH_SIZE: usize = 100;

/// Transforms the mutations read from a fork source into the rows written to
/// the new branch, given the project's language ids as of the same
/// transaction. An error rolls the fork back.
pub type ForkCopy<'a> =
    dyn Fn(Vec<MutationWithValues>, &HashSet<String>) -> Result<Vec<MutationWithValues>> + 'a;

/// Store defines the database interface.
///
/// Uniqueness of branch names, mutation keys per branch scope and values per
/// language is enforced by the storage layer; violations surface as
/// [`crate::error::Error::Conflict`]. Mutation and value writes into a locked
/// branch fail with `Forbidden(Locked)` inside the writing statement.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Space operations
    /// Creates the space and its owner membership atomically.
    fn create_space(&self, space: &Space, owner: &SpaceMember) -> Result<()>;
    fn list_user_spaces(&self, user_id: &str) -> Result<Vec<Space>>;
    fn add_space_member(&self, member: &SpaceMember) -> Result<()>;
    fn get_space_member(&self, user_id: &str, space_id: &str) -> Result<Option<SpaceMember>>;
    /// Role of the user in the space owning the project, if any.
    fn get_project_role(&self, user_id: &str, project_id: &str) -> Result<Option<Role>>;

    // Project operations
    /// Creates the project and its settings row atomically.
    fn create_project(&self, project: &Project, settings: &ProjectSettings) -> Result<()>;
    fn get_project_settings(&self, project_id: &str) -> Result<Option<ProjectSettings>>;
    fn update_project_settings(&self, settings: &ProjectSettings) -> Result<()>;

    // Language operations
    fn create_language(&self, language: &Language) -> Result<()>;
    fn get_language(&self, id: &str) -> Result<Option<Language>>;
    fn list_languages(&self, project_id: &str) -> Result<Vec<Language>>;

    // Branch operations
    fn get_branch(&self, id: &str) -> Result<Option<Branch>>;
    fn get_branch_by_name(&self, project_id: &str, name: &str) -> Result<Option<Branch>>;
    fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>>;
    fn set_branch_locked(&self, id: &str, locked: bool) -> Result<()>;
    /// Deletes the branch together with its mutations and their values.
    fn delete_branch(&self, id: &str) -> Result<bool>;
    /// Inserts `branch`, reads the project's languages and every mutation of
    /// `source` in the same project (ordered by key, values ordered by
    /// language id), passes them through `copy` and inserts the result. Everything happens in one write
    /// transaction; on any error nothing is committed, including the branch.
    /// Returns the number of mutations written.
    fn fork_branch(
        &self,
        branch: &Branch,
        source: &BranchRef,
        copy: &ForkCopy<'_>,
    ) -> Result<usize>;

    // Mutation operations
    /// Inserts the mutation and all of its values atomically.
    fn create_mutation(&self, mutation: &MutationWithValues) -> Result<()>;
    fn get_mutation(&self, id: &str) -> Result<Option<MutationWithValues>>;
    fn count_mutations_with_key(
        &self,
        project_id: &str,
        branch: &BranchRef,
        key: &str,
        exclude_id: Option<&str>,
    ) -> Result<i64>;
    fn update_mutation(&self, mutation: &Mutation) -> Result<()>;
    fn delete_mutation(&self, id: &str) -> Result<bool>;
    /// Lists the mutations of one branch scope with their values, ordered by key.
    fn list_mutations(
        &self,
        project_id: &str,
        branch: &BranchRef,
        query: &MutationQuery,
    ) -> Result<Vec<MutationWithValues>>;

    // Mutation value operations
    fn create_mutation_value(&self, value: &MutationValue) -> Result<()>;
    fn get_mutation_value(&self, id: &str) -> Result<Option<MutationValue>>;
    fn update_mutation_value(&self, value: &MutationValue) -> Result<()>;
}
