use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use super::{
    BranchForker, BranchMutabilityPolicy, BranchResolver, Decision, Denial, MAX_PAGE_SIZE,
    MutationKeyspace, PermissionGate,
};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::*;

/// Payload of CreateMutation.
#[derive(Debug, Clone, Default)]
pub struct NewMutation {
    pub key: String,
    pub status: Option<String>,
    /// Values keyed by language id.
    pub values: HashMap<String, String>,
}

/// Payload of UpdateMutation. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct MutationUpdate {
    pub key: Option<String>,
    pub status: Option<String>,
}

/// Payload of UpdateMutationValue. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ValueUpdate {
    pub value: Option<String>,
    pub status: Option<String>,
}

/// Operations acting on behalf of a user.
///
/// Every call takes the acting user's id first. Reads require membership
/// in the project's space; writes additionally go through
/// [`BranchMutabilityPolicy`].
pub struct BranchingService<'a> {
    store: &'a dyn Store,
    page_size: usize,
}

impl<'a> BranchingService<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            page_size: MAX_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn gate(&self) -> PermissionGate<'a> {
        PermissionGate::new(self.store)
    }

    fn keyspace(&self) -> MutationKeyspace<'a> {
        MutationKeyspace::new(self.store).with_page_size(self.page_size)
    }

    fn require_member(&self, user_id: &str, project_id: &str) -> Result<Role> {
        self.gate()
            .project_role(user_id, project_id)?
            .ok_or(Error::Forbidden(Denial::NotMember))
    }

    fn require_role(&self, user_id: &str, project_id: &str, required: Role) -> Result<Role> {
        let role = self.require_member(user_id, project_id)?;
        if !role.has(required) {
            tracing::warn!(user_id, project_id, %role, %required, "Role too low");
            return Err(Error::Forbidden(Denial::NoRole));
        }
        Ok(role)
    }

    fn require_space_role(&self, user_id: &str, space_id: &str, required: Role) -> Result<Role> {
        let role = self
            .gate()
            .role_of(user_id, space_id)?
            .ok_or(Error::Forbidden(Denial::NotMember))?;
        if !role.has(required) {
            return Err(Error::Forbidden(Denial::NoRole));
        }
        Ok(role)
    }

    /// Membership, then branch mutability.
    fn authorize_write(
        &self,
        user_id: &str,
        project_id: &str,
        target: &BranchRef,
    ) -> Result<Option<Branch>> {
        self.require_member(user_id, project_id)?;

        match BranchMutabilityPolicy::new(self.store).evaluate(user_id, project_id, target)? {
            Decision::Allowed { branch, .. } => Ok(branch),
            Decision::Denied(denial) => {
                tracing::warn!(user_id, project_id, branch = %target, %denial, "Write denied");
                Err(denial.into())
            }
        }
    }

    /// Loads a mutation, hiding mutations of other projects.
    fn mutation_in(&self, project_id: &str, mutation_id: &str) -> Result<MutationWithValues> {
        self.store
            .get_mutation(mutation_id)?
            .filter(|m| m.mutation.project_id == project_id)
            .ok_or(Error::NotFound("mutation"))
    }

    fn branch_in(&self, project_id: &str, branch_id: &str) -> Result<Branch> {
        self.store
            .get_branch(branch_id)?
            .filter(|b| b.project_id == project_id)
            .ok_or(Error::NotFound("branch"))
    }

    // Spaces

    pub fn create_space(&self, user_id: &str, name: &str) -> Result<Space> {
        let now = Utc::now();
        let space = Space {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: now,
        };
        let owner = SpaceMember {
            user_id: user_id.to_string(),
            space_id: space.id.clone(),
            role: Role::Owner,
            joined_at: now,
        };
        self.store.create_space(&space, &owner)?;
        tracing::info!(space_id = %space.id, user_id, "Created space");
        Ok(space)
    }

    pub fn add_space_member(
        &self,
        user_id: &str,
        space_id: &str,
        member_id: &str,
        role: Role,
    ) -> Result<SpaceMember> {
        self.require_space_role(user_id, space_id, Role::Admin)?;

        if role == Role::Owner {
            return Err(Error::Conflict("Space already has an owner".to_string()));
        }
        if self.store.get_user(member_id)?.is_none() {
            return Err(Error::NotFound("user"));
        }

        let member = SpaceMember {
            user_id: member_id.to_string(),
            space_id: space_id.to_string(),
            role,
            joined_at: Utc::now(),
        };
        self.store.add_space_member(&member)?;
        Ok(member)
    }

    pub fn list_user_spaces(&self, user_id: &str) -> Result<Vec<Space>> {
        self.store.list_user_spaces(user_id)
    }

    // Projects

    pub fn create_project(&self, user_id: &str, space_id: &str, name: &str) -> Result<Project> {
        self.require_space_role(user_id, space_id, Role::Editor)?;

        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            space_id: space_id.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        let settings = ProjectSettings {
            project_id: project.id.clone(),
            edit_main_role: None,
            updated_at: now,
        };
        self.store.create_project(&project, &settings)?;
        Ok(project)
    }

    pub fn get_project_settings(&self, user_id: &str, project_id: &str) -> Result<ProjectSettings> {
        self.require_member(user_id, project_id)?;
        self.store
            .get_project_settings(project_id)?
            .ok_or(Error::NotFound("project settings"))
    }

    pub fn update_project_settings(
        &self,
        user_id: &str,
        project_id: &str,
        edit_main_role: Option<Role>,
    ) -> Result<ProjectSettings> {
        self.require_role(user_id, project_id, Role::Admin)?;

        let settings = ProjectSettings {
            project_id: project_id.to_string(),
            edit_main_role,
            updated_at: Utc::now(),
        };
        self.store.update_project_settings(&settings)?;
        tracing::info!(project_id, edit_main_role = ?edit_main_role, "Updated project settings");
        Ok(settings)
    }

    // Languages

    pub fn create_language(&self, user_id: &str, project_id: &str, name: &str) -> Result<Language> {
        self.require_role(user_id, project_id, Role::Editor)?;

        let language = Language {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.store.create_language(&language)?;
        Ok(language)
    }

    pub fn list_languages(&self, user_id: &str, project_id: &str) -> Result<Vec<Language>> {
        self.require_member(user_id, project_id)?;
        self.store.list_languages(project_id)
    }

    // Branches

    /// Forks `source` into a new branch named `name`.
    pub fn create_branch(
        &self,
        user_id: &str,
        project_id: &str,
        name: &str,
        source: &BranchRef,
    ) -> Result<Branch> {
        self.require_role(user_id, project_id, Role::Editor)?;
        let (branch, _) = BranchForker::new(self.store).fork(project_id, source, name, user_id)?;
        Ok(branch)
    }

    pub fn list_branches(&self, user_id: &str, project_id: &str) -> Result<Vec<Branch>> {
        self.require_member(user_id, project_id)?;
        self.store.list_branches(project_id)
    }

    /// Admins may delete any branch, editors only the ones they created.
    /// Locked branches must be unlocked first.
    pub fn delete_branch(&self, user_id: &str, project_id: &str, branch_id: &str) -> Result<()> {
        let role = self.require_member(user_id, project_id)?;
        let branch = self.branch_in(project_id, branch_id)?;

        let allowed = role.has(Role::Admin) || (role.can_write() && branch.created_by == user_id);
        if !allowed {
            return Err(Error::Forbidden(Denial::NoRole));
        }
        if branch.locked {
            return Err(Error::Forbidden(Denial::Locked));
        }

        if !self.store.delete_branch(branch_id)? {
            return Err(Error::NotFound("branch"));
        }
        tracing::info!(project_id, branch = %branch.name, user_id, "Deleted branch");
        Ok(())
    }

    /// Locking and unlocking are admin-only. Unlocking is the one write a
    /// locked branch accepts.
    pub fn set_branch_locked(
        &self,
        user_id: &str,
        project_id: &str,
        branch_id: &str,
        locked: bool,
    ) -> Result<Branch> {
        self.require_role(user_id, project_id, Role::Admin)?;
        let branch = self.branch_in(project_id, branch_id)?;

        if branch.locked != locked {
            self.store.set_branch_locked(branch_id, locked)?;
            tracing::info!(project_id, branch = %branch.name, locked, "Changed branch lock");
        }
        self.branch_in(project_id, branch_id)
    }

    // Mutations

    pub fn create_mutation(
        &self,
        user_id: &str,
        project_id: &str,
        branch: &BranchRef,
        input: &NewMutation,
    ) -> Result<MutationWithValues> {
        self.authorize_write(user_id, project_id, branch)?;
        self.keyspace().create_mutation(
            project_id,
            branch,
            &input.key,
            input.status.as_deref(),
            &input.values,
            user_id,
        )
    }

    pub fn get_mutation(
        &self,
        user_id: &str,
        project_id: &str,
        mutation_id: &str,
    ) -> Result<MutationWithValues> {
        self.require_member(user_id, project_id)?;
        self.mutation_in(project_id, mutation_id)
    }

    /// Renames and/or restatuses a mutation inside its own branch.
    pub fn update_mutation(
        &self,
        user_id: &str,
        project_id: &str,
        mutation_id: &str,
        update: &MutationUpdate,
    ) -> Result<MutationWithValues> {
        let MutationWithValues { mut mutation, .. } = self.mutation_in(project_id, mutation_id)?;
        self.authorize_write(user_id, project_id, &mutation.branch)?;

        if let Some(key) = update.key.as_deref().filter(|k| *k != mutation.key) {
            let available = self.keyspace().check_key_available(
                project_id,
                &mutation.branch,
                key,
                Some(&mutation.id),
            )?;
            if !available {
                return Err(Error::Conflict(format!(
                    "Mutation with key '{key}' already exists in this branch"
                )));
            }
            mutation.key = key.to_string();
        }
        if let Some(status) = update.status.as_deref() {
            mutation.status = status_or_default(Some(status));
        }
        mutation.updated_at = Utc::now();

        self.store.update_mutation(&mutation)?;
        self.mutation_in(project_id, mutation_id)
    }

    pub fn delete_mutation(&self, user_id: &str, project_id: &str, mutation_id: &str) -> Result<()> {
        let existing = self.mutation_in(project_id, mutation_id)?;
        self.authorize_write(user_id, project_id, &existing.mutation.branch)?;

        if !self.store.delete_mutation(mutation_id)? {
            return Err(Error::NotFound("mutation"));
        }
        Ok(())
    }

    // Mutation values

    /// Adds the value of a language the mutation has none for yet.
    pub fn create_mutation_value(
        &self,
        user_id: &str,
        project_id: &str,
        mutation_id: &str,
        language_id: &str,
        value: &str,
        status: Option<&str>,
    ) -> Result<MutationValue> {
        let existing = self.mutation_in(project_id, mutation_id)?;
        self.authorize_write(user_id, project_id, &existing.mutation.branch)?;

        self.store
            .get_language(language_id)?
            .filter(|l| l.project_id == project_id)
            .ok_or(Error::NotFound("language"))?;

        if existing.values.iter().any(|v| v.language_id == language_id) {
            return Err(Error::Conflict(
                "Mutation already has a value for this language".to_string(),
            ));
        }

        let now = Utc::now();
        let value = MutationValue {
            id: Uuid::new_v4().to_string(),
            mutation_id: mutation_id.to_string(),
            language_id: language_id.to_string(),
            value: value.to_string(),
            status: status_or_default(status),
            last_updated_by: Some(user_id.to_string()),
            created_at: now,
            updated_at: now,
        };
        self.store.create_mutation_value(&value)?;
        Ok(value)
    }

    pub fn update_mutation_value(
        &self,
        user_id: &str,
        project_id: &str,
        value_id: &str,
        update: &ValueUpdate,
    ) -> Result<MutationValue> {
        let mut value = self
            .store
            .get_mutation_value(value_id)?
            .ok_or(Error::NotFound("mutation value"))?;
        let owner = reported_as(
            self.mutation_in(project_id, &value.mutation_id),
            "mutation value",
        )?;
        self.authorize_write(user_id, project_id, &owner.mutation.branch)?;

        if let Some(text) = &update.value {
            value.value.clone_from(text);
        }
        if let Some(status) = update.status.as_deref() {
            value.status = status_or_default(Some(status));
        }
        value.last_updated_by = Some(user_id.to_string());
        value.updated_at = Utc::now();

        self.store.update_mutation_value(&value)?;
        Ok(value)
    }

    // Reads

    pub fn search_mutations(
        &self,
        user_id: &str,
        project_id: &str,
        branch: &BranchRef,
        query: MutationQuery,
    ) -> Result<Vec<MutationWithValues>> {
        self.require_member(user_id, project_id)?;
        BranchResolver::new(self.store).resolve(project_id, branch)?;
        self.keyspace().search(project_id, branch, query)
    }

    pub fn list_mutations_by_branch(
        &self,
        user_id: &str,
        project_id: &str,
        branch: &BranchRef,
    ) -> Result<Vec<MutationWithValues>> {
        self.search_mutations(user_id, project_id, branch, MutationQuery::default())
    }
}

/// Reports a missing entity as `what`; every other error passes through.
fn reported_as<T>(result: Result<T>, what: &'static str) -> Result<T> {
    match result {
        Err(Error::NotFound(_)) => Err(Error::NotFound(what)),
        other => other,
    }
}
