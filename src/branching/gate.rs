use crate::error::Result;
use crate::store::Store;
use crate::types::Role;

/// Answers membership and role questions from space membership rows.
///
/// Lookups that find nothing (unknown user, unknown project) are reported
/// as "no role"; storage failures are returned as errors and must be
/// treated as a deny by callers.
pub struct PermissionGate<'a> {
    store: &'a dyn Store,
}

impl<'a> PermissionGate<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Whether the user belongs to the space owning the project.
    pub fn is_member(&self, user_id: &str, project_id: &str) -> Result<bool> {
        Ok(self.project_role(user_id, project_id)?.is_some())
    }

    pub fn role_of(&self, user_id: &str, space_id: &str) -> Result<Option<Role>> {
        Ok(self
            .store
            .get_space_member(user_id, space_id)?
            .map(|member| member.role))
    }

    /// Role of the user in the space owning the project.
    pub fn project_role(&self, user_id: &str, project_id: &str) -> Result<Option<Role>> {
        self.store.get_project_role(user_id, project_id)
    }
}
