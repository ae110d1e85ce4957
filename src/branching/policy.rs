use std::fmt;

use super::{BranchResolver, PermissionGate};
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Branch, BranchRef, Role};

/// Which rule rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// The target branch is locked.
    Locked,
    /// The user's role is too low for the action.
    NoRole,
    /// Main has no edit role configured for the project.
    MainFrozen,
    /// The user is not in the space owning the project.
    NotMember,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Denial::Locked => "branch is locked",
            Denial::NoRole => "your role does not allow this action",
            Denial::MainFrozen => "main branch is not editable in this project",
            Denial::NotMember => "not a member of this project's space",
        })
    }
}

impl From<Denial> for Error {
    fn from(denial: Denial) -> Self {
        Error::Forbidden(denial)
    }
}

/// Outcome of a write check.
#[derive(Debug)]
pub enum Decision {
    /// Carries the resolved branch (`None` for main) and the user's role.
    Allowed { branch: Option<Branch>, role: Role },
    Denied(Denial),
}

/// Decides whether a write against `branch` (`None` for main) is allowed.
///
/// Rules are checked in order and the first failing one wins:
/// a locked branch, no role, a viewer role, then for main the project's
/// edit role (unset freezes main).
pub fn decide(
    branch: Option<&Branch>,
    role: Option<Role>,
    edit_main_role: Option<Role>,
) -> std::result::Result<Role, Denial> {
    if branch.is_some_and(|b| b.locked) {
        return Err(Denial::Locked);
    }

    let role = role.ok_or(Denial::NoRole)?;
    if !role.can_write() {
        return Err(Denial::NoRole);
    }

    if branch.is_some() {
        return Ok(role);
    }

    match edit_main_role {
        None => Err(Denial::MainFrozen),
        Some(required) if role.has(required) => Ok(role),
        Some(_) => Err(Denial::NoRole),
    }
}

/// Store-backed evaluation of [`decide`].
pub struct BranchMutabilityPolicy<'a> {
    store: &'a dyn Store,
}

impl<'a> BranchMutabilityPolicy<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    pub fn evaluate(&self, user_id: &str, project_id: &str, target: &BranchRef) -> Result<Decision> {
        let branch = BranchResolver::new(self.store).resolve(project_id, target)?;

        if branch.as_ref().is_some_and(|b| b.locked) {
            return Ok(Decision::Denied(Denial::Locked));
        }

        let role = PermissionGate::new(self.store).project_role(user_id, project_id)?;

        // settings only matter for main
        let edit_main_role = match (&branch, role) {
            (None, Some(role)) if role.can_write() => self
                .store
                .get_project_settings(project_id)?
                .and_then(|settings| settings.edit_main_role),
            _ => None,
        };

        Ok(match decide(branch.as_ref(), role, edit_main_role) {
            Ok(role) => Decision::Allowed { branch, role },
            Err(denial) => Decision::Denied(denial),
        })
    }
}
