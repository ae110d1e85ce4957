use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Branch, BranchRef};

/// Turns a [`BranchRef`] into a concrete branch of a project.
pub struct BranchResolver<'a> {
    store: &'a dyn Store,
}

impl<'a> BranchResolver<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Returns `None` for the main line without touching the store.
    ///
    /// An explicit id that does not exist, or that belongs to another
    /// project, is `NotFound` whatever the caller's permissions.
    pub fn resolve(&self, project_id: &str, branch: &BranchRef) -> Result<Option<Branch>> {
        let BranchRef::Explicit(id) = branch else {
            return Ok(None);
        };

        match self.store.get_branch(id)? {
            Some(branch) if branch.project_id == project_id => Ok(Some(branch)),
            _ => Err(Error::NotFound("branch")),
        }
    }
}
