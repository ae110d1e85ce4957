use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::BranchResolver;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::*;

/// Creates branches as snapshots of an existing scope.
pub struct BranchForker<'a> {
    store: &'a dyn Store,
}

impl<'a> BranchForker<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Creates branch `name` in the project holding a copy of every mutation
    /// of `source`. Returns the branch and the number of copied mutations.
    ///
    /// The branch row and all copies are committed together or not at all.
    pub fn fork(
        &self,
        project_id: &str,
        source: &BranchRef,
        name: &str,
        creator_id: &str,
    ) -> Result<(Branch, usize)> {
        if is_reserved_branch_name(name) {
            return Err(Error::Conflict(format!("Branch name '{name}' is reserved")));
        }

        let base = BranchResolver::new(self.store).resolve(project_id, source)?;

        if self.store.get_branch_by_name(project_id, name)?.is_some() {
            return Err(Error::Conflict(format!(
                "Branch '{name}' already exists in this project"
            )));
        }

        let now = Utc::now();
        let branch = Branch {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            created_by: creator_id.to_string(),
            locked: false,
            base_branch_id: base.map(|b| b.id),
            created_at: now,
            updated_at: now,
        };

        let copied = self.store.fork_branch(&branch, source, &|rows, language_ids| {
            copy_mutations(rows, &branch.id, language_ids, now)
        })?;

        tracing::info!(
            project_id = %project_id,
            branch = %branch.name,
            source = %source,
            mutations = copied,
            "Forked branch"
        );

        Ok((branch, copied))
    }
}

/// Rebinds source mutations to `branch_id` under fresh ids.
///
/// Copied mutations are stamped with `now`. Each copied value keeps its
/// content, status and author, and takes the source value's `updated_at` as
/// both its `created_at` and `updated_at`. A value for a language outside
/// `language_ids`, or a second value for the same language, fails the copy.
pub fn copy_mutations(
    source: Vec<MutationWithValues>,
    branch_id: &str,
    language_ids: &HashSet<String>,
    now: DateTime<Utc>,
) -> Result<Vec<MutationWithValues>> {
    source
        .into_iter()
        .map(|original| -> Result<MutationWithValues> {
            let mutation_id = Uuid::new_v4().to_string();
            let mut seen = HashSet::new();

            let values = original
                .values
                .into_iter()
                .map(|value| {
                    if !language_ids.contains(&value.language_id) {
                        return Err(Error::Validation(format!(
                            "Mutation '{}' has a value for unknown language '{}'",
                            original.mutation.key, value.language_id
                        )));
                    }
                    if !seen.insert(value.language_id.clone()) {
                        return Err(Error::Validation(format!(
                            "Mutation '{}' has two values for language '{}'",
                            original.mutation.key, value.language_id
                        )));
                    }

                    Ok(MutationValue {
                        id: Uuid::new_v4().to_string(),
                        mutation_id: mutation_id.clone(),
                        language_id: value.language_id,
                        value: value.value,
                        status: value.status,
                        last_updated_by: value.last_updated_by,
                        created_at: value.updated_at,
                        updated_at: value.updated_at,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(MutationWithValues {
                mutation: Mutation {
                    id: mutation_id,
                    project_id: original.mutation.project_id,
                    branch: BranchRef::Explicit(branch_id.to_string()),
                    key: original.mutation.key,
                    status: original.mutation.status,
                    created_at: now,
                    updated_at: now,
                },
                values,
            })
        })
        .collect()
}
