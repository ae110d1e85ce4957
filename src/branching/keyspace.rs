use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::*;

/// Upper bound on the number of mutations returned by one search.
pub const MAX_PAGE_SIZE: usize = 100;

/// Key uniqueness and the mutation/value entity graph of one project.
pub struct MutationKeyspace<'a> {
    store: &'a dyn Store,
    page_size: usize,
}

impl<'a> MutationKeyspace<'a> {
    #[must_use]
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            page_size: MAX_PAGE_SIZE,
        }
    }

    /// Lowers the page size; values above [`MAX_PAGE_SIZE`] are capped.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Whether `key` is unused in the scope, ignoring `exclude_id`.
    ///
    /// This is an early exit only; the store's unique index decides races.
    pub fn check_key_available(
        &self,
        project_id: &str,
        branch: &BranchRef,
        key: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool> {
        let count = self
            .store
            .count_mutations_with_key(project_id, branch, key, exclude_id)?;
        Ok(count == 0)
    }

    /// Creates the mutation with exactly one value per project language.
    ///
    /// Languages missing from `values` get an empty string; entries for
    /// languages outside the project are ignored.
    pub fn create_mutation(
        &self,
        project_id: &str,
        branch: &BranchRef,
        key: &str,
        status: Option<&str>,
        values: &HashMap<String, String>,
        user_id: &str,
    ) -> Result<MutationWithValues> {
        if !self.check_key_available(project_id, branch, key, None)? {
            return Err(Error::Conflict(format!(
                "Mutation with key '{key}' already exists in this branch"
            )));
        }

        let now = Utc::now();
        let status = status_or_default(status);
        let mutation_id = Uuid::new_v4().to_string();

        let values = self
            .store
            .list_languages(project_id)?
            .into_iter()
            .map(|language| MutationValue {
                id: Uuid::new_v4().to_string(),
                mutation_id: mutation_id.clone(),
                value: values.get(&language.id).cloned().unwrap_or_default(),
                language_id: language.id,
                status: status.clone(),
                last_updated_by: Some(user_id.to_string()),
                created_at: now,
                updated_at: now,
            })
            .collect();

        let mutation = MutationWithValues {
            mutation: Mutation {
                id: mutation_id,
                project_id: project_id.to_string(),
                branch: branch.clone(),
                key: key.to_string(),
                status,
                created_at: now,
                updated_at: now,
            },
            values,
        };

        self.store.create_mutation(&mutation)?;
        Ok(mutation)
    }

    /// Mutations of the scope matching the query, ordered by key and capped
    /// at the page size.
    pub fn search(
        &self,
        project_id: &str,
        branch: &BranchRef,
        mut query: MutationQuery,
    ) -> Result<Vec<MutationWithValues>> {
        query.limit = match query.limit {
            0 => self.page_size,
            n => n.min(self.page_size),
        };
        self.store.list_mutations(project_id, branch, &query)
    }

    pub fn list(&self, project_id: &str, branch: &BranchRef) -> Result<Vec<MutationWithValues>> {
        self.search(project_id, branch, MutationQuery::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::branching::test_support::Fixture;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_create_backfills_every_language() {
        let f = Fixture::new();
        let keyspace = MutationKeyspace::new(f.store());

        let created = keyspace
            .create_mutation(
                &f.project_id,
                &BranchRef::Main,
                "greeting",
                None,
                &values(&[(f.en.as_str(), "hello"), ("lang-elsewhere", "ignored")]),
                &f.editor,
            )
            .unwrap();

        assert_eq!(created.mutation.status, DEFAULT_STATUS);
        assert_eq!(created.values.len(), 2);
        let by_lang: HashMap<&str, &str> = created
            .values
            .iter()
            .map(|v| (v.language_id.as_str(), v.value.as_str()))
            .collect();
        assert_eq!(by_lang[f.en.as_str()], "hello");
        assert_eq!(by_lang[f.fr.as_str()], "");

        let stored = f.store().get_mutation(&created.mutation.id).unwrap().unwrap();
        assert_eq!(stored.values.len(), 2);
    }

    #[test]
    fn test_key_availability_follows_create_and_delete() {
        let f = Fixture::new();
        let branch = f.branch("feature");
        let scope = BranchRef::Explicit(branch.id);
        let keyspace = MutationKeyspace::new(f.store());

        assert!(keyspace.check_key_available(&f.project_id, &scope, "k", None).unwrap());
        let created = keyspace
            .create_mutation(&f.project_id, &scope, "k", None, &HashMap::new(), &f.editor)
            .unwrap();
        assert!(!keyspace.check_key_available(&f.project_id, &scope, "k", None).unwrap());
        assert!(
            keyspace
                .check_key_available(&f.project_id, &scope, "k", Some(&created.mutation.id))
                .unwrap()
        );
        // other scopes are unaffected
        assert!(keyspace.check_key_available(&f.project_id, &BranchRef::Main, "k", None).unwrap());

        f.store().delete_mutation(&created.mutation.id).unwrap();
        assert!(keyspace.check_key_available(&f.project_id, &scope, "k", None).unwrap());
    }

    #[test]
    fn test_duplicate_key_conflicts() {
        let f = Fixture::new();
        let keyspace = MutationKeyspace::new(f.store());
        keyspace
            .create_mutation(&f.project_id, &BranchRef::Main, "k", None, &HashMap::new(), &f.owner)
            .unwrap();
        let again =
            keyspace.create_mutation(&f.project_id, &BranchRef::Main, "k", None, &HashMap::new(), &f.owner);
        assert!(matches!(again, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_concurrent_creates_have_one_winner() {
        let f = Fixture::new();
        let store = f.shared_store();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                let project_id = f.project_id.clone();
                let user_id = f.editor.clone();
                thread::spawn(move || {
                    barrier.wait();
                    MutationKeyspace::new(store.as_ref()).create_mutation(
                        &project_id,
                        &BranchRef::Main,
                        "race",
                        None,
                        &HashMap::new(),
                        &user_id,
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(
            results
                .iter()
                .filter(|r| r.is_err())
                .all(|r| matches!(r, Err(Error::Conflict(_))))
        );
    }

    #[test]
    fn test_search_caps_page_size() {
        let f = Fixture::new();
        let keyspace = MutationKeyspace::new(f.store()).with_page_size(3);
        for i in 0..5 {
            keyspace
                .create_mutation(
                    &f.project_id,
                    &BranchRef::Main,
                    &format!("key.{i}"),
                    None,
                    &HashMap::new(),
                    &f.owner,
                )
                .unwrap();
        }

        let listed = keyspace.list(&f.project_id, &BranchRef::Main).unwrap();
        let keys: Vec<&str> = listed.iter().map(|m| m.mutation.key.as_str()).collect();
        assert_eq!(keys, vec!["key.0", "key.1", "key.2"]);

        let query = MutationQuery {
            limit: 1000,
            ..Default::default()
        };
        assert_eq!(keyspace.search(&f.project_id, &BranchRef::Main, query).unwrap().len(), 3);
    }

    #[test]
    fn test_search_by_status_and_value() {
        let f = Fixture::new();
        let keyspace = MutationKeyspace::new(f.store());
        keyspace
            .create_mutation(
                &f.project_id,
                &BranchRef::Main,
                "done",
                Some("TRANSLATED"),
                &values(&[(f.en.as_str(), "Done"), (f.fr.as_str(), "Fini")]),
                &f.owner,
            )
            .unwrap();
        keyspace
            .create_mutation(
                &f.project_id,
                &BranchRef::Main,
                "todo",
                None,
                &values(&[(f.en.as_str(), "Todo")]),
                &f.owner,
            )
            .unwrap();

        let query = MutationQuery {
            status: Some("TRANSLATED".to_string()),
            ..Default::default()
        };
        let found = keyspace.search(&f.project_id, &BranchRef::Main, query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mutation.key, "done");

        let query = MutationQuery {
            languages: vec![LanguageFilter {
                language_id: f.fr.clone(),
                search: "Fin".to_string(),
            }],
            ..Default::default()
        };
        let found = keyspace.search(&f.project_id, &BranchRef::Main, query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mutation.key, "done");
    }
}
