use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use crate::store::{SqliteStore, Store};
use crate::types::*;

/// A project in a space with one user per role, an outsider, and the
/// languages `en` and `fr`.
pub(crate) struct Fixture {
    _temp: TempDir,
    store: Arc<SqliteStore>,
    pub space_id: String,
    pub project_id: String,
    pub owner: String,
    pub admin: String,
    pub editor: String,
    pub viewer: String,
    pub outsider: String,
    pub en: String,
    pub fr: String,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::new(temp.path().join("test.db")).unwrap());
        store.initialize().unwrap();

        let user = |name: &str| {
            let now = Utc::now();
            let user = User {
                id: format!("user-{name}"),
                name: name.to_string(),
                username: name.to_string(),
                created_at: now,
                updated_at: now,
            };
            store.create_user(&user).unwrap();
            user.id
        };
        let owner = user("owner");
        let admin = user("admin");
        let editor = user("editor");
        let viewer = user("viewer");
        let outsider = user("outsider");

        let now = Utc::now();
        let space = Space {
            id: "space-1".to_string(),
            name: "Team".to_string(),
            created_at: now,
        };
        let member = |user_id: &str, role: Role| SpaceMember {
            user_id: user_id.to_string(),
            space_id: space.id.clone(),
            role,
            joined_at: now,
        };
        store.create_space(&space, &member(&owner, Role::Owner)).unwrap();
        for (user_id, role) in [(&admin, Role::Admin), (&editor, Role::Editor), (&viewer, Role::Viewer)] {
            store.add_space_member(&member(user_id, role)).unwrap();
        }

        let mut fixture = Self {
            _temp: temp,
            store,
            space_id: space.id,
            project_id: String::new(),
            owner,
            admin,
            editor,
            viewer,
            outsider,
            en: String::new(),
            fr: String::new(),
        };
        fixture.project_id = fixture.project_in(&fixture.space_id, "App");
        fixture.en = fixture.language("en");
        fixture.fr = fixture.language("fr");
        fixture
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn shared_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn project_in(&self, space_id: &str, name: &str) -> String {
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
        self.store.create_project(&project, &settings).unwrap();
        project.id
    }

    /// A second project in the same space.
    pub fn other_project(&self) -> String {
        self.project_in(&self.space_id, "Other")
    }

    pub fn language(&self, name: &str) -> String {
        let language = Language {
            id: format!("lang-{name}"),
            project_id: self.project_id.clone(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.store.create_language(&language).unwrap();
        language.id
    }

    pub fn set_edit_main_role(&self, role: Option<Role>) {
        self.store
            .update_project_settings(&ProjectSettings {
                project_id: self.project_id.clone(),
                edit_main_role: role,
                updated_at: Utc::now(),
            })
            .unwrap();
    }

    /// Creates an empty branch in the fixture project.
    pub fn branch(&self, name: &str) -> Branch {
        self.branch_in(&self.project_id, name)
    }

    pub fn branch_in(&self, project_id: &str, name: &str) -> Branch {
        let now = Utc::now();
        let branch = Branch {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            name: name.to_string(),
            created_by: self.owner.clone(),
            locked: false,
            base_branch_id: None,
            created_at: now,
            updated_at: now,
        };
        self.store
            .fork_branch(&branch, &BranchRef::Main, &|_, _| Ok(Vec::new()))
            .unwrap();
        branch
    }
}
