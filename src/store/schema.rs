pub const SCHEMA: &str = r#"
-- Users authenticate with tokens and join spaces as members
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    username TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Tokens are auth credentials bound to a user
CREATE TABLE IF NOT EXISTS tokens (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL,          -- argon2id hash with embedded salt
    token_lookup TEXT NOT NULL,        -- lookup segment of the token for fast lookup
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    expires_at TEXT,                   -- NULL = never
    last_used_at TEXT
);

-- Spaces (teams) own projects
CREATE TABLE IF NOT EXISTS spaces (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS space_members (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    space_id TEXT NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('viewer', 'editor', 'admin', 'owner')),
    joined_at TEXT DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, space_id)
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    space_id TEXT NOT NULL REFERENCES spaces(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- One row per project; NULL edit_main_role freezes the main line
CREATE TABLE IF NOT EXISTS project_settings (
    project_id TEXT PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    edit_main_role TEXT CHECK (edit_main_role IN ('viewer', 'editor', 'admin', 'owner')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS languages (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),

    UNIQUE(project_id, name)
);

CREATE TABLE IF NOT EXISTS branches (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_by TEXT NOT NULL REFERENCES users(id),
    locked INTEGER NOT NULL DEFAULT 0,
    base_branch_id TEXT REFERENCES branches(id) ON DELETE SET NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(project_id, name)
);

-- Translation keys; branch_id NULL is the main line
CREATE TABLE IF NOT EXISTS mutations (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    branch_id TEXT REFERENCES branches(id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS mutation_values (
    id TEXT PRIMARY KEY,
    mutation_id TEXT NOT NULL REFERENCES mutations(id) ON DELETE CASCADE,
    language_id TEXT NOT NULL REFERENCES languages(id) ON DELETE CASCADE,
    value TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    last_updated_by TEXT REFERENCES users(id) ON DELETE SET NULL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now')),

    UNIQUE(mutation_id, language_id)
);

-- NULL branch ids never collide in a plain UNIQUE, so main is folded to ''
CREATE UNIQUE INDEX IF NOT EXISTS idx_mutations_scope_key
    ON mutations(project_id, IFNULL(branch_id, ''), key);

-- Writes to a locked branch abort inside the writing statement itself. The
-- message is matched in sqlite.rs.
CREATE TRIGGER IF NOT EXISTS trg_mutations_locked_insert
BEFORE INSERT ON mutations WHEN NEW.branch_id IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, 'branch locked')
    WHERE EXISTS (SELECT 1 FROM branches WHERE id = NEW.branch_id AND locked = 1);
END;

CREATE TRIGGER IF NOT EXISTS trg_mutations_locked_update
BEFORE UPDATE ON mutations WHEN OLD.branch_id IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, 'branch locked')
    WHERE EXISTS (SELECT 1 FROM branches WHERE id = OLD.branch_id AND locked = 1);
END;

CREATE TRIGGER IF NOT EXISTS trg_mutations_locked_delete
BEFORE DELETE ON mutations WHEN OLD.branch_id IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, 'branch locked')
    WHERE EXISTS (SELECT 1 FROM branches WHERE id = OLD.branch_id AND locked = 1);
END;

CREATE TRIGGER IF NOT EXISTS trg_mutation_values_locked_insert
BEFORE INSERT ON mutation_values
BEGIN
    SELECT RAISE(ABORT, 'branch locked')
    WHERE EXISTS (
        SELECT 1 FROM mutations m JOIN branches b ON b.id = m.branch_id
        WHERE m.id = NEW.mutation_id AND b.locked = 1
    );
END;

CREATE TRIGGER IF NOT EXISTS trg_mutation_values_locked_update
BEFORE UPDATE ON mutation_values
BEGIN
    SELECT RAISE(ABORT, 'branch locked')
    WHERE EXISTS (
        SELECT 1 FROM mutations m JOIN branches b ON b.id = m.branch_id
        WHERE m.id = OLD.mutation_id AND b.locked = 1
    );
END;

CREATE TRIGGER IF NOT EXISTS trg_mutation_values_locked_delete
BEFORE DELETE ON mutation_values
BEGIN
    SELECT RAISE(ABORT, 'branch locked')
    WHERE EXISTS (
        SELECT 1 FROM mutations m JOIN branches b ON b.id = m.branch_id
        WHERE m.id = OLD.mutation_id AND b.locked = 1
    );
END;

CREATE UNIQUE INDEX IF NOT EXISTS idx_tokens_lookup ON tokens(token_lookup);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON tokens(user_id);
CREATE INDEX IF NOT EXISTS idx_space_members_space ON space_members(space_id);
CREATE INDEX IF NOT EXISTS idx_projects_space ON projects(space_id);
CREATE INDEX IF NOT EXISTS idx_languages_project ON languages(project_id);
CREATE INDEX IF NOT EXISTS idx_branches_project ON branches(project_id);
CREATE INDEX IF NOT EXISTS idx_mutations_branch ON mutations(branch_id);
CREATE INDEX IF NOT EXISTS idx_mutation_values_mutation ON mutation_values(mutation_id);
"#;
