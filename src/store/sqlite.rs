use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{
    Connection, OptionalExtension, Row, ToSql, TransactionBehavior, ffi, params, params_from_iter,
};

use super::schema::SCHEMA;
use super::{BATCH_SIZE, ForkCopy, Store};
use crate::branching::Denial;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Role::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown role '{s}'").into()))
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Maps unique index violations to `Error::Conflict` with the given message.
fn conflict_on_unique(message: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| {
        if is_unique_violation(&e) {
            Error::Conflict(message.to_string())
        } else {
            Error::from(e)
        }
    }
}

/// Raised by the schema triggers guarding locked branches.
const BRANCH_LOCKED: &str = "branch locked";

fn is_branch_locked(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, Some(message))
            if err.extended_code == ffi::SQLITE_CONSTRAINT_TRIGGER && message == BRANCH_LOCKED
    )
}

fn is_foreign_key_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// Error mapping for writes into a branch scope: a locked branch becomes
/// `Forbidden(Locked)`, a vanished parent row `NotFound(missing)`, and a
/// unique violation `Conflict(conflict)`.
fn scope_write_error(
    conflict: &'static str,
    missing: &'static str,
) -> impl Fn(rusqlite::Error) -> Error {
    move |e| {
        if is_branch_locked(&e) {
            Error::Forbidden(Denial::Locked)
        } else if is_unique_violation(&e) {
            Error::Conflict(conflict.to_string())
        } else if is_foreign_key_violation(&e) {
            Error::NotFound(missing)
        } else {
            Error::from(e)
        }
    }
}

const KEY_TAKEN: &str = "Mutation with this key already exists in this branch";
const LANGUAGE_TAKEN: &str = "Mutation already has a value for this language";

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn optional_text(s: Option<&str>) -> Value {
    s.map_or(Value::Null, text)
}

const BRANCH_COLUMNS: &str =
    "id, project_id, name, created_by, locked, base_branch_id, created_at, updated_at";

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        created_by: row.get(3)?,
        locked: row.get(4)?,
        base_branch_id: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

const MUTATION_COLUMNS: &str = "id, project_id, branch_id, key, status, created_at, updated_at";

fn mutation_from_row(row: &Row<'_>) -> rusqlite::Result<Mutation> {
    Ok(Mutation {
        id: row.get(0)?,
        project_id: row.get(1)?,
        branch: BranchRef::from(row.get::<_, Option<String>>(2)?),
        key: row.get(3)?,
        status: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn mutation_row(m: &Mutation) -> Vec<Value> {
    vec![
        text(&m.id),
        text(&m.project_id),
        optional_text(m.branch.branch_id()),
        text(&m.key),
        text(&m.status),
        Value::Text(format_datetime(&m.created_at)),
        Value::Text(format_datetime(&m.updated_at)),
    ]
}

const VALUE_COLUMNS: &str =
    "id, mutation_id, language_id, value, status, last_updated_by, created_at, updated_at";

fn value_from_row(row: &Row<'_>) -> rusqlite::Result<MutationValue> {
    Ok(MutationValue {
        id: row.get(0)?,
        mutation_id: row.get(1)?,
        language_id: row.get(2)?,
        value: row.get(3)?,
        status: row.get(4)?,
        last_updated_by: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn value_row(v: &MutationValue) -> Vec<Value> {
    vec![
        text(&v.id),
        text(&v.mutation_id),
        text(&v.language_id),
        text(&v.value),
        text(&v.status),
        optional_text(v.last_updated_by.as_deref()),
        Value::Text(format_datetime(&v.created_at)),
        Value::Text(format_datetime(&v.updated_at)),
    ]
}

/// Inserts rows with multi-row `INSERT` statements of at most `BATCH_SIZE` rows.
fn insert_rows(conn: &Connection, target: &str, rows: &[Vec<Value>]) -> rusqlite::Result<()> {
    for chunk in rows.chunks(BATCH_SIZE) {
        let Some(first) = chunk.first() else {
            continue;
        };
        let row_placeholder = format!("({})", vec!["?"; first.len()].join(", "));
        let placeholders = vec![row_placeholder.as_str(); chunk.len()].join(", ");
        let sql = format!("INSERT INTO {target} VALUES {placeholders}");
        conn.execute(&sql, params_from_iter(chunk.iter().flatten()))?;
    }
    Ok(())
}

fn insert_mutations(conn: &Connection, mutations: &[MutationWithValues]) -> Result<()> {
    let mutation_rows: Vec<Vec<Value>> = mutations.iter().map(|m| mutation_row(&m.mutation)).collect();
    let value_rows: Vec<Vec<Value>> = mutations
        .iter()
        .flat_map(|m| m.values.iter().map(value_row))
        .collect();

    insert_rows(conn, &format!("mutations ({MUTATION_COLUMNS})"), &mutation_rows)
        .map_err(scope_write_error(KEY_TAKEN, "branch"))?;
    insert_rows(conn, &format!("mutation_values ({VALUE_COLUMNS})"), &value_rows)
        .map_err(scope_write_error(LANGUAGE_TAKEN, "language"))?;
    Ok(())
}

fn load_values(
    conn: &Connection,
    mutation_ids: &[String],
) -> Result<HashMap<String, Vec<MutationValue>>> {
    let mut by_mutation: HashMap<String, Vec<MutationValue>> = HashMap::new();

    for chunk in mutation_ids.chunks(BATCH_SIZE) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT {VALUE_COLUMNS} FROM mutation_values
             WHERE mutation_id IN ({placeholders}) ORDER BY language_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), value_from_row)?;
        for row in rows {
            let value = row?;
            by_mutation
                .entry(value.mutation_id.clone())
                .or_default()
                .push(value);
        }
    }

    Ok(by_mutation)
}

/// Reads the mutations of one `(project, branch)` scope with their values.
fn load_scope(
    conn: &Connection,
    project_id: &str,
    branch: &BranchRef,
    query: &MutationQuery,
) -> Result<Vec<MutationWithValues>> {
    let mut sql = format!(
        "SELECT {MUTATION_COLUMNS} FROM mutations m WHERE m.project_id = ? AND m.branch_id IS ?"
    );
    let mut args = vec![text(project_id), optional_text(branch.branch_id())];

    // instr() keeps substring matching case-sensitive, unlike LIKE
    if let Some(key) = query.key_contains.as_deref().filter(|k| !k.is_empty()) {
        sql.push_str(" AND instr(m.key, ?) > 0");
        args.push(text(key));
    }

    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        sql.push_str(" AND m.status = ?");
        args.push(text(status));
    }

    if !query.languages.is_empty() {
        let clauses =
            vec!["(v.language_id = ? AND instr(v.value, ?) > 0)"; query.languages.len()].join(" OR ");
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM mutation_values v WHERE v.mutation_id = m.id AND ({clauses}))"
        ));
        for filter in &query.languages {
            args.push(text(&filter.language_id));
            args.push(text(&filter.search));
        }
    }

    sql.push_str(" ORDER BY m.key ASC");
    if query.limit > 0 {
        sql.push_str(" LIMIT ?");
        args.push(Value::Integer(query.limit as i64));
    }

    let mutations = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), mutation_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let ids: Vec<String> = mutations.iter().map(|m| m.id.clone()).collect();
    let mut values = load_values(conn, &ids)?;

    Ok(mutations
        .into_iter()
        .map(|mutation| {
            let values = values.remove(&mutation.id).unwrap_or_default();
            MutationWithValues { mutation, values }
        })
        .collect())
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, name, username, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id,
                    user.name,
                    user.username,
                    format_datetime(&user.created_at),
                    format_datetime(&user.updated_at),
                ],
            )
            .map_err(conflict_on_unique("User with this username already exists"))?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, username, created_at, updated_at FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    username: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                    updated_at: parse_datetime(&row.get::<_, String>(4)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::TokenLookupCollision),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE token_lookup = ?1",
            params![lookup],
            |row| {
                Ok(Token {
                    id: row.get(0)?,
                    token_hash: row.get(1)?,
                    token_lookup: row.get(2)?,
                    user_id: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                    expires_at: row.get::<_, Option<String>>(5)?.map(|s| parse_datetime(&s)),
                    last_used_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Space operations

    fn create_space(&self, space: &Space, owner: &SpaceMember) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO spaces (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![space.id, space.name, format_datetime(&space.created_at)],
        )?;
        tx.execute(
            "INSERT INTO space_members (user_id, space_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                owner.user_id,
                owner.space_id,
                owner.role,
                format_datetime(&owner.joined_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn list_user_spaces(&self, user_id: &str) -> Result<Vec<Space>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT s.id, s.name, s.created_at
             FROM spaces s
             JOIN space_members sm ON sm.space_id = s.id
             WHERE sm.user_id = ?1
             ORDER BY s.name",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Space {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn add_space_member(&self, member: &SpaceMember) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO space_members (user_id, space_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    member.user_id,
                    member.space_id,
                    member.role,
                    format_datetime(&member.joined_at),
                ],
            )
            .map_err(conflict_on_unique("User is already in this space"))?;
        Ok(())
    }

    fn get_space_member(&self, user_id: &str, space_id: &str) -> Result<Option<SpaceMember>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, space_id, role, joined_at
             FROM space_members WHERE user_id = ?1 AND space_id = ?2",
            params![user_id, space_id],
            |row| {
                Ok(SpaceMember {
                    user_id: row.get(0)?,
                    space_id: row.get(1)?,
                    role: row.get(2)?,
                    joined_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_project_role(&self, user_id: &str, project_id: &str) -> Result<Option<Role>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT sm.role
             FROM space_members sm
             JOIN projects p ON p.space_id = sm.space_id
             WHERE p.id = ?1 AND sm.user_id = ?2",
            params![project_id, user_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    // Project operations

    fn create_project(&self, project: &Project, settings: &ProjectSettings) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO projects (id, space_id, name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                project.id,
                project.space_id,
                project.name,
                format_datetime(&project.created_at),
                format_datetime(&project.updated_at),
            ],
        )?;
        tx.execute(
            "INSERT INTO project_settings (project_id, edit_main_role, updated_at)
             VALUES (?1, ?2, ?3)",
            params![
                settings.project_id,
                settings.edit_main_role,
                format_datetime(&settings.updated_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_project_settings(&self, project_id: &str) -> Result<Option<ProjectSettings>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT project_id, edit_main_role, updated_at
             FROM project_settings WHERE project_id = ?1",
            params![project_id],
            |row| {
                Ok(ProjectSettings {
                    project_id: row.get(0)?,
                    edit_main_role: row.get(1)?,
                    updated_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_project_settings(&self, settings: &ProjectSettings) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE project_settings SET edit_main_role = ?1, updated_at = ?2 WHERE project_id = ?3",
            params![
                settings.edit_main_role,
                format_datetime(&settings.updated_at),
                settings.project_id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("project settings"));
        }
        Ok(())
    }

    // Language operations

    fn create_language(&self, language: &Language) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO languages (id, project_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    language.id,
                    language.project_id,
                    language.name,
                    format_datetime(&language.created_at),
                ],
            )
            .map_err(conflict_on_unique("Language with this name already exists"))?;
        Ok(())
    }

    fn get_language(&self, id: &str) -> Result<Option<Language>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, project_id, name, created_at FROM languages WHERE id = ?1",
            params![id],
            |row| {
                Ok(Language {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                    created_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_languages(&self, project_id: &str) -> Result<Vec<Language>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, created_at
             FROM languages WHERE project_id = ?1 ORDER BY created_at, name",
        )?;

        let rows = stmt.query_map(params![project_id], |row| {
            Ok(Language {
                id: row.get(0)?,
                project_id: row.get(1)?,
                name: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Branch operations

    fn get_branch(&self, id: &str) -> Result<Option<Branch>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?1"),
            params![id],
            branch_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_branch_by_name(&self, project_id: &str, name: &str) -> Result<Option<Branch>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 AND name = ?2"),
            params![project_id, name],
            branch_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_branches(&self, project_id: &str) -> Result<Vec<Branch>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 ORDER BY name"
        ))?;

        let rows = stmt.query_map(params![project_id], branch_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn set_branch_locked(&self, id: &str, locked: bool) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE branches SET locked = ?1, updated_at = ?2 WHERE id = ?3",
            params![locked, format_datetime(&Utc::now()), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound("branch"));
        }
        Ok(())
    }

    fn delete_branch(&self, id: &str) -> Result<bool> {
        // mutations and their values go with the branch through ON DELETE CASCADE
        let rows = self
            .conn()
            .execute("DELETE FROM branches WHERE id = ?1", params![id])
            .map_err(scope_write_error("Branch is still referenced", "branch"))?;
        Ok(rows > 0)
    }

    fn fork_branch(
        &self,
        branch: &Branch,
        source: &BranchRef,
        copy: &ForkCopy<'_>,
    ) -> Result<usize> {
        let mut conn = self.conn();
        // IMMEDIATE takes the write lock before the source read, so no other
        // writer can change the source scope between read and insert.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            &format!("INSERT INTO branches ({BRANCH_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                branch.id,
                branch.project_id,
                branch.name,
                branch.created_by,
                branch.locked,
                branch.base_branch_id,
                format_datetime(&branch.created_at),
                format_datetime(&branch.updated_at),
            ],
        )
        .map_err(conflict_on_unique("Branch with this name already exists"))?;

        let language_ids: HashSet<String> = {
            let mut stmt = tx.prepare("SELECT id FROM languages WHERE project_id = ?1")?;
            let rows = stmt.query_map(params![branch.project_id], |row| row.get(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };
        let source_rows = load_scope(&tx, &branch.project_id, source, &MutationQuery::default())?;
        let copies = copy(source_rows, &language_ids)?;
        insert_mutations(&tx, &copies)?;

        tx.commit()?;
        Ok(copies.len())
    }

    // Mutation operations

    fn create_mutation(&self, mutation: &MutationWithValues) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        insert_mutations(&tx, std::slice::from_ref(mutation))?;
        tx.commit()?;
        Ok(())
    }

    fn get_mutation(&self, id: &str) -> Result<Option<MutationWithValues>> {
        let conn = self.conn();
        let mutation = conn
            .query_row(
                &format!("SELECT {MUTATION_COLUMNS} FROM mutations WHERE id = ?1"),
                params![id],
                mutation_from_row,
            )
            .optional()?;

        let Some(mutation) = mutation else {
            return Ok(None);
        };

        let values = load_values(&conn, std::slice::from_ref(&mutation.id))?
            .remove(&mutation.id)
            .unwrap_or_default();

        Ok(Some(MutationWithValues { mutation, values }))
    }

    fn count_mutations_with_key(
        &self,
        project_id: &str,
        branch: &BranchRef,
        key: &str,
        exclude_id: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mutations
             WHERE project_id = ?1 AND branch_id IS ?2 AND key = ?3 AND id IS NOT ?4",
            params![project_id, branch.branch_id(), key, exclude_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn update_mutation(&self, mutation: &Mutation) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE mutations SET key = ?1, status = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    mutation.key,
                    mutation.status,
                    format_datetime(&mutation.updated_at),
                    mutation.id,
                ],
            )
            .map_err(scope_write_error(KEY_TAKEN, "mutation"))?;

        if rows == 0 {
            return Err(Error::NotFound("mutation"));
        }
        Ok(())
    }

    fn delete_mutation(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM mutations WHERE id = ?1", params![id])
            .map_err(scope_write_error(KEY_TAKEN, "mutation"))?;
        Ok(rows > 0)
    }

    fn list_mutations(
        &self,
        project_id: &str,
        branch: &BranchRef,
        query: &MutationQuery,
    ) -> Result<Vec<MutationWithValues>> {
        let conn = self.conn();
        load_scope(&conn, project_id, branch, query)
    }

    // Mutation value operations

    fn create_mutation_value(&self, value: &MutationValue) -> Result<()> {
        let conn = self.conn();
        insert_rows(
            &conn,
            &format!("mutation_values ({VALUE_COLUMNS})"),
            &[value_row(value)],
        )
        .map_err(scope_write_error(LANGUAGE_TAKEN, "mutation"))?;
        Ok(())
    }

    fn get_mutation_value(&self, id: &str) -> Result<Option<MutationValue>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {VALUE_COLUMNS} FROM mutation_values WHERE id = ?1"),
            params![id],
            value_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn update_mutation_value(&self, value: &MutationValue) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE mutation_values
             SET value = ?1, status = ?2, last_updated_by = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                value.value,
                value.status,
                value.last_updated_by,
                format_datetime(&value.updated_at),
                value.id,
            ],
        )
        .map_err(scope_write_error(LANGUAGE_TAKEN, "mutation value"))?;

        if rows == 0 {
            return Err(Error::NotFound("mutation value"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: SqliteStore,
        user_id: String,
        project_id: String,
    }

    const EN: &str = "lang-en";
    const FR: &str = "lang-fr";

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let now = Utc::now();
        let user = User {
            id: "user-1".to_string(),
            name: "Test User".to_string(),
            username: "tester".to_string(),
            created_at: now,
            updated_at: now,
        };
        store.create_user(&user).unwrap();

        let space = Space {
            id: "space-1".to_string(),
            name: "Team".to_string(),
            created_at: now,
        };
        let owner = SpaceMember {
            user_id: user.id.clone(),
            space_id: space.id.clone(),
            role: Role::Owner,
            joined_at: now,
        };
        store.create_space(&space, &owner).unwrap();

        let project = Project {
            id: "project-1".to_string(),
            space_id: space.id.clone(),
            name: "App".to_string(),
            created_at: now,
            updated_at: now,
        };
        let settings = ProjectSettings {
            project_id: project.id.clone(),
            edit_main_role: None,
            updated_at: now,
        };
        store.create_project(&project, &settings).unwrap();

        for (id, name) in [(EN, "en"), (FR, "fr")] {
            store
                .create_language(&Language {
                    id: id.to_string(),
                    project_id: project.id.clone(),
                    name: name.to_string(),
                    created_at: now,
                })
                .unwrap();
        }

        Fixture {
            _temp: temp,
            store,
            user_id: user.id,
            project_id: project.id,
        }
    }

    fn mutation(
        f: &Fixture,
        id: &str,
        branch: BranchRef,
        key: &str,
        values: &[(&str, &str)],
    ) -> MutationWithValues {
        let now = Utc::now();
        MutationWithValues {
            mutation: Mutation {
                id: id.to_string(),
                project_id: f.project_id.clone(),
                branch,
                key: key.to_string(),
                status: DEFAULT_STATUS.to_string(),
                created_at: now,
                updated_at: now,
            },
            values: values
                .iter()
                .map(|(lang, value)| MutationValue {
                    id: format!("{id}-{lang}"),
                    mutation_id: id.to_string(),
                    language_id: lang.to_string(),
                    value: value.to_string(),
                    status: DEFAULT_STATUS.to_string(),
                    last_updated_by: Some(f.user_id.clone()),
                    created_at: now,
                    updated_at: now,
                })
                .collect(),
        }
    }

    fn branch(f: &Fixture, id: &str, name: &str) -> Branch {
        let now = Utc::now();
        Branch {
            id: id.to_string(),
            project_id: f.project_id.clone(),
            name: name.to_string(),
            created_by: f.user_id.clone(),
            locked: false,
            base_branch_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let f = fixture();
        let conn = f.store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "tokens",
            "spaces",
            "space_members",
            "projects",
            "project_settings",
            "languages",
            "branches",
            "mutations",
            "mutation_values",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn test_project_role_lookup() {
        let f = fixture();
        assert_eq!(
            f.store.get_project_role(&f.user_id, &f.project_id).unwrap(),
            Some(Role::Owner)
        );
        assert_eq!(f.store.get_project_role("nobody", &f.project_id).unwrap(), None);
        assert_eq!(f.store.get_project_role(&f.user_id, "missing").unwrap(), None);
    }

    #[test]
    fn test_unique_key_on_main_scope() {
        let f = fixture();
        let first = mutation(&f, "m1", BranchRef::Main, "greeting", &[(EN, "hello")]);
        f.store.create_mutation(&first).unwrap();

        // NULL branch ids must still collide
        let second = mutation(&f, "m2", BranchRef::Main, "greeting", &[(EN, "hi")]);
        let result = f.store.create_mutation(&second);
        assert!(matches!(result, Err(Error::Conflict(_))));

        // and nothing of the failed mutation is left behind
        assert!(f.store.get_mutation("m2").unwrap().is_none());
        assert!(f.store.get_mutation_value("m2-lang-en").unwrap().is_none());
    }

    #[test]
    fn test_same_key_in_different_branches() {
        let f = fixture();
        f.store
            .fork_branch(&branch(&f, "b1", "feature"), &BranchRef::Main, &|rows, _| Ok(rows))
            .unwrap();

        let main = mutation(&f, "m1", BranchRef::Main, "greeting", &[]);
        let feature = mutation(&f, "m2", BranchRef::Explicit("b1".into()), "greeting", &[]);
        f.store.create_mutation(&main).unwrap();
        f.store.create_mutation(&feature).unwrap();

        let on_main = f
            .store
            .count_mutations_with_key(&f.project_id, &BranchRef::Main, "greeting", None)
            .unwrap();
        assert_eq!(on_main, 1);

        let excluding_self = f
            .store
            .count_mutations_with_key(&f.project_id, &BranchRef::Main, "greeting", Some("m1"))
            .unwrap();
        assert_eq!(excluding_self, 0);
    }

    #[test]
    fn test_fork_rolls_back_branch_on_copy_error() {
        let f = fixture();
        f.store
            .create_mutation(&mutation(&f, "m1", BranchRef::Main, "a.b", &[(EN, "hi")]))
            .unwrap();

        let result = f.store.fork_branch(&branch(&f, "b1", "broken"), &BranchRef::Main, &|_, _| {
            Err(Error::Validation("copy failed".to_string()))
        });
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(f.store.get_branch("b1").unwrap().is_none());
    }

    #[test]
    fn test_fork_duplicate_branch_name() {
        let f = fixture();
        f.store
            .fork_branch(&branch(&f, "b1", "release"), &BranchRef::Main, &|rows, _| Ok(rows))
            .unwrap();
        let result = f
            .store
            .fork_branch(&branch(&f, "b2", "release"), &BranchRef::Main, &|rows, _| Ok(rows));
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_list_mutations_filters() {
        let f = fixture();
        for m in [
            mutation(&f, "m1", BranchRef::Main, "common.save", &[(EN, "Save"), (FR, "Enregistrer")]),
            mutation(&f, "m2", BranchRef::Main, "common.cancel", &[(EN, "Cancel"), (FR, "Annuler")]),
            mutation(&f, "m3", BranchRef::Main, "profile.title", &[(EN, "Profile"), (FR, "Profil")]),
        ] {
            f.store.create_mutation(&m).unwrap();
        }

        let all = f
            .store
            .list_mutations(&f.project_id, &BranchRef::Main, &MutationQuery::default())
            .unwrap();
        let keys: Vec<&str> = all.iter().map(|m| m.mutation.key.as_str()).collect();
        assert_eq!(keys, vec!["common.cancel", "common.save", "profile.title"]);
        assert_eq!(all[0].values.len(), 2);

        let query = MutationQuery {
            key_contains: Some("common".to_string()),
            languages: vec![
                LanguageFilter {
                    language_id: EN.to_string(),
                    search: "Sav".to_string(),
                },
                LanguageFilter {
                    language_id: FR.to_string(),
                    search: "Annul".to_string(),
                },
            ],
            ..Default::default()
        };
        let found = f
            .store
            .list_mutations(&f.project_id, &BranchRef::Main, &query)
            .unwrap();
        let keys: Vec<&str> = found.iter().map(|m| m.mutation.key.as_str()).collect();
        assert_eq!(keys, vec!["common.cancel", "common.save"]);

        // substring match is case-sensitive
        let query = MutationQuery {
            key_contains: Some("COMMON".to_string()),
            ..Default::default()
        };
        assert!(f
            .store
            .list_mutations(&f.project_id, &BranchRef::Main, &query)
            .unwrap()
            .is_empty());

        let query = MutationQuery {
            limit: 1,
            ..Default::default()
        };
        assert_eq!(
            f.store
                .list_mutations(&f.project_id, &BranchRef::Main, &query)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_delete_branch_cascades_mutations() {
        let f = fixture();
        f.store
            .fork_branch(&branch(&f, "b1", "feature"), &BranchRef::Main, &|rows, _| Ok(rows))
            .unwrap();
        let m = mutation(&f, "m1", BranchRef::Explicit("b1".into()), "k", &[(EN, "v")]);
        f.store.create_mutation(&m).unwrap();

        assert!(f.store.delete_branch("b1").unwrap());
        assert!(f.store.get_mutation("m1").unwrap().is_none());
        assert!(f.store.get_mutation_value("m1-lang-en").unwrap().is_none());
    }

    #[test]
    fn test_value_timestamps_round_trip() {
        let f = fixture();
        let mut m = mutation(&f, "m1", BranchRef::Main, "k", &[(EN, "v")]);
        let past = Utc::now() - Duration::days(3);
        m.values[0].updated_at = past;
        f.store.create_mutation(&m).unwrap();

        let stored = f.store.get_mutation_value("m1-lang-en").unwrap().unwrap();
        assert_eq!(stored.updated_at.timestamp(), past.timestamp());
    }

    #[test]
    fn test_locked_branch_rejects_writes_in_storage() {
        let f = fixture();
        f.store
            .fork_branch(&branch(&f, "b1", "release"), &BranchRef::Main, &|rows, _| Ok(rows))
            .unwrap();
        let on_branch = mutation(&f, "m1", BranchRef::Explicit("b1".into()), "k", &[(EN, "v")]);
        f.store.create_mutation(&on_branch).unwrap();
        f.store.set_branch_locked("b1", true).unwrap();

        let locked = |result: Result<()>| matches!(result, Err(Error::Forbidden(Denial::Locked)));

        let another = mutation(&f, "m2", BranchRef::Explicit("b1".into()), "k2", &[]);
        assert!(locked(f.store.create_mutation(&another)));
        assert!(f.store.get_mutation("m2").unwrap().is_none());

        let mut renamed = on_branch.mutation.clone();
        renamed.key = "renamed".to_string();
        assert!(locked(f.store.update_mutation(&renamed)));

        let mut value = on_branch.values[0].clone();
        value.value = "changed".to_string();
        assert!(locked(f.store.update_mutation_value(&value)));

        let mut french = on_branch.values[0].clone();
        french.id = "m1-lang-fr".to_string();
        french.language_id = FR.to_string();
        assert!(locked(f.store.create_mutation_value(&french)));

        assert!(matches!(
            f.store.delete_mutation("m1"),
            Err(Error::Forbidden(Denial::Locked))
        ));
        assert_eq!(f.store.get_mutation_value("m1-lang-en").unwrap().unwrap().value, "v");

        // main is never locked
        f.store
            .create_mutation(&mutation(&f, "m3", BranchRef::Main, "k", &[(EN, "v")]))
            .unwrap();

        f.store.set_branch_locked("b1", false).unwrap();
        f.store.update_mutation(&renamed).unwrap();
        f.store.update_mutation_value(&value).unwrap();
    }

    #[test]
    fn test_write_into_deleted_branch_is_not_found() {
        let f = fixture();
        f.store
            .fork_branch(&branch(&f, "b1", "gone"), &BranchRef::Main, &|rows, _| Ok(rows))
            .unwrap();
        assert!(f.store.delete_branch("b1").unwrap());

        let orphan = mutation(&f, "m1", BranchRef::Explicit("b1".into()), "k", &[(EN, "v")]);
        let result = f.store.create_mutation(&orphan);
        assert!(matches!(result, Err(Error::NotFound("branch"))));
    }

    #[test]
    fn test_fork_reads_languages_in_transaction() {
        let f = fixture();
        f.store
            .create_language(&Language {
                id: "lang-de".to_string(),
                project_id: f.project_id.clone(),
                name: "de".to_string(),
                created_at: Utc::now(),
            })
            .unwrap();
        f.store
            .create_mutation(&mutation(&f, "m1", BranchRef::Main, "k", &[("lang-de", "Hallo")]))
            .unwrap();

        let copied = f
            .store
            .fork_branch(&branch(&f, "b1", "feature"), &BranchRef::Main, &|rows, languages| {
                assert_eq!(languages.len(), 3);
                assert!(languages.contains("lang-de"));
                crate::branching::copy_mutations(rows, "b1", languages, Utc::now())
            })
            .unwrap();
        assert_eq!(copied, 1);

        let forked = f
            .store
            .list_mutations(&f.project_id, &BranchRef::Explicit("b1".into()), &MutationQuery::default())
            .unwrap();
        assert_eq!(forked[0].values[0].language_id, "lang-de");
        assert_eq!(forked[0].values[0].value, "Hallo");
    }

    #[test]
    fn test_token_lookup_collision() {
        let f = fixture();
        let token = |id: &str| Token {
            id: id.to_string(),
            token_hash: "hash".to_string(),
            token_lookup: "lookup12".to_string(),
            user_id: f.user_id.clone(),
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };

        f.store.create_token(&token("token-1")).unwrap();
        let result = f.store.create_token(&token("token-2"));
        assert!(matches!(result, Err(Error::TokenLookupCollision)));
    }
}
