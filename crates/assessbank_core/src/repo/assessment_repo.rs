//! Assessment store contract and SQLite implementation.
//!
//! # Responsibility
//! - Load assessment generations with their ordered sections and items.
//! - Persist new assignments and new generations, retire superseded ones.
//! - Rewrite commit hashes in bulk.
//!
//! # Invariants
//! - `persist_assessment` only accepts resolved (`Stored`) references.
//! - At most one `is_latest = 1` row per tag, guarded by a partial unique
//!   index and re-checked by `flush`.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::assessment::{Assessment, AssessmentKey, Section};
use crate::model::assignment::{
    Assignment, AssignmentDraft, AssignmentId, AssignmentRef, AssignmentType,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const ASSESSMENT_SELECT_SQL: &str = "SELECT
    assessment_id,
    tag,
    git_commit_hash,
    is_latest
FROM assessments";

const ASSIGNMENT_SELECT_SQL: &str = "SELECT
    assignment_id,
    base_file_path,
    assignment_type,
    available_points,
    available_seconds
FROM assignments";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Retire target does not exist.
    AssessmentNotFound(AssessmentKey),
    /// A pending reference reached the store without being resolved.
    UnresolvedAssignmentRef(AssessmentKey),
    /// Writing this generation would break uniqueness of (tag, hash) or of
    /// the latest generation per tag.
    GenerationConflict(AssessmentKey),
    /// Tags with more than one latest generation found during flush.
    LatestConflict(Vec<String>),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "assessment store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "assessment store requires table `{table}`")
            }
            Self::AssessmentNotFound(key) => write!(f, "assessment not found: {key}"),
            Self::UnresolvedAssignmentRef(key) => write!(
                f,
                "assessment {key} still references an assignment without a stored id"
            ),
            Self::GenerationConflict(key) => write!(
                f,
                "assessment {key} conflicts with an existing generation or latest assessment"
            ),
            Self::LatestConflict(tags) => write!(
                f,
                "more than one latest assessment for tags: {}",
                tags.join(", ")
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted assessment data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Operations the reconciliation engine requires from persistence.
pub trait AssessmentStore {
    /// All assessments with `latest = Some(true)`, ordered by tag.
    fn latest_assessments(&self) -> StoreResult<Vec<Assessment>>;
    /// The latest assessment for `tag`, if any.
    fn latest_assessment(&self, tag: &str) -> StoreResult<Option<Assessment>>;
    /// Latest assessments holding any of `ids` in any section.
    fn latest_assessments_referencing(&self, ids: &[AssignmentId])
        -> StoreResult<Vec<Assessment>>;
    /// Assignments for the given ids; missing ids are simply absent.
    fn assignments_by_ids(&self, ids: &[AssignmentId]) -> StoreResult<Vec<Assignment>>;
    /// Every generation (latest or not) holding `id`.
    fn assessments_referencing(&self, id: AssignmentId) -> StoreResult<Vec<Assessment>>;
    /// Distinct tags of latest assessments holding `id`.
    fn tags_of_latest_referencing(&self, id: AssignmentId) -> StoreResult<Vec<String>>;
    /// Inserts a new assignment and returns its generated id.
    fn persist_assignment(&self, draft: &AssignmentDraft) -> StoreResult<AssignmentId>;
    /// Inserts a new generation with its sections.
    fn persist_assessment(&self, assessment: &Assessment) -> StoreResult<()>;
    /// Flips an existing generation to `latest = Some(false)`.
    fn retire_assessment(&self, key: &AssessmentKey) -> StoreResult<()>;
    /// Verifies pending writes before the surrounding transaction commits.
    fn flush(&self) -> StoreResult<()>;
    /// Replaces commit hash `old` with `new` on every assessment; returns
    /// the number of rows touched.
    fn rewrite_commit_hash(&self, old: &str, new: &str) -> StoreResult<usize>;
    /// Removes every assessment, section and assignment row.
    fn clear_all(&self) -> StoreResult<()>;
}

/// SQLite-backed assessment store.
///
/// Construct it over a `Transaction` (which derefs to `Connection`) so that
/// a whole batch shares one commit boundary.
pub struct SqliteAssessmentStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAssessmentStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Every generation ordered by insertion, history included.
    pub fn all_assessments(&self) -> StoreResult<Vec<Assessment>> {
        self.load_assessments(
            &format!("{ASSESSMENT_SELECT_SQL} ORDER BY assessment_id ASC;"),
            Vec::new(),
        )
    }

    /// Every stored assignment ordered by id.
    pub fn all_assignments(&self) -> StoreResult<Vec<Assignment>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ASSIGNMENT_SELECT_SQL} ORDER BY assignment_id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
    }

    fn load_assessments(&self, sql: &str, bind_values: Vec<Value>) -> StoreResult<Vec<Assessment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut headers = Vec::new();
        while let Some(row) = rows.next()? {
            headers.push(parse_assessment_header(row)?);
        }

        let mut assessments = Vec::with_capacity(headers.len());
        for (assessment_id, key, latest) in headers {
            assessments.push(Assessment {
                key,
                latest,
                sections: load_sections(self.conn, assessment_id)?,
            });
        }
        Ok(assessments)
    }
}

impl AssessmentStore for SqliteAssessmentStore<'_> {
    fn latest_assessments(&self) -> StoreResult<Vec<Assessment>> {
        self.load_assessments(
            &format!("{ASSESSMENT_SELECT_SQL} WHERE is_latest = 1 ORDER BY tag ASC;"),
            Vec::new(),
        )
    }

    fn latest_assessment(&self, tag: &str) -> StoreResult<Option<Assessment>> {
        let mut found = self.load_assessments(
            &format!("{ASSESSMENT_SELECT_SQL} WHERE tag = ? AND is_latest = 1;"),
            vec![Value::Text(tag.to_string())],
        )?;
        if found.len() > 1 {
            return Err(StoreError::LatestConflict(vec![tag.to_string()]));
        }
        Ok(found.pop())
    }

    fn latest_assessments_referencing(
        &self,
        ids: &[AssignmentId],
    ) -> StoreResult<Vec<Assessment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{ASSESSMENT_SELECT_SQL}
             WHERE is_latest = 1
               AND assessment_id IN (
                 SELECT s.assessment_id
                 FROM sections s
                 INNER JOIN section_assignments sa ON sa.section_id = s.section_id
                 WHERE sa.assignment_id IN ({})
               )
             ORDER BY tag ASC;",
            placeholders(ids.len())
        );
        self.load_assessments(&sql, ids.iter().map(|id| Value::Integer(*id)).collect())
    }

    fn assignments_by_ids(&self, ids: &[AssignmentId]) -> StoreResult<Vec<Assignment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{ASSIGNMENT_SELECT_SQL} WHERE assignment_id IN ({}) ORDER BY assignment_id ASC;",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(ids.iter()))?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
    }

    fn assessments_referencing(&self, id: AssignmentId) -> StoreResult<Vec<Assessment>> {
        self.load_assessments(
            &format!(
                "{ASSESSMENT_SELECT_SQL}
                 WHERE assessment_id IN (
                   SELECT s.assessment_id
                   FROM sections s
                   INNER JOIN section_assignments sa ON sa.section_id = s.section_id
                   WHERE sa.assignment_id = ?
                 )
                 ORDER BY assessment_id ASC;"
            ),
            vec![Value::Integer(id)],
        )
    }

    fn tags_of_latest_referencing(&self, id: AssignmentId) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT a.tag
             FROM assessments a
             INNER JOIN sections s ON s.assessment_id = a.assessment_id
             INNER JOIN section_assignments sa ON sa.section_id = s.section_id
             WHERE a.is_latest = 1
               AND sa.assignment_id = ?1
             ORDER BY a.tag ASC;",
        )?;
        let mut rows = stmt.query([id])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(row.get(0)?);
        }
        Ok(tags)
    }

    fn persist_assignment(&self, draft: &AssignmentDraft) -> StoreResult<AssignmentId> {
        self.conn.execute(
            "INSERT INTO assignments (
                base_file_path,
                assignment_type,
                available_points,
                available_seconds
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                draft.base_file_path.as_str(),
                draft.assignment_type.as_db_str(),
                draft.available_points,
                draft.available_seconds,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn persist_assessment(&self, assessment: &Assessment) -> StoreResult<()> {
        let inserted = self.conn.execute(
            "INSERT INTO assessments (tag, git_commit_hash, is_latest)
             VALUES (?1, ?2, ?3);",
            params![
                assessment.key.tag.as_str(),
                assessment.key.git_commit_hash.as_str(),
                latest_to_db(assessment.latest),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_constraint_violation(&err) => {
                return Err(StoreError::GenerationConflict(assessment.key.clone()));
            }
            Err(err) => return Err(err.into()),
        }
        let assessment_id = self.conn.last_insert_rowid();

        for (section_position, section) in assessment.sections.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO sections (assessment_id, title, position)
                 VALUES (?1, ?2, ?3);",
                params![assessment_id, section.title.as_str(), section_position as i64],
            )?;
            let section_id = self.conn.last_insert_rowid();

            for (position, assignment) in section.assignments.iter().enumerate() {
                let assignment_id = assignment
                    .stored_id()
                    .ok_or_else(|| StoreError::UnresolvedAssignmentRef(assessment.key.clone()))?;
                self.conn.execute(
                    "INSERT INTO section_assignments (section_id, position, assignment_id)
                     VALUES (?1, ?2, ?3);",
                    params![section_id, position as i64, assignment_id],
                )?;
            }
        }
        Ok(())
    }

    fn retire_assessment(&self, key: &AssessmentKey) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE assessments
             SET is_latest = 0
             WHERE tag = ?1
               AND git_commit_hash = ?2;",
            params![key.tag.as_str(), key.git_commit_hash.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::AssessmentNotFound(key.clone()));
        }
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        let mut stmt = self.conn.prepare("PRAGMA foreign_key_check;")?;
        let mut rows = stmt.query([])?;
        if let Some(row) = rows.next()? {
            let table: String = row.get(0)?;
            return Err(StoreError::InvalidData(format!(
                "foreign key violation in table `{table}`"
            )));
        }

        let mut stmt = self.conn.prepare(
            "SELECT tag
             FROM assessments
             WHERE is_latest = 1
             GROUP BY tag
             HAVING COUNT(*) > 1
             ORDER BY tag ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut conflicting = Vec::new();
        while let Some(row) = rows.next()? {
            conflicting.push(row.get(0)?);
        }
        if !conflicting.is_empty() {
            return Err(StoreError::LatestConflict(conflicting));
        }
        Ok(())
    }

    fn rewrite_commit_hash(&self, old: &str, new: &str) -> StoreResult<usize> {
        let changed = self.conn.execute(
            "UPDATE assessments
             SET git_commit_hash = ?2
             WHERE git_commit_hash = ?1;",
            params![old, new],
        );
        match changed {
            Ok(changed) => Ok(changed),
            Err(err) if is_constraint_violation(&err) => Err(StoreError::InvalidData(format!(
                "commit hash `{new}` already names a generation that `{old}` would collide with"
            ))),
            Err(err) => Err(err.into()),
        }
    }

    fn clear_all(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "DELETE FROM section_assignments;
             DELETE FROM sections;
             DELETE FROM assessments;
             DELETE FROM assignments;",
        )?;
        Ok(())
    }
}

fn load_sections(conn: &Connection, assessment_id: i64) -> StoreResult<Vec<Section>> {
    let mut stmt = conn.prepare(
        "SELECT section_id, title
         FROM sections
         WHERE assessment_id = ?1
         ORDER BY position ASC, section_id ASC;",
    )?;
    let mut rows = stmt.query([assessment_id])?;
    let mut headers: Vec<(i64, String)> = Vec::new();
    while let Some(row) = rows.next()? {
        headers.push((row.get(0)?, row.get(1)?));
    }

    let mut item_stmt = conn.prepare(
        "SELECT assignment_id
         FROM section_assignments
         WHERE section_id = ?1
         ORDER BY position ASC;",
    )?;
    let mut sections = Vec::with_capacity(headers.len());
    for (section_id, title) in headers {
        let mut item_rows = item_stmt.query([section_id])?;
        let mut assignments = Vec::new();
        while let Some(row) = item_rows.next()? {
            assignments.push(AssignmentRef::Stored(row.get(0)?));
        }
        sections.push(Section { title, assignments });
    }
    Ok(sections)
}

fn parse_assessment_header(row: &Row<'_>) -> StoreResult<(i64, AssessmentKey, Option<bool>)> {
    let latest = match row.get::<_, Option<i64>>("is_latest")? {
        None => None,
        Some(0) => Some(false),
        Some(1) => Some(true),
        Some(other) => {
            return Err(StoreError::InvalidData(format!(
                "invalid is_latest value `{other}` in assessments.is_latest"
            )));
        }
    };
    let key = AssessmentKey::new(
        row.get::<_, String>("tag")?,
        row.get::<_, String>("git_commit_hash")?,
    );
    Ok((row.get("assessment_id")?, key, latest))
}

fn parse_assignment_row(row: &Row<'_>) -> StoreResult<Assignment> {
    let type_text: String = row.get("assignment_type")?;
    let assignment_type = AssignmentType::from_db_str(&type_text).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "invalid assignment type `{type_text}` in assignments.assignment_type"
        ))
    })?;

    Ok(Assignment {
        id: row.get("assignment_id")?,
        base_file_path: row.get("base_file_path")?,
        assignment_type,
        available_points: row.get("available_points")?,
        available_seconds: row.get("available_seconds")?,
    })
}

fn latest_to_db(latest: Option<bool>) -> Option<i64> {
    latest.map(|value| if value { 1 } else { 0 })
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::ConstraintViolation
    )
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["assignments", "assessments", "sections", "section_assignments"] {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
