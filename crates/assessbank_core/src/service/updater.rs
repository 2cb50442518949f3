//! Reconciliation engine.
//!
//! # Responsibility
//! - Turn one batch of file changes (plus an optional config change) into a
//!   new generation of assessments.
//! - Run config sync, additions, deletions and modifications in that order,
//!   then commit, then rename files that gained an id.
//!
//! # Invariants
//! - The whole batch runs in one transaction; any error rolls it back.
//! - Every tag is forked at most once per batch.
//! - Stored assignments are never mutated; changed files get new ones and
//!   every latest generation holding the old one is forked to the new one.
//! - Files are renamed only after the transaction committed.

use crate::config::BankConfig;
use crate::db::begin_batch;
use crate::model::assignment::{AssignmentId, AssignmentRef};
use crate::model::frontmatter::Frontmatter;
use crate::parser::frontmatter::{FileParsingError, FrontmatterError, FrontmatterParser};
use crate::parser::qid;
use crate::repo::assessment_repo::{AssessmentStore, SqliteAssessmentStore};
use crate::service::batch::{insert_into_section, PendingBatch};
use crate::service::commit::{commit_batch, BatchOutcome};
use crate::service::error::{InvariantViolation, UpdateError};
use crate::service::rename::{rename_new_assignment_files, RenameReport};
use crate::service::scan::collect_question_files;
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Instant;

/// File-level changes for one batch, as paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub modified: Vec<String>,
    /// Re-sync assessments with the configured tag set.
    pub config_changed: bool,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.deleted.is_empty()
            && self.modified.is_empty()
            && !self.config_changed
    }
}

/// Parsed form of a [`ChangeSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedChanges {
    pub sync_config: bool,
    pub added: Vec<Frontmatter>,
    pub deleted_ids: Vec<AssignmentId>,
    pub modified: Vec<Frontmatter>,
}

/// Result of a committed batch plus the rename pass that followed it.
#[derive(Debug)]
pub struct UpdateReport {
    pub outcome: BatchOutcome,
    pub renames: RenameReport,
}

/// Reconciliation engine bound to one config snapshot and one commit hash.
pub struct AssessmentUpdater<'cfg> {
    config: &'cfg BankConfig,
    git_commit_hash: String,
}

impl<'cfg> AssessmentUpdater<'cfg> {
    pub fn new(config: &'cfg BankConfig, git_commit_hash: impl Into<String>) -> Self {
        Self {
            config,
            git_commit_hash: git_commit_hash.into(),
        }
    }

    pub fn git_commit_hash(&self) -> &str {
        &self.git_commit_hash
    }

    /// Parses added and modified files and decodes deleted ids.
    pub fn parse_changes(&self, changes: &ChangeSet) -> Result<ParsedChanges, UpdateError> {
        let parser = FrontmatterParser::new(self.config);
        let added = changes
            .added
            .iter()
            .map(|path| parser.parse_file(path))
            .collect::<Result<Vec<_>, _>>()?;
        let modified = changes
            .modified
            .iter()
            .map(|path| parser.parse_file(path))
            .collect::<Result<Vec<_>, _>>()?;
        let deleted_ids = changes
            .deleted
            .iter()
            .filter_map(|path| {
                let id = qid::decode(path);
                if id.is_none() {
                    debug!("event=decode_deleted module=updater status=skip path={path}");
                }
                id
            })
            .collect();

        Ok(ParsedChanges {
            sync_config: changes.config_changed,
            added,
            deleted_ids,
            modified,
        })
    }

    /// Applies `changes` to the store on `conn` in one transaction, then
    /// renames files of newly created assignments.
    pub fn update_assessments(
        &self,
        conn: &mut Connection,
        changes: &ChangeSet,
    ) -> Result<UpdateReport, UpdateError> {
        info!(
            "event=batch_start module=updater status=start commit={} added={} deleted={} modified={} config_changed={}",
            self.git_commit_hash,
            changes.added.len(),
            changes.deleted.len(),
            changes.modified.len(),
            changes.config_changed
        );
        let parsed = self.parse_changes(changes).inspect_err(|err| {
            error!("event=batch_parse module=updater status=error error={err}");
        })?;
        self.run_batch(conn, |store| self.reconcile(store, parsed))
    }

    /// Runs the four phases and the committer against `store`.
    ///
    /// Does not commit the surrounding transaction and does not rename files.
    pub fn reconcile<S: AssessmentStore>(
        &self,
        store: &S,
        changes: ParsedChanges,
    ) -> Result<BatchOutcome, UpdateError> {
        let mut batch = PendingBatch::new(self.git_commit_hash.as_str());
        if changes.sync_config {
            self.sync_config(store, &mut batch)?;
        }
        if !changes.added.is_empty() {
            self.add_assignments(store, &mut batch, &changes.added)?;
        }
        if !changes.deleted_ids.is_empty() {
            self.delete_assignments(store, &mut batch, &changes.deleted_ids)?;
        }
        if !changes.modified.is_empty() {
            self.modify_assignments(store, &mut batch, &changes.modified)?;
        }
        debug!(
            "event=reconcile module=updater status=ok commit={} pending_generations={}",
            self.git_commit_hash,
            batch.generations().count()
        );
        commit_batch(store, batch)
    }

    /// Rewrites this updater's commit hash to `new_hash` on every assessment.
    pub fn update_hash(&self, conn: &mut Connection, new_hash: &str) -> Result<usize, UpdateError> {
        let tx = begin_batch(conn)?;
        let changed = {
            let store = SqliteAssessmentStore::try_new(&tx)?;
            store.rewrite_commit_hash(&self.git_commit_hash, new_hash)?
        };
        tx.commit()?;
        info!(
            "event=rewrite_hash module=updater status=ok old={} new={} rows={}",
            self.git_commit_hash, new_hash, changed
        );
        Ok(changed)
    }

    /// Clears the store and rebuilds it from every question file under `root`.
    ///
    /// Existing qids are discarded: every file becomes a new assignment and
    /// is renamed to its freshly generated id.
    pub fn reset(&self, conn: &mut Connection, root: &Path) -> Result<UpdateReport, UpdateError> {
        let files = collect_question_files(root).map_err(|source| UpdateError::Scan {
            path: root.to_path_buf(),
            source,
        })?;
        info!(
            "event=reset_start module=updater status=start commit={} files={}",
            self.git_commit_hash,
            files.len()
        );

        let parser = FrontmatterParser::new(self.config);
        let mut added = Vec::with_capacity(files.len());
        for path in &files {
            let Some(path_text) = path.to_str() else {
                warn!(
                    "event=reset_scan module=updater status=skip reason=non_utf8_path path={}",
                    path.display()
                );
                continue;
            };
            let mut frontmatter = parser.parse_file(path_text)?;
            frontmatter.id = None;
            added.push(frontmatter);
        }

        let changes = ParsedChanges {
            sync_config: true,
            added,
            ..ParsedChanges::default()
        };
        self.run_batch(conn, |store| {
            store.clear_all()?;
            self.reconcile(store, changes)
        })
    }

    fn run_batch(
        &self,
        conn: &mut Connection,
        work: impl FnOnce(&SqliteAssessmentStore<'_>) -> Result<BatchOutcome, UpdateError>,
    ) -> Result<UpdateReport, UpdateError> {
        let started_at = Instant::now();
        let tx = begin_batch(conn)?;
        let result = SqliteAssessmentStore::try_new(&tx)
            .map_err(UpdateError::from)
            .and_then(|store| work(&store));

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    "event=batch_commit module=updater status=error commit={} duration_ms={} error={}",
                    self.git_commit_hash,
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };
        tx.commit()?;
        info!(
            "event=batch_commit module=updater status=ok commit={} duration_ms={} created={} retired={} new_assignments={}",
            self.git_commit_hash,
            started_at.elapsed().as_millis(),
            outcome.created.len(),
            outcome.retired.len(),
            outcome.new_assignment_ids.len()
        );

        let renames = rename_new_assignment_files(&outcome.renames);
        if !renames.is_clean() {
            warn!(
                "event=rename_pass module=updater status=partial failures={}",
                renames.failures.len()
            );
        }
        Ok(UpdateReport { outcome, renames })
    }

    fn sync_config<S: AssessmentStore>(
        &self,
        store: &S,
        batch: &mut PendingBatch,
    ) -> Result<(), UpdateError> {
        let current: BTreeMap<String, _> = store
            .latest_assessments()?
            .into_iter()
            .map(|assessment| (assessment.key.tag.clone(), assessment.key))
            .collect();
        let declared: BTreeSet<&str> = self
            .config
            .tag_options
            .iter()
            .map(String::as_str)
            .collect();

        for tag in declared.iter().filter(|tag| !current.contains_key(**tag)) {
            batch.create_empty(tag)?;
            info!("event=config_sync module=updater status=ok action=create tag={tag}");
        }

        // Retire targets are drawn from the latest rows themselves; a row
        // that disappears before commit fails there as `AssessmentNotFound`.
        for (tag, key) in current
            .into_iter()
            .filter(|(tag, _)| !declared.contains(tag.as_str()))
        {
            info!("event=config_sync module=updater status=ok action=retire tag={tag}");
            batch.retire(key);
        }
        Ok(())
    }

    fn add_assignments<S: AssessmentStore>(
        &self,
        store: &S,
        batch: &mut PendingBatch,
        frontmatters: &[Frontmatter],
    ) -> Result<(), UpdateError> {
        for frontmatter in frontmatters {
            if let Some(id) = frontmatter.id {
                return Err(FileParsingError::new(
                    frontmatter.original_file_path.as_str(),
                    FrontmatterError::UnexpectedQid(id),
                )
                .into());
            }

            if frontmatter.tags.is_empty() {
                warn!(
                    "event=add_assignment module=updater status=skip reason=no_tags path={}",
                    frontmatter.original_file_path
                );
                continue;
            }

            let new_ref =
                batch.add_assignment(frontmatter.to_draft(), frontmatter.original_file_path.as_str());
            for tag in &frontmatter.tags {
                let pending = batch.fetch_or_fork(store, tag)?;
                insert_into_section(pending, &frontmatter.section_title, new_ref)?;
            }
            debug!(
                "event=add_assignment module=updater status=ok path={} tags={}",
                frontmatter.original_file_path,
                frontmatter.tags.join(",")
            );
        }
        Ok(())
    }

    fn delete_assignments<S: AssessmentStore>(
        &self,
        store: &S,
        batch: &mut PendingBatch,
        ids: &[AssignmentId],
    ) -> Result<(), UpdateError> {
        for assessment in store.latest_assessments_referencing(ids)? {
            if batch.is_retired(assessment.tag()) {
                continue;
            }
            let pending = batch.fork_from(&assessment)?;
            for id in ids {
                let removed = pending.remove_everywhere(AssignmentRef::Stored(*id));
                if removed > 0 {
                    debug!(
                        "event=delete_assignment module=updater status=ok tag={} assignment_id={}",
                        assessment.tag(),
                        id
                    );
                }
            }
        }
        Ok(())
    }

    fn modify_assignments<S: AssessmentStore>(
        &self,
        store: &S,
        batch: &mut PendingBatch,
        frontmatters: &[Frontmatter],
    ) -> Result<(), UpdateError> {
        let ids = frontmatters
            .iter()
            .map(|frontmatter| {
                frontmatter.id.ok_or_else(|| {
                    InvariantViolation::ModifiedFileWithoutId(
                        frontmatter.original_file_path.clone(),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let existing: HashMap<AssignmentId, _> = store
            .assignments_by_ids(&ids)?
            .into_iter()
            .map(|assignment| (assignment.id, assignment))
            .collect();

        for (frontmatter, id) in frontmatters.iter().zip(ids) {
            let stored = existing
                .get(&id)
                .ok_or_else(|| InvariantViolation::MissingAssignment {
                    id,
                    path: frontmatter.original_file_path.clone(),
                })?;
            let old_ref = AssignmentRef::Stored(id);

            let current_ref = if frontmatter.equal_persistent_attrs(stored) {
                old_ref
            } else {
                let new_ref = batch
                    .add_assignment(frontmatter.to_draft(), frontmatter.original_file_path.as_str());
                self.replace_in_latest(store, batch, id, new_ref)?;
                new_ref
            };

            let existing_tags: BTreeSet<String> = store
                .tags_of_latest_referencing(id)?
                .into_iter()
                .filter(|tag| !batch.is_retired(tag))
                .collect();

            for tag in frontmatter
                .tags
                .iter()
                .filter(|tag| !existing_tags.contains(*tag))
            {
                let pending = batch.fetch_or_fork(store, tag)?;
                insert_into_section(pending, &frontmatter.section_title, current_ref)?;
            }

            for tag in existing_tags
                .iter()
                .filter(|tag| !frontmatter.tags.contains(*tag))
            {
                let pending = batch.fetch_or_fork(store, tag)?;
                pending.remove_everywhere(old_ref);
                if current_ref != old_ref {
                    pending.remove_everywhere(current_ref);
                }
            }

            debug!(
                "event=modify_assignment module=updater status=ok path={} assignment_id={} replaced={}",
                frontmatter.original_file_path,
                id,
                current_ref != old_ref
            );
        }
        Ok(())
    }

    /// Forks every latest generation holding `old_id` onto `new_ref`.
    fn replace_in_latest<S: AssessmentStore>(
        &self,
        store: &S,
        batch: &mut PendingBatch,
        old_id: AssignmentId,
        new_ref: AssignmentRef,
    ) -> Result<(), UpdateError> {
        for assessment in store.assessments_referencing(old_id)? {
            if !assessment.is_latest() || batch.is_retired(assessment.tag()) {
                continue;
            }
            let pending = batch.fork_from(&assessment)?;
            pending.replace_everywhere(AssignmentRef::Stored(old_id), new_ref);
        }
        Ok(())
    }
}
