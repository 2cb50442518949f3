//! Generation committer.
//!
//! Persists one batch's pending state through the store, inside the
//! caller's transaction:
//! 1. retire superseded and config-retired generations,
//! 2. insert new assignments and collect their generated ids,
//! 3. resolve batch-local references and insert the new generations,
//! 4. flush.
//!
//! Retiring first keeps the one-latest-per-tag index satisfied at every
//! statement.

use crate::model::assessment::AssessmentKey;
use crate::model::assignment::{AssignmentId, AssignmentRef};
use crate::repo::assessment_repo::{AssessmentStore, StoreError};
use crate::service::batch::PendingBatch;
use crate::service::error::UpdateError;
use crate::service::rename::PendingRename;
use log::info;

/// What a committed batch changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// New latest generations written by the batch.
    pub created: Vec<AssessmentKey>,
    /// Generations flipped to not-latest.
    pub retired: Vec<AssessmentKey>,
    /// Ids generated for assignments created by the batch, in creation order.
    pub new_assignment_ids: Vec<AssignmentId>,
    /// Files to rename once the transaction has committed.
    pub renames: Vec<PendingRename>,
}

/// Writes `batch` through `store`. Does not commit the transaction.
pub fn commit_batch<S: AssessmentStore>(
    store: &S,
    batch: PendingBatch,
) -> Result<BatchOutcome, UpdateError> {
    let (generations, config_retired, new_assignments) = batch.into_parts();
    let mut outcome = BatchOutcome::default();

    for key in config_retired
        .into_iter()
        .chain(generations.iter().filter_map(|g| g.supersedes.clone()))
    {
        store.retire_assessment(&key)?;
        outcome.retired.push(key);
    }

    for new_assignment in &new_assignments {
        let id = store.persist_assignment(&new_assignment.draft)?;
        outcome.new_assignment_ids.push(id);
    }

    for mut generation in generations {
        for section in &mut generation.assessment.sections {
            for assignment in &mut section.assignments {
                if let AssignmentRef::Pending(pending) = *assignment {
                    let id = outcome
                        .new_assignment_ids
                        .get(pending.0)
                        .copied()
                        .ok_or_else(|| {
                            StoreError::UnresolvedAssignmentRef(generation.assessment.key.clone())
                        })?;
                    *assignment = AssignmentRef::Stored(id);
                }
            }
        }
        store.persist_assessment(&generation.assessment)?;
        outcome.created.push(generation.assessment.key);
    }

    store.flush()?;

    outcome.renames = new_assignments
        .into_iter()
        .zip(outcome.new_assignment_ids.iter().copied())
        .map(|(new_assignment, assignment_id)| PendingRename {
            original_file_path: new_assignment.original_file_path,
            base_file_path: new_assignment.draft.base_file_path,
            assignment_id,
        })
        .collect();

    info!(
        "event=batch_flush module=commit status=ok created={} retired={} new_assignments={}",
        outcome.created.len(),
        outcome.retired.len(),
        outcome.new_assignment_ids.len()
    );
    Ok(outcome)
}
