//! Per-batch copy-on-write state.
//!
//! # Responsibility
//! - Hold the pending generation of every tag touched by the batch.
//! - Own the arena of assignments created by the batch until commit.
//!
//! # Invariants
//! - At most one pending generation per tag per batch.
//! - A pending generation is a shallow copy: same titles, same references.
//! - The state lives for one batch only and is consumed by the committer.

use crate::model::assessment::{Assessment, AssessmentKey, Section};
use crate::model::assignment::{AssignmentDraft, AssignmentRef, PendingAssignmentId};
use crate::repo::assessment_repo::AssessmentStore;
use crate::service::error::{InvariantViolation, UpdateError};
use log::debug;
use std::collections::BTreeMap;

/// New generation for one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGeneration {
    pub assessment: Assessment,
    /// Latest generation this one replaces; flipped to not-latest on commit.
    pub supersedes: Option<AssessmentKey>,
}

/// Assignment created by the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    pub draft: AssignmentDraft,
    /// File to rename once the generated id is known.
    pub original_file_path: String,
}

/// Copy-on-write memo map plus new-assignment arena for one batch.
#[derive(Debug)]
pub struct PendingBatch {
    git_commit_hash: String,
    generations: BTreeMap<String, PendingGeneration>,
    retired: BTreeMap<String, AssessmentKey>,
    new_assignments: Vec<NewAssignment>,
}

impl PendingBatch {
    pub fn new(git_commit_hash: impl Into<String>) -> Self {
        Self {
            git_commit_hash: git_commit_hash.into(),
            generations: BTreeMap::new(),
            retired: BTreeMap::new(),
            new_assignments: Vec::new(),
        }
    }

    /// Starts an empty latest generation for a tag that has none.
    pub fn create_empty(&mut self, tag: &str) -> Result<&mut Assessment, InvariantViolation> {
        if self.generations.contains_key(tag) {
            return Err(InvariantViolation::DuplicateGeneration(tag.to_string()));
        }
        let key = AssessmentKey::new(tag, self.git_commit_hash.as_str());
        let generation = self
            .generations
            .entry(tag.to_string())
            .or_insert(PendingGeneration {
                assessment: Assessment::new_latest(key),
                supersedes: None,
            });
        Ok(&mut generation.assessment)
    }

    /// Records that the latest generation `key` is retired without replacement.
    pub fn retire(&mut self, key: AssessmentKey) {
        self.retired.insert(key.tag.clone(), key);
    }

    pub fn is_retired(&self, tag: &str) -> bool {
        self.retired.contains_key(tag)
    }

    /// Returns the pending generation for `source`'s tag, forking `source`
    /// on first use.
    pub fn fork_from(&mut self, source: &Assessment) -> Result<&mut Assessment, InvariantViolation> {
        let tag = source.tag();
        if self.is_retired(tag) {
            return Err(InvariantViolation::TagRetired(tag.to_string()));
        }
        if !self.generations.contains_key(tag) {
            if !source.is_latest() {
                return Err(InvariantViolation::ForkFromHistorical(source.key.clone()));
            }
            debug!(
                "event=fork module=batch status=ok tag={} from={} to={}",
                tag, source.key.git_commit_hash, self.git_commit_hash
            );
            self.generations.insert(
                tag.to_string(),
                PendingGeneration {
                    assessment: source.fork(&self.git_commit_hash),
                    supersedes: Some(source.key.clone()),
                },
            );
        }
        self.generations
            .get_mut(tag)
            .map(|generation| &mut generation.assessment)
            .ok_or_else(|| InvariantViolation::MissingLatestAssessment(tag.to_string()))
    }

    /// Fetch-or-fork by tag, loading the latest generation from `store` when
    /// the batch has not touched the tag yet.
    pub fn fetch_or_fork<S: AssessmentStore>(
        &mut self,
        store: &S,
        tag: &str,
    ) -> Result<&mut Assessment, UpdateError> {
        if self.is_retired(tag) {
            return Err(InvariantViolation::TagRetired(tag.to_string()).into());
        }
        if !self.generations.contains_key(tag) {
            let source = store
                .latest_assessment(tag)?
                .ok_or_else(|| InvariantViolation::MissingLatestAssessment(tag.to_string()))?;
            self.fork_from(&source)?;
        }
        self.generations
            .get_mut(tag)
            .map(|generation| &mut generation.assessment)
            .ok_or_else(|| InvariantViolation::MissingLatestAssessment(tag.to_string()).into())
    }

    /// Adds an assignment to the arena and returns its batch-local reference.
    pub fn add_assignment(
        &mut self,
        draft: AssignmentDraft,
        original_file_path: impl Into<String>,
    ) -> AssignmentRef {
        let pending = PendingAssignmentId(self.new_assignments.len());
        self.new_assignments.push(NewAssignment {
            draft,
            original_file_path: original_file_path.into(),
        });
        AssignmentRef::Pending(pending)
    }

    pub fn generations(&self) -> impl Iterator<Item = &PendingGeneration> {
        self.generations.values()
    }

    /// Hands the accumulated state to the committer.
    pub fn into_parts(
        self,
    ) -> (
        Vec<PendingGeneration>,
        Vec<AssessmentKey>,
        Vec<NewAssignment>,
    ) {
        (
            self.generations.into_values().collect(),
            self.retired.into_values().collect(),
            self.new_assignments,
        )
    }
}

/// Inserts `assignment` into the section titled `title`, creating the
/// section when missing. Inserting an already present reference is a no-op.
pub fn insert_into_section(
    assessment: &mut Assessment,
    title: &str,
    assignment: AssignmentRef,
) -> Result<(), InvariantViolation> {
    match assessment.section_indices(title).as_slice() {
        [] => {
            let mut section = Section::new(title);
            section.assignments.push(assignment);
            assessment.sections.push(section);
        }
        [index] => {
            let section = &mut assessment.sections[*index];
            if !section.contains(assignment) {
                section.assignments.push(assignment);
            }
        }
        _ => {
            return Err(InvariantViolation::DuplicateSectionTitle {
                tag: assessment.tag().to_string(),
                title: title.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{insert_into_section, PendingBatch};
    use crate::model::assessment::{Assessment, AssessmentKey, Section};
    use crate::model::assignment::{AssignmentDraft, AssignmentRef, AssignmentType};
    use crate::service::error::InvariantViolation;

    fn latest(tag: &str, hash: &str) -> Assessment {
        let mut section = Section::new("intro");
        section.assignments.push(AssignmentRef::Stored(1));
        Assessment {
            key: AssessmentKey::new(tag, hash),
            latest: Some(true),
            sections: vec![section],
        }
    }

    fn draft() -> AssignmentDraft {
        AssignmentDraft {
            base_file_path: "bank/intro/q.md".to_string(),
            assignment_type: AssignmentType::Open,
            available_points: 1,
            available_seconds: None,
        }
    }

    #[test]
    fn fork_happens_once_per_tag() {
        let mut batch = PendingBatch::new("c1");
        let source = latest("rust", "c0");

        batch.fork_from(&source).unwrap().sections[0]
            .assignments
            .push(AssignmentRef::Stored(2));
        let again = batch.fork_from(&source).unwrap();
        assert_eq!(again.sections[0].assignments.len(), 2);

        assert_eq!(batch.generations().count(), 1);
        let (generations, _, _) = batch.into_parts();
        assert_eq!(generations[0].assessment.key, AssessmentKey::new("rust", "c1"));
        assert_eq!(generations[0].supersedes, Some(AssessmentKey::new("rust", "c0")));
        // the source object itself is untouched
        assert_eq!(source.sections[0].assignments.len(), 1);
    }

    #[test]
    fn retired_tags_cannot_be_forked() {
        let mut batch = PendingBatch::new("c1");
        batch.retire(AssessmentKey::new("rust", "c0"));
        let err = batch.fork_from(&latest("rust", "c0")).unwrap_err();
        assert_eq!(err, InvariantViolation::TagRetired("rust".to_string()));
    }

    #[test]
    fn historical_generations_cannot_be_forked() {
        let mut batch = PendingBatch::new("c1");
        let mut source = latest("rust", "c0");
        source.latest = Some(false);
        assert!(matches!(
            batch.fork_from(&source),
            Err(InvariantViolation::ForkFromHistorical(_))
        ));
    }

    #[test]
    fn create_empty_rejects_second_generation() {
        let mut batch = PendingBatch::new("c1");
        batch.create_empty("sql").unwrap();
        assert!(matches!(
            batch.create_empty("sql"),
            Err(InvariantViolation::DuplicateGeneration(_))
        ));
    }

    #[test]
    fn arena_hands_out_sequential_pending_refs() {
        let mut batch = PendingBatch::new("c1");
        let first = batch.add_assignment(draft(), "bank/intro/q.md");
        let second = batch.add_assignment(draft(), "bank/intro/r.md");
        assert_ne!(first, second);
        assert_eq!(first.stored_id(), None);
        let (_, _, new_assignments) = batch.into_parts();
        assert_eq!(new_assignments.len(), 2);
        assert_eq!(new_assignments[1].original_file_path, "bank/intro/r.md");
    }

    #[test]
    fn insert_creates_section_and_rejects_duplicate_titles() {
        let mut assessment = latest("rust", "c0");
        insert_into_section(&mut assessment, "loops", AssignmentRef::Stored(5)).unwrap();
        insert_into_section(&mut assessment, "loops", AssignmentRef::Stored(5)).unwrap();
        assert_eq!(assessment.section_indices("loops").len(), 1);
        assert_eq!(assessment.assignment_count(), 2);

        assessment.sections.push(Section::new("loops"));
        let err =
            insert_into_section(&mut assessment, "loops", AssignmentRef::Stored(6)).unwrap_err();
        assert!(matches!(err, InvariantViolation::DuplicateSectionTitle { .. }));
    }
}
