//! Assessment (versioned group container) and section model.
//!
//! # Invariants
//! - `AssessmentKey` (tag + commit hash) identifies one generation.
//! - No two sections of one assessment share a title.
//! - Sections hold `AssignmentRef`s; copying a section never copies the
//!   referenced assignments.

use crate::model::assignment::{AssignmentId, AssignmentRef};
use std::fmt::{Display, Formatter};

/// Identity of one assessment generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssessmentKey {
    pub tag: String,
    pub git_commit_hash: String,
}

impl AssessmentKey {
    pub fn new(tag: impl Into<String>, git_commit_hash: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            git_commit_hash: git_commit_hash.into(),
        }
    }
}

impl Display for AssessmentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.tag, self.git_commit_hash)
    }
}

/// Named partition of assignments within one assessment generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub assignments: Vec<AssignmentRef>,
}

impl Section {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            assignments: Vec::new(),
        }
    }

    pub fn contains(&self, assignment: AssignmentRef) -> bool {
        self.assignments.contains(&assignment)
    }

    pub fn contains_stored(&self, id: AssignmentId) -> bool {
        self.contains(AssignmentRef::Stored(id))
    }

    /// Removes every occurrence of `assignment`; returns how many were removed.
    pub fn remove(&mut self, assignment: AssignmentRef) -> usize {
        let before = self.assignments.len();
        self.assignments.retain(|current| *current != assignment);
        before - self.assignments.len()
    }

    /// Replaces every occurrence of `old` with `new`; returns the count.
    pub fn replace(&mut self, old: AssignmentRef, new: AssignmentRef) -> usize {
        let mut replaced = 0;
        for current in &mut self.assignments {
            if *current == old {
                *current = new;
                replaced += 1;
            }
        }
        replaced
    }
}

/// One versioned snapshot of a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub key: AssessmentKey,
    /// `Some(true)` active, `Some(false)` superseded, `None` never activated.
    pub latest: Option<bool>,
    pub sections: Vec<Section>,
}

impl Assessment {
    /// Empty generation marked latest, used when a tag is first declared.
    pub fn new_latest(key: AssessmentKey) -> Self {
        Self {
            key,
            latest: Some(true),
            sections: Vec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.key.tag
    }

    pub fn is_latest(&self) -> bool {
        self.latest == Some(true)
    }

    /// Shallow copy under a new commit hash: same titles, same references.
    pub fn fork(&self, git_commit_hash: &str) -> Self {
        Self {
            key: AssessmentKey::new(self.key.tag.clone(), git_commit_hash),
            latest: Some(true),
            sections: self
                .sections
                .iter()
                .map(|section| Section {
                    title: section.title.clone(),
                    assignments: section.assignments.clone(),
                })
                .collect(),
        }
    }

    pub fn references_stored(&self, id: AssignmentId) -> bool {
        self.sections
            .iter()
            .any(|section| section.contains_stored(id))
    }

    pub fn assignment_count(&self) -> usize {
        self.sections
            .iter()
            .map(|section| section.assignments.len())
            .sum()
    }

    /// Removes `assignment` from every section; returns how many were removed.
    pub fn remove_everywhere(&mut self, assignment: AssignmentRef) -> usize {
        self.sections
            .iter_mut()
            .map(|section| section.remove(assignment))
            .sum()
    }

    /// Replaces `old` with `new` in every section; returns the count.
    pub fn replace_everywhere(&mut self, old: AssignmentRef, new: AssignmentRef) -> usize {
        self.sections
            .iter_mut()
            .map(|section| section.replace(old, new))
            .sum()
    }

    /// Indices of sections titled `title`.
    pub fn section_indices(&self, title: &str) -> Vec<usize> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, section)| section.title == title)
            .map(|(index, _)| index)
            .collect()
    }
}
