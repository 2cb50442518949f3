//! Parsed question-file metadata.
//!
//! Transient: lives for one batch, drives reconciliation, and maps a newly
//! created assignment back to the file that must be renamed.

use crate::model::assignment::{Assignment, AssignmentDraft, AssignmentId, AssignmentType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frontmatter {
    /// Decoded from the `_qid<N>` filename marker; absent for new files.
    pub id: Option<AssignmentId>,
    /// Declared tags, deduplicated, in declaration order.
    pub tags: Vec<String>,
    pub assignment_type: AssignmentType,
    pub available_points: i64,
    pub available_seconds: Option<i64>,
    /// Name of the directory holding the file.
    pub section_title: String,
    /// Path as given by the caller.
    pub original_file_path: String,
    /// `original_file_path` without the qid marker.
    pub base_file_path: String,
}

impl Frontmatter {
    /// Draft for a new assignment built from this file.
    pub fn to_draft(&self) -> AssignmentDraft {
        AssignmentDraft {
            base_file_path: self.base_file_path.clone(),
            assignment_type: self.assignment_type,
            available_points: self.available_points,
            available_seconds: self.available_seconds,
        }
    }

    /// Whether `assignment` already stores everything this file declares.
    ///
    /// The id comparison is redundant when `assignment` was looked up by
    /// `self.id`; it is kept so the check stays correct for any caller.
    pub fn equal_persistent_attrs(&self, assignment: &Assignment) -> bool {
        self.id == Some(assignment.id)
            && self.base_file_path == assignment.base_file_path
            && self.assignment_type == assignment.assignment_type
            && self.available_points == assignment.available_points
            && self.available_seconds == assignment.available_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::Frontmatter;
    use crate::model::assignment::{Assignment, AssignmentType};

    fn frontmatter() -> Frontmatter {
        Frontmatter {
            id: Some(7),
            tags: vec!["rust".to_string()],
            assignment_type: AssignmentType::Open,
            available_points: 2,
            available_seconds: Some(60),
            section_title: "Ownership".to_string(),
            original_file_path: "bank/Ownership/borrow_qid7.md".to_string(),
            base_file_path: "bank/Ownership/borrow.md".to_string(),
        }
    }

    fn stored(fm: &Frontmatter, id: i64) -> Assignment {
        let draft = fm.to_draft();
        Assignment {
            id,
            base_file_path: draft.base_file_path,
            assignment_type: draft.assignment_type,
            available_points: draft.available_points,
            available_seconds: draft.available_seconds,
        }
    }

    #[test]
    fn persistent_attrs_compare_base_path_not_original_path() {
        let fm = frontmatter();
        let mut stored = stored(&fm, 7);
        assert!(fm.equal_persistent_attrs(&stored));

        stored.assignment_type = AssignmentType::Coding;
        assert!(!fm.equal_persistent_attrs(&stored));
    }

    #[test]
    fn scoring_change_counts_as_changed() {
        let fm = frontmatter();
        let stored = Assignment {
            available_points: 5,
            ..stored(&fm, 7)
        };
        assert!(!fm.equal_persistent_attrs(&stored));
    }
}
