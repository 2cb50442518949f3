//! Post-commit rename pass.
//!
//! # Responsibility
//! - Embed freshly generated assignment ids into question filenames.
//!
//! # Invariants
//! - Runs only after the batch transaction committed.
//! - Idempotent: files already carrying their target name are skipped.
//! - Never overwrites an existing file.
//! - Failures are reported and logged, never turned into a batch rollback:
//!   the store already holds the new generation, so a failed rename leaves
//!   a filename/store mismatch that has to be fixed by hand or by `reset`.

use crate::model::assignment::AssignmentId;
use crate::parser::qid;
use log::{info, warn};
use std::fmt::{Display, Formatter};
use std::path::Path;

/// One file that produced a new assignment in a committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRename {
    pub original_file_path: String,
    pub base_file_path: String,
    pub assignment_id: AssignmentId,
}

impl PendingRename {
    /// Path embedding the generated id.
    pub fn target_path(&self) -> String {
        qid::encode(&self.base_file_path, self.assignment_id)
    }
}

/// Rename that could not be applied.
#[derive(Debug)]
pub struct RenameFailure {
    pub from: String,
    pub to: String,
    pub error: std::io::Error,
}

impl Display for RenameFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "could not rename `{}` to `{}`: {}",
            self.from, self.to, self.error
        )
    }
}

#[derive(Debug, Default)]
pub struct RenameReport {
    /// `(from, to)` pairs applied by this pass.
    pub renamed: Vec<(String, String)>,
    /// Entries already carrying their target name.
    pub skipped: usize,
    pub failures: Vec<RenameFailure>,
}

impl RenameReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Renames every listed file to embed its new assignment id.
pub fn rename_new_assignment_files(renames: &[PendingRename]) -> RenameReport {
    let mut report = RenameReport::default();

    for rename in renames {
        let from = rename.original_file_path.clone();
        let to = rename.target_path();
        let from_path = Path::new(&from);
        let to_path = Path::new(&to);

        if from == to || (!from_path.exists() && to_path.exists()) {
            report.skipped += 1;
            continue;
        }

        let outcome = if to_path.exists() {
            Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "target file already exists",
            ))
        } else {
            std::fs::rename(from_path, to_path)
        };

        match outcome {
            Ok(()) => {
                info!(
                    "event=rename_file module=rename status=ok assignment_id={} from={} to={}",
                    rename.assignment_id, from, to
                );
                report.renamed.push((from, to));
            }
            Err(error) => {
                warn!(
                    "event=rename_file module=rename status=error assignment_id={} from={} to={} error={}",
                    rename.assignment_id, from, to, error
                );
                report.failures.push(RenameFailure { from, to, error });
            }
        }
    }

    report
}
