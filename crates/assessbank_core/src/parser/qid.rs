//! Filename identifier codec.
//!
//! A stored question file carries its assignment id in the file stem:
//! `topic/loops_qid42.md`. New files have no marker until the first
//! successful upload renames them.

use crate::model::assignment::AssignmentId;
use once_cell::sync::Lazy;
use regex::Regex;

static QID_STEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)_qid([0-9]+)$").expect("valid qid regex"));

/// Extracts the assignment id embedded in `path`, if any.
pub fn decode(path: &str) -> Option<AssignmentId> {
    let (_, stem, _) = split_path(path);
    let caps = QID_STEM_RE.captures(stem)?;
    caps.get(2)?.as_str().parse::<AssignmentId>().ok()
}

/// Builds the path that embeds `id` into `base_path`.
///
/// `base_path` is expected to be marker-free; an existing marker is replaced.
pub fn encode(base_path: &str, id: AssignmentId) -> String {
    let stripped = strip(base_path);
    let (dir, stem, ext) = split_path(&stripped);
    format!("{dir}{stem}_qid{id}{ext}")
}

/// Removes the `_qid<N>` marker from `path`; unmarked paths are returned as is.
pub fn strip(path: &str) -> String {
    let (dir, stem, ext) = split_path(path);
    match QID_STEM_RE.captures(stem).and_then(|caps| caps.get(1)) {
        Some(base) => format!("{dir}{}{ext}", base.as_str()),
        None => path.to_string(),
    }
}

/// Splits into `(directory prefix incl. separator, stem, extension incl. dot)`.
fn split_path(path: &str) -> (&str, &str, &str) {
    let name_start = path.rfind(['/', '\\']).map_or(0, |index| index + 1);
    let (dir, name) = path.split_at(name_start);
    match name.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, ext) = name.split_at(dot);
            (dir, stem, ext)
        }
        _ => (dir, name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, strip};

    #[test]
    fn decode_reads_marker_from_file_stem() {
        assert_eq!(decode("bank/Loops/file1_qid42.md"), Some(42));
        assert_eq!(decode("file1_qid7"), Some(7));
        assert_eq!(decode("bank/Loops/file1.md"), None);
        assert_eq!(decode("bank/dir_qid3/file1.md"), None);
        assert_eq!(decode("bank/file_qidx.md"), None);
    }

    #[test]
    fn encode_inserts_marker_before_extension() {
        assert_eq!(encode("bank/Loops/file1.md", 42), "bank/Loops/file1_qid42.md");
        assert_eq!(encode("file1", 3), "file1_qid3");
        assert_eq!(encode("a\\b\\c.md", 9), "a\\b\\c_qid9.md");
    }

    #[test]
    fn encode_replaces_stale_marker() {
        assert_eq!(encode("x/old_qid1.md", 2), "x/old_qid2.md");
    }

    #[test]
    fn encoded_path_decodes_to_same_id() {
        let encoded = encode("topic/question.v2.md", 1234);
        assert_eq!(decode(&encoded), Some(1234));
        assert_eq!(strip(&encoded), "topic/question.v2.md");
    }

    #[test]
    fn strip_leaves_unmarked_paths_alone() {
        assert_eq!(strip("topic/.hidden"), "topic/.hidden");
        assert_eq!(strip("topic/q_qid5.md"), "topic/q.md");
    }

    #[test]
    fn oversized_ids_are_not_decoded() {
        assert_eq!(decode("q_qid99999999999999999999999.md"), None);
    }
}
