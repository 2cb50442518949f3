//! Question-file parsing: filename identifier codec and frontmatter parser.
//!
//! # Responsibility
//! - Map between assignment ids and `_qid<N>` filename markers.
//! - Turn raw question text into validated `Frontmatter`.

pub mod frontmatter;
pub mod qid;
