//! Transform application passes.
//!
//! Each pass is a pure function from the current member files to new file
//! bytes; [`crate::package::Package`] decides where those bytes go.

pub mod decl;
pub mod dedup;
pub mod format;
pub mod import;

pub use decl::{apply_decl, DeclChange, DeclRequest};
pub use dedup::dedup_imports;
pub use format::{format_source, FormatError, FormatterConfig};
pub use import::insert_import;

use serde::Serialize;
use std::collections::BTreeSet;

/// What one transform did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    /// New text appended to `file`
    Inserted { file: String },
    /// Old declaration removed from `from`, new text appended to `file`
    Replaced { from: String, file: String },
    /// Nothing to do
    Unchanged,
    /// A whole-file pass changed these files
    Rewritten { files: Vec<String> },
}

/// Outcome of one transform in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub index: usize,
    pub kind: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Result of [`crate::package::Package::apply_transforms`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub transforms: Vec<TransformReport>,
    /// Member files written through to the output layer
    pub written: BTreeSet<String>,
}

impl ApplyReport {
    /// Number of transforms that changed something.
    pub fn changed(&self) -> usize {
        self.transforms
            .iter()
            .filter(|t| t.outcome != Outcome::Unchanged)
            .count()
    }
}
