//! Import deduplication.

use crate::edit::{Edit, EditError};
use crate::source::SourceFile;
use crate::ts::DeclKind;
use std::collections::HashSet;

/// One import declaration and which of its lines survive.
struct ImportBlock<'f> {
    span: std::ops::Range<usize>,
    lines: Vec<(&'f std::ops::Range<usize>, bool)>,
}

impl ImportBlock<'_> {
    fn kept(&self) -> usize {
        self.lines.iter().filter(|(_, keep)| *keep).count()
    }
}

/// Drop every import line whose path already appeared earlier in the file.
///
/// Bytes between and around import lines are kept verbatim; a declaration
/// left with no lines is removed whole, parentheses included. Returns
/// `Ok(None)` when nothing was repeated.
pub fn dedup_imports(file: &SourceFile) -> Result<Option<Vec<u8>>, EditError> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut blocks = Vec::new();

    for decl in file.imports() {
        let DeclKind::Import { specs, .. } = &decl.kind else {
            continue;
        };
        let lines = specs
            .iter()
            .map(|spec| (&spec.span, seen.insert(spec.path.as_str())))
            .collect();
        blocks.push(ImportBlock {
            span: decl.span.clone(),
            lines,
        });
    }

    let bytes = file.bytes();
    let mut edits = Vec::new();
    for block in &blocks {
        if block.kept() == 0 {
            edits.push(Edit::delete(file.name(), bytes, block.span.clone()));
            continue;
        }
        for (span, keep) in &block.lines {
            if !keep {
                edits.push(Edit::delete(file.name(), bytes, (*span).clone()));
            }
        }
    }

    if edits.is_empty() {
        return Ok(None);
    }
    Edit::apply_all(bytes, edits).map(Some)
}
