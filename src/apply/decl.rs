//! Insert-or-replace of functions, methods, const/var groups and types.

use crate::apply::Outcome;
use crate::edit::Edit;
use crate::index::{DeclIdentity, DeclIndex};
use crate::package::PackageError;
use tracing::debug;

/// A declaration transform reduced to what the applier needs.
#[derive(Debug, Clone, Copy)]
pub struct DeclRequest<'t> {
    pub identity: &'t DeclIdentity,
    pub filename: &'t str,
    pub text: &'t str,
    pub replace: bool,
}

/// New contents for the files a declaration transform touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclChange {
    pub outcome: Outcome,
    /// (member file, new bytes), the file losing a declaration first
    pub writes: Vec<(String, Vec<u8>)>,
}

impl DeclChange {
    fn unchanged() -> Self {
        Self {
            outcome: Outcome::Unchanged,
            writes: Vec::new(),
        }
    }
}

/// Decide keep / replace / insert for one declaration.
///
/// `target_bytes` is the current content of the request's file, or the
/// header a new file would start with.
pub fn apply_decl(
    index: &DeclIndex<'_>,
    request: &DeclRequest<'_>,
    target_bytes: &[u8],
) -> Result<DeclChange, PackageError> {
    let matches = index.find_all(request.identity);

    let Some(found) = matches.first().copied() else {
        debug!(identity = %request.identity, file = request.filename, "insert");
        return Ok(DeclChange {
            outcome: Outcome::Inserted {
                file: request.filename.to_string(),
            },
            writes: vec![(
                request.filename.to_string(),
                appended(target_bytes, request.text),
            )],
        });
    };

    if !request.replace {
        debug!(identity = %request.identity, file = found.filename(), "keep existing");
        return Ok(DeclChange::unchanged());
    }

    if let Some(requested) = group_names(request.identity) {
        if matches.len() > 1 {
            return Err(PackageError::AmbiguousGroup {
                requested: requested.to_vec(),
                existing: matches
                    .iter()
                    .flat_map(|m| m.names())
                    .map(str::to_string)
                    .collect(),
            });
        }
        let existing = found.names();
        if existing.iter().any(|name| !requested.iter().any(|r| r == name)) {
            return Err(PackageError::AmbiguousGroup {
                requested: requested.to_vec(),
                existing: existing.into_iter().map(str::to_string).collect(),
            });
        }
    }

    debug!(
        identity = %request.identity,
        from = found.filename(),
        file = request.filename,
        "replace"
    );

    let source = found.file.bytes();
    let without = Edit::delete(found.filename(), source, found.decl.removal_range())
        .apply_to(source)?;

    let from = found.filename().to_string();
    let writes = if from == request.filename {
        vec![(from.clone(), appended(&without, request.text))]
    } else {
        vec![
            (from.clone(), without),
            (
                request.filename.to_string(),
                appended(target_bytes, request.text),
            ),
        ]
    };

    Ok(DeclChange {
        outcome: Outcome::Replaced {
            from,
            file: request.filename.to_string(),
        },
        writes,
    })
}

/// Names of identities that replace whole groups.
///
/// Types join in only when the existing declaration turns out to be a
/// grouped `type ( ... )` block; see the subset check in [`apply_decl`].
fn group_names(identity: &DeclIdentity) -> Option<&[String]> {
    match identity {
        DeclIdentity::Const { names } | DeclIdentity::Var { names } => Some(names),
        DeclIdentity::Type { name } => Some(std::slice::from_ref(name)),
        DeclIdentity::Function { .. } => None,
    }
}

fn appended(base: &[u8], text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(base.len() + text.len() + 1);
    out.extend_from_slice(base);
    out.extend_from_slice(text.as_bytes());
    out.push(b'\n');
    out
}
