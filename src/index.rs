//! Declaration lookup across the member files of a package.

use crate::source::SourceFile;
use crate::ts::{DeclKind, Declaration};
use serde::Serialize;
use std::fmt;

/// The fields of a declaration that decide whether a transform matches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DeclIdentity {
    /// `receiver` is `""`, `"T"` or `"*T"`.
    Function { receiver: String, name: String },
    Const { names: Vec<String> },
    Var { names: Vec<String> },
    Type { name: String },
}

impl DeclIdentity {
    pub fn function(receiver: impl Into<String>, name: impl Into<String>) -> Self {
        DeclIdentity::Function {
            receiver: receiver.into(),
            name: name.into(),
        }
    }

    pub fn type_named(name: impl Into<String>) -> Self {
        DeclIdentity::Type { name: name.into() }
    }

    /// Whether `decl` has this identity.
    ///
    /// Grouped const/var declarations match when the name sets intersect;
    /// the subset check is the applier's job.
    pub fn matches(&self, decl: &Declaration) -> bool {
        match (self, &decl.kind) {
            (
                DeclIdentity::Function { receiver, name },
                DeclKind::Function {
                    name: existing,
                    receiver: existing_receiver,
                },
            ) => {
                name == existing
                    && existing_receiver.type_expr().as_deref() == Some(receiver.as_str())
            }
            (DeclIdentity::Const { names }, DeclKind::Const { names: existing })
            | (DeclIdentity::Var { names }, DeclKind::Var { names: existing }) => {
                names.iter().any(|n| existing.contains(n))
            }
            (DeclIdentity::Type { name }, DeclKind::Type { names }) => names.contains(name),
            _ => false,
        }
    }
}

impl fmt::Display for DeclIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclIdentity::Function { receiver, name } if receiver.is_empty() => {
                write!(f, "func {name}")
            }
            DeclIdentity::Function { receiver, name } => write!(f, "func ({receiver}) {name}"),
            DeclIdentity::Const { names } => write!(f, "const ({})", names.join(", ")),
            DeclIdentity::Var { names } => write!(f, "var ({})", names.join(", ")),
            DeclIdentity::Type { name } => write!(f, "type {name}"),
        }
    }
}

/// A declaration found in a member file.
#[derive(Debug, Clone, Copy)]
pub struct Found<'a> {
    pub file: &'a SourceFile,
    pub decl: &'a Declaration,
}

impl Found<'_> {
    pub fn filename(&self) -> &str {
        self.file.name()
    }

    /// Names bound by the matched declaration.
    pub fn names(&self) -> Vec<&str> {
        match &self.decl.kind {
            DeclKind::Function { name, .. } => vec![name.as_str()],
            DeclKind::Const { names } | DeclKind::Var { names } | DeclKind::Type { names } => {
                names.iter().map(String::as_str).collect()
            }
            DeclKind::Import { .. } => Vec::new(),
        }
    }
}

/// Linear-scan index over a package's files.
///
/// Files are scanned in the order given (the package passes them sorted by
/// name) and declarations in source order; the first match wins.
#[derive(Debug, Clone)]
pub struct DeclIndex<'a> {
    files: Vec<&'a SourceFile>,
}

impl<'a> DeclIndex<'a> {
    pub fn new(files: impl IntoIterator<Item = &'a SourceFile>) -> Self {
        Self {
            files: files.into_iter().collect(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = Found<'a>> + '_ {
        self.files.iter().copied().flat_map(|file: &'a SourceFile| {
            file.declarations()
                .iter()
                .map(move |decl| Found { file, decl })
        })
    }

    /// First declaration with this identity.
    pub fn find(&self, identity: &DeclIdentity) -> Option<Found<'a>> {
        self.iter().find(|found| identity.matches(found.decl))
    }

    /// Every declaration with this identity, in scan order.
    pub fn find_all(&self, identity: &DeclIdentity) -> Vec<Found<'a>> {
        self.iter()
            .filter(|found| identity.matches(found.decl))
            .collect()
    }

    /// Type declaration whose name satisfies `pred`.
    pub fn find_type_by(&self, pred: impl Fn(&str) -> bool) -> Option<(Found<'a>, &'a str)> {
        self.iter().find_map(|found| match &found.decl.kind {
            DeclKind::Type { names } => names
                .iter()
                .find(|name| pred(name))
                .map(|name| (found, name.as_str())),
            _ => None,
        })
    }

    /// Up to `limit` declared names of the given kind closest to `wanted`.
    ///
    /// `kind` is a [`DeclKind::label`]; ranking uses Jaro-Winkler similarity
    /// on lowercased names and drops anything below 0.7.
    pub fn suggest(&self, kind: &str, wanted: &str, limit: usize) -> Vec<String> {
        let wanted = wanted.to_lowercase();
        let mut scored: Vec<(f64, String)> = Vec::new();
        for found in self.iter().filter(|f| f.decl.kind.label() == kind) {
            for name in found.names() {
                if scored.iter().any(|(_, seen)| seen == name) {
                    continue;
                }
                let score = strsim::jaro_winkler(&wanted, &name.to_lowercase());
                if score >= 0.7 {
                    scored.push((score, name.to_string()));
                }
            }
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.into_iter().take(limit).map(|(_, name)| name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, source: &str) -> SourceFile {
        SourceFile::parse(name, source.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn method_identity_includes_receiver() {
        let a = file(
            "a.go",
            "package a\n\nfunc Close() {}\n\nfunc (s Store) Close() {}\n\nfunc (s *Store) Open() {}\n",
        );
        let index = DeclIndex::new([&a]);

        let plain = index.find(&DeclIdentity::function("", "Close")).unwrap();
        assert_eq!(&a.bytes()[plain.decl.span.clone()], b"func Close() {}");

        let value = index
            .find(&DeclIdentity::function("Store", "Close"))
            .unwrap();
        assert!(value.decl.span.start > plain.decl.span.start);

        assert!(index
            .find(&DeclIdentity::function("*Store", "Close"))
            .is_none());
        assert!(index
            .find(&DeclIdentity::function("*Store", "Open"))
            .is_some());
    }

    #[test]
    fn groups_match_on_intersection() {
        let a = file("a.go", "package a\n\nconst (\n\tx = 1\n\ty = 2\n)\n\nvar x = 3\n");
        let index = DeclIndex::new([&a]);

        let found = index
            .find(&DeclIdentity::Const {
                names: vec!["y".into(), "q".into()],
            })
            .unwrap();
        assert_eq!(found.names(), vec!["x", "y"]);

        let var = index
            .find(&DeclIdentity::Var {
                names: vec!["x".into()],
            })
            .unwrap();
        assert_eq!(var.decl.kind.label(), "var");
        assert!(index
            .find(&DeclIdentity::Const {
                names: vec!["q".into()]
            })
            .is_none());
    }

    #[test]
    fn first_file_wins() {
        let a = file("a.go", "package a\n\ntype T int\n");
        let b = file("b.go", "package a\n\ntype T string\n");
        let index = DeclIndex::new([&a, &b]);

        let found = index.find(&DeclIdentity::type_named("T")).unwrap();
        assert_eq!(found.filename(), "a.go");
        assert_eq!(index.find_all(&DeclIdentity::type_named("T")).len(), 2);
    }

    #[test]
    fn suggestions_are_ranked() {
        let a = file(
            "a.go",
            "package a\n\ntype StoreItem struct{}\n\ntype Store struct{}\n\ntype Unrelated int\n",
        );
        let index = DeclIndex::new([&a]);

        let suggestions = index.suggest("type", "StoreItm", 3);
        assert_eq!(suggestions.first().map(String::as_str), Some("StoreItem"));
        assert!(!suggestions.contains(&"Unrelated".to_string()));
    }

    #[test]
    fn identity_display() {
        assert_eq!(DeclIdentity::function("", "A").to_string(), "func A");
        assert_eq!(
            DeclIdentity::function("*S", "A").to_string(),
            "func (*S) A"
        );
        assert_eq!(
            DeclIdentity::Const {
                names: vec!["a".into(), "b".into()]
            }
            .to_string(),
            "const (a, b)"
        );
    }
}
