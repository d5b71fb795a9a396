//! Transform values: one intended edit each.
//!
//! Transforms are plain data. They are built by hand, decomposed from a
//! rendered snippet by [`crate::snippet::parse_snippet`], or expanded from a
//! plan file, and consumed by [`crate::package::Package::apply_transforms`].

use crate::apply::format::FormatterConfig;
use crate::index::DeclIdentity;
use serde::{Deserialize, Serialize};

/// Ensure a package is imported, optionally under a local name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// File to write to
    pub filename: String,
    /// Local name: `_`, `.`, or an identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Import path
    pub path: String,
}

/// Add or replace a function or method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFunction {
    pub filename: String,
    pub name: String,
    /// `""`, `"T"` or `"*T"`
    #[serde(default)]
    pub receiver: String,
    /// Full declaration text including its doc comment
    pub text: String,
    #[serde(default)]
    pub replace: bool,
}

/// Add or replace a `const` declaration (single or grouped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddConst {
    pub filename: String,
    pub names: Vec<String>,
    pub text: String,
    #[serde(default)]
    pub replace: bool,
}

/// Add or replace a `var` declaration (single or grouped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddVar {
    pub filename: String,
    pub names: Vec<String>,
    pub text: String,
    #[serde(default)]
    pub replace: bool,
}

/// Add or replace a type declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddType {
    pub filename: String,
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub replace: bool,
}

/// Remove repeated import paths; `None` selects every member file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupImports {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filenames: Option<Vec<String>>,
}

/// Pipe files through the external formatter; `None` selects every member file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filenames: Option<Vec<String>>,
    #[serde(default)]
    pub formatter: FormatterConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Transform {
    Import(Import),
    Function(AddFunction),
    Const(AddConst),
    Var(AddVar),
    Type(AddType),
    DedupImports(DedupImports),
    Format(Format),
}

/// Ordering class of a transform.
///
/// Dedup has to see every insertion and formatting has to see the deduped
/// result, so a batch is only well ordered when phases never decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Edit,
    Dedup,
    Format,
}

impl Transform {
    pub fn kind(&self) -> &'static str {
        match self {
            Transform::Import(_) => "import",
            Transform::Function(_) => "function",
            Transform::Const(_) => "const",
            Transform::Var(_) => "var",
            Transform::Type(_) => "type",
            Transform::DedupImports(_) => "dedup-imports",
            Transform::Format(_) => "format",
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Transform::DedupImports(_) => Phase::Dedup,
            Transform::Format(_) => Phase::Format,
            _ => Phase::Edit,
        }
    }

    /// Target file of single-file transforms.
    pub fn filename(&self) -> Option<&str> {
        match self {
            Transform::Import(t) => Some(&t.filename),
            Transform::Function(t) => Some(&t.filename),
            Transform::Const(t) => Some(&t.filename),
            Transform::Var(t) => Some(&t.filename),
            Transform::Type(t) => Some(&t.filename),
            Transform::DedupImports(_) | Transform::Format(_) => None,
        }
    }

    /// Identity used to look for an existing declaration.
    pub fn identity(&self) -> Option<DeclIdentity> {
        match self {
            Transform::Function(t) => Some(DeclIdentity::function(&t.receiver, &t.name)),
            Transform::Const(t) => Some(DeclIdentity::Const {
                names: t.names.clone(),
            }),
            Transform::Var(t) => Some(DeclIdentity::Var {
                names: t.names.clone(),
            }),
            Transform::Type(t) => Some(DeclIdentity::type_named(&t.name)),
            _ => None,
        }
    }

    /// Set the target file of single-file transforms.
    pub fn set_filename(&mut self, filename: impl Into<String>) {
        let filename = filename.into();
        match self {
            Transform::Import(t) => t.filename = filename,
            Transform::Function(t) => t.filename = filename,
            Transform::Const(t) => t.filename = filename,
            Transform::Var(t) => t.filename = filename,
            Transform::Type(t) => t.filename = filename,
            Transform::DedupImports(_) | Transform::Format(_) => {}
        }
    }

    /// Set the replace flag of declaration transforms.
    pub fn set_replace(&mut self, replace: bool) {
        match self {
            Transform::Function(t) => t.replace = replace,
            Transform::Const(t) => t.replace = replace,
            Transform::Var(t) => t.replace = replace,
            Transform::Type(t) => t.replace = replace,
            _ => {}
        }
    }
}

macro_rules! impl_from {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Transform {
            fn from(t: $ty) -> Self {
                Transform::$variant(t)
            }
        })*
    };
}

impl_from!(
    Import => Import,
    AddFunction => Function,
    AddConst => Const,
    AddVar => Var,
    AddType => Type,
    DedupImports => DedupImports,
    Format => Format,
);

/// An ordered collection of transforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transformers {
    list: Vec<Transform>,
}

impl Transformers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every transform from `list`.
    pub fn add(&mut self, list: impl IntoIterator<Item = Transform>) -> &mut Self {
        self.list.extend(list);
        self
    }

    /// Append one transform.
    pub fn push(&mut self, transform: impl Into<Transform>) -> &mut Self {
        self.list.push(transform.into());
        self
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transform> {
        self.list.iter()
    }

    /// The transforms in insertion order.
    pub fn into_vec(self) -> Vec<Transform> {
        self.list
    }

    /// The transforms stably sorted by [`Phase`].
    pub fn into_phased(mut self) -> Vec<Transform> {
        self.list.sort_by_key(Transform::phase);
        self.list
    }
}

impl From<Vec<Transform>> for Transformers {
    fn from(list: Vec<Transform>) -> Self {
        Self { list }
    }
}

impl IntoIterator for Transformers {
    type Item = Transform;
    type IntoIter = std::vec::IntoIter<Transform>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.into_iter()
    }
}
