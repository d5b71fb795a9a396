//! Package orchestrator over an input and an output layer.
//!
//! A [`Package`] is one directory of Go files seen through two layers: the
//! read-only input (the original tree) and the writable output (the live
//! tree, or a [`crate::layer::MemLayer`] for dry runs). A file present in
//! the output shadows the input file of the same name entirely.

use crate::apply::{
    apply_decl, dedup_imports, format_source, insert_import, ApplyReport, DeclRequest,
    FormatError, Outcome, TransformReport,
};
use crate::edit::EditError;
use crate::index::{DeclIdentity, DeclIndex, Found};
use crate::layer::{Layer, LayerError, DEFAULT_MODE};
use crate::naming::{is_package_ident, lower_for_type};
use crate::safety::{join, validate_relative, SafetyError};
use crate::source::SourceFile;
use crate::transform::Transform;
use crate::ts::TreeSitterError;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("output layer cannot create files and directories")]
    Capability,

    #[error("names {requested:?} do not cover existing group {existing:?}")]
    AmbiguousGroup {
        requested: Vec<String>,
        existing: Vec<String>,
    },

    #[error("multiple package names found: {names:?}")]
    AmbiguousPackageName { names: Vec<String> },

    #[error("derived package name {name:?} is not valid")]
    InvalidPackageName { name: String },

    #[error("{name:?} is not a bare .go file name")]
    InvalidFileName { name: String },

    #[error("{file} has no package clause")]
    NoPackageClause { file: String },

    #[error(transparent)]
    Syntax(#[from] TreeSitterError),

    #[error(transparent)]
    Layer(#[from] LayerError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("transform #{index} ({kind}{}) failed: {source}", .filename.as_deref().map(|f| format!(" on {f}")).unwrap_or_default())]
    Transform {
        index: usize,
        kind: &'static str,
        filename: Option<String>,
        #[source]
        source: Box<PackageError>,
    },
}

impl PackageError {
    /// The error underneath any [`PackageError::Transform`] wrapping.
    pub fn root(&self) -> &PackageError {
        match self {
            PackageError::Transform { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result of a declaration lookup; a miss is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    /// Up to three close names, best first
    NotFound { suggestions: Vec<String> },
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// A declaration located by [`Package::find_type`] or [`Package::find_function`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclInfo {
    /// Member file holding the declaration
    pub filename: String,
    /// Name it was found under
    pub name: String,
    /// Byte span of the declaration in `file_bytes`
    pub span: Range<usize>,
    /// Start of its doc comment
    pub doc_start: Option<usize>,
    /// Full contents of the file
    pub file_bytes: Vec<u8>,
}

/// Type lookups return the same shape as any other declaration lookup.
pub type TypeInfo = DeclInfo;

impl DeclInfo {
    fn from_found(found: Found<'_>, name: &str) -> Self {
        Self {
            filename: found.filename().to_string(),
            name: name.to_string(),
            span: found.decl.span.clone(),
            doc_start: found.decl.doc_start,
            file_bytes: found.file.bytes().to_vec(),
        }
    }

    /// Source of the declaration itself.
    pub fn source(&self) -> &[u8] {
        &self.file_bytes[self.span.clone()]
    }

    /// Source of the doc comment and declaration.
    pub fn source_with_doc(&self) -> &[u8] {
        &self.file_bytes[self.doc_start.unwrap_or(self.span.start)..self.span.end]
    }
}

const SUGGESTIONS: usize = 3;

/// One package directory across an input and an output layer.
#[derive(Debug)]
pub struct Package {
    input: Arc<dyn Layer>,
    output: Arc<dyn Layer>,
    module_path: String,
    sub_dir: String,
    local_name: String,
    files: BTreeMap<String, SourceFile>,
}

impl Package {
    /// Bind a package to its layers.
    ///
    /// `module_path` is the `module` line of go.mod; `sub_dir` is where the
    /// package lives inside both layers (`""` for the layer root). Fails
    /// with [`PackageError::Capability`] when `output` cannot be written.
    pub fn new(
        input: Arc<dyn Layer>,
        output: Arc<dyn Layer>,
        module_path: impl Into<String>,
        sub_dir: impl Into<String>,
    ) -> Result<Self, PackageError> {
        let sub_dir = sub_dir.into();
        validate_relative(&sub_dir)?;
        if output.writer().is_none() {
            return Err(PackageError::Capability);
        }
        Ok(Self {
            input,
            output,
            module_path: module_path.into(),
            sub_dir,
            local_name: String::new(),
            files: BTreeMap::new(),
        })
    }

    /// Directory of the package inside the layers.
    pub fn sub_dir(&self) -> &str {
        &self.sub_dir
    }

    /// Module path from go.mod.
    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    /// Package name from the member files, or derived when there are none.
    ///
    /// Empty until [`Package::load`] has run.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Member file names, sorted.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn file(&self, name: &str) -> Option<&SourceFile> {
        self.files.get(name)
    }

    fn path_of(&self, name: &str) -> String {
        join(&self.sub_dir, name)
    }

    fn member_names(&self) -> Result<BTreeSet<String>, PackageError> {
        let mut names = BTreeSet::new();
        for layer in [&self.output, &self.input] {
            for entry in layer.read_dir(&self.sub_dir)? {
                if !entry.is_dir && entry.name.ends_with(".go") {
                    names.insert(entry.name);
                }
            }
        }
        Ok(names)
    }

    fn read_member(&self, name: &str) -> Result<Option<Vec<u8>>, PackageError> {
        let path = self.path_of(name);
        match self.output.read(&path)? {
            Some(bytes) => Ok(Some(bytes)),
            None => Ok(self.input.read(&path)?),
        }
    }

    /// Re-read and re-parse every member file and re-derive the package name.
    pub fn load(&mut self) -> Result<(), PackageError> {
        let mut files = BTreeMap::new();
        let mut declared: Vec<String> = Vec::new();

        for name in self.member_names()? {
            let Some(bytes) = self.read_member(&name)? else {
                continue;
            };
            let file = SourceFile::parse(name.clone(), bytes)?;
            let package = file
                .package_name()
                .ok_or_else(|| PackageError::NoPackageClause { file: name.clone() })?;
            if !declared.iter().any(|d| d == package) {
                declared.push(package.to_string());
            }
            files.insert(name, file);
        }

        self.local_name = self.derive_local_name(&declared)?;
        self.files = files;

        debug!(
            sub_dir = %self.sub_dir,
            package = %self.local_name,
            files = self.files.len(),
            "loaded package"
        );
        Ok(())
    }

    fn derive_local_name(&self, declared: &[String]) -> Result<String, PackageError> {
        let name = match declared {
            [] => {
                let tail = self.sub_dir.trim_end_matches('/').rsplit('/').next().unwrap_or("");
                let tail = tail.replace('-', "");
                if tail.is_empty() || tail == "." {
                    self.module_path
                        .trim_end_matches('/')
                        .rsplit('/')
                        .next()
                        .unwrap_or("")
                        .to_string()
                } else {
                    tail
                }
            }
            [single] => single.clone(),
            many => {
                let mut non_test = many.iter().filter(|n| !n.ends_with("_test"));
                match (non_test.next(), non_test.next()) {
                    (Some(name), None) => name.clone(),
                    (None, _) => String::new(),
                    (Some(_), Some(_)) => {
                        return Err(PackageError::AmbiguousPackageName {
                            names: many.to_vec(),
                        })
                    }
                }
            }
        };

        if !is_package_ident(&name) {
            return Err(PackageError::InvalidPackageName { name });
        }
        Ok(name)
    }

    /// Apply transforms in the order given, writing through to the output layer.
    ///
    /// Loads once, then every write updates the in-memory file and is
    /// reparsed, so later transforms see earlier ones. Not transactional: on
    /// error, writes made by earlier transforms stay in place.
    pub fn apply_transforms(
        &mut self,
        transforms: impl IntoIterator<Item = Transform>,
    ) -> Result<ApplyReport, PackageError> {
        self.load()?;

        let mut report = ApplyReport::default();
        for (index, transform) in transforms.into_iter().enumerate() {
            let outcome = self
                .apply_loaded(&transform, &mut report.written)
                .map_err(|source| PackageError::Transform {
                    index,
                    kind: transform.kind(),
                    filename: transform.filename().map(str::to_string),
                    source: Box::new(source),
                })?;
            report.transforms.push(TransformReport {
                index,
                kind: transform.kind(),
                outcome,
            });
        }
        Ok(report)
    }

    /// Load, then apply a single transform.
    pub fn apply_transform(&mut self, transform: &Transform) -> Result<Outcome, PackageError> {
        self.load()?;
        let mut written = BTreeSet::new();
        self.apply_loaded(transform, &mut written)
    }

    fn apply_loaded(
        &mut self,
        transform: &Transform,
        written: &mut BTreeSet<String>,
    ) -> Result<Outcome, PackageError> {
        debug!(kind = transform.kind(), file = ?transform.filename(), "applying transform");
        if let Some(name) = transform.filename() {
            check_file_name(name)?;
        }

        match transform {
            Transform::Import(t) => {
                let updated = match self.files.get(&t.filename) {
                    Some(file) => insert_import(file, t.alias.as_deref(), &t.path)?,
                    None => {
                        let fresh = SourceFile::parse(t.filename.clone(), self.header())?;
                        insert_import(&fresh, t.alias.as_deref(), &t.path)?
                    }
                };
                self.write_member(&t.filename, updated, written)?;
                Ok(Outcome::Inserted {
                    file: t.filename.clone(),
                })
            }
            Transform::Function(t) => {
                self.apply_declaration(transform, &t.filename, &t.text, t.replace, written)
            }
            Transform::Const(t) => {
                self.apply_declaration(transform, &t.filename, &t.text, t.replace, written)
            }
            Transform::Var(t) => {
                self.apply_declaration(transform, &t.filename, &t.text, t.replace, written)
            }
            Transform::Type(t) => {
                self.apply_declaration(transform, &t.filename, &t.text, t.replace, written)
            }
            Transform::DedupImports(t) => {
                let mut changed = Vec::new();
                for name in self.selected(t.filenames.as_deref()) {
                    let Some(file) = self.files.get(&name) else {
                        continue;
                    };
                    if let Some(updated) = dedup_imports(file)? {
                        self.write_member(&name, updated, written)?;
                        changed.push(name);
                    }
                }
                Ok(rewritten(changed))
            }
            Transform::Format(t) => {
                let mut changed = Vec::new();
                for name in self.selected(t.filenames.as_deref()) {
                    let Some(file) = self.files.get(&name) else {
                        continue;
                    };
                    if let Some(updated) = format_source(&t.formatter, &name, file.bytes())? {
                        self.write_member(&name, updated, written)?;
                        changed.push(name);
                    }
                }
                Ok(rewritten(changed))
            }
        }
    }

    fn apply_declaration(
        &mut self,
        transform: &Transform,
        filename: &str,
        text: &str,
        replace: bool,
        written: &mut BTreeSet<String>,
    ) -> Result<Outcome, PackageError> {
        let Some(identity) = transform.identity() else {
            return Ok(Outcome::Unchanged);
        };

        let header = self.header();
        let change = {
            let target = self
                .files
                .get(filename)
                .map_or(header.as_slice(), |f| f.bytes());
            let index = DeclIndex::new(self.files.values());
            let request = DeclRequest {
                identity: &identity,
                filename,
                text,
                replace,
            };
            apply_decl(&index, &request, target)?
        };

        for (name, bytes) in change.writes {
            self.write_member(&name, bytes, written)?;
        }
        Ok(change.outcome)
    }

    /// Bytes a new member file starts with.
    fn header(&self) -> Vec<u8> {
        format!("package {}\n\n", self.local_name).into_bytes()
    }

    fn selected(&self, filenames: Option<&[String]>) -> Vec<String> {
        match filenames {
            Some(names) => {
                let wanted: BTreeSet<&str> = names.iter().map(String::as_str).collect();
                self.file_names()
                    .filter(|name| wanted.contains(name))
                    .map(str::to_string)
                    .collect()
            }
            None => self.file_names().map(str::to_string).collect(),
        }
    }

    /// Write a member file through to the output layer and reparse it.
    fn write_member(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
        written: &mut BTreeSet<String>,
    ) -> Result<(), PackageError> {
        validate_relative(name)?;
        let path = self.path_of(name);
        let mode = match self.output.mode(&path)? {
            Some(mode) => mode,
            None => self.input.mode(&path)?.unwrap_or(DEFAULT_MODE),
        };

        let writer = self.output.writer().ok_or(PackageError::Capability)?;
        if !self.sub_dir.is_empty() && self.sub_dir != "." {
            writer.create_dir_all(&self.sub_dir)?;
        }
        writer.write_file(&path, &bytes, mode)?;
        info!(file = %path, bytes = bytes.len(), "wrote");

        written.insert(name.to_string());
        let file = SourceFile::parse(name.to_string(), bytes)?;
        self.files.insert(name.to_string(), file);
        Ok(())
    }

    /// Find a type declaration by exact name.
    pub fn find_type(&mut self, name: &str) -> Result<Lookup<TypeInfo>, PackageError> {
        self.load()?;
        Ok(self.lookup_type(|candidate| candidate == name, name))
    }

    /// Find a type by name ignoring case and `-`/`_` separators, so
    /// `store-item` finds `StoreItem`.
    pub fn find_type_loose(&mut self, name: &str) -> Result<Lookup<TypeInfo>, PackageError> {
        self.load()?;
        let wanted = loose(name);
        Ok(self.lookup_type(|candidate| loose(candidate) == wanted, name))
    }

    fn lookup_type(&self, pred: impl Fn(&str) -> bool, wanted: &str) -> Lookup<TypeInfo> {
        let index = DeclIndex::new(self.files.values());
        match index.find_type_by(pred) {
            Some((found, name)) => Lookup::Found(DeclInfo::from_found(found, name)),
            None => Lookup::NotFound {
                suggestions: index.suggest("type", wanted, SUGGESTIONS),
            },
        }
    }

    /// Find a function (`receiver == ""`) or method (`"T"` / `"*T"`).
    pub fn find_function(
        &mut self,
        receiver: &str,
        name: &str,
    ) -> Result<Lookup<DeclInfo>, PackageError> {
        self.load()?;
        let index = DeclIndex::new(self.files.values());
        let identity = DeclIdentity::function(receiver, name);
        Ok(match index.find(&identity) {
            Some(found) => Lookup::Found(DeclInfo::from_found(found, name)),
            None => Lookup::NotFound {
                suggestions: index.suggest("func", name, SUGGESTIONS),
            },
        })
    }
}

fn rewritten(files: Vec<String>) -> Outcome {
    if files.is_empty() {
        Outcome::Unchanged
    } else {
        Outcome::Rewritten { files }
    }
}

/// Transform targets name a file directly inside the package directory.
fn check_file_name(name: &str) -> Result<(), PackageError> {
    validate_relative(name)?;
    if name.contains('/') || !name.ends_with(".go") || name == ".go" {
        return Err(PackageError::InvalidFileName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn loose(name: &str) -> String {
    lower_for_type(name, "").replace(['-', '_'], "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{MemLayer, ReadOnly};
    use crate::transform::{AddConst, AddFunction, Import};

    fn package(input: MemLayer, output: Arc<MemLayer>, sub_dir: &str) -> Package {
        Package::new(
            Arc::new(ReadOnly(input)),
            output,
            "example.com/app",
            sub_dir,
        )
        .unwrap()
    }

    #[test]
    fn output_layer_must_be_writable() {
        let err = Package::new(
            Arc::new(MemLayer::new()),
            Arc::new(ReadOnly(MemLayer::new())),
            "example.com/app",
            "",
        )
        .unwrap_err();
        assert!(matches!(err, PackageError::Capability));
    }

    #[test]
    fn local_name_derivation() {
        let out = Arc::new(MemLayer::new());

        let mut p = package(MemLayer::new(), out.clone(), "internal/my-store");
        p.load().unwrap();
        assert_eq!(p.local_name(), "mystore");

        let mut p = package(MemLayer::new(), out.clone(), "");
        p.load().unwrap();
        assert_eq!(p.local_name(), "app");

        let input = MemLayer::new()
            .with_file("a.go", "package store\n")
            .with_file("a_test.go", "package store_test\n");
        let mut p = package(input, out.clone(), "");
        p.load().unwrap();
        assert_eq!(p.local_name(), "store");

        let input = MemLayer::new()
            .with_file("a.go", "package one\n")
            .with_file("b.go", "package two\n");
        let mut p = package(input, out, "");
        assert!(matches!(
            p.load(),
            Err(PackageError::AmbiguousPackageName { .. })
        ));
    }

    #[test]
    fn invalid_derived_name() {
        let mut p = Package::new(
            Arc::new(MemLayer::new()),
            Arc::new(MemLayer::new()),
            "example.com/my_app",
            "",
        )
        .unwrap();
        assert!(matches!(
            p.load(),
            Err(PackageError::InvalidPackageName { .. })
        ));
    }

    #[test]
    fn output_shadows_input() {
        let input = MemLayer::new().with_file("pkg/a.go", "package pkg\n\nfunc Old() {}\n");
        let output = Arc::new(MemLayer::new().with_file("pkg/a.go", "package pkg\n\nfunc New() {}\n"));
        let mut p = package(input, output, "pkg");

        assert!(p.find_function("", "New").unwrap().is_found());
        assert!(!p.find_function("", "Old").unwrap().is_found());
    }

    #[test]
    fn replace_moves_function_between_files() {
        let input = MemLayer::new().with_file("a.go", "package test1\nfunc A() error { return nil }\n");
        let output = Arc::new(MemLayer::new());
        let mut p = package(input, output.clone(), "");

        let report = p
            .apply_transforms([Transform::Function(AddFunction {
                filename: "b.go".into(),
                name: "A".into(),
                receiver: String::new(),
                text: "func A() (err error) { return }".into(),
                replace: true,
            })])
            .unwrap();

        assert_eq!(
            report.transforms[0].outcome,
            Outcome::Replaced {
                from: "a.go".into(),
                file: "b.go".into()
            }
        );
        assert_eq!(output.get_string("a.go").as_deref(), Some("package test1\n\n"));
        assert_eq!(
            output.get_string("b.go").as_deref(),
            Some("package test1\n\nfunc A() (err error) { return }\n")
        );
    }

    #[test]
    fn later_transforms_see_earlier_writes() {
        let output = Arc::new(MemLayer::new());
        let mut p = package(MemLayer::new(), output.clone(), "store");

        let report = p
            .apply_transforms([
                Transform::Import(Import {
                    filename: "store.go".into(),
                    alias: None,
                    path: "io".into(),
                }),
                Transform::Const(AddConst {
                    filename: "store.go".into(),
                    names: vec!["x".into()],
                    text: "const x = 1".into(),
                    replace: false,
                }),
                Transform::Const(AddConst {
                    filename: "store.go".into(),
                    names: vec!["x".into()],
                    text: "const x = 2".into(),
                    replace: false,
                }),
            ])
            .unwrap();

        assert_eq!(report.changed(), 2);
        assert_eq!(report.transforms[2].outcome, Outcome::Unchanged);
        assert_eq!(
            output.get_string("store/store.go").as_deref(),
            Some("package store\n\nimport \"io\"\n\n\nconst x = 1\n")
        );
    }

    #[test]
    fn failing_transform_is_named() {
        let input = MemLayer::new().with_file("a.go", "package a\n\nconst (\n\tx = 1\n\ty = 2\n)\n");
        let mut p = package(input, Arc::new(MemLayer::new()), "");

        let err = p
            .apply_transforms([Transform::Const(AddConst {
                filename: "a.go".into(),
                names: vec!["x".into()],
                text: "const x = 3".into(),
                replace: true,
            })])
            .unwrap_err();

        match &err {
            PackageError::Transform {
                index,
                kind,
                filename,
                ..
            } => {
                assert_eq!(*index, 0);
                assert_eq!(*kind, "const");
                assert_eq!(filename.as_deref(), Some("a.go"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.root(), PackageError::AmbiguousGroup { .. }));
    }

    #[test]
    fn find_type_variants() {
        let input = MemLayer::new().with_file(
            "a.go",
            "package a\n\n// StoreItem is stored.\ntype StoreItem struct{}\n",
        );
        let mut p = package(input, Arc::new(MemLayer::new()), "");

        let info = p.find_type("StoreItem").unwrap().found().unwrap();
        assert_eq!(info.filename, "a.go");
        assert_eq!(info.source(), b"type StoreItem struct{}");
        assert_eq!(
            info.source_with_doc(),
            b"// StoreItem is stored.\ntype StoreItem struct{}"
        );

        assert!(p.find_type_loose("store-item").unwrap().is_found());
        assert!(p.find_type_loose("storeitem").unwrap().is_found());

        match p.find_type("StoreIten").unwrap() {
            Lookup::NotFound { suggestions } => assert_eq!(suggestions, vec!["StoreItem"]),
            Lookup::Found(info) => panic!("unexpected match: {info:?}"),
        }
    }
}
