//! declpatch: declaration-level patching of Go packages
//!
//! Generators render Go source as text; declpatch merges that text into an
//! existing package one declaration at a time. A rendered snippet is
//! decomposed into [`Transform`]s (imports, functions and methods,
//! `const`/`var` groups, types), and a [`Package`] applies them: a
//! declaration that already exists is kept or replaced in place, a missing
//! one is appended to the requested file, repeated imports are removed and
//! the result is piped through `gofmt`.
//!
//! # Architecture
//!
//! Every change compiles down to the [`Edit`] primitive, a verified
//! byte-span splice. Declarations are located with tree-sitter, so the
//! bytes outside the spliced ranges, comments and blank lines included,
//! are never touched.
//!
//! A package is read through two [`Layer`]s: an input tree and an output
//! tree that shadows it file by file. All writes go to the output, which
//! makes a dry run a matter of passing a [`MemLayer`].
//!
//! # Example
//!
//! ```no_run
//! use declpatch::{parse_snippet, DirLayer, Package, ReadOnly};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = DirLayer::open("/path/to/module")?;
//! let mut package = Package::new(
//!     Arc::new(ReadOnly(root.clone())),
//!     Arc::new(root),
//!     "example.com/app",
//!     "internal/store",
//! )?;
//!
//! let transforms = parse_snippet(
//!     "store.go",
//!     "import \"database/sql\"\n\nfunc (s *Store) Close() error { return s.db.Close() }\n",
//! )?;
//! let report = package.apply_transforms(transforms)?;
//! println!("{} transform(s) changed the package", report.changed());
//! # Ok(())
//! # }
//! ```

pub mod apply;
pub mod config;
pub mod edit;
pub mod index;
pub mod layer;
pub mod naming;
pub mod package;
pub mod pool;
pub mod safety;
pub mod snippet;
pub mod source;
pub mod transform;
pub mod ts;

// Re-exports
pub use apply::{ApplyReport, FormatError, FormatterConfig, Outcome, TransformReport};
pub use config::{load_from_path, load_from_str, load_plan, ConfigError, PatchConfig};
pub use edit::{Edit, EditError, EditVerification};
pub use index::{DeclIdentity, DeclIndex};
pub use layer::{DirLayer, Layer, LayerError, LayerWriter, MemLayer, ReadOnly, DEFAULT_MODE};
pub use naming::{dir_has_suffix, dir_resolve_to, lower_for_type, NamingError};
pub use package::{DeclInfo, Lookup, Package, PackageError, TypeInfo};
pub use safety::{RootGuard, SafetyError};
pub use snippet::{parse_snippet, SnippetError};
pub use source::SourceFile;
pub use transform::{
    AddConst, AddFunction, AddType, AddVar, DedupImports, Format, Import, Phase, Transform,
    Transformers,
};
pub use ts::{SyntaxError, TreeSitterError};
