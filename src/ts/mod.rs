//! Tree-sitter integration for Go source files.
//!
//! This module provides CST-based parsing with byte-exact positions for
//! every top-level declaration, so edits can splice source text without
//! losing comments or formatting.

pub mod decl;
pub mod errors;
pub mod parser;

pub use decl::{
    extract, unquote, DeclKind, Declaration, FileDecls, ImportSpec, OtherNode, PackageClause,
    Receiver,
};
pub use errors::{SyntaxError, TreeSitterError};
pub use parser::{GoParser, LineIndex, ParsedSource};
