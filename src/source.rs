//! One parsed member file of a package.

use crate::pool::with_parser;
use crate::ts::{extract, DeclKind, Declaration, FileDecls, LineIndex, TreeSitterError};
use std::ops::Range;

/// Raw bytes of a Go file plus its declaration list and line table.
///
/// Offsets in the declarations are only valid for the bytes they were
/// parsed from; any edit produces a new `SourceFile` via [`SourceFile::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    name: String,
    bytes: Vec<u8>,
    decls: FileDecls,
    lines: LineIndex,
}

impl SourceFile {
    /// Parse `bytes`, failing with a positioned syntax error on invalid source.
    pub fn parse(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, TreeSitterError> {
        let name = name.into();
        let (decls, lines) = with_parser(|parser| {
            let parsed = parser.parse_with_source(&bytes)?;
            if let Some(err) = parsed.first_syntax_error(&name) {
                return Err(TreeSitterError::Syntax(err));
            }
            Ok((extract(&parsed), parsed.lines.clone()))
        })??;

        tracing::trace!(file = %name, decls = decls.decls.len(), "parsed");

        Ok(Self {
            name,
            bytes,
            decls,
            lines,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }

    /// Top-level declarations in source order.
    pub fn declarations(&self) -> &[Declaration] {
        &self.decls.decls
    }

    /// Name from the `package` clause.
    pub fn package_name(&self) -> Option<&str> {
        self.decls.package.as_ref().map(|p| p.name.as_str())
    }

    /// Offset just past the package clause line (before its newline).
    pub fn package_line_end(&self) -> Option<usize> {
        let clause = self.decls.package.as_ref()?;
        Some(self.lines.line_end(clause.span.end))
    }

    /// Import declarations in source order.
    pub fn imports(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations()
            .iter()
            .filter(|d| matches!(d.kind, DeclKind::Import { .. }))
    }

    /// Source text of a byte range, lossily decoded.
    pub fn text(&self, range: Range<usize>) -> String {
        String::from_utf8_lossy(&self.bytes[range]).into_owned()
    }
}
