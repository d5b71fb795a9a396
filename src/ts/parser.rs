use crate::ts::errors::{SyntaxError, TreeSitterError};
use ast_grep_language::{LanguageExt, SupportLang};
use tree_sitter::{Parser, Tree};

/// Tree-sitter parser wrapper for Go source code.
pub struct GoParser {
    parser: Parser,
}

impl GoParser {
    /// Create a new Go parser.
    pub fn new() -> Result<Self, TreeSitterError> {
        let mut parser = Parser::new();
        // Get the tree-sitter Language from ast-grep-language
        let ts_lang = SupportLang::Go.get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| TreeSitterError::LanguageSet)?;

        Ok(Self { parser })
    }

    /// Parse source bytes into a tree-sitter Tree.
    pub fn parse(&mut self, source: &[u8]) -> Result<Tree, TreeSitterError> {
        self.parser
            .parse(source, None)
            .ok_or(TreeSitterError::ParseFailed)
    }

    /// Parse source bytes and return the tree along with the source.
    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a [u8],
    ) -> Result<ParsedSource<'a>, TreeSitterError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource {
            source,
            tree,
            lines: LineIndex::new(source),
        })
    }
}

/// A parsed source file with its tree-sitter tree and line table.
pub struct ParsedSource<'a> {
    pub source: &'a [u8],
    pub tree: Tree,
    pub lines: LineIndex,
}

impl<'a> ParsedSource<'a> {
    /// Get the root node of the tree.
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    /// Check if the tree contains any ERROR or MISSING nodes.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Get all ERROR nodes in the tree, in source order.
    pub fn error_nodes(&self) -> Vec<ErrorNode> {
        let mut errors = Vec::new();
        collect_error_nodes(self.tree.root_node(), &mut errors);
        errors.sort_by_key(|e| e.byte_start);
        errors
    }

    /// Describe the first syntax error as a positioned [`SyntaxError`].
    pub fn first_syntax_error(&self, file: &str) -> Option<SyntaxError> {
        let first = self.error_nodes().into_iter().next()?;
        let (line, column) = self.lines.position(first.byte_start);
        let message = if first.missing {
            format!("missing {}", first.kind)
        } else {
            let snippet = String::from_utf8_lossy(&self.source[first.byte_start..first.byte_end]);
            let snippet: String = snippet.lines().next().unwrap_or("").chars().take(24).collect();
            if snippet.is_empty() {
                "unexpected end of input".to_string()
            } else {
                format!("unexpected `{snippet}`")
            }
        };
        Some(SyntaxError {
            file: file.to_string(),
            line,
            column,
            offset: first.byte_start,
            message,
        })
    }

    /// Extract text for a node's byte range.
    pub fn node_text(&self, node: tree_sitter::Node<'_>) -> &'a str {
        std::str::from_utf8(&self.source[node.byte_range()]).unwrap_or("")
    }
}

/// Information about an ERROR or MISSING node in the parse tree.
#[derive(Debug, Clone)]
pub struct ErrorNode {
    pub byte_start: usize,
    pub byte_end: usize,
    pub kind: String,
    pub missing: bool,
}

fn collect_error_nodes(node: tree_sitter::Node<'_>, errors: &mut Vec<ErrorNode>) {
    if !node.has_error() {
        return;
    }

    if node.is_error() || node.is_missing() {
        errors.push(ErrorNode {
            byte_start: node.start_byte(),
            byte_end: node.end_byte(),
            kind: node.kind().to_string(),
            missing: node.is_missing(),
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, errors);
    }
}

/// Maps byte offsets to 1-based line/column pairs and back.
///
/// Built once per parse from the offsets at which each line starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &[u8]) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// Number of lines (a trailing newline opens a final empty line).
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 1-based (line, column) of a byte offset; column counts bytes.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }

    /// Byte offset of a 1-based (line, column), if it lies inside the source.
    pub fn offset(&self, line: usize, column: usize) -> Option<usize> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(self.len + 1);
        let offset = start + column.checked_sub(1)?;
        (offset < end).then_some(offset)
    }

    /// Byte offset at which the line containing `offset` ends (the newline
    /// itself, or the end of the source).
    pub fn line_end(&self, offset: usize) -> usize {
        let (line, _) = self.position(offset);
        match self.line_starts.get(line) {
            Some(next_start) => next_start - 1,
            None => self.len,
        }
    }
}
