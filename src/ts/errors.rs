use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeSitterError {
    #[error("failed to set language for parser")]
    LanguageSet,

    #[error("failed to parse source code")]
    ParseFailed,

    #[error("{0}")]
    Syntax(#[from] SyntaxError),
}

/// A parse failure pinned to a 1-based line/column and a byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub message: String,
}

impl SyntaxError {
    /// Shift the position back by a synthetic prefix that was prepended
    /// before parsing, so the position refers to the caller's text.
    pub fn without_prefix(mut self, prefix_len: usize, prefix_lines: usize) -> Self {
        self.offset = self.offset.saturating_sub(prefix_len);
        self.line = self.line.saturating_sub(prefix_lines).max(1);
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file, self.line, self.column, self.message
        )
    }
}

impl std::error::Error for SyntaxError {}
