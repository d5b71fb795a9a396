//! Thread-local parser pooling.
//!
//! A package load parses every member file and each transform reparses the
//! files it touched, so the Go parser is created once per thread and reused.

use crate::ts::{GoParser, TreeSitterError};
use std::cell::RefCell;

thread_local! {
    static GO_PARSER: RefCell<Option<GoParser>> = const { RefCell::new(None) };
}

/// Execute function with pooled parser instance.
///
/// On first call per thread, creates new parser. Subsequent calls reuse
/// the same parser instance.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use declpatch::pool::with_parser;
///
/// let has_errors = with_parser(|parser| {
///     parser
///         .parse_with_source(b"package main\n")
///         .map(|parsed| parsed.has_errors())
/// })??;
/// assert!(!has_errors);
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(f: F) -> Result<R, TreeSitterError>
where
    F: FnOnce(&mut GoParser) -> R,
{
    GO_PARSER.with(|cell| {
        let mut opt = cell.borrow_mut();
        let parser = match opt.take() {
            Some(parser) => parser,
            None => GoParser::new()?,
        };
        Ok(f(opt.insert(parser)))
    })
}
