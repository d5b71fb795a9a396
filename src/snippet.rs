//! Snippet decomposition: headerless Go source into transforms.
//!
//! Templates render plain declarations (`func F() {}`, an import block, a
//! `const` group ...) without a package clause. [`parse_snippet`] parses
//! such text under a synthetic clause and turns each top-level item into a
//! transform aimed at the given file.

use crate::pool::with_parser;
use crate::transform::{AddConst, AddFunction, AddType, AddVar, Import, Transform};
use crate::ts::{extract, unquote, DeclKind, Declaration, Receiver, SyntaxError, TreeSitterError};
use thiserror::Error;

/// Synthetic header placed before the snippet text.
pub const SNIPPET_PREFIX: &str = "package snippet__\n\n";
const PREFIX_LINES: usize = 2;

#[derive(Error, Debug)]
pub enum SnippetError {
    #[error(transparent)]
    Parser(TreeSitterError),

    /// Position is relative to the snippet text, not the synthetic header.
    #[error("{0}")]
    Syntax(SyntaxError),

    #[error("{file}:{line}: unsupported top-level construct `{kind}`")]
    UnsupportedConstruct {
        file: String,
        kind: String,
        line: usize,
    },

    #[error("{file}:{line}: unsupported receiver `{receiver}` on method {name}")]
    UnsupportedReceiver {
        file: String,
        name: String,
        receiver: String,
        line: usize,
    },

    #[error("{file}:{line}: type declaration binds {} names ({}), expected exactly one", .names.len(), .names.join(", "))]
    MultipleTypeNames {
        file: String,
        names: Vec<String>,
        line: usize,
    },

    #[error("{file}:{line}: invalid import path literal")]
    BadImportPath { file: String, line: usize },
}

/// Decompose `text` into transforms targeting `filename`, in source order.
///
/// Imports become one [`Import`] each, functions and methods one
/// [`AddFunction`], every `const`/`var` declaration (grouped or not) one
/// [`AddConst`]/[`AddVar`], and every type declaration one [`AddType`].
/// The text of a declaration transform includes its doc comment. Replace
/// flags start out false.
pub fn parse_snippet(filename: &str, text: &str) -> Result<Vec<Transform>, SnippetError> {
    let source = format!("{SNIPPET_PREFIX}{text}");

    let (file_decls, lines) = with_parser(|parser| {
        let parsed = parser
            .parse_with_source(source.as_bytes())
            .map_err(SnippetError::Parser)?;
        if let Some(err) = parsed.first_syntax_error(filename) {
            return Err(SnippetError::Syntax(
                err.without_prefix(SNIPPET_PREFIX.len(), PREFIX_LINES),
            ));
        }
        Ok((extract(&parsed), parsed.lines.clone()))
    })
    .map_err(SnippetError::Parser)??;

    let line_of = |offset: usize| {
        lines
            .position(offset)
            .0
            .saturating_sub(PREFIX_LINES)
            .max(1)
    };

    if let Some(clause) = file_decls
        .package
        .as_ref()
        .filter(|clause| clause.span.start != 0)
    {
        return Err(SnippetError::UnsupportedConstruct {
            file: filename.to_string(),
            kind: "package_clause".to_string(),
            line: line_of(clause.span.start),
        });
    }
    if let Some(other) = file_decls.others.first() {
        return Err(SnippetError::UnsupportedConstruct {
            file: filename.to_string(),
            kind: other.kind.clone(),
            line: line_of(other.span.start),
        });
    }

    let mut transforms = Vec::new();
    for decl in &file_decls.decls {
        let line = line_of(decl.span.start);
        match &decl.kind {
            DeclKind::Import { specs, .. } => {
                for spec in specs {
                    if !matches!(unquote(&spec.literal), Some(path) if !path.is_empty()) {
                        return Err(SnippetError::BadImportPath {
                            file: filename.to_string(),
                            line: line_of(spec.span.start),
                        });
                    }
                    transforms.push(Transform::Import(Import {
                        filename: filename.to_string(),
                        alias: spec.alias.clone(),
                        path: spec.path.clone(),
                    }));
                }
            }
            DeclKind::Function { name, receiver } => {
                let receiver_type = match receiver {
                    Receiver::Unsupported(text) => {
                        return Err(SnippetError::UnsupportedReceiver {
                            file: filename.to_string(),
                            name: name.clone(),
                            receiver: text.clone(),
                            line,
                        })
                    }
                    other => other.type_expr().unwrap_or_default(),
                };
                transforms.push(Transform::Function(AddFunction {
                    filename: filename.to_string(),
                    name: name.clone(),
                    receiver: receiver_type,
                    text: decl_text(&source, decl),
                    replace: false,
                }));
            }
            DeclKind::Const { names } => transforms.push(Transform::Const(AddConst {
                filename: filename.to_string(),
                names: names.clone(),
                text: decl_text(&source, decl),
                replace: false,
            })),
            DeclKind::Var { names } => transforms.push(Transform::Var(AddVar {
                filename: filename.to_string(),
                names: names.clone(),
                text: decl_text(&source, decl),
                replace: false,
            })),
            DeclKind::Type { names } => {
                let [name] = names.as_slice() else {
                    return Err(SnippetError::MultipleTypeNames {
                        file: filename.to_string(),
                        names: names.clone(),
                        line,
                    });
                };
                transforms.push(Transform::Type(AddType {
                    filename: filename.to_string(),
                    name: name.clone(),
                    text: decl_text(&source, decl),
                    replace: false,
                }));
            }
        }
    }

    tracing::debug!(file = filename, transforms = transforms.len(), "parsed snippet");
    Ok(transforms)
}

/// Doc comment (when present), one newline, then the declaration itself.
fn decl_text(source: &str, decl: &Declaration) -> String {
    let code = &source[decl.span.clone()];
    match decl.doc_start {
        Some(doc_start) => {
            let region = &source[doc_start..decl.span.start];
            // the comment group ends at the last line break before the declaration
            let doc = match region.rfind('\n') {
                Some(end) => region[..end].strip_suffix('\r').unwrap_or(&region[..end]),
                None => region.trim_end(),
            };
            format!("{doc}\n{code}")
        }
        None => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(filename: &str, alias: Option<&str>, path: &str) -> Transform {
        Transform::Import(Import {
            filename: filename.into(),
            alias: alias.map(str::to_string),
            path: path.into(),
        })
    }

    #[test]
    fn syntax_error_position_is_snippet_relative() {
        let err = parse_snippet("parse_err.go", "import \"example123\n").unwrap_err();
        match err {
            SnippetError::Syntax(syntax) => {
                assert_eq!(syntax.file, "parse_err.go");
                assert_eq!(syntax.line, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = parse_snippet("later.go", "func A() {}\n\nfunc B( {\n").unwrap_err();
        match err {
            SnippetError::Syntax(syntax) => assert_eq!(syntax.line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn imports_single_and_block() {
        let transforms =
            parse_snippet("imports.go", "\nimport \"abc\"\nimport (\n\t_ \"def\"\n\t\"ghi\"\n)\n")
                .unwrap();
        assert_eq!(
            transforms,
            vec![
                import("imports.go", None, "abc"),
                import("imports.go", Some("_"), "def"),
                import("imports.go", None, "ghi"),
            ]
        );
    }

    #[test]
    fn functions_keep_doc_comment() {
        let transforms = parse_snippet(
            "func_init.go",
            "\n// init some stuff\nfunc init() {\n\tprintln(\"initing\")\n}\n",
        )
        .unwrap();
        assert_eq!(
            transforms,
            vec![Transform::Function(AddFunction {
                filename: "func_init.go".into(),
                name: "init".into(),
                receiver: String::new(),
                text: "// init some stuff\nfunc init() {\n\tprintln(\"initing\")\n}".into(),
                replace: false,
            })]
        );
    }

    #[test]
    fn doc_comment_bytes_are_kept_exactly() {
        let transforms = parse_snippet("ws.go", "// trailing ws   \nfunc F() {}\n").unwrap();
        match &transforms[..] {
            [Transform::Function(f)] => assert_eq!(f.text, "// trailing ws   \nfunc F() {}"),
            other => panic!("unexpected transforms: {other:?}"),
        }
    }

    #[test]
    fn escaped_import_paths_are_decoded() {
        let transforms = parse_snippet("esc.go", "import \"\\u0069o\"\n").unwrap();
        assert_eq!(transforms, vec![import("esc.go", None, "io")]);

        let err = parse_snippet("esc.go", "import \"\\xff\"\n").unwrap_err();
        assert!(matches!(err, SnippetError::BadImportPath { line: 1, .. }));
    }

    #[test]
    fn method_receivers() {
        let transforms = parse_snippet(
            "recv.go",
            "// F does something\nfunc (a A) F() {}\n\nfunc (a *A) G() {}\n",
        )
        .unwrap();
        let receivers: Vec<_> = transforms
            .iter()
            .map(|t| match t {
                Transform::Function(f) => (f.receiver.as_str(), f.text.as_str()),
                other => panic!("unexpected transform: {other:?}"),
            })
            .collect();
        assert_eq!(
            receivers,
            vec![
                ("A", "// F does something\nfunc (a A) F() {}"),
                ("*A", "func (a *A) G() {}"),
            ]
        );

        let err = parse_snippet("generic.go", "func (s *Set[T]) Add(v T) {}\n").unwrap_err();
        assert!(matches!(err, SnippetError::UnsupportedReceiver { .. }));
    }

    #[test]
    fn var_const_type() {
        let snippet = "\n// some vars\nvar (\n\tx = 1\n\ty = 2\n)\n\n// w here\nvar w = 3\n\n// some consts\nconst (\n\tz = 1\n\ta = 2\n)\n\n// a type\ntype t struct {\n\ta, b, c int\n}\n";
        let transforms = parse_snippet("var_const_type.go", snippet).unwrap();
        assert_eq!(
            transforms,
            vec![
                Transform::Var(AddVar {
                    filename: "var_const_type.go".into(),
                    names: vec!["x".into(), "y".into()],
                    text: "// some vars\nvar (\n\tx = 1\n\ty = 2\n)".into(),
                    replace: false,
                }),
                Transform::Var(AddVar {
                    filename: "var_const_type.go".into(),
                    names: vec!["w".into()],
                    text: "// w here\nvar w = 3".into(),
                    replace: false,
                }),
                Transform::Const(AddConst {
                    filename: "var_const_type.go".into(),
                    names: vec!["z".into(), "a".into()],
                    text: "// some consts\nconst (\n\tz = 1\n\ta = 2\n)".into(),
                    replace: false,
                }),
                Transform::Type(AddType {
                    filename: "var_const_type.go".into(),
                    name: "t".into(),
                    text: "// a type\ntype t struct {\n\ta, b, c int\n}".into(),
                    replace: false,
                }),
            ]
        );
    }

    #[test]
    fn grouped_type_is_rejected() {
        let err = parse_snippet("types.go", "\n\ntype (\n\tA int\n\tB string\n)\n").unwrap_err();
        match err {
            SnippetError::MultipleTypeNames { names, line, .. } => {
                assert_eq!(names, vec!["A", "B"]);
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn statements_are_unsupported() {
        let err = parse_snippet("stmt.go", "func F() {}\nx := 1\n");
        assert!(matches!(
            err,
            Err(SnippetError::UnsupportedConstruct { .. }) | Err(SnippetError::Syntax(_))
        ));

        let err = parse_snippet("pkg.go", "package other\n\nfunc F() {}\n");
        assert!(matches!(
            err,
            Err(SnippetError::UnsupportedConstruct { .. }) | Err(SnippetError::Syntax(_))
        ));
    }
}
