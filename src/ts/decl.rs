//! Top-level declaration extraction for Go source files.
//!
//! Walks the named children of a `source_file` node and turns each
//! declaration into a [`Declaration`] carrying its byte span, the start of
//! its doc comment (if any), and the identity fields used for matching.

use crate::ts::parser::ParsedSource;
use std::ops::Range;
use tree_sitter::Node;

/// Receiver of a method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    /// Plain function, no receiver.
    None,
    /// `func (x T) ...`
    Value(String),
    /// `func (x *T) ...`
    Pointer(String),
    /// Any other receiver form (generic, parenthesized, ...), kept verbatim.
    Unsupported(String),
}

impl Receiver {
    /// Receiver type expression used as identity: `""`, `"T"` or `"*T"`.
    ///
    /// Returns `None` for receiver forms that have no such expression.
    pub fn type_expr(&self) -> Option<String> {
        match self {
            Receiver::None => Some(String::new()),
            Receiver::Value(name) => Some(name.clone()),
            Receiver::Pointer(name) => Some(format!("*{name}")),
            Receiver::Unsupported(_) => None,
        }
    }
}

/// A single line of an import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Local alias (`_`, `.`, or a name), if present.
    pub alias: Option<String>,
    /// Unquoted import path; the literal text itself when it cannot be decoded.
    pub path: String,
    /// Path literal as written, quotes included.
    pub literal: String,
    /// Byte range from the alias (or path) to the end of the path literal.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Function { name: String, receiver: Receiver },
    Const { names: Vec<String> },
    Var { names: Vec<String> },
    Type { names: Vec<String> },
    Import {
        specs: Vec<ImportSpec>,
        /// Offset of the closing `)` for parenthesized blocks.
        rparen: Option<usize>,
    },
}

impl DeclKind {
    pub fn label(&self) -> &'static str {
        match self {
            DeclKind::Function { .. } => "func",
            DeclKind::Const { .. } => "const",
            DeclKind::Var { .. } => "var",
            DeclKind::Type { .. } => "type",
            DeclKind::Import { .. } => "import",
        }
    }
}

/// A top-level declaration with byte positions in its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclKind,
    pub span: Range<usize>,
    /// Start of the attached doc comment group.
    pub doc_start: Option<usize>,
}

impl Declaration {
    /// Range removed when the declaration is replaced: doc comment included.
    pub fn removal_range(&self) -> Range<usize> {
        self.doc_start.unwrap_or(self.span.start)..self.span.end
    }
}

/// The `package` clause of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageClause {
    pub name: String,
    pub span: Range<usize>,
}

/// A top-level construct outside the declaration vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherNode {
    pub kind: String,
    pub span: Range<usize>,
}

/// Everything the engine needs from one parsed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDecls {
    pub package: Option<PackageClause>,
    pub decls: Vec<Declaration>,
    pub others: Vec<OtherNode>,
}

/// Pending comment group while scanning siblings.
struct CommentGroup {
    start_byte: usize,
    end_row: usize,
}

/// Interpret the top level of a parsed file.
pub fn extract(parsed: &ParsedSource<'_>) -> FileDecls {
    let root = parsed.root_node();
    let mut out = FileDecls::default();

    let mut group: Option<CommentGroup> = None;
    let mut last_code_row: Option<usize> = None;

    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        let start_row = node.start_position().row;
        let end_row = node.end_position().row;

        if node.kind() == "comment" {
            if last_code_row == Some(start_row) {
                // trailing comment on a code line
                group = None;
                continue;
            }
            group = match group {
                Some(g) if start_row <= g.end_row + 1 => Some(CommentGroup {
                    start_byte: g.start_byte,
                    end_row,
                }),
                _ => Some(CommentGroup {
                    start_byte: node.start_byte(),
                    end_row,
                }),
            };
            continue;
        }

        let doc_start = group
            .take()
            .filter(|g| g.end_row + 1 == start_row)
            .map(|g| g.start_byte);
        last_code_row = Some(end_row);

        let span = node.start_byte()..node.end_byte();
        let kind = match node.kind() {
            "package_clause" => {
                let name = first_named_child(node)
                    .map(|n| parsed.node_text(n).to_string())
                    .unwrap_or_default();
                out.package = Some(PackageClause { name, span });
                continue;
            }
            "function_declaration" => DeclKind::Function {
                name: field_text(parsed, node, "name"),
                receiver: Receiver::None,
            },
            "method_declaration" => DeclKind::Function {
                name: field_text(parsed, node, "name"),
                receiver: receiver_of(parsed, node),
            },
            "const_declaration" => DeclKind::Const {
                names: spec_names(parsed, node, "const_spec"),
            },
            "var_declaration" => DeclKind::Var {
                names: spec_names(parsed, node, "var_spec"),
            },
            "type_declaration" => DeclKind::Type {
                names: type_names(parsed, node),
            },
            "import_declaration" => import_decl(parsed, node),
            other => {
                out.others.push(OtherNode {
                    kind: other.to_string(),
                    span,
                });
                continue;
            }
        };

        out.decls.push(Declaration {
            kind,
            span,
            doc_start,
        });
    }

    out
}

fn first_named_child(node: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = node.walk();
    let child = node.named_children(&mut cursor).next();
    child
}

fn field_text(parsed: &ParsedSource<'_>, node: Node<'_>, field: &str) -> String {
    node.child_by_field_name(field)
        .map(|n| parsed.node_text(n).to_string())
        .unwrap_or_default()
}

fn receiver_of(parsed: &ParsedSource<'_>, method: Node<'_>) -> Receiver {
    let Some(list) = method.child_by_field_name("receiver") else {
        return Receiver::None;
    };
    let mut cursor = list.walk();
    let params: Vec<Node<'_>> = list
        .named_children(&mut cursor)
        .filter(|n| n.kind() == "parameter_declaration")
        .collect();
    let [param] = params.as_slice() else {
        return Receiver::Unsupported(parsed.node_text(list).to_string());
    };
    let Some(ty) = param.child_by_field_name("type") else {
        return Receiver::Unsupported(parsed.node_text(list).to_string());
    };

    match ty.kind() {
        "type_identifier" => Receiver::Value(parsed.node_text(ty).to_string()),
        "pointer_type" => match first_named_child(ty) {
            Some(inner) if inner.kind() == "type_identifier" => {
                Receiver::Pointer(parsed.node_text(inner).to_string())
            }
            _ => Receiver::Unsupported(parsed.node_text(ty).to_string()),
        },
        _ => Receiver::Unsupported(parsed.node_text(ty).to_string()),
    }
}

/// Collect spec nodes of `spec_kind` directly below `node` or one list level down.
fn collect_specs<'t>(node: Node<'t>, spec_kind: &str, out: &mut Vec<Node<'t>>, depth: usize) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == spec_kind {
            out.push(child);
        } else if depth > 0 && child.kind().ends_with("_list") {
            collect_specs(child, spec_kind, out, depth - 1);
        }
    }
}

fn spec_names(parsed: &ParsedSource<'_>, decl: Node<'_>, spec_kind: &str) -> Vec<String> {
    let mut specs = Vec::new();
    collect_specs(decl, spec_kind, &mut specs, 1);

    let mut names = Vec::new();
    for spec in specs {
        let mut cursor = spec.walk();
        names.extend(
            spec.children_by_field_name("name", &mut cursor)
                .map(|n| parsed.node_text(n).to_string()),
        );
    }
    names
}

fn type_names(parsed: &ParsedSource<'_>, decl: Node<'_>) -> Vec<String> {
    let mut specs = Vec::new();
    collect_specs(decl, "type_spec", &mut specs, 1);
    collect_specs(decl, "type_alias", &mut specs, 1);
    specs.sort_by_key(|n| n.start_byte());
    specs
        .into_iter()
        .map(|spec| field_text(parsed, spec, "name"))
        .collect()
}

fn import_decl(parsed: &ParsedSource<'_>, decl: Node<'_>) -> DeclKind {
    let mut specs = Vec::new();
    let mut rparen = None;

    let mut nodes = Vec::new();
    collect_specs(decl, "import_spec", &mut nodes, 1);

    let mut cursor = decl.walk();
    for child in decl.named_children(&mut cursor) {
        if child.kind() == "import_spec_list" {
            let mut list_cursor = child.walk();
            rparen = child
                .children(&mut list_cursor)
                .filter(|c| c.kind() == ")")
                .last()
                .map(|c| c.start_byte());
        }
    }

    for node in nodes {
        let alias = node
            .child_by_field_name("name")
            .map(|n| parsed.node_text(n).to_string());
        let literal = node
            .child_by_field_name("path")
            .map(|n| parsed.node_text(n).to_string())
            .unwrap_or_default();
        let path = unquote(&literal).unwrap_or_else(|| literal.clone());
        specs.push(ImportSpec {
            alias,
            path,
            literal,
            span: node.start_byte()..node.end_byte(),
        });
    }

    DeclKind::Import { specs, rparen }
}

/// Unquote a Go string literal (interpreted or raw).
///
/// Handles the full escape set, including `\x`, octal, `\u` and `\U`.
/// Returns `None` for malformed literals or byte escapes that do not form
/// UTF-8.
pub fn unquote(literal: &str) -> Option<String> {
    if let Some(raw) = literal
        .strip_prefix('`')
        .and_then(|s| s.strip_suffix('`'))
    {
        return Some(raw.replace('\r', ""));
    }

    let inner = literal.strip_prefix('"')?.strip_suffix('"')?;
    let mut out: Vec<u8> = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            push_char(&mut out, c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push(b'\\'),
            '"' => out.push(b'"'),
            'n' => out.push(b'\n'),
            't' => out.push(b'\t'),
            'r' => out.push(b'\r'),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0C),
            'v' => out.push(0x0B),
            'x' => out.push(u8::try_from(digits(&mut chars, 2, 16)?).ok()?),
            'u' => push_char(&mut out, char::from_u32(digits(&mut chars, 4, 16)?)?),
            'U' => push_char(&mut out, char::from_u32(digits(&mut chars, 8, 16)?)?),
            first @ '0'..='7' => {
                let rest = digits(&mut chars, 2, 8)?;
                let value = first.to_digit(8)? * 64 + rest;
                out.push(u8::try_from(value).ok()?);
            }
            _ => return None,
        }
    }
    String::from_utf8(out).ok()
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

/// Read exactly `count` digits in `radix`.
fn digits(chars: &mut std::str::Chars<'_>, count: usize, radix: u32) -> Option<u32> {
    let mut value = 0u32;
    for _ in 0..count {
        value = value * radix + chars.next()?.to_digit(radix)?;
    }
    Some(value)
}
