//! Import insertion.

use crate::edit::Edit;
use crate::package::PackageError;
use crate::source::SourceFile;
use crate::ts::DeclKind;

/// Add an import line to `file`, returning its new bytes.
///
/// The line goes into the last import declaration: inside its parentheses
/// for a block, as a new statement right after it for a single import, or
/// after the package clause when the file has no imports. Duplicates are
/// left for the dedup pass.
pub fn insert_import(
    file: &SourceFile,
    alias: Option<&str>,
    path: &str,
) -> Result<Vec<u8>, PackageError> {
    let spec = spec_text(alias, path);
    let bytes = file.bytes();

    let edit = match file.imports().last() {
        Some(decl) => match &decl.kind {
            DeclKind::Import {
                rparen: Some(rparen),
                ..
            } => {
                let rparen = *rparen;
                let mut text = String::new();
                if rparen == 0 || bytes[rparen - 1] != b'\n' {
                    text.push('\n');
                }
                text.push('\t');
                text.push_str(&spec);
                text.push('\n');
                Edit::insert(file.name(), rparen, text)
            }
            _ => {
                let end = decl.span.end;
                let mut text = String::new();
                if end == 0 || bytes[end - 1] != b'\n' {
                    text.push('\n');
                }
                text.push_str("import ");
                text.push_str(&spec);
                text.push('\n');
                // swallow one newline of the remainder
                let swallow = usize::from(bytes.get(end) == Some(&b'\n'));
                Edit::new(
                    file.name(),
                    end,
                    end + swallow,
                    text,
                    &bytes[end..end + swallow],
                )
            }
        },
        None => {
            let at = file
                .package_line_end()
                .ok_or_else(|| PackageError::NoPackageClause {
                    file: file.name().to_string(),
                })?;
            Edit::insert(file.name(), at, format!("\n\nimport {spec}\n"))
        }
    };

    Ok(edit.apply_to(bytes)?)
}

/// `[alias ]"path"` with the path quoted as a Go string literal.
fn spec_text(alias: Option<&str>, path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 8);
    if let Some(alias) = alias.filter(|a| !a.is_empty()) {
        out.push_str(alias);
        out.push(' ');
    }
    out.push('"');
    for c in path.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(source: &str, alias: Option<&str>, path: &str) -> String {
        let file = SourceFile::parse("a.go", source.as_bytes().to_vec()).unwrap();
        String::from_utf8(insert_import(&file, alias, path).unwrap()).unwrap()
    }

    #[test]
    fn into_block() {
        let out = insert(
            "package test1\n\nimport (\n\t\"io\"\n\t\"os\"\n)\n",
            None,
            "io/ioutil",
        );
        assert_eq!(
            out,
            "package test1\n\nimport (\n\t\"io\"\n\t\"os\"\n\t\"io/ioutil\"\n)\n"
        );
    }

    #[test]
    fn into_block_without_trailing_newline() {
        let out = insert("package a\n\nimport (\"io\")\n", Some("x"), "os");
        assert_eq!(out, "package a\n\nimport (\"io\"\n\tx \"os\"\n)\n");
    }

    #[test]
    fn after_single_import() {
        let out = insert("package test1\n\nimport \"io\"\n\n", None, "io/ioutil");
        assert_eq!(out, "package test1\n\nimport \"io\"\nimport \"io/ioutil\"\n\n");
    }

    #[test]
    fn uses_last_import_declaration() {
        let out = insert(
            "package a\n\nimport (\n\t\"io\"\n)\nimport \"os\"\n\nfunc F() {}\n",
            Some("_"),
            "embed",
        );
        assert_eq!(
            out,
            "package a\n\nimport (\n\t\"io\"\n)\nimport \"os\"\nimport _ \"embed\"\n\nfunc F() {}\n"
        );
    }

    #[test]
    fn after_package_clause() {
        let out = insert("package test1\n\n", None, "io/ioutil");
        assert_eq!(out, "package test1\n\nimport \"io/ioutil\"\n\n\n");

        let out = insert("package a // doc\nfunc F() {}\n", None, "io");
        assert_eq!(out, "package a // doc\n\nimport \"io\"\n\nfunc F() {}\n");
    }

    #[test]
    fn quotes_paths() {
        assert_eq!(spec_text(None, "a\"b"), "\"a\\\"b\"");
        assert_eq!(spec_text(Some(""), "io"), "\"io\"");
        assert_eq!(spec_text(Some("."), "io"), ". \"io\"");
    }
}
