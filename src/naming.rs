//! Name and directory helpers for generators that feed the engine.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NamingError {
    #[error("dir {dir:?} does not end with suffix {suffix:?}")]
    SuffixMismatch { dir: String, suffix: String },
}

/// Lowercase a type name, separating its words with `sep`.
///
/// A word starts at an uppercase letter followed by a lowercase one, so
/// runs of capitals stay together: `HTTPSomething` becomes `http-something`
/// with `sep = "-"`. Handy for deriving file names from type names.
pub fn lower_for_type(type_name: &str, sep: &str) -> String {
    let mut out: Vec<char> = Vec::with_capacity(type_name.len() + 4 * sep.len());
    let mut last: Option<char> = None;

    for c in type_name.chars() {
        let this_upper = c.is_uppercase();
        let last_upper = last.map_or(true, char::is_uppercase);
        if !this_upper && last_upper {
            if let Some(prior) = out.pop() {
                out.extend(sep.chars());
                out.push(prior);
            }
        }
        out.extend(c.to_lowercase());
        last = Some(c);
    }

    let joined: String = out.into_iter().collect();
    match joined.strip_prefix(sep) {
        Some(rest) if !sep.is_empty() => rest.to_string(),
        _ => joined,
    }
}

/// Lexically clean a slash separated path.
///
/// Collapses repeated separators, `.` elements and `..` after a named
/// element. An empty result is `"."`.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            part => parts.push(part),
        }
    }

    let body = parts.join("/");
    match (rooted, body.is_empty()) {
        (true, _) => format!("/{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

/// Whether the cleaned `dir` ends with the cleaned `suffix`.
///
/// `("some/dir/here", "here")` and `("here", "here")` are both true.
pub fn dir_has_suffix(dir: &str, suffix: &str) -> bool {
    clean_path(dir).ends_with(&clean_path(suffix))
}

/// Swap the `from_suffix` end of `dir` for `to_suffix`.
///
/// `("some/dir/here", "here", "there")` gives `"some/dir/there"`. A leading
/// `/` is only kept when `dir` had one.
pub fn dir_resolve_to(dir: &str, from_suffix: &str, to_suffix: &str) -> Result<String, NamingError> {
    let cleaned = clean_path(dir);
    let from = clean_path(from_suffix);
    let to = clean_path(to_suffix);

    let Some(base) = cleaned.strip_suffix(&from) else {
        return Err(NamingError::SuffixMismatch {
            dir: dir.to_string(),
            suffix: from_suffix.to_string(),
        });
    };

    let joined = if base.is_empty() {
        to
    } else {
        format!("{base}/{to}")
    };
    let resolved = clean_path(&joined);
    if dir.starts_with('/') {
        Ok(resolved)
    } else {
        Ok(resolved.trim_start_matches('/').to_string())
    }
}

/// Whether `name` is usable as a package name: a letter, then letters or digits.
pub fn is_package_ident(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}
