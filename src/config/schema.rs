use crate::apply::FormatterConfig;
use crate::snippet::{parse_snippet, SnippetError};
use crate::transform::{
    AddConst, AddFunction, AddType, AddVar, DedupImports, Format, Import, Transform,
};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub formatter: FormatterSection,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.steps.is_empty() {
            issues.push(ValidationIssue::EmptyStepList);
        }
        if self.formatter.timeout_secs == Some(0) {
            issues.push(ValidationIssue::InvalidCombo {
                step: None,
                message: "formatter.timeout_secs must be positive".to_string(),
            });
        }
        if self.formatter.program.as_deref().is_some_and(|p| p.trim().is_empty()) {
            issues.push(ValidationIssue::MissingField {
                step: None,
                field: "formatter.program",
            });
        }

        for (index, step) in self.steps.iter().enumerate() {
            let missing = |field: &'static str| ValidationIssue::MissingField {
                step: Some(index),
                field,
            };

            if let Some(file) = step.file() {
                if file.trim().is_empty() {
                    issues.push(missing("file"));
                } else if !file.ends_with(".go") || file.contains('/') {
                    issues.push(ValidationIssue::InvalidCombo {
                        step: Some(index),
                        message: format!("file {file:?} must be a bare .go file name"),
                    });
                }
            }

            match step {
                Step::Snippet { text, source, .. } => match (text, source) {
                    (Some(_), Some(_)) => issues.push(ValidationIssue::InvalidCombo {
                        step: Some(index),
                        message: "snippet sets both text and source".to_string(),
                    }),
                    (None, None) => issues.push(missing("text")),
                    (Some(text), None) if text.trim().is_empty() => issues.push(missing("text")),
                    (None, Some(source)) if source.trim().is_empty() => {
                        issues.push(missing("source"))
                    }
                    _ => {}
                },
                Step::Import { path, .. } => {
                    if path.trim().is_empty() {
                        issues.push(missing("path"));
                    }
                }
                Step::Function { name, text, .. } | Step::Type { name, text, .. } => {
                    if name.trim().is_empty() {
                        issues.push(missing("name"));
                    }
                    if text.trim().is_empty() {
                        issues.push(missing("text"));
                    }
                }
                Step::Const { names, text, .. } | Step::Var { names, text, .. } => {
                    if names.is_empty() || names.iter().any(|n| n.trim().is_empty()) {
                        issues.push(missing("names"));
                    }
                    if text.trim().is_empty() {
                        issues.push(missing("text"));
                    }
                }
                Step::DedupImports { .. } | Step::Format { .. } => {}
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Expand the steps into an ordered transform list.
    ///
    /// Snippet `source` paths are resolved against `plan_dir`. With the
    /// formatter disabled, `format` steps are dropped.
    pub fn to_transforms(&self, plan_dir: &Path) -> Result<Vec<Transform>, ExpandError> {
        let formatter = self.formatter.config();
        let mut out = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            match step.clone() {
                Step::Snippet {
                    file,
                    text,
                    source,
                    replace,
                } => {
                    let text = match (text, source) {
                        (Some(text), _) => text,
                        (None, Some(source)) => {
                            let path = plan_dir.join(source);
                            std::fs::read_to_string(&path).map_err(|source| ExpandError::Io {
                                step: index,
                                path,
                                source,
                            })?
                        }
                        (None, None) => String::new(),
                    };
                    let transforms = parse_snippet(&file, &text)
                        .map_err(|source| ExpandError::Snippet { step: index, source })?;
                    out.extend(transforms.into_iter().map(|mut t| {
                        t.set_replace(replace);
                        t
                    }));
                }
                Step::Import { file, alias, path } => out.push(Transform::Import(Import {
                    filename: file,
                    alias,
                    path,
                })),
                Step::Function {
                    file,
                    name,
                    receiver,
                    text,
                    replace,
                } => out.push(Transform::Function(AddFunction {
                    filename: file,
                    name,
                    receiver,
                    text,
                    replace,
                })),
                Step::Const {
                    file,
                    names,
                    text,
                    replace,
                } => out.push(Transform::Const(AddConst {
                    filename: file,
                    names,
                    text,
                    replace,
                })),
                Step::Var {
                    file,
                    names,
                    text,
                    replace,
                } => out.push(Transform::Var(AddVar {
                    filename: file,
                    names,
                    text,
                    replace,
                })),
                Step::Type {
                    file,
                    name,
                    text,
                    replace,
                } => out.push(Transform::Type(AddType {
                    filename: file,
                    name,
                    text,
                    replace,
                })),
                Step::DedupImports { files } => {
                    out.push(Transform::DedupImports(DedupImports { filenames: files }))
                }
                Step::Format { files } => {
                    if self.formatter.enabled {
                        out.push(Transform::Format(Format {
                            filenames: files,
                            formatter: formatter.clone(),
                        }));
                    }
                }
            }
        }

        Ok(out)
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Module path; read from go.mod when absent
    #[serde(default)]
    pub module: Option<String>,
    /// Package directory inside the module
    #[serde(default)]
    pub package: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FormatterSection {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl Default for FormatterSection {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout_secs: None,
            enabled: true,
        }
    }
}

impl FormatterSection {
    pub fn config(&self) -> FormatterConfig {
        let mut config = FormatterConfig::default();
        if let Some(program) = &self.program {
            config.program = program.clone();
        }
        config.args = self.args.clone();
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Step {
    /// Headerless Go source decomposed into transforms
    Snippet {
        file: String,
        #[serde(default)]
        text: Option<String>,
        /// Path relative to the plan file
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        replace: bool,
    },
    Import {
        file: String,
        #[serde(default)]
        alias: Option<String>,
        path: String,
    },
    Function {
        file: String,
        name: String,
        #[serde(default)]
        receiver: String,
        text: String,
        #[serde(default)]
        replace: bool,
    },
    Const {
        file: String,
        names: Vec<String>,
        text: String,
        #[serde(default)]
        replace: bool,
    },
    Var {
        file: String,
        names: Vec<String>,
        text: String,
        #[serde(default)]
        replace: bool,
    },
    Type {
        file: String,
        name: String,
        text: String,
        #[serde(default)]
        replace: bool,
    },
    DedupImports {
        #[serde(default)]
        files: Option<Vec<String>>,
    },
    Format {
        #[serde(default)]
        files: Option<Vec<String>>,
    },
}

impl Step {
    pub fn file(&self) -> Option<&str> {
        match self {
            Step::Snippet { file, .. }
            | Step::Import { file, .. }
            | Step::Function { file, .. }
            | Step::Const { file, .. }
            | Step::Var { file, .. }
            | Step::Type { file, .. } => Some(file),
            Step::DedupImports { .. } | Step::Format { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyStepList,
    MissingField {
        step: Option<usize>,
        field: &'static str,
    },
    InvalidCombo {
        step: Option<usize>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyStepList => write!(f, "plan contains no steps"),
            ValidationIssue::MissingField { step, field } => match step {
                Some(idx) => write!(f, "step #{idx} missing required field '{field}'"),
                None => write!(f, "plan missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { step, message } => match step {
                Some(idx) => write!(f, "step #{idx} has invalid configuration: {message}"),
                None => write!(f, "invalid plan configuration: {message}"),
            },
        }
    }
}

/// Failure while expanding a valid plan into transforms.
#[derive(Debug)]
pub enum ExpandError {
    Io {
        step: usize,
        path: PathBuf,
        source: std::io::Error,
    },
    Snippet {
        step: usize,
        source: SnippetError,
    },
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpandError::Io { step, path, source } => write!(
                f,
                "step #{step}: failed to read snippet source {}: {source}",
                path.display()
            ),
            ExpandError::Snippet { step, source } => write!(f, "step #{step}: {source}"),
        }
    }
}

impl std::error::Error for ExpandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExpandError::Io { source, .. } => Some(source),
            ExpandError::Snippet { source, .. } => Some(source),
        }
    }
}
