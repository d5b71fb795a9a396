use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use declpatch::config::load_plan;
use declpatch::safety::join;
use declpatch::{
    parse_snippet, ApplyReport, DirLayer, Layer, Lookup, MemLayer, Outcome, Package, ReadOnly,
    Transform,
};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "declpatch")]
#[command(about = "Declaration-level patching of Go packages", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine decisions (sets the default filter to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch plans to a Go module
    Apply {
        /// Module root containing go.mod (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Specific plan file (otherwise applies all in .declpatch/)
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Package directory, overriding the plan's meta.package
        #[arg(long)]
        package: Option<String>,

        /// Dry run - write to memory and show what would change
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Print the report and diffs as JSON
        #[arg(long)]
        json: bool,

        /// Skip format steps
        #[arg(long)]
        no_format: bool,
    },

    /// Show the transforms a snippet decomposes into
    Inspect {
        /// File holding headerless Go source
        snippet: PathBuf,

        /// Target file name recorded in the transforms
        #[arg(short, long, default_value = "snippet.go")]
        file: String,
    },

    /// Look up a declaration in a package
    Find {
        /// Module root containing go.mod (auto-detected if not specified)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Package directory inside the module
        #[arg(long, default_value = "")]
        package: String,

        /// Type name
        #[arg(long = "type", conflicts_with = "func")]
        type_name: Option<String>,

        /// Function or method name
        #[arg(long)]
        func: Option<String>,

        /// Method receiver type, `T` or `*T`
        #[arg(long, requires = "func")]
        receiver: Option<String>,

        /// Ignore case and `-`/`_` when matching type names
        #[arg(long)]
        loose: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Apply {
            workspace,
            plan,
            package,
            dry_run,
            diff,
            json,
            no_format,
        } => cmd_apply(ApplyArgs {
            workspace,
            plan,
            package,
            dry_run,
            show_diff: diff,
            json,
            no_format,
        }),

        Commands::Inspect { snippet, file } => cmd_inspect(&snippet, &file),

        Commands::Find {
            workspace,
            package,
            type_name,
            func,
            receiver,
            loose,
        } => cmd_find(
            workspace,
            &package,
            type_name,
            func,
            receiver.as_deref().unwrap_or(""),
            loose,
        ),
    }
}

/// Resolve the module root.
///
/// Priority order:
/// 1. Explicit --workspace flag
/// 2. DECLPATCH_WORKSPACE environment variable
/// 3. Nearest ancestor of the current directory holding go.mod
fn resolve_workspace(cli_workspace: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_workspace {
        return path
            .canonicalize()
            .with_context(|| format!("workspace {} does not exist", path.display()));
    }

    if let Ok(env_path) = env::var("DECLPATCH_WORKSPACE") {
        let path = PathBuf::from(&env_path);
        if path.exists() {
            return Ok(path.canonicalize()?);
        }
        eprintln!(
            "{}",
            format!("Warning: DECLPATCH_WORKSPACE is set but path doesn't exist: {env_path}")
                .yellow()
        );
    }

    let current = env::current_dir()?;
    for ancestor in current.ancestors() {
        if ancestor.join("go.mod").is_file() {
            return Ok(ancestor.to_path_buf());
        }
    }

    anyhow::bail!(
        "{}\n{}\n  {}\n  {}",
        "Could not find a Go module (no go.mod above the current directory).".red(),
        "Try one of:".bold(),
        "1. cd into the module: cd /path/to/module && declpatch apply",
        "2. Specify explicitly: declpatch apply --workspace /path/to/module"
    )
}

/// Read the `module` directive from go.mod.
fn read_module_path(workspace: &Path) -> Result<String> {
    let go_mod = workspace.join("go.mod");
    let contents = fs::read_to_string(&go_mod)
        .with_context(|| format!("failed to read {}", go_mod.display()))?;
    parse_module_line(&contents)
        .with_context(|| format!("no module directive in {}", go_mod.display()))
}

fn parse_module_line(go_mod: &str) -> Option<String> {
    go_mod.lines().find_map(|line| {
        let line = line.split("//").next().unwrap_or("").trim();
        let rest = line.strip_prefix("module")?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        let path = rest.trim().trim_matches(|c| c == '"' || c == '`');
        (!path.is_empty()).then(|| path.to_string())
    })
}

/// Discover all .toml plan files in `<workspace>/.declpatch`, sorted.
fn discover_plan_files(workspace: &Path) -> Result<Vec<PathBuf>> {
    let plans_dir = workspace.join(".declpatch");
    let mut files = Vec::new();
    if plans_dir.is_dir() {
        for entry in WalkDir::new(&plans_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort();

    if files.is_empty() {
        anyhow::bail!("No .toml plan files found in {}", plans_dir.display());
    }
    Ok(files)
}

fn unified_diff(path: &str, original: &str, modified: &str) -> String {
    let diff = TextDiff::from_lines(original, modified);
    let old_header = format!("{path} (original)");
    let new_header = format!("{path} (patched)");
    diff.unified_diff()
        .header(&old_header, &new_header)
        .to_string()
}

fn display_diff(path: &str, original: &str, modified: &str) {
    println!("\n{}", format!("--- {path} (original)").dimmed());
    println!("{}", format!("+++ {path} (patched)").dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{change}").red(),
            ChangeTag::Insert => format!("+{change}").green(),
            ChangeTag::Equal => format!(" {change}").normal(),
        };
        print!("{sign}");
    }
}

struct ApplyArgs {
    workspace: Option<PathBuf>,
    plan: Option<PathBuf>,
    package: Option<String>,
    dry_run: bool,
    show_diff: bool,
    json: bool,
    no_format: bool,
}

#[derive(Serialize)]
struct PlanOutput {
    plan: String,
    package: String,
    report: ApplyReport,
    diffs: BTreeMap<String, String>,
}

fn cmd_apply(args: ApplyArgs) -> Result<()> {
    let workspace = resolve_workspace(args.workspace)?;
    let plan_files = match args.plan {
        Some(path) => vec![path],
        None => discover_plan_files(&workspace)?,
    };

    if !args.json {
        println!("Workspace: {}", workspace.display());
        if args.dry_run {
            println!("{}", "[DRY RUN - nothing is written to disk]".cyan());
        }
        println!();
    }

    let input: Arc<dyn Layer> = Arc::new(ReadOnly(DirLayer::open(&workspace)?));
    // shared by every plan in the run
    let output: Arc<dyn Layer> = if args.dry_run {
        Arc::new(MemLayer::new())
    } else {
        Arc::new(DirLayer::open(&workspace)?)
    };

    let mut outputs = Vec::new();
    let mut total_changed = 0;
    let mut total_unchanged = 0;

    for plan_file in plan_files {
        let (config, mut transforms) = load_plan(&plan_file)?;
        if args.no_format {
            transforms.retain(|t| !matches!(t, Transform::Format(_)));
        }

        let module_path = match &config.meta.module {
            Some(module) => module.clone(),
            None => read_module_path(&workspace)?,
        };
        let sub_dir = args
            .package
            .clone()
            .unwrap_or_else(|| config.meta.package.clone());

        let before = snapshot(output.as_ref(), input.as_ref(), &sub_dir)?;

        if !args.json {
            let label = if config.meta.name.is_empty() {
                plan_file.display().to_string()
            } else {
                format!("{} ({})", config.meta.name, plan_file.display())
            };
            println!("Applying {label}...");
        }

        let mut package =
            Package::new(input.clone(), output.clone(), module_path, sub_dir.clone())?;
        let report = package
            .apply_transforms(transforms)
            .with_context(|| format!("plan {} failed", plan_file.display()))?;

        let mut diffs = BTreeMap::new();
        for name in &report.written {
            let path = join(&sub_dir, name);
            let after = output
                .read(&path)?
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default();
            let original = before.get(name).map(String::as_str).unwrap_or("");
            if original != after {
                if args.show_diff && !args.json {
                    display_diff(&path, original, &after);
                }
                diffs.insert(path.clone(), unified_diff(&path, original, &after));
            }
        }

        if !args.json {
            print_report(&report, args.dry_run);
            println!();
        }

        total_changed += report.changed();
        total_unchanged += report.transforms.len() - report.changed();
        outputs.push(PlanOutput {
            plan: plan_file.display().to_string(),
            package: sub_dir,
            report,
            diffs,
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        return Ok(());
    }

    println!("{}", "Summary:".bold());
    println!("  {} changed", format!("{total_changed}").green());
    println!("  {} unchanged", format!("{total_unchanged}").yellow());
    Ok(())
}

/// Current contents of the package's .go files, output shadowing input.
fn snapshot(
    output: &dyn Layer,
    input: &dyn Layer,
    sub_dir: &str,
) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    for layer in [output, input] {
        for entry in layer.read_dir(sub_dir)? {
            if entry.is_dir || !entry.name.ends_with(".go") || files.contains_key(&entry.name) {
                continue;
            }
            if let Some(bytes) = layer.read(&join(sub_dir, &entry.name))? {
                files.insert(entry.name, String::from_utf8_lossy(&bytes).into_owned());
            }
        }
    }
    Ok(files)
}

fn print_report(report: &ApplyReport, dry_run: bool) {
    let verb = if dry_run { "Would write" } else { "Wrote" };
    for entry in &report.transforms {
        let label = format!("#{} {}", entry.index, entry.kind);
        match &entry.outcome {
            Outcome::Inserted { file } => {
                println!("{} {label}: {verb} {file}", "✓".green());
            }
            Outcome::Replaced { from, file } if from == file => {
                println!("{} {label}: Replaced in {file}", "✓".green());
            }
            Outcome::Replaced { from, file } => {
                println!("{} {label}: Moved from {from} to {file}", "✓".green());
            }
            Outcome::Rewritten { files } => {
                println!("{} {label}: {verb} {}", "✓".green(), files.join(", "));
            }
            Outcome::Unchanged => {
                println!("{} {label}: Unchanged", "⊙".yellow());
            }
        }
    }
}

fn cmd_inspect(snippet: &Path, file: &str) -> Result<()> {
    let text = fs::read_to_string(snippet)
        .with_context(|| format!("failed to read {}", snippet.display()))?;
    let transforms = parse_snippet(file, &text)?;
    println!("{}", serde_json::to_string_pretty(&transforms)?);
    Ok(())
}

fn cmd_find(
    workspace: Option<PathBuf>,
    sub_dir: &str,
    type_name: Option<String>,
    func: Option<String>,
    receiver: &str,
    loose: bool,
) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    let module_path = read_module_path(&workspace).unwrap_or_default();

    let input: Arc<dyn Layer> = Arc::new(ReadOnly(DirLayer::open(&workspace)?));
    let mut package = Package::new(input, Arc::new(MemLayer::new()), module_path, sub_dir)?;

    let (wanted, lookup) = match (type_name, func) {
        (Some(name), _) if loose => (name.clone(), package.find_type_loose(&name)?),
        (Some(name), _) => (name.clone(), package.find_type(&name)?),
        (None, Some(name)) => (name.clone(), package.find_function(receiver, &name)?),
        (None, None) => anyhow::bail!("pass --type or --func"),
    };

    match lookup {
        Lookup::Found(info) => {
            let line = info.file_bytes[..info.span.start]
                .iter()
                .filter(|&&b| b == b'\n')
                .count()
                + 1;
            println!(
                "{}",
                format!("{}:{line}", join(sub_dir, &info.filename)).bold()
            );
            println!("{}", String::from_utf8_lossy(info.source_with_doc()));
            Ok(())
        }
        Lookup::NotFound { suggestions } => {
            eprintln!("{} {wanted} not found", "✗".red());
            if !suggestions.is_empty() {
                eprintln!("  Did you mean: {}", suggestions.join(", "));
            }
            std::process::exit(1);
        }
    }
}
