use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use survey_library::LibraryIndex;
use survey_match::{ImportedGroup, MatchEngine, SuggestedAction};
use survey_recipe::{evaluate, RecipeLibrary};

mod config;
mod flags;
mod rows;

use config::SurveyConfig;
use flags::{OutputFormat, PolicyFlag};

#[derive(Parser)]
#[command(name = "survey")]
#[command(about = "Recognise survey instruments and score responses", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for results)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Settings file (default: ./survey.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Global template library root (overrides library.global_root)
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Project template library root (overrides library.project_root)
    #[arg(long, global = true)]
    project: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List indexed templates
    Templates(TemplatesArgs),

    /// Match an imported item set against the template library
    Match(MatchArgs),

    /// Validate every recipe in a directory
    Validate(ValidateArgs),

    /// Evaluate a recipe over response rows
    Score(ScoreArgs),
}

#[derive(Args)]
struct TemplatesArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct MatchArgs {
    /// Comma-separated item codes
    #[arg(long, value_delimiter = ',', required_unless_present = "group", conflicts_with = "group")]
    items: Vec<String>,

    /// Group label used for name matching
    #[arg(long)]
    label: Option<String>,

    /// JSON file with an imported group ({label, short_name, long_name, items})
    #[arg(long)]
    group: Option<PathBuf>,

    /// Override matching.unmatched_policy
    #[arg(long, value_enum)]
    unmatched: Option<PolicyFlag>,
}

#[derive(Args)]
struct ValidateArgs {
    /// Directory holding recipe documents
    path: PathBuf,
}

#[derive(Args)]
struct ScoreArgs {
    /// Directory holding recipe documents
    #[arg(long)]
    recipes: PathBuf,

    /// Task (or biometric) name of the recipe to apply
    #[arg(long)]
    task: String,

    /// Response rows: JSON array of objects, or TSV with a header
    #[arg(long)]
    rows: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "tsv")]
    format: OutputFormat,

    /// Write a JSON description of the score columns here
    #[arg(long)]
    sidecar: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let mut config = SurveyConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.library {
        config.library.global_root = Some(root);
    }
    if let Some(root) = cli.project {
        config.library.project_root = Some(root);
    }

    match cli.command {
        Commands::Templates(args) => run_templates(&args, &config),
        Commands::Match(args) => run_match(args, config),
        Commands::Validate(args) => run_validate(&args),
        Commands::Score(args) => run_score(&args, &config),
    }
}

fn load_library(config: &SurveyConfig) -> Result<LibraryIndex> {
    let roots = config.library.roots();
    if roots.global.is_none() && roots.project.is_none() {
        bail!("No template library configured (use --library or library.global_root)");
    }
    let (index, report) = LibraryIndex::load(&roots).context("Failed to load template library")?;
    log::info!(
        "Indexed {} template(s), skipped {}",
        report.loaded,
        report.skipped.len()
    );
    Ok(index)
}

fn run_templates(args: &TemplatesArgs, config: &SurveyConfig) -> Result<()> {
    let index = load_library(config)?;

    if args.json {
        let entries: Vec<_> = index
            .all()
            .map(|entry| {
                json!({
                    "key": entry.key,
                    "kind": entry.kind.as_str(),
                    "source": entry.source.as_str(),
                    "items": entry.signature().len(),
                    "path": entry.path,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("key\tkind\tsource\titems");
    for entry in index.all() {
        println!(
            "{}\t{}\t{}\t{}",
            entry.key,
            entry.kind.as_str(),
            entry.source.as_str(),
            entry.signature().len()
        );
    }
    Ok(())
}

fn run_match(args: MatchArgs, mut config: SurveyConfig) -> Result<()> {
    if let Some(policy) = args.unmatched {
        config.matching.unmatched_policy = policy.as_domain();
    }

    let mut group = match &args.group {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read group {}", path.display()))?;
            serde_json::from_str::<ImportedGroup>(&raw)
                .with_context(|| format!("Invalid group file {}", path.display()))?
        }
        None => ImportedGroup::from_codes(
            args.items
                .iter()
                .map(|code| code.trim())
                .filter(|code| !code.is_empty()),
        ),
    };
    if let Some(label) = args.label {
        group.label = Some(label);
    }

    let index = load_library(&config)?;
    let engine = MatchEngine::try_new(&index, config.matching.clone())
        .context("Invalid matching configuration")?;

    let found = engine.match_group(&group);
    let diagnostics = engine.check_unmatched(&group, found.as_ref())?;
    let suggested = found
        .as_ref()
        .map_or_else(SuggestedAction::unmatched, |m| m.suggested_action());

    let output = json!({
        "group": group.display_name(),
        "match": found,
        "suggested_action": suggested,
        "diagnostics": diagnostics,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_validate(args: &ValidateArgs) -> Result<()> {
    let check = RecipeLibrary::check(&args.path)
        .with_context(|| format!("Failed to read recipes in {}", args.path.display()))?;

    for issue in &check.issues {
        println!("{issue}");
    }
    let errors = check.issues.iter().filter(|i| i.is_error()).count();
    log::info!(
        "Checked {} recipe file(s): {} error(s), {} warning(s)",
        check.files,
        errors,
        check.issues.len() - errors
    );

    if check.is_fatal() {
        bail!("{errors} recipe validation error(s)");
    }
    Ok(())
}

fn run_score(args: &ScoreArgs, config: &SurveyConfig) -> Result<()> {
    let library = RecipeLibrary::load(&args.recipes)?;
    let recipe = library.get(&args.task)?;

    let rows = rows::read_rows(&args.rows, &config.scoring.id_column)?;
    let table = evaluate(recipe, &rows, &config.eval_options());

    match args.format {
        OutputFormat::Tsv => {
            let tsv = table
                .to_tsv(&config.scoring.id_column, &config.scoring.na_token)
                .context("Failed to render score table")?;
            print!("{tsv}");
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&table.to_json())?),
    }

    if let Some(path) = &args.sidecar {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&recipe.sidecar())?)
            .with_context(|| format!("Failed to write sidecar {}", path.display()))?;
    }
    Ok(())
}
