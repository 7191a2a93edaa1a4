use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use organizer_cli::report::{self, PlanSummary};
use organizer_core::config::{self, AppConfig};
use organizer_core::extractor;
use organizer_core::models::{CorrectionKind, FileSignature};
use organizer_core::pipeline::{self, PlanRequest};
use organizer_core::scanner::ScanOptions;
use organizer_core::suggester::{NoopSource, StaticSource, Suggestion, SuggestionSource};
use organizer_core::timing::{Season, Timing};
use organizer_core::{DecisionEngine, FolderHint};
use std::path::{Path, PathBuf};
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    let mut engine = DecisionEngine::open(&cfg);

    let result = match cli.command {
        Commands::Plan {
            dir,
            recursive,
            no_folders,
            suggestions,
            batch_size,
            record,
            json,
            summary,
            fields,
        } => {
            let opts = PlanOptions {
                dir,
                recursive,
                no_folders,
                suggestions,
                batch_size,
                record,
                json,
                summary,
                fields,
            };
            run_plan(&cfg, &mut engine, opts).await
        }
        Commands::Decide {
            file,
            suggestion,
            folder_category,
            accept,
            json,
        } => run_decide(&mut engine, &file, suggestion.as_deref(), folder_category, accept, json),
        Commands::Correct {
            file,
            kind,
            from,
            to,
        } => run_correct(&mut engine, &file, &kind, from, &to),
        Commands::Categories { command } => run_categories(&mut engine, command),
        Commands::Memory { command } => run_memory(&mut engine, command),
        Commands::Cache { command } => run_cache(&mut engine, command),
    };

    for warning in engine.persistence_warnings() {
        eprintln!("warning: {warning}");
    }
    result
}

#[derive(Parser)]
#[command(name = "organizer")]
#[command(about = "Adaptive file categorization", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide a category and destination for every file in a directory (nothing is moved)
    Plan {
        /// Directory to plan; defaults to every `scan.include` root in the config
        dir: Option<PathBuf>,
        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
        /// Decide every file on its own instead of batching folders
        #[arg(long)]
        no_folders: bool,
        /// JSON object of file name -> suggestion, used as the suggestion source
        #[arg(long)]
        suggestions: Option<PathBuf>,
        /// Loose files per suggestion request
        #[arg(long, default_value_t = 3)]
        batch_size: usize,
        /// Count confidently decided files towards memory statistics
        #[arg(long)]
        record: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
        /// Only print the summary line
        #[arg(long)]
        summary: bool,
        /// Comma-separated fields to include in JSON rows
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },
    /// Decide a single file
    Decide {
        file: PathBuf,
        /// Raw suggestion JSON for this file
        #[arg(long)]
        suggestion: Option<String>,
        /// Category chosen for the file's whole folder
        #[arg(long)]
        folder_category: Option<String>,
        /// Count the decision towards memory statistics
        #[arg(long)]
        accept: bool,
        #[arg(long)]
        json: bool,
    },
    /// Record a user correction for a file
    Correct {
        file: PathBuf,
        /// context, description or timestamp
        #[arg(long, default_value = "context")]
        kind: String,
        /// Previous value; defaults to the engine's current decision
        #[arg(long)]
        from: Option<String>,
        /// Chosen value (a category, a description, or YEAR-Season)
        #[arg(long)]
        to: String,
    },
    /// Inspect or extend the category registry
    Categories {
        #[command(subcommand)]
        command: CategoryCommand,
    },
    /// Inspect what was learned from corrections
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
    /// Inspect or clear the result cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CategoryCommand {
    /// List categories in menu order
    List {
        #[arg(long)]
        json: bool,
    },
    /// Add a custom category
    Add { label: String },
    /// Record the year and season a category belongs to
    Timing {
        label: String,
        year: i32,
        season: Season,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// Accuracy and processing statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Learned hints for a file
    Hints { file: PathBuf },
    /// Correction digest handed to suggestion sources
    Prompt { files: Vec<PathBuf> },
    /// Rules suggested by repeated corrections
    Rules,
}

#[derive(Subcommand)]
enum CacheCommand {
    Stats,
    Clear,
}

struct PlanOptions {
    dir: Option<PathBuf>,
    recursive: bool,
    no_folders: bool,
    suggestions: Option<PathBuf>,
    batch_size: usize,
    record: bool,
    json: bool,
    summary: bool,
    fields: Vec<String>,
}

async fn run_plan(cfg: &AppConfig, engine: &mut DecisionEngine, opts: PlanOptions) -> Result<()> {
    let roots: Vec<PathBuf> = match &opts.dir {
        Some(dir) => vec![dir.clone()],
        None => cfg.scan.include.iter().map(PathBuf::from).collect(),
    };
    if roots.is_empty() {
        anyhow::bail!("no directory given and scan.include is empty");
    }
    for root in &roots {
        plan_root(cfg, engine, &opts, root).await?;
    }
    Ok(())
}

async fn plan_root(
    cfg: &AppConfig,
    engine: &mut DecisionEngine,
    opts: &PlanOptions,
    root: &Path,
) -> Result<()> {
    let source: Box<dyn SuggestionSource> = match &opts.suggestions {
        Some(path) => Box::new(StaticSource::load(path)?),
        None => Box::new(NoopSource),
    };
    let request = PlanRequest {
        root: root.to_path_buf(),
        scan: ScanOptions::from_config(&cfg.scan, opts.recursive),
        min_folder_files: (!opts.no_folders).then_some(cfg.scan.min_folder_files),
        batch_size: opts.batch_size,
    };

    if opts.record {
        engine.memory_mut().start_session(Utc::now());
    }
    let plan = pipeline::plan(engine, source.as_ref(), &request).await?;
    if opts.record {
        let thresholds = engine.settings().thresholds.clone();
        for file in plan.files().filter(|f| f.decision.is_auto_accept(&thresholds)) {
            engine.record_acceptance(&file.decision);
        }
        if let Some(session) = engine.memory_mut().end_session(Utc::now()) {
            tracing::info!(files = session.files_processed, "session recorded");
        }
    }

    let summary = PlanSummary::of(&plan);
    if opts.json {
        let fields = report::parse_fields(&opts.fields);
        let fields = if fields.is_empty() {
            report::DEFAULT_FIELDS.iter().map(|s| s.to_string()).collect()
        } else {
            fields
        };
        let rows = report::filter_fields(report::plan_rows(&plan), &fields);
        let out = serde_json::json!({
            "root": root.display().to_string(),
            "summary": summary,
            "files": rows,
            "series": plan.series,
            "warnings": plan.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if opts.summary {
        println!("{}: {summary}", root.display());
    } else {
        for folder in &plan.folders {
            let label = folder
                .resolution
                .as_ref()
                .map(|r| format!("{} ({})", r.category, r.reason()))
                .unwrap_or_else(|| "no folder signal".to_string());
            println!("[{}] {} files: {}", folder.name, folder.files.len(), label);
            for file in &folder.files {
                println!("  {}", report::decision_line(&file.signature.file_name(), &file.decision, &file.placement));
            }
        }
        for file in &plan.loose {
            println!("{}", report::decision_line(&file.signature.file_name(), &file.decision, &file.placement));
        }
        println!("{summary}");
        for warning in &plan.warnings {
            warn!("{warning}");
        }
    }
    Ok(())
}

fn signature(file: &Path) -> Result<FileSignature> {
    extractor::signature_for(file).with_context(|| format!("reading {}", file.display()))
}

fn run_decide(
    engine: &mut DecisionEngine,
    file: &Path,
    suggestion: Option<&str>,
    folder_category: Option<String>,
    accept: bool,
    json: bool,
) -> Result<()> {
    let sig = signature(file)?;
    let suggestion = suggestion
        .map(|raw| -> Result<Suggestion> {
            let value: serde_json::Value =
                serde_json::from_str(raw).context("suggestion is not valid JSON")?;
            Ok(Suggestion::from_value(&value))
        })
        .transpose()?;
    let hint = folder_category.map(FolderHint::Manual);

    let decision = engine.decide(&sig, suggestion.as_ref(), hint.as_ref());
    let placement = engine.place(&sig, &decision);
    if accept {
        engine.record_acceptance(&decision);
    }

    if json {
        let row = report::decision_row(&decision, &placement);
        println!("{}", serde_json::to_string_pretty(&row)?);
    } else {
        println!("{}", report::decision_line(&sig.file_name(), &decision, &placement));
        for reason in &decision.reasons {
            println!("  - {reason}");
        }
        for alt in &decision.alternatives {
            println!("  alt: {} {:.0}% ({})", alt.category, alt.confidence * 100.0, alt.provenance);
        }
    }
    Ok(())
}

fn run_correct(
    engine: &mut DecisionEngine,
    file: &Path,
    kind: &str,
    from: Option<String>,
    to: &str,
) -> Result<()> {
    let kind: CorrectionKind = kind.parse()?;
    let sig = signature(file)?;
    let current = engine.decide(&sig, None, None);

    match kind {
        CorrectionKind::Context => {
            let mut prior = current;
            if let Some(from) = from {
                prior.category = from;
            }
            let decision = engine.apply_override(&sig, &prior, to);
            println!("{}: {} -> {}", sig.file_name(), prior.category, decision.category);
        }
        CorrectionKind::Description => {
            let prior = from.unwrap_or(current.description);
            engine.record_correction(&sig, kind, &prior, to);
            println!("{}: description '{prior}' -> '{to}'", sig.file_name());
        }
        CorrectionKind::Timestamp => {
            let timing: Timing = to.parse()?;
            let prior = from.unwrap_or_else(|| {
                engine
                    .timing_of(&sig, &current, Utc::now())
                    .label()
            });
            engine.record_correction(&sig, kind, &prior, &timing.label());
            let effective = engine.override_timing(&current.category, timing);
            println!("{}: {} now files under {}", sig.file_name(), current.category, effective.label());
        }
    }
    Ok(())
}

fn run_categories(engine: &mut DecisionEngine, command: CategoryCommand) -> Result<()> {
    match command {
        CategoryCommand::List { json } => {
            let entries = engine.categories().entries();
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for (i, entry) in entries.iter().enumerate() {
                    match entry.timing {
                        Some(t) => println!("{:>3}. {} ({})", i + 1, entry.label, t.label()),
                        None => println!("{:>3}. {}", i + 1, entry.label),
                    }
                }
            }
        }
        CategoryCommand::Add { label } => {
            if engine.categories_mut().add(&label) {
                println!("added {}", label.trim());
            } else {
                println!("{} already exists or is empty", label.trim());
            }
        }
        CategoryCommand::Timing {
            label,
            year,
            season,
        } => {
            let timing = Timing::new(year, season);
            engine.categories_mut().record_timing(&label, timing);
            println!("{label} -> {}", timing.label());
        }
    }
    Ok(())
}

fn run_memory(engine: &mut DecisionEngine, command: MemoryCommand) -> Result<()> {
    match command {
        MemoryCommand::Stats { json } => {
            let stats = engine.memory().accuracy_stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "accuracy {:.1}%: files={}, corrections={}, auto={}, pattern={}, cached={}",
                    stats.overall_accuracy,
                    stats.total_files,
                    stats.corrections,
                    stats.auto_accepted,
                    stats.pattern_matched,
                    stats.cache_hits
                );
                for session in &stats.recent_sessions {
                    println!(
                        "  {} files={} accuracy={:.1}%",
                        session.started_at.format("%Y-%m-%d %H:%M"),
                        session.files_processed,
                        session.accuracy
                    );
                }
            }
        }
        MemoryCommand::Hints { file } => {
            let sig = signature(&file)?;
            let hints = engine.memory().relevant_context(&sig);
            println!("{}", serde_json::to_string_pretty(&hints)?);
        }
        MemoryCommand::Prompt { files } => {
            let sigs = files
                .iter()
                .map(|f| signature(f))
                .collect::<Result<Vec<_>>>()?;
            let text = engine.memory().prompt_context(&sigs);
            if text.is_empty() {
                println!("no corrections recorded yet");
            } else {
                println!("{text}");
            }
        }
        MemoryCommand::Rules => {
            let rules = engine.memory().suggest_pattern_rules();
            if rules.is_empty() {
                println!("no rule suggestions yet");
            }
            for rule in rules {
                println!("{} ({})", rule.pattern, rule.reason);
            }
        }
    }
    Ok(())
}

fn run_cache(engine: &mut DecisionEngine, command: CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Stats => {
            let stats = engine.cache().stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        CacheCommand::Clear => {
            let removed = engine.cache().len();
            engine.cache_mut().clear();
            println!("removed {removed} cache entries");
        }
    }
    Ok(())
}
