use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use flash_search::config::{Config, FileFilterConfig, ProjectConfig};
use flash_search::telemetry::init_logging;
use flash_search::utils::format_number;
use flash_search::{
    diff_results, FileSelector, Freshness, IndexEngine, IndexQueryContentSelector,
    IndexQuerySelector, LiveScanner, RegexContentSelector, ResultState, ScanOutcome,
    SearchResult, SmartContentSelector,
};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, Level};

/// Flash Search - live regex scans and incrementally indexed code search
#[derive(Parser, Debug)]
#[command(name = "flash_search")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a directory tree without an index: [ [ PATH ] FILE_REGEX ] QUERY_REGEX
    Scan {
        #[arg(num_args = 1..=3, required = true, value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Bring a project's indexes in sync with the file system
    Index {
        #[arg(short, long)]
        project: String,

        /// File filter to index (default: every configured filter)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Query a project's index with a regex
    Query {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        filter: String,

        /// Query the index as it is, without reconciling first
        #[arg(long)]
        no_update: bool,

        /// Treat QUERY as a free-text index query instead of a regex
        #[arg(long)]
        raw: bool,

        query: String,
    },

    /// Generate a template configuration file and exit
    Init {
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_logging(log_level);

    if let Command::Init { path } = &args.command {
        return init(path.clone());
    }

    let (config, source) = Config::load(args.config.as_deref())?;
    match source {
        Some(path) => info!(path = %path.display(), "Loaded config"),
        None => info!("No config file found, using defaults"),
    }

    match args.command {
        Command::Scan { args } => scan(&config, &args),
        Command::Index { project, filter } => {
            let project = find_project(&config, &project)?;
            let filters: Vec<&FileFilterConfig> = match &filter {
                Some(name) => vec![find_filter(&config, name)?],
                None => config.file_filters.iter().collect(),
            };
            for filter in filters {
                let engine = open_engine(&config, project, filter)?;
                reconcile(&engine, &config, project, filter)?;
            }
            Ok(())
        }
        Command::Query {
            project,
            filter,
            no_update,
            raw,
            query,
        } => {
            let project = find_project(&config, &project)?;
            let filter = find_filter(&config, &filter)?;
            let engine = open_engine(&config, project, filter)?;
            if raw {
                let selector = IndexQueryContentSelector::new(query.as_str())?;
                run_query(&engine, &config, project, filter, &selector, !no_update)
            } else {
                let selector = SmartContentSelector::with_case(&query, config.search.match_case)?;
                run_query(&engine, &config, project, filter, &selector, !no_update)
            }
        }
        Command::Init { .. } => Ok(()),
    }
}

fn init(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from("flash_search.toml"));
    if path.exists() {
        bail!(
            "Config file already exists: {}\nRemove it first or choose a different path.",
            path.display()
        );
    }

    Config::write_template(&path)?;
    println!("✓ Generated config file: {}", path.display());
    println!("\nAdd your projects to the file, then index one with:");
    println!("  flash_search --config {} index --project <NAME>", path.display());
    Ok(())
}

fn scan(config: &Config, args: &[String]) -> Result<()> {
    let current_dir = std::env::current_dir().context("Failed to read current directory")?;
    let (root, file_regex, query) = match args {
        [query] => (current_dir, None, query),
        [file_regex, query] => (current_dir, Some(file_regex), query),
        [path, file_regex, query] => (current_dir.join(path), Some(file_regex), query),
        _ => bail!("Expected: [ [ PATH ] FILE_REGEX ] QUERY_REGEX"),
    };

    let mut selector_config = config.selector_config();
    if let Some(file_regex) = file_regex {
        selector_config = selector_config.with_include_regex(file_regex.as_str());
    }
    let file_selector = FileSelector::new(&selector_config)?;
    let content_selector = RegexContentSelector::with_case(query, config.search.match_case)?;

    let started = Instant::now();
    let color = std::io::stdout().is_terminal();
    let mut results = LiveScanner::new(config.live_scan_options()).search(
        &root,
        file_selector,
        content_selector,
    );
    let mut count = 0;
    for result in results.by_ref() {
        print_result(&result, None, color);
        count += 1;
    }

    let outcome = results.wait();
    if outcome != ScanOutcome::Completed {
        info!(?outcome, "Scan ended early");
    }
    info!(
        root = %root.display(),
        matches = %format_number(count),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Scan finished"
    );
    Ok(())
}

fn find_project<'a>(config: &'a Config, name: &str) -> Result<&'a ProjectConfig> {
    config.project(name).with_context(|| {
        format!("Unknown project '{name}'. Add it to the [[projects]] section of the config file.")
    })
}

fn find_filter<'a>(config: &'a Config, name: &str) -> Result<&'a FileFilterConfig> {
    config.file_filter(name).with_context(|| {
        let known: Vec<&str> = config.file_filters.iter().map(|f| f.name.as_str()).collect();
        format!("Unknown file filter '{name}'. Known filters: {}", known.join(", "))
    })
}

fn open_engine(config: &Config, project: &ProjectConfig, filter: &FileFilterConfig) -> Result<IndexEngine> {
    let directory = config.index_dir(project, filter);
    IndexEngine::open_or_create(&directory, config.index_options())
        .with_context(|| format!("Failed to open index: {}", directory.display()))
}

/// Reconcile one index, showing a spinner fed by the engine's progress counters.
fn reconcile(
    engine: &IndexEngine,
    config: &Config,
    project: &ProjectConfig,
    filter: &FileFilterConfig,
) -> Result<()> {
    let selector = config.file_selector(filter)?;

    let progress_bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        progress_bar.set_style(style);
    }
    progress_bar.enable_steady_tick(Duration::from_millis(80));

    let done = AtomicBool::new(false);
    let started = Instant::now();
    let run = std::thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::Relaxed) {
                let progress = engine.progress();
                progress_bar.set_message(format!(
                    "{} {}: {} / {} files, {} re-read, {} workers",
                    project.name,
                    filter.name,
                    format_number(progress.files_indexed),
                    format_number(progress.total_files_found),
                    format_number(progress.files_reindexed),
                    progress.active_workers
                ));
                std::thread::sleep(Duration::from_millis(100));
            }
        });
        let run = engine.index_content_in_folder(&project.path, &selector);
        done.store(true, Ordering::Relaxed);
        run
    })?;
    progress_bar.finish_and_clear();

    println!(
        "{} {}: {} files, {} re-read in {:.1}s{}",
        project.name,
        filter.name,
        format_number(run.progress.files_indexed),
        format_number(run.progress.files_reindexed),
        started.elapsed().as_secs_f64(),
        if run.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

fn run_query<C>(
    engine: &IndexEngine,
    config: &Config,
    project: &ProjectConfig,
    filter: &FileFilterConfig,
    selector: &C,
    update: bool,
) -> Result<()>
where
    C: IndexQuerySelector + Clone,
{
    let color = std::io::stdout().is_terminal();
    let before = collect_indexed(engine, config, project, filter, selector)?;

    if !update {
        for result in &before {
            print_result(result, None, color);
        }
        return Ok(());
    }

    reconcile(engine, config, project, filter)?;
    let after = collect_indexed(engine, config, project, filter, selector)?;
    for (result, state) in diff_results(&before, &after) {
        print_result(&result, Some(state), color);
    }
    Ok(())
}

fn collect_indexed<C>(
    engine: &IndexEngine,
    config: &Config,
    project: &ProjectConfig,
    filter: &FileFilterConfig,
    selector: &C,
) -> Result<Vec<SearchResult>>
where
    C: IndexQuerySelector + Clone,
{
    let results = engine.search_indexed(&project.path, config.file_selector(filter)?, selector.clone())?;
    let hit_limit = results.hit_limit();
    let results: Vec<SearchResult> = results.collect();
    if hit_limit {
        tracing::warn!(
            max_results = engine.options().max_results,
            "Candidate limit reached, some matches may be missing"
        );
    }
    Ok(results)
}

fn print_result(result: &SearchResult, state: Option<ResultState>, color: bool) {
    let marker = match state {
        None => "",
        Some(ResultState::Added) => "+ ",
        Some(ResultState::Removed) => "- ",
        Some(ResultState::Unchanged) => "  ",
    };
    let location = format!("{}:{}:", display_path(&result.path), result.line_number);
    let freshness = match result.freshness() {
        Freshness::Live | Freshness::Current => String::new(),
        Freshness::Stale => format!(" [stale since {}]", indexed_at(result)),
        Freshness::Missing => " [missing]".to_string(),
    };

    if !color {
        println!("{marker}{location} {}{freshness}", result.line_content);
        return;
    }

    let mut line = String::with_capacity(result.line_content.len() + 16);
    for (text, matched) in result.segments() {
        if matched {
            line.push_str(&text.green().to_string());
        } else {
            line.push_str(text);
        }
    }
    let marker = match state {
        Some(ResultState::Added) => marker.green().to_string(),
        Some(ResultState::Removed) => marker.red().to_string(),
        _ => marker.to_string(),
    };
    println!(
        "{marker}{} {line}{}",
        location.bright_black(),
        freshness.yellow()
    );
}

fn display_path(path: &Path) -> String {
    match std::env::current_dir() {
        Ok(current) => path
            .strip_prefix(&current)
            .unwrap_or(path)
            .display()
            .to_string(),
        Err(_) => path.display().to_string(),
    }
}

fn indexed_at(result: &SearchResult) -> String {
    result
        .last_indexed_timestamp
        .map(|ticks| {
            DateTime::from_timestamp_nanos(ticks)
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}
