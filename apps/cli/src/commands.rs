//! CLI definition, routing, and tracing setup.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use outlinekb_completion::ChatCompletionClient;
use outlinekb_core::pipeline::{
    BuildKbConfig, BuildKbResult, ProgressReporter, answer_hooks, build_kb, load_outline,
};
use outlinekb_core::source::detect_outline;
use outlinekb_outline::ParseOptions;
use outlinekb_shared::{
    AppConfig, ConceptMode, ItemStatus, WritePolicy, load_config, load_config_from,
    resolve_api_key,
};

/// Crates whose logs are shown at the chosen verbosity.
const LOG_TARGETS: [&str; 5] = [
    "outlinekb",
    "outlinekb_core",
    "outlinekb_outline",
    "outlinekb_completion",
    "outlinekb_shared",
];

const OUTLINE_GUIDE: &str = "\
Outline format:
  ## Topic            top-level module, becomes a folder
  *Core concept*      italic line before the first ### of a topic,
                      listed in that topic's MOC notes
  ### Subtopic        folder inside the topic, gets '<Subtopic> MOC.md'
  - Note title        one atomic note per bullet
  - 钩子: Question    hook for the note title above it

Generated layout:
  <output>/<outline>学习总览.md
  <output>/<Topic>/<Subtopic>/<Subtopic> MOC.md
  <output>/<Topic>/<Subtopic>/<Note title>.md

With no OUTLINE, the current directory is searched for an outline file.";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// outlinekb: turn a Markdown outline into a linked knowledge base.
#[derive(Parser, Debug)]
#[command(
    name = "outlinekb",
    version,
    about = "Turn a Markdown study outline into an Obsidian-style knowledge base.",
    long_about = None,
    after_long_help = OUTLINE_GUIDE,
)]
pub(crate) struct Cli {
    /// Outline file (auto-detected in the current directory if omitted).
    pub outline: Option<PathBuf>,

    /// Output directory (defaults to the outline's directory).
    pub output: Option<PathBuf>,

    /// Config file (defaults to ~/.outlinekb/outlinekb.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Leave files that already exist untouched.
    #[arg(long)]
    pub skip_existing: bool,

    /// Collect every *italic* span in a concept line, not only whole-line italics.
    #[arg(long)]
    pub concept_spans: bool,

    /// Answer hooks with the completion service and write answers into notes.
    #[arg(long)]
    pub answer_hooks: bool,

    /// Folder of notes used as hook context (defaults to the outline text).
    #[arg(long, value_name = "DIR", requires = "answer_hooks")]
    pub context: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long)]
    pub json: bool,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// `outlinekb help` as the sole argument behaves like `--help` instead of
/// naming an outline file.
pub(crate) fn is_help_alias(args: &[OsString]) -> bool {
    matches!(args, [_, arg] if arg == "help")
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let directives = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Build command
// ---------------------------------------------------------------------------

/// Run the build.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    let cwd = std::env::current_dir()
        .map_err(|e| eyre!("cannot determine working directory: {e}"))?;

    let outline_path = match &cli.outline {
        Some(path) => path.clone(),
        None => detect_outline(&cwd, &config.outline, &config.build.overview_suffix)?,
    };
    let output_root = match &cli.output {
        Some(path) => path.clone(),
        None => outline_dir(&outline_path).unwrap_or(cwd),
    };

    let build_config = build_config_from(&cli, &config, outline_path, output_root);

    info!(
        outline = %build_config.outline_path.display(),
        output = %build_config.output_root.display(),
        "building knowledge base"
    );

    let loaded = load_outline(&build_config)?;
    let reporter = CliProgress::new(cli.json);

    let answers = if cli.answer_hooks {
        let api_key = resolve_api_key(&config.completion)?;
        let client = ChatCompletionClient::new(&config.completion, api_key)?;
        let answers = answer_hooks(
            &build_config,
            &loaded,
            &client,
            cli.context.as_deref(),
            &config.completion.context_extension,
            config.completion.temperature,
            &reporter,
        )
        .await;
        Some(answers)
    } else {
        None
    };

    let result = build_kb(&build_config, &loaded, answers.as_ref(), &reporter)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    let failed = result.report.failed();
    if failed > 0 {
        return Err(eyre!("{failed} item(s) could not be written"));
    }

    Ok(())
}

/// Merge config-file values with CLI overrides.
fn build_config_from(
    cli: &Cli,
    config: &AppConfig,
    outline_path: PathBuf,
    output_root: PathBuf,
) -> BuildKbConfig {
    let write_policy = if cli.skip_existing {
        WritePolicy::SkipExisting
    } else {
        config.build.write_policy
    };
    let concept_mode = if cli.concept_spans {
        ConceptMode::InlineSpans
    } else {
        config.outline.concept_mode
    };

    BuildKbConfig {
        outline_path,
        output_root,
        write_policy,
        parse: ParseOptions { concept_mode },
        overview_suffix: config.build.overview_suffix.clone(),
    }
}

/// Directory holding the outline, if the path has a non-empty parent.
fn outline_dir(outline: &Path) -> Option<PathBuf> {
    outline
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn print_summary(result: &BuildKbResult) {
    let stats = &result.stats;
    let report = &result.report;

    println!();
    println!("  Knowledge base built!");
    println!("  Topics:     {}", stats.topics);
    println!("  Subtopics:  {}", stats.subtopics);
    println!("  Notes:      {}", stats.notes);
    println!("  Hooks:      {}", stats.hooks);
    println!(
        "  Files:      {} written, {} skipped, {} failed",
        report.written(),
        report.skipped(),
        report.failed()
    );
    println!("  Overview:   {}", result.overview_path.display());
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());

    for outcome in report.failures() {
        if let ItemStatus::Failed { reason } = &outcome.status {
            println!("  ! {}: {reason}", outcome.path.display());
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(hidden: bool) -> Self {
        if hidden {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn file_written(&self, path: &Path, current: usize, total: usize) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.spinner
            .set_message(format!("Writing [{current}/{total}] {name}"));
    }

    fn done(&self, _result: &BuildKbResult) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn positionals_are_optional() {
        let cli = Cli::try_parse_from(["outlinekb"]).unwrap();
        assert!(cli.outline.is_none());
        assert!(cli.output.is_none());

        let cli = Cli::try_parse_from(["outlinekb", "大纲.md", "out"]).unwrap();
        assert_eq!(cli.outline, Some(PathBuf::from("大纲.md")));
        assert_eq!(cli.output, Some(PathBuf::from("out")));
    }

    #[test]
    fn too_many_positionals_rejected() {
        assert!(Cli::try_parse_from(["outlinekb", "a.md", "out", "extra"]).is_err());
    }

    #[test]
    fn context_requires_answer_hooks() {
        assert!(Cli::try_parse_from(["outlinekb", "a.md", "--context", "notes"]).is_err());
        let cli =
            Cli::try_parse_from(["outlinekb", "a.md", "--answer-hooks", "--context", "notes"])
                .unwrap();
        assert_eq!(cli.context, Some(PathBuf::from("notes")));
    }

    #[test]
    fn flags_override_config() {
        let cli =
            Cli::try_parse_from(["outlinekb", "a.md", "--skip-existing", "--concept-spans"])
                .unwrap();
        let build = build_config_from(
            &cli,
            &AppConfig::default(),
            PathBuf::from("a.md"),
            PathBuf::from("."),
        );
        assert_eq!(build.write_policy, WritePolicy::SkipExisting);
        assert_eq!(build.parse.concept_mode, ConceptMode::InlineSpans);
        assert_eq!(build.overview_suffix, "学习总览");
    }

    #[test]
    fn output_defaults_to_outline_dir() {
        assert_eq!(
            outline_dir(Path::new("notes/大纲.md")),
            Some(PathBuf::from("notes"))
        );
        assert_eq!(outline_dir(Path::new("大纲.md")), None);
    }

    #[test]
    fn long_help_has_outline_guide() {
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("钩子: Question"));
    }

    #[test]
    fn help_alias_only_as_sole_argument() {
        let args = |list: &[&str]| list.iter().map(OsString::from).collect::<Vec<_>>();

        assert!(is_help_alias(&args(&["outlinekb", "help"])));
        assert!(!is_help_alias(&args(&["outlinekb"])));
        assert!(!is_help_alias(&args(&["outlinekb", "help", "out"])));
        assert!(!is_help_alias(&args(&["outlinekb", "help.md"])));
        assert!(!is_help_alias(&args(&["outlinekb", "大纲.md"])));
    }
}
