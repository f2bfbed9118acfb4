//! CLI definition, routing, and tracing setup.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use outlinekb_completion::ChatCompletionClient;
use outlinekb_core::hooks::{FillHooksConfig, FillStatus, HookOutcome, HookProgress, fill_hooks};
use outlinekb_shared::{AppConfig, load_config, load_config_from, resolve_api_key};

const LOG_TARGETS: [&str; 4] = [
    "fill_hooks",
    "outlinekb_core",
    "outlinekb_completion",
    "outlinekb_shared",
];

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// fill-hooks: answer the hook questions in a note.
#[derive(Parser, Debug)]
#[command(
    name = "fill-hooks",
    version,
    about = "Answer `- 钩子:` questions in a Markdown note using a folder of notes as context.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Markdown note whose hooks are answered in place.
    pub note: PathBuf,

    /// Folder searched recursively for context notes.
    pub context_dir: PathBuf,

    /// Config file (defaults to ~/.outlinekb/outlinekb.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Model name override.
    #[arg(long)]
    pub model: Option<String>,

    /// OpenAI-compatible API base override (e.g. https://api.deepseek.com/v1).
    #[arg(long)]
    pub base_url: Option<String>,

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

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
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
// Command
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    apply_overrides(&cli, &mut config);

    let api_key = resolve_api_key(&config.completion)?;
    let client = ChatCompletionClient::new(&config.completion, api_key)?;

    if !cli.note.is_file() {
        return Err(eyre!("note file not found: {}", cli.note.display()));
    }
    if !cli.context_dir.is_dir() {
        return Err(eyre!(
            "context folder not found: {}",
            cli.context_dir.display()
        ));
    }

    let fill_config = FillHooksConfig {
        note_path: cli.note.clone(),
        context_dir: cli.context_dir.clone(),
        context_extension: config.completion.context_extension.clone(),
        temperature: config.completion.temperature,
    };

    info!(
        note = %fill_config.note_path.display(),
        context = %fill_config.context_dir.display(),
        model = %client.model(),
        "filling hooks"
    );

    let progress = CliHookProgress::new();
    let report = fill_hooks(&fill_config, &client, &progress).await?;
    progress.finish();

    println!();
    match report.status {
        FillStatus::ContextEmpty => {
            println!("  Context folder had no usable notes; note left unchanged.");
        }
        FillStatus::NoHooks => {
            println!("  No hooks found; note left unchanged.");
        }
        FillStatus::Filled => {
            println!("  Hooks filled!");
            println!("  Context files: {}", report.context_files);
            println!("  Answered:      {}", report.answered());
            println!("  Failed:        {}", report.failed());
            println!("  Note:          {}", report.note_path.display());
        }
    }
    println!();

    Ok(())
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(model) = &cli.model {
        config.completion.model = model.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.completion.base_url = base_url.clone();
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing the hook being answered; results go above it.
struct CliHookProgress {
    spinner: ProgressBar,
}

impl CliHookProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl HookProgress for CliHookProgress {
    fn hook_started(&self, question: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Answering [{current}/{total}] {question}"));
    }

    fn hook_finished(&self, outcome: &HookOutcome) {
        let mark = if outcome.is_failure() { "✗" } else { "✓" };
        self.spinner
            .println(format!("  {mark} {}", outcome.question));
    }
}
