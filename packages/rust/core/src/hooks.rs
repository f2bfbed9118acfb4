//! Hook filler.
//!
//! Answers `- 钩子:` questions with a completion service, using a folder of
//! notes as context, and writes each answer as a quote line directly under
//! its question.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use outlinekb_completion::CompletionService;
use outlinekb_outline::strip_hook_marker;
use outlinekb_shared::{HookAnswers, OutlineKbError, ParsedOutline, Result};

use crate::materializer::write_atomic;
use crate::source::read_text;

/// Role sent as the system message on every hook request.
pub const SYSTEM_ROLE: &str = "你是一位知识渊博、善于总结的学者。";

/// Written in place of an answer when the service call fails.
pub const FAILURE_PLACEHOLDER: &str = "(AI 内容生成失败，请检查 API 密钥、网络或账户余额)";

const BULLET_MARKER: &str = "- ";

static LINE_BREAKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*(?:\r\n|\r|\n)+[ \t]*").expect("line-break regex"));

// ---------------------------------------------------------------------------
// Tasks & results
// ---------------------------------------------------------------------------

/// One question to answer, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookTask {
    /// Zero-based line the answer goes under.
    pub line_index: usize,
    pub question: String,
}

/// Outcome of a single hook task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HookOutcome {
    pub line_index: usize,
    pub question: String,
    /// Final text inserted after `> `; the placeholder on failure.
    pub answer: String,
    /// Service error, if the call failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HookOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// How a fill run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStatus {
    /// Hooks answered and the note rewritten.
    Filled,
    /// Context folder yielded no text; note untouched.
    ContextEmpty,
    /// Note has no hook lines; note untouched.
    NoHooks,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HookFillReport {
    pub note_path: PathBuf,
    pub status: FillStatus,
    /// Number of context files read.
    pub context_files: usize,
    pub outcomes: Vec<HookOutcome>,
}

impl HookFillReport {
    pub fn answered(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_failure()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// Configuration for [`fill_hooks`].
#[derive(Debug, Clone)]
pub struct FillHooksConfig {
    /// Markdown file whose hooks get answered.
    pub note_path: PathBuf,
    /// Folder walked recursively for context.
    pub context_dir: PathBuf,
    /// Extension of context files (no dot).
    pub context_extension: String,
    pub temperature: f32,
}

/// Progress callback for hook answering.
pub trait HookProgress: Send + Sync {
    /// Called before each service call.
    fn hook_started(&self, question: &str, current: usize, total: usize);
    /// Called after each task, successful or not.
    fn hook_finished(&self, outcome: &HookOutcome);
}

/// No-op hook progress.
pub struct SilentHookProgress;

impl HookProgress for SilentHookProgress {
    fn hook_started(&self, _question: &str, _current: usize, _total: usize) {}
    fn hook_finished(&self, _outcome: &HookOutcome) {}
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Answer every hook in `config.note_path` and rewrite the note in place.
///
/// The note is left byte-identical when the context is empty or when it has
/// no hooks. Individual service failures become placeholder answers.
#[instrument(skip_all, fields(note = %config.note_path.display(), context = %config.context_dir.display()))]
pub async fn fill_hooks<S: CompletionService>(
    config: &FillHooksConfig,
    service: &S,
    progress: &dyn HookProgress,
) -> Result<HookFillReport> {
    if !config.note_path.is_file() {
        return Err(OutlineKbError::input_missing(format!(
            "note file not found: {}",
            config.note_path.display()
        )));
    }
    if !config.context_dir.is_dir() {
        return Err(OutlineKbError::input_missing(format!(
            "context folder not found: {}",
            config.context_dir.display()
        )));
    }

    let gathered = gather_context(
        &config.context_dir,
        &config.context_extension,
        Some(&config.note_path),
    );

    let mut report = HookFillReport {
        note_path: config.note_path.clone(),
        status: FillStatus::ContextEmpty,
        context_files: gathered.files,
        outcomes: Vec::new(),
    };

    if gathered.text.trim().is_empty() {
        warn!("context is empty, note left untouched");
        return Ok(report);
    }

    let original = read_text(&config.note_path)?;
    let lines: Vec<&str> = original.split_inclusive('\n').collect();
    let tasks = plan_hook_tasks(&lines);

    if tasks.is_empty() {
        info!("no hooks in note, nothing to do");
        report.status = FillStatus::NoHooks;
        return Ok(report);
    }

    info!(hooks = tasks.len(), context_files = gathered.files, "filling hooks");

    let outcomes = run_hook_tasks(
        service,
        &gathered.text,
        &tasks,
        config.temperature,
        progress,
    )
    .await;

    let rewritten = rewrite_lines(&lines, &outcomes);
    write_atomic(&config.note_path, &rewritten)?;

    report.status = FillStatus::Filled;
    report.outcomes = outcomes;

    info!(
        answered = report.answered(),
        failed = report.failed(),
        "hook filling complete"
    );

    Ok(report)
}

/// Answer every hook of a parsed outline, keyed by raw note title.
///
/// Titles are visited in outline order; answers line up index-for-index with
/// `outline.hooks`.
#[instrument(skip_all, fields(hooks = outline.stats.hooks))]
pub async fn answer_outline_hooks<S: CompletionService>(
    service: &S,
    context: &str,
    outline: &ParsedOutline,
    temperature: f32,
    progress: &dyn HookProgress,
) -> HookAnswers {
    let mut titles: Vec<&str> = Vec::new();
    for title in outline
        .topics
        .iter()
        .flat_map(|t| &t.subtopics)
        .flat_map(|s| &s.notes)
    {
        if outline.hooks.contains_key(title) && !titles.contains(&title.as_str()) {
            titles.push(title);
        }
    }

    // Flatten into one ordered task list; line_index is the position in it.
    let mut owners: Vec<&str> = Vec::new();
    let mut tasks: Vec<HookTask> = Vec::new();
    for title in &titles {
        for question in outline.hooks_for(title) {
            tasks.push(HookTask {
                line_index: tasks.len(),
                question: question.clone(),
            });
            owners.push(title);
        }
    }

    let outcomes = run_hook_tasks(service, context, &tasks, temperature, progress).await;

    let mut answers = HookAnswers::new();
    for (owner, outcome) in owners.into_iter().zip(outcomes) {
        answers.entry(owner.to_string()).or_default().push(outcome.answer);
    }
    answers
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Concatenated context text plus the number of files it came from.
#[derive(Debug, Clone, Default)]
pub struct GatheredContext {
    pub text: String,
    pub files: usize,
}

/// Read every `*.{extension}` file under `dir` in sorted order.
///
/// `exclude` is compared after canonicalization so the target note never
/// feeds its own context. Unreadable files are logged and skipped.
pub fn gather_context(dir: &Path, extension: &str, exclude: Option<&Path>) -> GatheredContext {
    let excluded = exclude.and_then(|p| p.canonicalize().ok());
    let mut gathered = GatheredContext::default();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable context entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if !ext_ok {
            continue;
        }
        if excluded.is_some() && path.canonicalize().ok() == excluded {
            debug!(path = %path.display(), "target note excluded from context");
            continue;
        }

        match read_text(path) {
            Ok(content) => {
                let name = entry.file_name().to_string_lossy();
                gathered
                    .text
                    .push_str(&format!("--- 来自文件: {name} ---\n{content}\n\n"));
                gathered.files += 1;
                debug!(path = %path.display(), bytes = content.len(), "context file read");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read context file, skipping");
            }
        }
    }

    gathered
}

/// Find hook lines. `lines` are raw lines, endings included.
pub fn plan_hook_tasks(lines: &[&str]) -> Vec<HookTask> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(line_index, line)| {
            let item = line.trim().strip_prefix(BULLET_MARKER)?;
            let question = strip_hook_marker(item.trim_start())?;
            Some(HookTask {
                line_index,
                question: question.to_string(),
            })
        })
        .collect()
}

/// User prompt for one hook question.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "你是一位知识渊博的学者。请根据以下提供的学习材料，用简洁、启发性的语言，回答下面的问题。\n\n\
         # 学习材料 (上下文):\n{context}\n\n\
         # 需要回答的问题:\n{question}\n\n\
         # 你的回答 (请直接针对问题进行回答，不要说“根据提供的材料...”或类似的话):\n"
    )
}

/// Run tasks strictly in order, one awaited call at a time.
pub async fn run_hook_tasks<S: CompletionService>(
    service: &S,
    context: &str,
    tasks: &[HookTask],
    temperature: f32,
    progress: &dyn HookProgress,
) -> Vec<HookOutcome> {
    let total = tasks.len();
    let mut outcomes = Vec::with_capacity(total);

    for (i, task) in tasks.iter().enumerate() {
        progress.hook_started(&task.question, i + 1, total);

        let prompt = build_prompt(context, &task.question);
        let outcome = match service.complete(SYSTEM_ROLE, &prompt, temperature).await {
            Ok(answer) => {
                debug!(question = %task.question, answer_len = answer.len(), "hook answered");
                HookOutcome {
                    line_index: task.line_index,
                    question: task.question.clone(),
                    answer: collapse_line_breaks(&answer),
                    error: None,
                }
            }
            Err(e) => {
                warn!(question = %task.question, error = %e, "hook completion failed");
                HookOutcome {
                    line_index: task.line_index,
                    question: task.question.clone(),
                    answer: FAILURE_PLACEHOLDER.to_string(),
                    error: Some(e.to_string()),
                }
            }
        };

        progress.hook_finished(&outcome);
        outcomes.push(outcome);
    }

    outcomes
}

/// Join a multi-line answer into one line.
pub fn collapse_line_breaks(answer: &str) -> String {
    LINE_BREAKS_RE.replace_all(answer.trim(), " ").into_owned()
}

/// Original lines verbatim, with `> answer` inserted after each hook line.
pub fn rewrite_lines(lines: &[&str], outcomes: &[HookOutcome]) -> String {
    let extra: usize = outcomes.iter().map(|o| o.answer.len() + 4).sum();
    let mut out = String::with_capacity(lines.iter().map(|l| l.len()).sum::<usize>() + extra);
    let mut pending = outcomes.iter().peekable();

    for (index, line) in lines.iter().enumerate() {
        out.push_str(line);

        while let Some(outcome) = pending.next_if(|o| o.line_index == index) {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("> ");
            out.push_str(&outcome.answer);
            out.push('\n');
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
