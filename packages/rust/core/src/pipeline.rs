//! End-to-end `build` pipeline: outline file → parse → (answer hooks) → KB tree.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use outlinekb_completion::CompletionService;
use outlinekb_outline::{ParseOptions, parse};
use outlinekb_shared::{
    HookAnswers, OutlineKbError, OutlineStats, ParsedOutline, Result, WritePolicy,
};

use crate::hooks::{self, HookOutcome, HookProgress};
use crate::materializer::{self, MaterializeConfig, MaterializeProgress, MaterializeReport};
use crate::source::read_text;

/// Configuration for the `build_kb` pipeline.
#[derive(Debug, Clone)]
pub struct BuildKbConfig {
    /// Outline Markdown file.
    pub outline_path: PathBuf,
    /// Directory the knowledge base is written into.
    pub output_root: PathBuf,
    pub write_policy: WritePolicy,
    pub parse: ParseOptions,
    /// Appended to the outline stem to name the overview note.
    pub overview_suffix: String,
}

/// An outline read from disk and parsed.
#[derive(Debug, Clone)]
pub struct LoadedOutline {
    /// Outline file stem.
    pub base_name: String,
    /// Decoded source text.
    pub text: String,
    pub outline: ParsedOutline,
}

/// Result of the `build_kb` pipeline.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildKbResult {
    pub overview_path: PathBuf,
    pub stats: OutlineStats,
    pub report: MaterializeReport,
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each generated file.
    fn file_written(&self, path: &Path, current: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, result: &BuildKbResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn file_written(&self, _path: &Path, _current: usize, _total: usize) {}
    fn done(&self, _result: &BuildKbResult) {}
}

/// Read, decode, and parse the outline. Nothing is written.
#[instrument(skip_all, fields(outline = %config.outline_path.display()))]
pub fn load_outline(config: &BuildKbConfig) -> Result<LoadedOutline> {
    let path = &config.outline_path;
    if !path.is_file() {
        return Err(OutlineKbError::input_missing(format!(
            "outline file not found: {}",
            path.display()
        )));
    }

    let base_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| OutlineKbError::validation(format!("bad outline path: {}", path.display())))?;

    let text = read_text(path)?;
    let outline = parse(&text, &config.parse);

    if outline.topics.is_empty() {
        warn!("outline has no `## ` topics; only the overview will be written");
    }

    Ok(LoadedOutline {
        base_name,
        text,
        outline,
    })
}

/// Answer the outline's hooks before materializing.
///
/// Context comes from `context_dir` when given (the outline itself excluded),
/// otherwise from the outline text.
#[instrument(skip_all, fields(hooks = loaded.outline.stats.hooks))]
pub async fn answer_hooks<S: CompletionService>(
    config: &BuildKbConfig,
    loaded: &LoadedOutline,
    service: &S,
    context_dir: Option<&Path>,
    context_extension: &str,
    temperature: f32,
    progress: &dyn ProgressReporter,
) -> HookAnswers {
    if loaded.outline.stats.hooks == 0 {
        info!("outline has no hooks, skipping completion");
        return HookAnswers::new();
    }

    progress.phase("Gathering hook context");
    let context = match context_dir {
        Some(dir) => {
            hooks::gather_context(dir, context_extension, Some(&config.outline_path)).text
        }
        None => loaded.text.clone(),
    };

    if context.trim().is_empty() {
        warn!("hook context is empty, hooks left unanswered");
        return HookAnswers::new();
    }

    progress.phase("Answering hooks");
    let hook_progress = PipelineHookProgress { inner: progress };
    hooks::answer_outline_hooks(service, &context, &loaded.outline, temperature, &hook_progress)
        .await
}

/// Materialize a loaded outline.
#[instrument(skip_all, fields(outline = %config.outline_path.display(), root = %config.output_root.display()))]
pub fn build_kb(
    config: &BuildKbConfig,
    loaded: &LoadedOutline,
    answers: Option<&HookAnswers>,
    progress: &dyn ProgressReporter,
) -> Result<BuildKbResult> {
    let start = Instant::now();

    if config.output_root.exists() && !config.output_root.is_dir() {
        return Err(OutlineKbError::validation(format!(
            "output path is not a directory: {}",
            config.output_root.display()
        )));
    }

    info!(
        base = %loaded.base_name,
        topics = loaded.outline.stats.topics,
        notes = loaded.outline.stats.notes,
        "starting build pipeline"
    );

    progress.phase("Writing knowledge base");
    let materialize_config = MaterializeConfig {
        output_root: config.output_root.clone(),
        base_name: loaded.base_name.clone(),
        overview_suffix: config.overview_suffix.clone(),
        write_policy: config.write_policy,
    };
    let file_progress = PipelineMaterializeProgress { inner: progress };
    let report = materializer::materialize(
        &loaded.outline,
        &materialize_config,
        answers,
        &file_progress,
    );

    let result = BuildKbResult {
        overview_path: report.overview_path.clone(),
        stats: report.stats,
        report,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        overview = %result.overview_path.display(),
        failed = result.report.failed(),
        elapsed_ms = result.elapsed.as_millis(),
        "build pipeline complete"
    );

    Ok(result)
}

fn serialize_millis<S: serde::Serializer>(
    elapsed: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

// ---------------------------------------------------------------------------
// Progress adapters
// ---------------------------------------------------------------------------

/// Adapts a `ProgressReporter` to the `MaterializeProgress` interface.
struct PipelineMaterializeProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl MaterializeProgress for PipelineMaterializeProgress<'_> {
    fn file_done(&self, path: &Path, current: usize, total: usize) {
        self.inner.file_written(path, current, total);
    }
}

/// Adapts a `ProgressReporter` to the `HookProgress` interface.
struct PipelineHookProgress<'a> {
    inner: &'a dyn ProgressReporter,
}

impl HookProgress for PipelineHookProgress<'_> {
    fn hook_started(&self, question: &str, current: usize, total: usize) {
        self.inner.phase(&format!("[{current}/{total}] {question}"));
    }

    fn hook_finished(&self, _outcome: &HookOutcome) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoService {
        calls: AtomicUsize,
    }

    impl CompletionService for EchoService {
        async fn complete(&self, _system_role: &str, user_prompt: &str, _temperature: f32) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let question = user_prompt
                .split("# 需要回答的问题:\n")
                .nth(1)
                .and_then(|rest| rest.lines().next())
                .unwrap_or_default();
            Ok(format!("answer to {question}"))
        }
    }

    fn make_config(dir: &Path, outline: &str) -> BuildKbConfig {
        let outline_path = dir.join("历史.md");
        std::fs::write(&outline_path, outline).unwrap();
        BuildKbConfig {
            outline_path,
            output_root: dir.join("kb"),
            write_policy: WritePolicy::Overwrite,
            parse: ParseOptions::default(),
            overview_suffix: "学习总览".into(),
        }
    }

    const OUTLINE: &str = "\u{feff}## Topic A\n*Concept 1*\n### Sub A1\n- Note X\n- 钩子: Why X?\n- Note Y\n";

    #[test]
    fn build_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let config = make_config(tmp.path(), OUTLINE);

        let loaded = load_outline(&config).unwrap();
        assert_eq!(loaded.base_name, "历史");
        assert_eq!(loaded.outline.topics[0].name, "Topic A");

        let result = build_kb(&config, &loaded, None, &SilentProgress).unwrap();

        assert_eq!(result.overview_path, tmp.path().join("kb").join("历史学习总览.md"));
        assert!(result.overview_path.is_file());
        assert!(tmp.path().join("kb/Topic A/Sub A1/Note X.md").is_file());
        assert_eq!(result.stats.topics, 1);
        assert_eq!(result.stats.hooks, 1);
        assert_eq!(result.report.failed(), 0);

        let json = serde_json::to_value(&result).unwrap();
        assert!(json["elapsed_ms"].is_u64());
        assert_eq!(json["stats"]["notes"], 2);
    }

    #[test]
    fn missing_outline_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = make_config(tmp.path(), "");
        config.outline_path = tmp.path().join("absent.md");

        let err = load_outline(&config).unwrap_err();
        assert!(matches!(err, OutlineKbError::InputMissing { .. }));
        assert!(!config.output_root.exists());
    }

    #[tokio::test]
    async fn answered_build_renders_answers() {
        let tmp = tempfile::tempdir().unwrap();
        let config = make_config(tmp.path(), OUTLINE);
        let loaded = load_outline(&config).unwrap();
        let service = EchoService {
            calls: AtomicUsize::new(0),
        };

        let answers =
            answer_hooks(&config, &loaded, &service, None, "md", 0.5, &SilentProgress).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(answers["Note X"], vec!["answer to Why X?".to_string()]);

        build_kb(&config, &loaded, Some(&answers), &SilentProgress).unwrap();
        let note = std::fs::read_to_string(tmp.path().join("kb/Topic A/Sub A1/Note X.md")).unwrap();
        assert!(note.starts_with("#### Why X?\n\n> answer to Why X?\n\n"));
    }

    #[tokio::test]
    async fn answer_hooks_skips_service_without_hooks() {
        let tmp = tempfile::tempdir().unwrap();
        let config = make_config(tmp.path(), "## T\n### S\n- N\n");
        let loaded = load_outline(&config).unwrap();
        let service = EchoService {
            calls: AtomicUsize::new(0),
        };

        let answers =
            answer_hooks(&config, &loaded, &service, None, "md", 0.5, &SilentProgress).await;
        assert!(answers.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }
}
