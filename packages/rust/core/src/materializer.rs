//! Knowledge-base materializer.
//!
//! Takes a parsed outline (and optionally hook answers), then writes the
//! topic/subtopic folder tree, index notes, atomic notes, and the overview.
//!
//! ```text
//! <output_root>/
//! ├── <base>学习总览.md
//! └── <Topic>/
//!     └── <Subtopic>/
//!         ├── <Subtopic> MOC.md
//!         └── <Note>.md
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use outlinekb_outline::sanitize_file_name;
use outlinekb_shared::{
    FileOutcome, HookAnswers, ItemKind, ItemStatus, OutlineKbError, OutlineStats, ParsedOutline,
    Result, Subtopic, Topic, WritePolicy,
};

const NOTE_EXTENSION: &str = "md";

/// Configuration for one materialize run.
#[derive(Debug, Clone)]
pub struct MaterializeConfig {
    /// Directory the tree is written into.
    pub output_root: PathBuf,
    /// Outline file stem; prefixes the overview note name.
    pub base_name: String,
    /// Appended to `base_name` to form the overview note name.
    pub overview_suffix: String,
    pub write_policy: WritePolicy,
}

impl MaterializeConfig {
    /// Overview note name without extension, e.g. `历史学习总览`.
    pub fn overview_name(&self) -> String {
        format!("{}{}", self.base_name, self.overview_suffix)
    }

    pub fn overview_path(&self) -> PathBuf {
        self.output_root
            .join(format!("{}.{NOTE_EXTENSION}", self.overview_name()))
    }
}

/// Everything a materialize run did, item by item.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MaterializeReport {
    pub overview_path: PathBuf,
    pub stats: OutlineStats,
    pub outcomes: Vec<FileOutcome>,
}

impl MaterializeReport {
    pub fn written(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Per-file progress callback.
pub trait MaterializeProgress: Send + Sync {
    /// Called after each file is written, skipped, or failed.
    fn file_done(&self, path: &Path, current: usize, total: usize);
}

/// No-op materialize progress.
pub struct SilentMaterializeProgress;

impl MaterializeProgress for SilentMaterializeProgress {
    fn file_done(&self, _path: &Path, _current: usize, _total: usize) {}
}

/// Write the knowledge-base tree for `outline`.
///
/// Never aborts on a single item: every directory and file gets a
/// [`FileOutcome`], and children of a directory that could not be created
/// are recorded as failed without being attempted.
#[instrument(skip_all, fields(root = %config.output_root.display(), topics = outline.topics.len()))]
pub fn materialize(
    outline: &ParsedOutline,
    config: &MaterializeConfig,
    answers: Option<&HookAnswers>,
    progress: &dyn MaterializeProgress,
) -> MaterializeReport {
    let overview_name = config.overview_name();
    let mut writer = TreeWriter {
        policy: config.write_policy,
        outcomes: Vec::new(),
        files_done: 0,
        files_total: count_files(outline),
        progress,
    };

    info!(
        files = writer.files_total,
        policy = ?config.write_policy,
        "materializing knowledge base"
    );

    let root_ok = writer.ensure_dir(&config.output_root, true);

    for topic in &outline.topics {
        let topic_dir = config.output_root.join(&topic.name);
        let topic_ok = writer.ensure_dir(&topic_dir, root_ok);

        for subtopic in &topic.subtopics {
            let sub_dir = topic_dir.join(&subtopic.name);
            let sub_ok = writer.ensure_dir(&sub_dir, topic_ok);

            let moc_path = sub_dir.join(format!("{}.{NOTE_EXTENSION}", subtopic.moc_name()));
            if sub_ok {
                let moc = render_moc(topic, subtopic, &overview_name);
                writer.write_file(&moc_path, ItemKind::IndexNote, &moc);
            } else {
                writer.blocked(&moc_path, ItemKind::IndexNote);
            }

            for title in &subtopic.notes {
                let stem = sanitize_file_name(title);
                if stem.is_empty() {
                    writer.fail(
                        &sub_dir.join(title),
                        ItemKind::AtomicNote,
                        "note title is empty after sanitizing".into(),
                    );
                    continue;
                }

                let note_path = sub_dir.join(format!("{stem}.{NOTE_EXTENSION}"));
                if !sub_ok {
                    writer.blocked(&note_path, ItemKind::AtomicNote);
                    continue;
                }

                let hooks = outline.hooks_for(title);
                let hook_answers = answers.and_then(|a| a.get(title)).map(Vec::as_slice);
                let note = render_note(subtopic, hooks, hook_answers);
                writer.write_file(&note_path, ItemKind::AtomicNote, &note);
            }
        }
    }

    let overview_path = config.overview_path();
    if root_ok {
        let overview = render_overview(outline, &config.base_name, &overview_name);
        writer.write_file(&overview_path, ItemKind::OverviewNote, &overview);
    } else {
        writer.blocked(&overview_path, ItemKind::OverviewNote);
    }

    let report = MaterializeReport {
        overview_path,
        stats: outline.stats,
        outcomes: writer.outcomes,
    };

    info!(
        written = report.written(),
        skipped = report.skipped(),
        failed = report.failed(),
        "materialize complete"
    );

    report
}

/// Write `content` to `path` via a temporary sibling and rename.
///
/// Returns the SHA-256 of the content as lowercase hex.
pub fn write_atomic(path: &Path, content: &str) -> Result<String> {
    let file_name = path
        .file_name()
        .ok_or_else(|| OutlineKbError::validation(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    std::fs::write(&temp, content).map_err(|e| OutlineKbError::io(&temp, e))?;

    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(OutlineKbError::io(path, e));
    }

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Subtopic index note.
fn render_moc(topic: &Topic, subtopic: &Subtopic, overview: &str) -> String {
    let mut out = String::new();
    let _ = write!(out, "# {}\n\n", subtopic.name);
    let _ = write!(out, "主题：[[{overview}]] > [[{overview}#{}]]\n\n", topic.name);

    if !topic.concepts.is_empty() {
        out.push_str("## 核心概念\n\n");
        for concept in &topic.concepts {
            let _ = writeln!(out, "- {concept}");
        }
        out.push('\n');
    }

    out.push_str("## 相关文章\n\n");
    for stem in subtopic.notes.iter().map(|t| sanitize_file_name(t)) {
        if !stem.is_empty() {
            let _ = writeln!(out, "- [[{stem}]]");
        }
    }

    out.push_str("\n## 链接\n\n");
    let _ = writeln!(out, "- [[{overview}]]");
    out
}

/// Atomic note: hook headings (with answers if known), then the study template.
fn render_note(subtopic: &Subtopic, hooks: &[String], answers: Option<&[String]>) -> String {
    let mut out = String::new();

    for (i, question) in hooks.iter().enumerate() {
        let _ = write!(out, "#### {question}\n\n");
        match answers.and_then(|a| a.get(i)) {
            Some(answer) => {
                let _ = write!(out, "> {answer}\n\n");
            }
            None => out.push('\n'),
        }
    }

    out.push_str("## 摘要\n\n\n");
    out.push_str("## 要点\n\n- \n- \n- \n\n");
    let _ = writeln!(out, "## 链接\n\n- [[{}]]", subtopic.moc_name());
    out
}

/// Root overview note.
fn render_overview(outline: &ParsedOutline, base_name: &str, overview: &str) -> String {
    let stats = &outline.stats;
    let mut out = String::new();

    let _ = write!(out, "# {overview}\n\n");
    let _ = write!(out, "系统性学习 **{base_name}** 的知识中心\n\n");

    out.push_str("## 统计\n\n");
    let _ = writeln!(out, "- **顶级模块**: {}个", stats.topics);
    let _ = writeln!(out, "- **子主题**: {}个", stats.subtopics);
    let _ = writeln!(out, "- **原子笔记**: {}篇", stats.notes);
    let _ = write!(out, "- **知识钩子**: {}个\n\n", stats.hooks);

    out.push_str("## 模块导航\n\n");

    let mut topics: Vec<&Topic> = outline
        .topics
        .iter()
        .filter(|t| !t.subtopics.is_empty())
        .collect();
    topics.sort_by(|a, b| a.name.cmp(&b.name));

    for topic in topics {
        let _ = write!(out, "### {}\n\n", topic.name);
        let mut mocs: Vec<String> = topic.subtopics.iter().map(Subtopic::moc_name).collect();
        mocs.sort();
        for moc in mocs {
            let _ = writeln!(out, "- [[{moc}]]");
        }
        out.push('\n');
    }

    out.push_str("---\n\n> 💡 **链接结构说明**：原子笔记 → MOC笔记 → 学习总览\n");
    out
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Number of files a run will produce (index notes, atomic notes, overview).
fn count_files(outline: &ParsedOutline) -> usize {
    let per_subtopic: usize = outline
        .topics
        .iter()
        .flat_map(|t| &t.subtopics)
        .map(|s| 1 + s.notes.len())
        .sum();
    per_subtopic + 1
}

/// Collects outcomes and applies the write policy.
struct TreeWriter<'a> {
    policy: WritePolicy,
    outcomes: Vec<FileOutcome>,
    files_done: usize,
    files_total: usize,
    progress: &'a dyn MaterializeProgress,
}

impl TreeWriter<'_> {
    /// Create `dir` if its parent is usable; returns whether it is usable now.
    fn ensure_dir(&mut self, dir: &Path, parent_ok: bool) -> bool {
        let status = if !parent_ok {
            blocked_status()
        } else {
            match std::fs::create_dir_all(dir) {
                Ok(()) => {
                    debug!(path = %dir.display(), "directory ready");
                    ItemStatus::Ready
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "failed to create directory");
                    ItemStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        };

        let ok = status == ItemStatus::Ready;
        self.outcomes.push(FileOutcome {
            path: dir.to_path_buf(),
            kind: ItemKind::Directory,
            status,
        });
        ok
    }

    fn write_file(&mut self, path: &Path, kind: ItemKind, content: &str) {
        let status = if self.policy == WritePolicy::SkipExisting && path.exists() {
            debug!(path = %path.display(), "exists, skipped");
            ItemStatus::Skipped
        } else {
            match write_atomic(path, content) {
                Ok(sha256) => {
                    debug!(path = %path.display(), bytes = content.len(), "wrote note");
                    ItemStatus::Written {
                        sha256,
                        bytes: content.len(),
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to write note");
                    ItemStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        };
        self.record_file(path, kind, status);
    }

    fn blocked(&mut self, path: &Path, kind: ItemKind) {
        self.record_file(path, kind, blocked_status());
    }

    fn fail(&mut self, path: &Path, kind: ItemKind, reason: String) {
        warn!(path = %path.display(), %reason, "note not written");
        self.record_file(path, kind, ItemStatus::Failed { reason });
    }

    fn record_file(&mut self, path: &Path, kind: ItemKind, status: ItemStatus) {
        self.files_done += 1;
        self.progress
            .file_done(path, self.files_done, self.files_total);
        self.outcomes.push(FileOutcome {
            path: path.to_path_buf(),
            kind,
            status,
        });
    }
}

fn blocked_status() -> ItemStatus {
    ItemStatus::Failed {
        reason: "parent directory could not be created".into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use outlinekb_outline::{ParseOptions, parse};

    const EXAMPLE: &str = "\
## Topic A
*Concept 1*
### Sub A1
- Note X
- 钩子: Why X?
- Note Y
";

    fn make_config(root: &Path, policy: WritePolicy) -> MaterializeConfig {
        MaterializeConfig {
            output_root: root.to_path_buf(),
            base_name: "kb".into(),
            overview_suffix: "学习总览".into(),
            write_policy: policy,
        }
    }

    fn read(path: impl AsRef<Path>) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn example_produces_documented_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let outline = parse(EXAMPLE, &ParseOptions::default());
        let config = make_config(tmp.path(), WritePolicy::Overwrite);

        let report = materialize(&outline, &config, None, &SilentMaterializeProgress);

        let sub = tmp.path().join("Topic A").join("Sub A1");
        assert!(sub.join("Sub A1 MOC.md").is_file());
        assert!(sub.join("Note X.md").is_file());
        assert!(sub.join("Note Y.md").is_file());
        assert_eq!(report.overview_path, tmp.path().join("kb学习总览.md"));
        assert!(report.overview_path.is_file());

        // root + topic + subtopic dirs, MOC + 2 notes + overview
        assert_eq!(report.outcomes.len(), 7);
        assert_eq!(report.written(), 4);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.stats.notes, 2);
        assert_eq!(report.stats.hooks, 1);
    }

    #[test]
    fn moc_content() {
        let tmp = tempfile::tempdir().unwrap();
        let outline = parse(EXAMPLE, &ParseOptions::default());
        materialize(
            &outline,
            &make_config(tmp.path(), WritePolicy::Overwrite),
            None,
            &SilentMaterializeProgress,
        );

        let moc = read(tmp.path().join("Topic A/Sub A1/Sub A1 MOC.md"));
        assert_eq!(
            moc,
            "# Sub A1\n\n\
             主题：[[kb学习总览]] > [[kb学习总览#Topic A]]\n\n\
             ## 核心概念\n\n- Concept 1\n\n\
             ## 相关文章\n\n- [[Note X]]\n- [[Note Y]]\n\n\
             ## 链接\n\n- [[kb学习总览]]\n"
        );
    }

    #[test]
    fn moc_omits_empty_concepts() {
        let tmp = tempfile::tempdir().unwrap();
        let outline = parse("## T\n### S\n- N\n", &ParseOptions::default());
        materialize(
            &outline,
            &make_config(tmp.path(), WritePolicy::Overwrite),
            None,
            &SilentMaterializeProgress,
        );

        let moc = read(tmp.path().join("T/S/S MOC.md"));
        assert!(!moc.contains("核心概念"));
        assert!(moc.contains("## 相关文章\n\n- [[N]]\n"));
    }

    #[test]
    fn note_content_with_and_without_hooks() {
        let tmp = tempfile::tempdir().unwrap();
        let outline = parse(EXAMPLE, &ParseOptions::default());
        materialize(
            &outline,
            &make_config(tmp.path(), WritePolicy::Overwrite),
            None,
            &SilentMaterializeProgress,
        );

        let template = "## 摘要\n\n\n## 要点\n\n- \n- \n- \n\n## 链接\n\n- [[Sub A1 MOC]]\n";
        let note_x = read(tmp.path().join("Topic A/Sub A1/Note X.md"));
        assert_eq!(note_x, format!("#### Why X?\n\n\n{template}"));

        let note_y = read(tmp.path().join("Topic A/Sub A1/Note Y.md"));
        assert_eq!(note_y, template);
        assert!(!note_y.contains("学习总览"));
    }

    #[test]
    fn answers_rendered_under_hooks() {
        let tmp = tempfile::tempdir().unwrap();
        let outline = parse(EXAMPLE, &ParseOptions::default());
        let mut answers = HookAnswers::new();
        answers.insert("Note X".into(), vec!["Because.".into()]);

        materialize(
            &outline,
            &make_config(tmp.path(), WritePolicy::Overwrite),
            Some(&answers),
            &SilentMaterializeProgress,
        );

        let note_x = read(tmp.path().join("Topic A/Sub A1/Note X.md"));
        assert!(note_x.starts_with("#### Why X?\n\n> Because.\n\n## 摘要"));
    }

    #[test]
    fn overview_content() {
        let tmp = tempfile::tempdir().unwrap();
        let text = "## Zeta\n### Z2\n- a\n### Z1\n- b\n## Alpha\n### A1\n- c\n## Empty\n";
        let outline = parse(text, &ParseOptions::default());
        let report = materialize(
            &outline,
            &make_config(tmp.path(), WritePolicy::Overwrite),
            None,
            &SilentMaterializeProgress,
        );

        let overview = read(&report.overview_path);
        assert!(overview.starts_with("# kb学习总览\n\n系统性学习 **kb** 的知识中心\n\n"));
        assert!(overview.contains(
            "## 统计\n\n- **顶级模块**: 3个\n- **子主题**: 3个\n- **原子笔记**: 3篇\n- **知识钩子**: 0个\n\n"
        ));
        assert!(overview.contains(
            "## 模块导航\n\n### Alpha\n\n- [[A1 MOC]]\n\n### Zeta\n\n- [[Z1 MOC]]\n- [[Z2 MOC]]\n\n---\n"
        ));
        assert!(!overview.contains("### Empty"));
        assert!(overview.ends_with("> 💡 **链接结构说明**：原子笔记 → MOC笔记 → 学习总览\n"));
    }

    #[test]
    fn rerun_is_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let outline = parse(EXAMPLE, &ParseOptions::default());
        let config = make_config(tmp.path(), WritePolicy::Overwrite);

        let first = materialize(&outline, &config, None, &SilentMaterializeProgress);
        let before: Vec<String> = first
            .outcomes
            .iter()
            .filter(|o| o.kind != ItemKind::Directory)
            .map(|o| read(&o.path))
            .collect();

        let second = materialize(&outline, &config, None, &SilentMaterializeProgress);
        let after: Vec<String> = second
            .outcomes
            .iter()
            .filter(|o| o.kind != ItemKind::Directory)
            .map(|o| read(&o.path))
            .collect();

        assert_eq!(before, after);
        assert_eq!(first.outcomes, second.outcomes);
    }

    #[test]
    fn skip_existing_leaves_files_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("Topic A").join("Sub A1");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join("Note X.md"), "my own notes").unwrap();

        let outline = parse(EXAMPLE, &ParseOptions::default());
        let report = materialize(
            &outline,
            &make_config(tmp.path(), WritePolicy::SkipExisting),
            None,
            &SilentMaterializeProgress,
        );

        assert_eq!(read(sub.join("Note X.md")), "my own notes");
        assert_eq!(report.skipped(), 1);
        let skipped = report
            .outcomes
            .iter()
            .find(|o| o.status == ItemStatus::Skipped)
            .unwrap();
        assert_eq!(skipped.path, sub.join("Note X.md"));
        assert!(sub.join("Note Y.md").is_file());
    }

    #[test]
    fn sanitized_title_matches_link() {
        let tmp = tempfile::tempdir().unwrap();
        let outline = parse("## T\n### S\n- Note: Part/1?\n", &ParseOptions::default());
        materialize(
            &outline,
            &make_config(tmp.path(), WritePolicy::Overwrite),
            None,
            &SilentMaterializeProgress,
        );

        assert!(tmp.path().join("T/S/Note Part1.md").is_file());
        let moc = read(tmp.path().join("T/S/S MOC.md"));
        assert!(moc.contains("- [[Note Part1]]\n"));
    }

    #[test]
    fn empty_stem_recorded_as_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let outline = parse("## T\n### S\n- ???\n- ok\n", &ParseOptions::default());
        let report = materialize(
            &outline,
            &make_config(tmp.path(), WritePolicy::Overwrite),
            None,
            &SilentMaterializeProgress,
        );

        assert_eq!(report.failed(), 1);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.kind, ItemKind::AtomicNote);
        assert!(tmp.path().join("T/S/ok.md").is_file());
    }

    #[test]
    fn dot_names_stay_inside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("kb");
        let outline = parse(
            "## ..\n### escaped\n- n\n## T\n### S\n- ..\n- ok\n",
            &ParseOptions::default(),
        );
        let report = materialize(
            &outline,
            &make_config(&root, WritePolicy::Overwrite),
            None,
            &SilentMaterializeProgress,
        );

        assert!(!tmp.path().join("escaped").exists());
        assert!(!root.join("T/S/...md").exists());
        assert!(root.join("T/S/ok.md").is_file());
        assert_eq!(report.failed(), 1);
        assert!(report.outcomes.iter().all(|o| o.path.starts_with(&root)));
    }

    #[test]
    fn blocked_directory_fails_children() {
        let tmp = tempfile::tempdir().unwrap();
        // A file where the topic directory should go.
        std::fs::write(tmp.path().join("T"), "not a dir").unwrap();

        let outline = parse("## T\n### S\n- a\n- b\n", &ParseOptions::default());
        let report = materialize(
            &outline,
            &make_config(tmp.path(), WritePolicy::Overwrite),
            None,
            &SilentMaterializeProgress,
        );

        // topic dir, subtopic dir, MOC, two notes
        assert_eq!(report.failed(), 5);
        assert!(report.overview_path.is_file());
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("note.md");

        let hash = write_atomic(&path, "hello").unwrap();

        assert_eq!(hash.len(), 64);
        assert_eq!(read(&path), "hello");
        for entry in std::fs::read_dir(tmp.path()).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "temp file left behind: {name}");
        }
    }
}
