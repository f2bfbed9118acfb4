//! Core domain types shared by the parser, materializer, and hook filler.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Parsed outline
// ---------------------------------------------------------------------------

/// Hook questions keyed by the raw note title they attach to.
pub type HooksByTitle = BTreeMap<String, Vec<String>>;

/// Answers aligned index-for-index with [`HooksByTitle`].
pub type HookAnswers = BTreeMap<String, Vec<String>>;

/// A top-level (`## `) outline heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Sanitized display name; also the folder name.
    pub name: String,
    /// Italic core concepts collected before the first subtopic.
    pub concepts: Vec<String>,
    /// Subtopics in first-seen order.
    pub subtopics: Vec<Subtopic>,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            concepts: Vec::new(),
            subtopics: Vec::new(),
        }
    }
}

/// A second-level (`### `) outline heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtopic {
    /// Sanitized display name; also the folder name and index-note prefix.
    pub name: String,
    /// Raw note titles in insertion order (duplicates preserved).
    pub notes: Vec<String>,
}

impl Subtopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            notes: Vec::new(),
        }
    }

    /// Name of the generated index note, without extension.
    pub fn moc_name(&self) -> String {
        format!("{} MOC", self.name)
    }
}

/// Counts reported by the parser and echoed into the overview note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineStats {
    pub topics: usize,
    pub subtopics: usize,
    pub notes: usize,
    pub hooks: usize,
}

/// Everything the parser extracts from one outline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedOutline {
    /// Topics in input order (repeated headings merged).
    pub topics: Vec<Topic>,
    /// Hook questions by raw note title.
    pub hooks: HooksByTitle,
    pub stats: OutlineStats,
}

impl ParsedOutline {
    /// Topic name → concepts, for topics that have any.
    pub fn concepts_by_topic(&self) -> BTreeMap<&str, &[String]> {
        self.topics
            .iter()
            .filter(|t| !t.concepts.is_empty())
            .map(|t| (t.name.as_str(), t.concepts.as_slice()))
            .collect()
    }

    /// Hooks attached to a raw note title (empty if none).
    pub fn hooks_for(&self, title: &str) -> &[String] {
        self.hooks.get(title).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How core-concept lines are recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConceptMode {
    /// The whole trimmed line is `*text*`.
    #[default]
    WholeLine,
    /// Every `*text*` span anywhere in the line.
    InlineSpans,
}

/// What the materializer does when a target file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Always regenerate from the outline.
    #[default]
    Overwrite,
    /// Leave existing files untouched.
    SkipExisting,
}

// ---------------------------------------------------------------------------
// Run reports
// ---------------------------------------------------------------------------

/// Kind of filesystem item produced by the materializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Directory,
    IndexNote,
    AtomicNote,
    OverviewNote,
}

/// Result of producing one filesystem item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Directory exists (created or already present).
    Ready,
    /// File written; checksum of the content.
    Written { sha256: String, bytes: usize },
    /// File left untouched under [`WritePolicy::SkipExisting`].
    Skipped,
    Failed { reason: String },
}

/// One directory or file touched by a materialize run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: std::path::PathBuf,
    pub kind: ItemKind,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ItemStatus::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moc_name_appends_suffix() {
        assert_eq!(Subtopic::new("Sub A1").moc_name(), "Sub A1 MOC");
    }

    #[test]
    fn concepts_by_topic_skips_empty() {
        let mut a = Topic::new("A");
        a.concepts.push("Concept 1".into());
        let outline = ParsedOutline {
            topics: vec![a, Topic::new("B")],
            ..Default::default()
        };
        let map = outline.concepts_by_topic();
        assert_eq!(map.len(), 1);
        assert_eq!(map["A"], ["Concept 1".to_string()]);
    }

    #[test]
    fn policy_and_mode_serde_names() {
        let json = serde_json::to_string(&WritePolicy::SkipExisting).unwrap();
        assert_eq!(json, r#""skip-existing""#);
        let mode: ConceptMode = serde_json::from_str(r#""inline-spans""#).unwrap();
        assert_eq!(mode, ConceptMode::InlineSpans);
    }

    #[test]
    fn file_outcome_serializes_flat() {
        let outcome = FileOutcome {
            path: "Topic A/Sub A1/Note X.md".into(),
            kind: ItemKind::AtomicNote,
            status: ItemStatus::Failed {
                reason: "denied".into(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "atomic_note");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "denied");
        assert!(outcome.is_failure());
    }
}
