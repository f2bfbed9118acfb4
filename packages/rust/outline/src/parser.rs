//! Single-pass outline parser.
//!
//! Recognized line forms, tested in priority order on each trimmed line:
//! - `## Topic`: opens (or re-opens) a topic, closes the current subtopic
//! - `### Subtopic`: opens a subtopic under the current topic
//! - `*concept*`: core concept, only before the topic's first `### ` line
//! - `- 钩子: question`: hook for the last note title in the open subtopic
//! - `- Note title`: note title in the open subtopic
//!
//! Anything else is ignored; parsing never fails.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};

use outlinekb_shared::{ConceptMode, ParsedOutline, Subtopic, Topic};

use crate::sanitize::sanitize_file_name;

const TOPIC_MARKER: &str = "## ";
const SUBTOPIC_MARKER: &str = "### ";
const BULLET_MARKER: &str = "- ";

/// Hook prefixes, ASCII and full-width colon.
const HOOK_MARKERS: [&str; 2] = ["钩子:", "钩子："];

/// Matches each `*text*` span in a line.
static ITALIC_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*]+)\*").expect("italic span regex"));

// ---------------------------------------------------------------------------
// Options & state
// ---------------------------------------------------------------------------

/// Parser configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub concept_mode: ConceptMode,
}

/// Cursor into the outline being built.
///
/// Indices point into `ParsedOutline::topics` and that topic's `subtopics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseState {
    pub topic: Option<usize>,
    pub subtopic: Option<usize>,
    /// Set by any `### ` line under the current topic, usable or not.
    pub subtopic_seen: bool,
}

/// Incremental parser; feed lines with [`OutlineParser::step`].
#[derive(Debug)]
pub struct OutlineParser {
    options: ParseOptions,
    outline: ParsedOutline,
    state: ParseState,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a whole outline document.
pub fn parse(text: &str, options: &ParseOptions) -> ParsedOutline {
    let mut parser = OutlineParser::new(*options);
    for line in text.lines() {
        parser.step(line);
    }
    parser.finish()
}

/// If `text` starts with a hook marker, return the trimmed question after it.
pub fn strip_hook_marker(text: &str) -> Option<&str> {
    HOOK_MARKERS
        .iter()
        .find_map(|marker| text.strip_prefix(marker))
        .map(str::trim)
}

impl OutlineParser {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            outline: ParsedOutline::default(),
            state: ParseState::default(),
        }
    }

    /// Current cursor, mainly for tests and diagnostics.
    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Process one raw line.
    pub fn step(&mut self, raw: &str) {
        let line = raw.trim_start_matches('\u{feff}').trim();
        if line.is_empty() {
            return;
        }

        if let Some(name) = line.strip_prefix(TOPIC_MARKER) {
            self.open_topic(name);
            return;
        }

        if let Some(name) = line.strip_prefix(SUBTOPIC_MARKER) {
            if let Some(topic) = self.state.topic {
                self.open_subtopic(topic, name);
            }
            return;
        }

        if let (Some(topic), false) = (self.state.topic, self.state.subtopic_seen) {
            let concepts = extract_concepts(line, self.options.concept_mode);
            if !concepts.is_empty() {
                self.outline.topics[topic].concepts.extend(concepts);
                return;
            }
        }

        if let Some(item) = line.strip_prefix(BULLET_MARKER) {
            if let (Some(topic), Some(subtopic)) = (self.state.topic, self.state.subtopic) {
                self.add_bullet(topic, subtopic, item.trim());
            }
            return;
        }

        trace!(line, "ignored outline line");
    }

    /// Consume the parser and return the outline.
    pub fn finish(self) -> ParsedOutline {
        let stats = self.outline.stats;
        debug!(
            topics = stats.topics,
            subtopics = stats.subtopics,
            notes = stats.notes,
            hooks = stats.hooks,
            "outline parsed"
        );
        self.outline
    }

    fn open_topic(&mut self, raw_name: &str) {
        // Every H2 closes the subtopic, even an unusable one.
        self.state = ParseState::default();

        let name = sanitize_file_name(raw_name);
        if name.is_empty() {
            debug!(raw_name, "topic name empty after sanitizing, scope closed");
            return;
        }

        let topics = &mut self.outline.topics;
        let index = match topics.iter().position(|t| t.name == name) {
            Some(existing) => existing,
            None => {
                topics.push(Topic::new(name));
                self.outline.stats.topics += 1;
                topics.len() - 1
            }
        };
        self.state.topic = Some(index);
    }

    fn open_subtopic(&mut self, topic: usize, raw_name: &str) {
        self.state.subtopic = None;
        self.state.subtopic_seen = true;

        let name = sanitize_file_name(raw_name);
        if name.is_empty() {
            debug!(raw_name, "subtopic name empty after sanitizing, scope closed");
            return;
        }

        let subtopics = &mut self.outline.topics[topic].subtopics;
        let index = match subtopics.iter().position(|s| s.name == name) {
            Some(existing) => existing,
            None => {
                subtopics.push(Subtopic::new(name));
                self.outline.stats.subtopics += 1;
                subtopics.len() - 1
            }
        };
        self.state.subtopic = Some(index);
    }

    fn add_bullet(&mut self, topic: usize, subtopic: usize, item: &str) {
        let notes = &mut self.outline.topics[topic].subtopics[subtopic].notes;

        let Some(question) = strip_hook_marker(item) else {
            notes.push(item.to_string());
            self.outline.stats.notes += 1;
            return;
        };

        let Some(title) = notes.last() else {
            debug!(question, "hook before any note title, dropped");
            return;
        };
        if question.is_empty() {
            debug!(title = %title, "empty hook, dropped");
            return;
        }

        self.outline
            .hooks
            .entry(title.clone())
            .or_default()
            .push(question.to_string());
        self.outline.stats.hooks += 1;
    }
}

/// Pull core-concept text out of a trimmed line.
fn extract_concepts(line: &str, mode: ConceptMode) -> Vec<String> {
    match mode {
        ConceptMode::WholeLine => line
            .strip_prefix('*')
            .and_then(|s| s.strip_suffix('*'))
            .map(|inner| inner.trim_matches('*').trim())
            .filter(|inner| !inner.is_empty())
            .map(|inner| vec![inner.to_string()])
            .unwrap_or_default(),
        ConceptMode::InlineSpans => ITALIC_SPAN_RE
            .captures_iter(line)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}
