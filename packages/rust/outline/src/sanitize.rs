//! File-name sanitization shared by folder names, note stems, and link targets.

use std::sync::LazyLock;

use regex::Regex;

/// Characters that are illegal in file names on at least one major platform.
static ILLEGAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("illegal-chars regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Strip path-illegal characters and collapse whitespace runs to one space.
///
/// The result is used verbatim both as a file stem and inside `[[...]]` links,
/// so a note's link always resolves to its file. Names made only of dots
/// (`.`, `..`) would address the parent folder and come back empty.
/// May return an empty string.
pub fn sanitize_file_name(name: &str) -> String {
    let stripped = ILLEGAL_RE.replace_all(name, "");
    let collapsed = WHITESPACE_RE.replace_all(stripped.trim(), " ");
    if collapsed.chars().all(|c| c == '.') {
        return String::new();
    }
    collapsed.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_illegal_characters() {
        assert_eq!(sanitize_file_name("Note: Part/1?"), "Note Part1");
        assert_eq!(sanitize_file_name(r#"a\b*c"d<e>f|g"#), "abcdefg");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(sanitize_file_name("  Sub \t  A1  "), "Sub A1");
        assert_eq!(sanitize_file_name("a : b"), "a b");
    }

    #[test]
    fn keeps_cjk_and_punctuation() {
        assert_eq!(sanitize_file_name("第一章：概论（上）"), "第一章：概论（上）");
    }

    #[test]
    fn can_become_empty() {
        assert_eq!(sanitize_file_name("???"), "");
    }

    #[test]
    fn dot_only_names_become_empty() {
        assert_eq!(sanitize_file_name("."), "");
        assert_eq!(sanitize_file_name(".."), "");
        assert_eq!(sanitize_file_name(" ... "), "");
        assert_eq!(sanitize_file_name("../.."), "");
        assert_eq!(sanitize_file_name("v1.2"), "v1.2");
        assert_eq!(sanitize_file_name(".hidden"), ".hidden");
    }
}
