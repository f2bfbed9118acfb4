//! Outline parsing for outlinekb.
//!
//! Turns an indented bullet outline (`##` topics, `###` subtopics, `-` note
//! titles, `- 钩子:` hooks, `*italic*` core concepts) into a [`ParsedOutline`],
//! and provides the file-name sanitizer used for every generated path and link.
//!
//! [`ParsedOutline`]: outlinekb_shared::ParsedOutline

mod parser;
mod sanitize;

pub use parser::{OutlineParser, ParseOptions, ParseState, parse, strip_hook_marker};
pub use sanitize::sanitize_file_name;
