//! Reading outline and note files from disk.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use outlinekb_shared::{OutlineConfig, OutlineKbError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Read a text file as UTF-8 (BOM stripped), falling back to GBK.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| OutlineKbError::io(path, e))?;
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    if let Ok(text) = std::str::from_utf8(body) {
        return Ok(text.to_string());
    }

    match encoding_rs::GBK.decode_without_bom_handling_and_without_replacement(body) {
        Some(text) => {
            debug!(path = %path.display(), "decoded as GBK");
            Ok(text.into_owned())
        }
        None => Err(OutlineKbError::Decode {
            path: path.to_path_buf(),
        }),
    }
}

/// Pick the outline file in `dir`.
///
/// Candidates carry the configured extension, and their stem neither starts
/// with an excluded prefix nor ends with the overview suffix (a previously
/// generated overview). The first candidate by name wins.
pub fn detect_outline(dir: &Path, config: &OutlineConfig, overview_suffix: &str) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir).map_err(|e| OutlineKbError::io(dir, e))?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| is_candidate(path, config, overview_suffix))
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(OutlineKbError::input_missing(format!(
            "no .{} outline file found in {}",
            config.extension,
            dir.display()
        ))),
        1 => {
            info!(path = %candidates[0].display(), "outline detected");
            Ok(candidates.swap_remove(0))
        }
        n => {
            warn!(
                count = n,
                chosen = %candidates[0].display(),
                "several outline candidates, using the first by name"
            );
            Ok(candidates.swap_remove(0))
        }
    }
}

fn is_candidate(path: &Path, config: &OutlineConfig, overview_suffix: &str) -> bool {
    let ext_ok = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(&config.extension));
    if !ext_ok {
        return false;
    }

    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    if !overview_suffix.is_empty() && stem.ends_with(overview_suffix) {
        return false;
    }
    !config
        .exclude_prefixes
        .iter()
        .any(|prefix| stem.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "## T\n").unwrap();
    }

    #[test]
    fn read_text_strips_bom() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bom.md");
        std::fs::write(&path, b"\xEF\xBB\xBF## Topic A\n").unwrap();

        assert_eq!(read_text(&path).unwrap(), "## Topic A\n");
    }

    #[test]
    fn read_text_falls_back_to_gbk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gbk.md");
        // "## 历史" in GBK
        let (bytes, _, _) = encoding_rs::GBK.encode("## 历史\n");
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(read_text(&path).unwrap(), "## 历史\n");
    }

    #[test]
    fn read_text_rejects_undecodable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bin.md");
        std::fs::write(&path, [0x81u8, 0x20, 0xFF, 0xFF]).unwrap();

        let err = read_text(&path).unwrap_err();
        assert!(matches!(err, OutlineKbError::Decode { .. }));
    }

    #[test]
    fn detect_skips_excluded_and_overview() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "通用大纲转换.md");
        touch(tmp.path(), "create_notes.md");
        touch(tmp.path(), "历史学习总览.md");
        touch(tmp.path(), "notes.txt");
        touch(tmp.path(), "历史.md");

        let found = detect_outline(tmp.path(), &OutlineConfig::default(), "学习总览").unwrap();
        assert_eq!(found, tmp.path().join("历史.md"));
    }

    #[test]
    fn detect_picks_first_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "b.md");
        touch(tmp.path(), "a.md");

        let found = detect_outline(tmp.path(), &OutlineConfig::default(), "学习总览").unwrap();
        assert_eq!(found, tmp.path().join("a.md"));
    }

    #[test]
    fn detect_reports_missing() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "总览.md");

        let err = detect_outline(tmp.path(), &OutlineConfig::default(), "学习总览").unwrap_err();
        assert!(matches!(err, OutlineKbError::InputMissing { .. }));
    }
}
