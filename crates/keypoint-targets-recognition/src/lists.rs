//! Reference and test list files.
//!
//! Reference list, one target per line:
//!
//! ```text
//! <filename> <sep> <id> <sep> <red> <green> <blue>
//! ```
//!
//! Separator tokens are any non-numeric tokens; a glued `tag:<id>` token is
//! also accepted. Test list, one image per line:
//!
//! ```text
//! <filename> <sep> <id> <id> ...
//! ```
//!
//! where expected ids are read until the first non-integer token. Blank lines
//! and lines starting with `#` are ignored in both.

use crate::{ListError, LoadError, ReferenceEntry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to a reference file stem to locate its mask.
pub const MASK_SUFFIX: &str = "_mask";

/// One line of the test list, resolved to a file path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestEntry {
    pub image_path: PathBuf,
    /// Expected target ids; repeated ids are distinct instances.
    pub expected: Vec<u32>,
}

/// `<dir>/<stem>_mask.<ext>` for a reference image at `<dir>/<stem>.<ext>`.
pub fn mask_path_for(image_path: &Path) -> Result<PathBuf, LoadError> {
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LoadError::MaskPath(image_path.to_path_buf()))?;
    let name = match image_path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}{MASK_SUFFIX}.{ext}"),
        None => format!("{stem}{MASK_SUFFIX}"),
    };
    Ok(image_path.with_file_name(name))
}

fn content_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
}

/// Numeric payload of a token: the token itself, or what follows its last `:`.
fn numeric_part(token: &str) -> &str {
    token.rsplit(':').next().unwrap_or(token)
}

/// Parse one non-blank reference line. Paths are resolved against `image_dir`.
pub fn parse_reference_line(
    line: &str,
    line_no: usize,
    image_dir: &Path,
) -> Result<ReferenceEntry, ListError> {
    let malformed = |reason: &str| ListError::Malformed {
        line: line_no,
        reason: reason.to_string(),
    };

    let mut tokens = line.split_whitespace();
    let filename = tokens.next().ok_or_else(|| malformed("empty line"))?;
    let numbers: Vec<u64> = tokens
        .filter_map(|t| numeric_part(t).parse::<u64>().ok())
        .collect();
    let [id, r, g, b] = numbers[..] else {
        return Err(malformed("expected an id and three color components"));
    };

    let id = u32::try_from(id).map_err(|_| malformed("target id out of range"))?;
    let channel = |v: u64| u8::try_from(v).map_err(|_| malformed("color component above 255"));
    let color = [channel(r)?, channel(g)?, channel(b)?];

    let image_path = image_dir.join(filename);
    let mask_path = mask_path_for(&image_path).map_err(|e| malformed(&e.to_string()))?;
    Ok(ReferenceEntry {
        image_path,
        mask_path,
        id,
        color,
    })
}

/// Parse a whole reference list, skipping (and logging) malformed lines.
pub fn parse_reference_list(text: &str, image_dir: &Path) -> Vec<ReferenceEntry> {
    content_lines(text)
        .filter_map(|(n, line)| match parse_reference_line(line, n, image_dir) {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("reference list: {err}");
                None
            }
        })
        .collect()
}

pub fn load_reference_list(
    path: impl AsRef<Path>,
    image_dir: impl AsRef<Path>,
) -> Result<Vec<ReferenceEntry>, ListError> {
    let text = read_list(path.as_ref())?;
    Ok(parse_reference_list(&text, image_dir.as_ref()))
}

/// Parse one non-blank test line. Paths are resolved against `image_dir`.
pub fn parse_test_line(line: &str, line_no: usize, image_dir: &Path) -> Result<TestEntry, ListError> {
    let mut tokens = line.split_whitespace();
    let filename = tokens.next().ok_or_else(|| ListError::Malformed {
        line: line_no,
        reason: "empty line".to_string(),
    })?;

    let mut expected = Vec::new();
    // The separator may carry the first id glued to it (`tag:5`).
    if let Some(sep) = tokens.next() {
        if sep.contains(':') {
            if let Ok(id) = numeric_part(sep).parse::<u32>() {
                expected.push(id);
            }
        }
    }
    expected.extend(tokens.map_while(|t| t.parse::<u32>().ok()));

    Ok(TestEntry {
        image_path: image_dir.join(filename),
        expected,
    })
}

pub fn parse_test_list(text: &str, image_dir: &Path) -> Vec<TestEntry> {
    content_lines(text)
        .filter_map(|(n, line)| match parse_test_line(line, n, image_dir) {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("test list: {err}");
                None
            }
        })
        .collect()
}

pub fn load_test_list(
    path: impl AsRef<Path>,
    image_dir: impl AsRef<Path>,
) -> Result<Vec<TestEntry>, ListError> {
    let text = read_list(path.as_ref())?;
    Ok(parse_test_list(&text, image_dir.as_ref()))
}

fn read_list(path: &Path) -> Result<String, ListError> {
    fs::read_to_string(path).map_err(|source| ListError::Io {
        path: path.to_path_buf(),
        source,
    })
}
