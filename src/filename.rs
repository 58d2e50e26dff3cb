//! Filename derivation for code blocks.
//!
//! A snippet may declare its own filename on its first line using the
//! comment syntax of its language. Otherwise the name is synthesized
//! from a content hash, so running the same snippet twice in one
//! sandbox overwrites the previous file instead of piling up copies.

use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use sha1::{Digest, Sha1};

/// Filename directives, tried in order. Group 2 holds the name.
static FILENAME_PATTERNS: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"^<!-- (filename:)?(.+?) -->",
        r"^/\* (filename:)?(.+?) \*/",
        r"^// (filename:)?(.+?)$",
        r"^# (filename:)?(.+?)$",
    ]
    .map(|pattern| Regex::new(pattern).expect("Failed to compile filename pattern"))
});

/// Returns the filename declared on the first line of `code`, or
/// `tmp_code_<sha1>.<language>` when there is none.
pub fn derive_filename(code: &str, language: &str) -> String {
    declared_filename(code).unwrap_or_else(|| synthetic_filename(code, language))
}

fn declared_filename(code: &str) -> Option<String> {
    let first_line = code.split('\n').next().unwrap_or_default().trim();
    let name = FILENAME_PATTERNS
        .iter()
        .find_map(|re| re.captures(first_line))
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str().trim().to_string())?;

    is_safe_relative(&name).then_some(name)
}

fn synthetic_filename(code: &str, language: &str) -> String {
    let digest = hex::encode(Sha1::digest(code.as_bytes()));
    format!("tmp_code_{digest}.{language}")
}

/// The name must stay inside the sandbox working directory once joined,
/// and must name a file rather than a directory.
fn is_safe_relative(name: &str) -> bool {
    if name.is_empty() || name.contains('\0') {
        return false;
    }
    // `components()` drops trailing separators and interior `.`
    if matches!(name.rsplit(['/', '\\']).next(), Some("" | ".")) {
        return false;
    }
    let path = Path::new(name);
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && matches!(path.components().last(), Some(Component::Normal(_)))
}
