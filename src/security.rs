//! Path validation for every file reference followed during composition.
//!
//! Layouts, components and include directives all name other files by path,
//! and those paths come straight from author-controlled HTML. Before the
//! composition engine reads anything it calls [`validate_path`], which
//! either returns the resolved absolute path or a [`SecurityError`].
//!
//! # Rules
//!
//! 1. Null bytes are rejected in every spelling (`\0`, `\x00`, `%00`).
//! 2. Input is percent-decoded defensively: a malformed escape falls back to
//!    the raw input instead of failing.
//! 3. Backslash separators are accepted for plain Windows-style relative
//!    paths; mixing them with `/` is only tolerated when no `..` segment is
//!    involved. UNC and drive-letter paths are rejected.
//! 4. More than [`TraversalPolicy::max_traversals`] `..` segments are always
//!    rejected. At [`TraversalPolicy::marker_threshold`] or more the path
//!    must also name an allowlisted directory.
//! 5. After lexical normalization the path must sit inside the source root,
//!    or the part of it that escapes the root must pass through an
//!    allowlisted convention directory (`_includes`, `_layouts`, `assets`, …).
//! 6. Escaping paths that land in system locations (`/etc`, `/proc`, …) are
//!    rejected unless the source root itself lives in a temporary working
//!    directory, which is how sandboxed builds and tests run.
//!
//! # The allowlist is policy
//!
//! The convention directories in rule 5 are a heuristic that keeps the
//! common `../_includes/header.html` pattern working for sites whose shared
//! fragments live next to the source root. It is configured through
//! `[security] traversal_allowlist` and is not a hard security boundary:
//! a directory named `assets` anywhere above the root satisfies it.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Null byte in path: {0:?}")]
    NullByte(String),
    #[error("Path escapes source root: {0}")]
    Traversal(String),
    #[error("Access to system path denied: {0}")]
    SystemPath(String),
    #[error("Too many parent traversals ({count}) in path: {input}")]
    TooManyTraversals { input: String, count: usize },
    #[error("Unsupported path separators: {0}")]
    MixedSeparators(String),
}

/// Directories that legitimately sit outside the source root.
pub const DEFAULT_TRAVERSAL_ALLOWLIST: &[&str] = &[
    "_layouts",
    "_includes",
    "_components",
    "dist",
    "build",
    "assets",
    "static",
    "public",
];

const SYSTEM_PREFIXES: &[&str] = &[
    "/etc", "/proc", "/sys", "/root", "/bin", "/sbin", "/usr", "/boot", "/dev", "/lib", "/lib64",
    "/var", "/private/etc",
];

const TEMP_PREFIXES: &[&str] = &["/tmp", "/var/tmp", "/private/tmp", "/var/folders", "/private/var/folders"];

/// Tunable traversal rules. See the [module docs](self).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalPolicy {
    /// Directory names that make an escaping path acceptable.
    pub allowlist: Vec<String>,
    /// Traversal count from which an allowlisted directory must be named.
    pub marker_threshold: usize,
    /// Traversal count above which a path is always rejected.
    pub max_traversals: usize,
}

impl Default for TraversalPolicy {
    fn default() -> Self {
        Self::with_allowlist(DEFAULT_TRAVERSAL_ALLOWLIST.iter().map(|s| s.to_string()))
    }
}

impl TraversalPolicy {
    pub fn with_allowlist(allowlist: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowlist: allowlist.into_iter().collect(),
            marker_threshold: 3,
            max_traversals: 5,
        }
    }

    fn allows(&self, segment: &str) -> bool {
        self.allowlist.iter().any(|dir| dir == segment)
    }
}

/// Validate `input` against `source_root` and return the resolved path.
///
/// Relative input is resolved against `source_root`. The function is pure:
/// it never touches the filesystem, so a path can be validated before the
/// file it names is known to exist.
pub fn validate_path(
    input: &str,
    source_root: &Path,
    policy: &TraversalPolicy,
) -> Result<PathBuf, SecurityError> {
    validate_from(input, source_root, source_root, policy)
}

/// Validate a reference written in a file that lives in `base_dir`.
///
/// Traversal counts and the allowlist marker are taken from `reference`
/// alone: a referrer sitting in `_includes/` does not make its own `..`
/// chains acceptable. Containment is still judged against `source_root`.
pub fn validate_reference(
    reference: &str,
    base_dir: &Path,
    source_root: &Path,
    policy: &TraversalPolicy,
) -> Result<PathBuf, SecurityError> {
    validate_from(reference, base_dir, source_root, policy)
}

fn validate_from(
    input: &str,
    base_dir: &Path,
    source_root: &Path,
    policy: &TraversalPolicy,
) -> Result<PathBuf, SecurityError> {
    if contains_null_byte(input) {
        return Err(SecurityError::NullByte(input.to_string()));
    }
    let decoded = decode_defensively(input);
    if contains_null_byte(&decoded) {
        return Err(SecurityError::NullByte(input.to_string()));
    }

    let unified = unify_separators(&decoded)?;
    let traversals = unified.split('/').filter(|seg| *seg == "..").count();
    if traversals > policy.max_traversals {
        return Err(SecurityError::TooManyTraversals {
            input: input.to_string(),
            count: traversals,
        });
    }
    let names_allowlisted = unified.split('/').any(|seg| policy.allows(seg));
    if traversals >= policy.marker_threshold && !names_allowlisted {
        return Err(SecurityError::TooManyTraversals {
            input: input.to_string(),
            count: traversals,
        });
    }

    let root = normalize(source_root);
    let candidate = Path::new(&unified);
    let resolved = if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&root.join(base_dir).join(candidate))
    };

    if resolved.starts_with(&root) {
        return Ok(resolved);
    }

    if is_system_path(&resolved) && !is_temp_workspace(&root) {
        return Err(SecurityError::SystemPath(input.to_string()));
    }

    if escapes_through_allowlist(&resolved, &root, policy) {
        Ok(resolved)
    } else {
        Err(SecurityError::Traversal(input.to_string()))
    }
}

/// True if `path` is `root` or lies beneath it, after lexical normalization.
pub fn is_within(path: &Path, root: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent.
///
/// `..` at the filesystem root is discarded; leading `..` on a relative
/// path is kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Decode `%XX` escapes. Returns `None` on a malformed escape or when the
/// decoded bytes are not UTF-8.
pub fn percent_decode(input: &str) -> Option<String> {
    if !input.contains('%') {
        return Some(input.to_string());
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            let text = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(text, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Decode repeatedly (double-encoded input is a classic bypass) until the
/// value is stable or decoding fails.
fn decode_defensively(input: &str) -> String {
    let mut current = input.to_string();
    for _ in 0..3 {
        match percent_decode(&current) {
            Some(decoded) if decoded != current => current = decoded,
            _ => break,
        }
    }
    current
}

fn contains_null_byte(value: &str) -> bool {
    value.contains('\0') || value.contains("\\x00") || value.to_ascii_lowercase().contains("%00")
}

fn unify_separators(path: &str) -> Result<String, SecurityError> {
    if !path.contains('\\') {
        return Ok(path.to_string());
    }
    let is_unc = path.starts_with("\\\\");
    let bytes = path.as_bytes();
    let is_drive = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/');
    if is_unc || is_drive {
        return Err(SecurityError::MixedSeparators(path.to_string()));
    }
    let unified = path.replace('\\', "/");
    let mixed = path.contains('/');
    if mixed && unified.split('/').any(|seg| seg == "..") {
        return Err(SecurityError::MixedSeparators(path.to_string()));
    }
    Ok(unified)
}

fn is_system_path(path: &Path) -> bool {
    SYSTEM_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix) && !is_temp_location(path))
}

fn is_temp_location(path: &Path) -> bool {
    TEMP_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn is_temp_workspace(root: &Path) -> bool {
    if is_temp_location(root) {
        return true;
    }
    let temp = normalize(&std::env::temp_dir());
    temp.components().count() > 1 && root.starts_with(temp)
}

/// Check whether the components of `resolved` below its common ancestor with
/// `root` include an allowlisted directory.
fn escapes_through_allowlist(resolved: &Path, root: &Path, policy: &TraversalPolicy) -> bool {
    let shared = resolved
        .components()
        .zip(root.components())
        .take_while(|(a, b)| a == b)
        .count();
    resolved
        .components()
        .skip(shared)
        .filter_map(|c| match c {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .any(|name| policy.allows(name))
}
