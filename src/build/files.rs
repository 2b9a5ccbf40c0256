//! Source enumeration, the in-memory file map, and output paths.

use crate::classify::{Classification, FileClassifier, ProcessingStrategy};
use crate::security::normalize;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use walkdir::WalkDir;

/// Read-only snapshot of every page and fragment source, keyed by absolute
/// path. Built once per build and shared by all composition workers.
#[derive(Debug, Clone)]
pub struct FileSystemMap {
    root: PathBuf,
    files: HashMap<PathBuf, Arc<str>>,
}

impl FileSystemMap {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
            files: HashMap::new(),
        }
    }

    /// Read the text sources among `paths` (pages and fragments with an
    /// HTML or markdown strategy). Unreadable files are left out with a
    /// warning; composing a page that references one reports it missing.
    pub fn load(root: &Path, paths: &[PathBuf], classifier: &FileClassifier) -> Self {
        let loaded: Vec<(PathBuf, Arc<str>)> = paths
            .par_iter()
            .filter(|path| is_text_source(&classifier.classify(path)))
            .filter_map(|path| match fs::read_to_string(path) {
                Ok(content) => Some((path.clone(), Arc::from(content))),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "cannot read source file");
                    None
                }
            })
            .collect();

        let mut map = Self::new(root);
        for (path, content) in loaded {
            map.insert(path, content);
        }
        map
    }

    /// Add or replace a file. Relative paths are taken from the root.
    pub fn insert(&mut self, path: impl Into<PathBuf>, content: impl Into<Arc<str>>) {
        let key = self.key(&path.into());
        self.files.insert(key, content.into());
    }

    pub fn remove(&mut self, path: &Path) {
        let key = self.key(path);
        self.files.remove(&key);
    }

    /// Content of `path`, absolute or relative to the root.
    pub fn get(&self, path: &Path) -> Option<Arc<str>> {
        self.files.get(&self.key(path)).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(&self.key(path))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn key(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root.join(path))
        }
    }
}

fn is_text_source(class: &Classification) -> bool {
    (class.is_page() || class.is_fragment())
        && matches!(
            class.strategy,
            ProcessingStrategy::Html | ProcessingStrategy::Markdown
        )
}

/// Every file under `source_root`, sorted, skipping the `excluded`
/// directories (output and cache dirs that live inside the source tree).
pub fn enumerate_sources(source_root: &Path, excluded: &[&Path]) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(source_root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| !excluded.iter().any(|dir| entry.path() == *dir));
    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Output location of a source file, relative to the output root.
///
/// Markdown maps to `.html`. With pretty URLs, `name.html` becomes
/// `name/index.html`; `index.html` stays where it is.
pub fn output_path(relative: &Path, pretty_urls: bool) -> PathBuf {
    let is_page_source = relative
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| matches!(e.as_str(), "html" | "htm" | "md" | "markdown"));
    if !is_page_source {
        return relative.to_path_buf();
    }

    let html = relative.with_extension("html");
    if !pretty_urls {
        return html;
    }
    match html.file_stem().and_then(|s| s.to_str()) {
        Some("index") | None => html,
        Some(stem) => html.with_file_name(stem).join("index.html"),
    }
}

/// Write `contents` to `path` through a sibling temp file, so readers never
/// see a partially written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

/// Copy `from` to `to` through a sibling temp file.
pub fn copy_atomic(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(to);
    fs::copy(from, &tmp)?;
    fs::rename(&tmp, to).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.unify-tmp", name))
}
