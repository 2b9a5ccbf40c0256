//! Source file classification: what the builder does with each path.
//!
//! ## Basic rules (first match wins)
//!
//! | Path | Kind | Strategy |
//! |------|------|----------|
//! | file name starts with `_` | Fragment | never emitted |
//! | inside a `_`-prefixed directory (`_includes/`, `_layouts/`) | Fragment | never emitted |
//! | hidden (`.git/`, `.DS_Store`) | Ignored | |
//! | `.html`, `.htm` | Page | `Html` |
//! | `.md`, `.markdown` | Page | `Markdown` |
//! | image, font, media, `.css`/`.js`, archive, document | Asset | `Copy` |
//! | anything else | Ignored | not an error |
//!
//! The directory rule is what `[files] auto_ignore_layouts` controls.
//!
//! ## Glob layer
//!
//! `[files]` patterns refine the basic decision, gitignore-style: a pattern
//! without `/` matches any path component, a pattern with `/` is anchored at
//! the source root, a trailing `/` only matches directories, and `!` negates
//! an earlier match. Precedence: `ignore` > `render` > `ignore_render` >
//! `copy` > basic rules.
//!
//! A pattern that fails to compile disables the whole glob layer (with a
//! warning); classification then falls back to the basic rules instead of
//! failing the build.

use crate::config::FilesConfig;
use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

const ASSET_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "bmp", "tif", "tiff",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // audio / video
    "mp3", "wav", "ogg", "flac", "m4a", "aac", "mp4", "webm", "mov", "avi", "mkv",
    // styles and scripts
    "css", "js", "mjs", "map",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "7z", "rar",
    // documents and data
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "xml", "json", "webmanifest",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Page,
    Fragment,
    Asset,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStrategy {
    Html,
    Markdown,
    Copy,
    Skip,
}

/// Routing decision for one path. Computed per call, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: FileKind,
    pub strategy: ProcessingStrategy,
    /// Composed and written to the output tree.
    pub should_emit: bool,
    /// Copied verbatim to the output tree (when referenced, or always if
    /// `explicit_copy`).
    pub should_copy: bool,
    /// Matched a `copy` or `ignore_render` pattern.
    pub explicit_copy: bool,
}

impl Classification {
    fn page(strategy: ProcessingStrategy) -> Self {
        Self {
            kind: FileKind::Page,
            strategy,
            should_emit: true,
            should_copy: false,
            explicit_copy: false,
        }
    }

    fn fragment(strategy: ProcessingStrategy) -> Self {
        Self {
            kind: FileKind::Fragment,
            strategy,
            should_emit: false,
            should_copy: false,
            explicit_copy: false,
        }
    }

    fn asset(explicit_copy: bool) -> Self {
        Self {
            kind: FileKind::Asset,
            strategy: ProcessingStrategy::Copy,
            should_emit: false,
            should_copy: true,
            explicit_copy,
        }
    }

    fn ignored() -> Self {
        Self {
            kind: FileKind::Ignored,
            strategy: ProcessingStrategy::Skip,
            should_emit: false,
            should_copy: false,
            explicit_copy: false,
        }
    }

    pub fn is_page(&self) -> bool {
        self.kind == FileKind::Page
    }

    pub fn is_fragment(&self) -> bool {
        self.kind == FileKind::Fragment
    }

    pub fn is_asset(&self) -> bool {
        self.kind == FileKind::Asset
    }

    pub fn is_ignored(&self) -> bool {
        self.kind == FileKind::Ignored
    }
}

/// Classifies paths under one source root.
#[derive(Debug, Clone)]
pub struct FileClassifier {
    source_root: PathBuf,
    auto_ignore_layouts: bool,
    rules: Option<GlobRules>,
}

impl FileClassifier {
    /// Basic rules only.
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            auto_ignore_layouts: true,
            rules: None,
        }
    }

    /// Basic rules refined by the `[files]` glob patterns.
    pub fn with_rules(source_root: impl Into<PathBuf>, files: &FilesConfig) -> Self {
        let rules = match GlobRules::compile(files) {
            Ok(rules) if !rules.is_empty() => Some(rules),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "invalid file pattern, using basic classification rules");
                None
            }
        };
        Self {
            source_root: source_root.into(),
            auto_ignore_layouts: files.auto_ignore_layouts,
            rules,
        }
    }

    pub fn classify(&self, path: &Path) -> Classification {
        let Some(relative) = self.relative(path) else {
            return Classification::ignored();
        };
        let basic = self.classify_basic(&relative);
        match &self.rules {
            Some(rules) => rules.refine(&relative, basic),
            None => basic,
        }
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.source_root).ok()?
        } else {
            path
        };
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    fn classify_basic(&self, relative: &str) -> Classification {
        let components: Vec<&str> = relative.split('/').collect();
        let (name, dirs) = components
            .split_last()
            .map(|(name, dirs)| (*name, dirs))
            .unwrap_or((relative, &[]));
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let strategy = strategy_for(&extension);

        if name.starts_with('_') {
            return Classification::fragment(strategy);
        }
        if self.auto_ignore_layouts && dirs.iter().any(|d| d.starts_with('_')) {
            return Classification::fragment(strategy);
        }
        if components.iter().any(|c| c.starts_with('.')) {
            return Classification::ignored();
        }
        match strategy {
            ProcessingStrategy::Html | ProcessingStrategy::Markdown => {
                Classification::page(strategy)
            }
            _ if ASSET_EXTENSIONS.contains(&extension.as_str()) => Classification::asset(false),
            _ => Classification::ignored(),
        }
    }
}

fn strategy_for(extension: &str) -> ProcessingStrategy {
    match extension {
        "html" | "htm" => ProcessingStrategy::Html,
        "md" | "markdown" => ProcessingStrategy::Markdown,
        _ => ProcessingStrategy::Skip,
    }
}

// =============================================================================
// Glob layer
// =============================================================================

#[derive(Debug, Clone)]
struct GlobRule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    anchored: bool,
}

impl GlobRule {
    fn compile(raw: &str) -> Result<Self, glob::PatternError> {
        let (negated, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let dir_only = body.ends_with('/');
        let body = body.trim_end_matches('/');
        let anchored = body.contains('/');
        let body = body.trim_start_matches('/');
        Ok(Self {
            pattern: Pattern::new(body)?,
            negated,
            dir_only,
            anchored,
        })
    }

    fn matches(&self, relative: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        let components: Vec<&str> = relative.split('/').collect();
        // Directory prefixes of the path: "a", "a/b", …
        let dir_prefixes = (1..components.len()).map(|n| components[..n].join("/"));

        match (self.anchored, self.dir_only) {
            (true, false) => {
                self.pattern.matches_with(relative, options)
                    || dir_prefixes
                        .into_iter()
                        .any(|p| self.pattern.matches_with(&p, options))
            }
            (true, true) => dir_prefixes
                .into_iter()
                .any(|p| self.pattern.matches_with(&p, options)),
            (false, false) => components
                .iter()
                .any(|c| self.pattern.matches_with(c, options)),
            (false, true) => components[..components.len().saturating_sub(1)]
                .iter()
                .any(|c| self.pattern.matches_with(c, options)),
        }
    }
}

/// An ordered gitignore-style pattern list: the last matching rule decides.
#[derive(Debug, Clone, Default)]
struct PatternList(Vec<GlobRule>);

impl PatternList {
    fn compile(patterns: &[String]) -> Result<Self, String> {
        patterns
            .iter()
            .map(|p| GlobRule::compile(p).map_err(|e| format!("{}: {}", p, e)))
            .collect::<Result<Vec<_>, _>>()
            .map(PatternList)
    }

    fn matches(&self, relative: &str) -> bool {
        let mut matched = false;
        for rule in &self.0 {
            if rule.matches(relative) {
                matched = !rule.negated;
            }
        }
        matched
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
struct GlobRules {
    copy: PatternList,
    ignore: PatternList,
    ignore_render: PatternList,
    render: PatternList,
}

impl GlobRules {
    fn compile(files: &FilesConfig) -> Result<Self, String> {
        Ok(Self {
            copy: PatternList::compile(&files.copy)?,
            ignore: PatternList::compile(&files.ignore)?,
            ignore_render: PatternList::compile(&files.ignore_render)?,
            render: PatternList::compile(&files.render)?,
        })
    }

    fn is_empty(&self) -> bool {
        self.copy.is_empty()
            && self.ignore.is_empty()
            && self.ignore_render.is_empty()
            && self.render.is_empty()
    }

    fn refine(&self, relative: &str, basic: Classification) -> Classification {
        if self.ignore.matches(relative) {
            return Classification::ignored();
        }
        if self.render.matches(relative)
            && matches!(
                basic.strategy,
                ProcessingStrategy::Html | ProcessingStrategy::Markdown
            )
        {
            return Classification::page(basic.strategy);
        }
        if basic.is_page() && self.ignore_render.matches(relative) {
            return Classification::asset(true);
        }
        if !basic.is_page() && self.copy.matches(relative) {
            return Classification::asset(true);
        }
        basic
    }
}

/// Validate every pattern in `files`, reporting the first invalid one.
pub fn check_patterns(files: &FilesConfig) -> Result<(), String> {
    GlobRules::compile(files).map(|_| ())
}
