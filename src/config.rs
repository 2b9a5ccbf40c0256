//! Build configuration.
//!
//! Handles loading, validating, and merging `unify.toml`. Stock defaults are
//! the base layer; an optional `unify.toml` in the source root overrides
//! them key by key, and command-line flags override both.
//!
//! ## Options
//!
//! ```toml
//! # Every key is optional; the values below are the defaults
//!
//! [build]
//! pretty_urls = false          # about.html -> about/index.html
//! minify = false               # collapse whitespace, drop comments
//! clean = false                # wipe output before a full build
//! cache_dir = ".unify-cache"   # relative to the source root
//!
//! [files]
//! copy = []                    # always copied, referenced or not
//! ignore = []                  # never processed
//! ignore_render = []           # pages copied verbatim instead of composed
//! render = []                  # fragments promoted to pages
//! auto_ignore_layouts = true   # files under _-prefixed directories are fragments
//!
//! [security]
//! traversal_allowlist = ["_layouts", "_includes", "_components",
//!                        "dist", "build", "assets", "static", "public"]
//!
//! [processing]
//! max_processes = 4            # omit for auto = CPU cores
//! ```
//!
//! A key the structs do not know is an error, so typos surface immediately.

use crate::security::{DEFAULT_TRAVERSAL_ALLOWLIST, TraversalPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the configuration file looked up in the source root.
pub const CONFIG_FILENAME: &str = "unify.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `unify.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Output and cache behaviour.
    pub build: BuildConfig,
    /// Glob rules refining file classification.
    pub files: FilesConfig,
    /// Path traversal policy.
    pub security: SecurityConfig,
    /// Parallel page composition settings.
    pub processing: ProcessingConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.cache_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "build.cache_dir must not be empty".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        crate::classify::check_patterns(&self.files)
            .map_err(|e| ConfigError::Validation(format!("invalid file pattern {}", e)))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Emit `name.html` as `name/index.html` and rewrite links to match.
    pub pretty_urls: bool,
    /// Minify emitted HTML.
    pub minify: bool,
    /// Remove the output directory before a full build.
    pub clean: bool,
    /// Where the hash and dependency maps are persisted.
    pub cache_dir: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pretty_urls: false,
            minify: false,
            clean: false,
            cache_dir: ".unify-cache".to_string(),
        }
    }
}

/// Glob patterns consumed by [`FileClassifier`](crate::classify::FileClassifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesConfig {
    pub copy: Vec<String>,
    pub ignore: Vec<String>,
    pub ignore_render: Vec<String>,
    pub render: Vec<String>,
    pub auto_ignore_layouts: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            copy: Vec::new(),
            ignore: Vec::new(),
            ignore_render: Vec::new(),
            render: Vec::new(),
            auto_ignore_layouts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// Directory names a reference may traverse into outside the source root.
    pub traversal_allowlist: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            traversal_allowlist: DEFAULT_TRAVERSAL_ALLOWLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl SecurityConfig {
    pub fn policy(&self) -> TraversalPolicy {
        TraversalPolicy::with_allowlist(self.traversal_allowlist.iter().cloned())
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel page-composition workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Worker count for the rayon pool: `max_processes` capped at the core
/// count, or every core when unset.
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// `SiteConfig::default()` as a TOML table, the layer `unify.toml` is
/// merged onto.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Deep-merge two TOML values. Tables merge per key; any other overlay
/// value (arrays included) replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// The raw `unify.toml` in `dir`, or `None` when there is no such file.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Apply `overlay` (if any) to `base` and produce a validated config.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Stock defaults overridden by `<source_root>/unify.toml`.
pub fn load_config(source_root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(source_root)?;
    resolve_config(base, overlay)
}

/// Documented stock `unify.toml`, printed by `unify gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# Unify Configuration
# ===================
# Every key is optional; delete whatever you do not want to change.
# Values shown below are the defaults. Place this file in the source root
# as unify.toml. Command-line flags override these values.
# Misspelled or unknown keys are an error.

# ---------------------------------------------------------------------------
# Build output
# ---------------------------------------------------------------------------
[build]
# Emit about.html as about/index.html and rewrite local links to about/.
pretty_urls = false

# Collapse insignificant whitespace and drop comments in emitted HTML.
minify = false

# Delete the output directory before every full build.
clean = false

# Directory holding the hash and dependency maps, relative to the source
# root. Hidden directories are never treated as sources.
cache_dir = ".unify-cache"

# ---------------------------------------------------------------------------
# File classification (gitignore-style globs)
# ---------------------------------------------------------------------------
[files]
# Copied to the output whether or not a page references them.
copy = []

# Never processed.
ignore = []

# Pages copied verbatim instead of composed.
ignore_render = []

# Fragments (underscore files) rendered as pages anyway.
render = []

# Treat every file under an underscore-prefixed directory as a fragment.
auto_ignore_layouts = true

# ---------------------------------------------------------------------------
# Path security
# ---------------------------------------------------------------------------
[security]
# Directories a data-unify or include reference may reach through "../"
# outside the source root. This is a convenience policy, not a sandbox.
traversal_allowlist = ["_layouts", "_includes", "_components", "dist", "build", "assets", "static", "public"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel page-composition workers.
# Leave unset to use one worker per CPU core.
# max_processes = 4
"##
}
