//! Full and incremental builds.
//!
//! [`IncrementalBuilder`] owns everything that survives between builds (the
//! [`BuildCache`], the [`DependencyTracker`]) and drives the pipeline:
//!
//! ```text
//! enumerate → classify → cache check → FileSystemMap → compose (parallel)
//!           → post-process → write → record deps + hashes → copy assets → persist
//! ```
//!
//! ## Full build
//!
//! If no tracked source changed since the last build and every page output
//! (and every asset output the pages use) still exists, nothing is done.
//! Otherwise every page is composed against a fresh [`FileSystemMap`]; a page
//! that fails is logged and counted but never stops the others. Only assets referenced by composed pages (plus explicit
//! `copy` matches) are copied.
//!
//! ## Incremental build
//!
//! | Changed file | Work |
//! |--------------|------|
//! | fragment | rebuild every page that reaches it through the dependency graph |
//! | page | rebuild that page |
//! | asset | copy that asset |
//! | anything else | nothing |
//!
//! Deleting a source removes its output. Deleting or creating a fragment
//! rebuilds the pages that reference it.
//!
//! ## Cache discipline
//!
//! A page's hash is recorded only after its output was written. A failed page
//! loses its hash so the next build retries it. Cache load and persist
//! failures degrade to a cold cache and never fail a build.

pub mod assets;
pub mod files;

pub use files::{FileSystemMap, output_path};

use crate::cache::{BuildCache, CacheStats};
use crate::classify::FileClassifier;
use crate::compose::{
    Composer, CompositionContext, CompositionError, CompositionResult, RecoverableError,
};
use crate::config::{FilesConfig, SiteConfig};
use crate::deps::DependencyTracker;
use crate::markdown::{MarkdownRenderer, PulldownRenderer};
use crate::postprocess;
use crate::security::{TraversalPolicy, normalize};
use crate::types::{ChangeEvent, ChangeKind, DependencyKind};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{}: {source}", .file.display())]
    Composition {
        file: PathBuf,
        #[source]
        source: CompositionError,
    },
    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Build failed: {0}")]
    Unknown(String),
}

impl BuildError {
    /// The file the error is about, or `"unknown"`.
    pub fn file(&self) -> String {
        match self {
            BuildError::Composition { file, .. } => file.display().to_string(),
            BuildError::Filesystem { path, .. } => path.display().to_string(),
            BuildError::Unknown(_) => "unknown".to_string(),
        }
    }

    fn filesystem(path: &Path, source: io::Error) -> Self {
        BuildError::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Settings for one builder.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub pretty_urls: bool,
    pub minify: bool,
    /// Remove the output directory and start from a cold cache.
    pub clean: bool,
    /// Relative paths are taken from the source root.
    pub cache_dir: PathBuf,
    pub files: FilesConfig,
    pub policy: TraversalPolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_config(&SiteConfig::default())
    }
}

impl BuildOptions {
    pub fn from_config(config: &SiteConfig) -> Self {
        Self {
            pretty_urls: config.build.pretty_urls,
            minify: config.build.minify,
            clean: config.build.clean,
            cache_dir: PathBuf::from(&config.build.cache_dir),
            files: config.files.clone(),
            policy: config.security.policy(),
        }
    }
}

/// Outcome of [`IncrementalBuilder::perform_initial_build`].
#[derive(Debug, Default)]
pub struct InitialBuildResult {
    /// No page failed and the build itself did not abort.
    pub success: bool,
    /// Pages composed and written.
    pub processed_files: usize,
    pub cache_hits: usize,
    pub cache_invalidations: usize,
    pub build_time_ms: u64,
    pub copied_assets: usize,
    /// Pages (or assets) that could not be built.
    pub failed: Vec<BuildError>,
    /// Degraded but written pages.
    pub warnings: Vec<RecoverableError>,
    /// Why the whole build aborted, if it did.
    pub error: Option<String>,
}

/// Outcome of an incremental rebuild, new-file or deletion event.
#[derive(Debug, Default)]
pub struct IncrementalBuildResult {
    pub success: bool,
    /// Pages composed and written.
    pub rebuilt_files: usize,
    /// Pages selected for rebuilding, written or not.
    pub affected_pages: Vec<PathBuf>,
    pub copied_assets: usize,
    pub removed_files: usize,
    pub errors: Vec<BuildError>,
    pub warnings: Vec<RecoverableError>,
    pub error: Option<String>,
}

impl IncrementalBuildResult {
    fn empty() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    fn failed(err: BuildError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            errors: vec![err],
            ..Default::default()
        }
    }

    fn absorb(&mut self, other: IncrementalBuildResult) {
        self.success &= other.success;
        self.rebuilt_files += other.rebuilt_files;
        self.affected_pages.extend(other.affected_pages);
        self.copied_assets += other.copied_assets;
        self.removed_files += other.removed_files;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        if self.error.is_none() {
            self.error = other.error;
        }
    }
}

/// Outcome of [`IncrementalBuilder::check`]: the site composed in memory.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub pages: usize,
    pub fragments: usize,
    pub assets: usize,
    pub ignored: usize,
    pub failed: Vec<BuildError>,
    pub warnings: Vec<RecoverableError>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.warnings.is_empty()
    }
}

/// One page after the parallel phase.
struct PageOutcome {
    page: PathBuf,
    /// Raw source, when it could be read.
    content: Option<Arc<str>>,
    result: Result<CompositionResult, BuildError>,
}

/// What the sequential phase learned from a batch of page outcomes.
#[derive(Default)]
struct Recorded {
    built: usize,
    referenced_assets: BTreeSet<PathBuf>,
    failed: Vec<BuildError>,
    warnings: Vec<RecoverableError>,
}

/// Outcome of one asset copy batch.
#[derive(Default)]
struct CopiedAssets {
    copied: BTreeSet<PathBuf>,
    /// Assets whose copy failed; their hashes were dropped.
    failed: BTreeSet<PathBuf>,
    errors: Vec<BuildError>,
}

/// Builds one source tree into one output tree.
///
/// Not internally synchronized: callers run one build at a time and
/// coalesce change events themselves.
pub struct IncrementalBuilder {
    source: PathBuf,
    output: PathBuf,
    cache_dir: PathBuf,
    options: BuildOptions,
    classifier: FileClassifier,
    cache: BuildCache,
    tracker: DependencyTracker,
    renderer: Box<dyn MarkdownRenderer>,
}

impl IncrementalBuilder {
    /// Set up a builder, loading the persisted cache and dependency graph.
    pub fn new(
        source: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: BuildOptions,
    ) -> Result<Self, BuildError> {
        let source = source.as_ref();
        let source = fs::canonicalize(source).map_err(|e| BuildError::filesystem(source, e))?;
        let output = output.as_ref();
        let output = normalize(
            &std::path::absolute(output).map_err(|e| BuildError::filesystem(output, e))?,
        );
        let cache_dir = if options.cache_dir.is_absolute() {
            normalize(&options.cache_dir)
        } else {
            normalize(&source.join(&options.cache_dir))
        };

        let classifier = FileClassifier::with_rules(&source, &options.files);
        let cache = BuildCache::load(&cache_dir);
        let mut tracker = DependencyTracker::new();
        tracker.restore(cache.dependencies(), |path| {
            classifier.classify(path).is_page()
        });

        Ok(Self {
            source,
            output,
            cache_dir,
            options,
            classifier,
            cache,
            tracker,
            renderer: Box::new(PulldownRenderer),
        })
    }

    /// Replace the markdown renderer.
    pub fn with_renderer(mut self, renderer: impl MarkdownRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// Where `source` lands in the output tree.
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        let source = self.absolute(source);
        let relative = source.strip_prefix(&self.source).unwrap_or(&source);
        if self.classifier.classify(&source).is_asset() {
            self.output.join(relative)
        } else {
            self.output.join(output_path(relative, self.options.pretty_urls))
        }
    }

    // =========================================================================
    // Full build
    // =========================================================================

    /// Build the whole site, skipping all work when nothing changed.
    pub fn perform_initial_build(&mut self) -> InitialBuildResult {
        let started = Instant::now();
        let mut result = self.initial_build().unwrap_or_else(|err| {
            error!(error = %err, "build aborted");
            InitialBuildResult {
                success: false,
                error: Some(err.to_string()),
                ..Default::default()
            }
        });
        result.build_time_ms = started.elapsed().as_millis() as u64;
        info!(
            pages = result.processed_files,
            failed = result.failed.len(),
            assets = result.copied_assets,
            cache_hits = result.cache_hits,
            ms = result.build_time_ms,
            "build finished"
        );
        result
    }

    fn initial_build(&mut self) -> Result<InitialBuildResult, BuildError> {
        if self.options.clean {
            remove_dir_if_exists(&self.output)?;
            self.cache.clear();
            self.tracker = DependencyTracker::new();
        }

        let sources = self.tracked_sources()?;
        let check = self.cache.check_multiple(&sources);
        let mut changed: BTreeSet<PathBuf> = check.changed.into_iter().collect();
        let expected_assets = self.expected_assets(&sources);
        for path in &check.unchanged {
            let emitted =
                self.classifier.classify(path).is_page() || expected_assets.contains(path);
            if emitted && !self.output_path_for(path).exists() {
                debug!(source = %path.display(), "output missing, rebuilding");
                changed.insert(path.clone());
            }
        }

        let present: HashSet<&Path> = sources.iter().map(PathBuf::as_path).collect();
        let vanished: Vec<PathBuf> = self
            .cache
            .paths()
            .into_iter()
            .filter(|path| !present.contains(path.as_path()))
            .collect();
        for path in &vanished {
            self.cache.remove(path);
            self.tracker.remove_page(path);
        }

        let mut stats = CacheStats::default();
        for path in &sources {
            if changed.contains(path) {
                stats.invalidate();
            } else {
                stats.hit();
            }
        }
        debug!(%stats, vanished = vanished.len(), "cache check");
        if changed.is_empty() && vanished.is_empty() {
            info!(files = sources.len(), "nothing changed");
            return Ok(InitialBuildResult {
                success: true,
                cache_hits: stats.hits,
                ..Default::default()
            });
        }

        let files = FileSystemMap::load(&self.source, &sources, &self.classifier);
        let pages: Vec<PathBuf> = sources
            .iter()
            .filter(|path| self.classifier.classify(path).is_page())
            .cloned()
            .collect();
        let outcomes = self.compose_pages(&pages, &files, true);
        let mut recorded = self.record_outcomes(outcomes);

        let fragments: Vec<PathBuf> = sources
            .iter()
            .filter(|path| self.classifier.classify(path).is_fragment())
            .cloned()
            .collect();
        for fragment in &fragments {
            if let Some(content) = files.get(fragment) {
                let deps = self.tracker.track_fragment_dependencies(
                    fragment,
                    &content,
                    &self.source,
                    &self.options.policy,
                );
                self.cache.set_dependencies(fragment, deps);
            }
        }

        let explicit = sources
            .iter()
            .filter(|path| self.classifier.classify(path).explicit_copy)
            .cloned();
        let seeds: Vec<PathBuf> = recorded
            .referenced_assets
            .iter()
            .cloned()
            .chain(explicit)
            .collect();
        let copies = self.copy_assets(seeds);
        recorded.failed.extend(copies.errors);

        // Pages were hashed as they were written and copied assets as they
        // were copied. Failed copies stay unhashed so the next build retries.
        for path in &sources {
            let class = self.classifier.classify(path);
            if class.is_page() || copies.copied.contains(path) || copies.failed.contains(path) {
                continue;
            }
            if let Err(err) = self.cache.store_hash(path) {
                warn!(path = %path.display(), error = %err, "cannot hash source file");
            }
        }
        self.persist_cache();

        Ok(InitialBuildResult {
            success: recorded.failed.is_empty(),
            processed_files: recorded.built,
            cache_hits: stats.hits,
            cache_invalidations: stats.invalidations,
            build_time_ms: 0,
            copied_assets: copies.copied.len(),
            error: (!recorded.failed.is_empty())
                .then(|| format!("{} file(s) failed to build", recorded.failed.len())),
            failed: recorded.failed,
            warnings: recorded.warnings,
        })
    }

    // =========================================================================
    // Incremental builds
    // =========================================================================

    /// Rebuild what depends on `changed`.
    pub fn perform_incremental_build(&mut self, changed: &Path) -> IncrementalBuildResult {
        let path = self.absolute(changed);
        let class = self.classifier.classify(&path);
        debug!(path = %path.display(), kind = ?class.kind, "incremental build");

        let mut result = if class.is_fragment() {
            if let Ok(content) = fs::read_to_string(&path) {
                let deps = self.tracker.track_fragment_dependencies(
                    &path,
                    &content,
                    &self.source,
                    &self.options.policy,
                );
                self.cache.set_dependencies(&path, deps);
            }
            let dependents = self.tracker.get_all_transitive_dependents(&path);
            let result = self.rebuild_pages(dependents);
            if let Err(err) = self.cache.store_hash(&path) {
                debug!(path = %path.display(), error = %err, "cannot hash fragment");
            }
            result
        } else if class.is_page() {
            self.rebuild_pages(vec![path.clone()])
        } else if class.is_asset() {
            match assets::copy_asset(&path, &self.source, &self.output) {
                Ok(_) => {
                    if let Err(err) = self.cache.store_hash(&path) {
                        debug!(path = %path.display(), error = %err, "cannot hash asset");
                    }
                    IncrementalBuildResult {
                        copied_assets: 1,
                        ..IncrementalBuildResult::empty()
                    }
                }
                Err(err) => {
                    self.cache.remove(&path);
                    IncrementalBuildResult::failed(BuildError::filesystem(&path, err))
                }
            }
        } else {
            return IncrementalBuildResult::empty();
        };

        self.persist_cache();
        if result.error.is_none() && !result.errors.is_empty() {
            result.error = Some(format!("{} file(s) failed to build", result.errors.len()));
        }
        result
    }

    /// A file appeared. Pages are built, assets copied; a new fragment is
    /// never emitted but rebuilds the pages that were waiting for it.
    pub fn handle_new_file(&mut self, path: &Path) -> IncrementalBuildResult {
        debug!(path = %path.display(), "new file");
        self.perform_incremental_build(path)
    }

    /// Remove the outputs of deleted sources and rebuild the pages that
    /// referenced deleted fragments.
    ///
    /// A filesystem error while removing an output fails the whole batch.
    pub fn handle_deleted_files(
        &mut self,
        paths: &[PathBuf],
    ) -> Result<IncrementalBuildResult, BuildError> {
        let mut result = IncrementalBuildResult::empty();
        let mut deleted = BTreeSet::new();
        let mut dependents = BTreeSet::new();

        for path in paths {
            let path = self.absolute(path);
            let class = self.classifier.classify(&path);
            if class.is_page() || class.is_asset() {
                let target = self.output_path_for(&path);
                match fs::remove_file(&target) {
                    Ok(()) => {
                        debug!(output = %target.display(), "removed output");
                        result.removed_files += 1;
                    }
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(BuildError::filesystem(&target, err)),
                }
            }
            if class.is_fragment() {
                dependents.extend(self.tracker.get_all_transitive_dependents(&path));
            }
            self.tracker.remove_page(&path);
            self.cache.remove(&path);
            deleted.insert(path);
        }

        let pages: Vec<PathBuf> = dependents
            .into_iter()
            .filter(|page| !deleted.contains(page))
            .collect();
        if !pages.is_empty() {
            result.absorb(self.rebuild_pages(pages));
        }
        self.persist_cache();
        Ok(result)
    }

    /// Dispatch one watcher event.
    pub fn handle_change(&mut self, event: &ChangeEvent) -> IncrementalBuildResult {
        match event.kind {
            ChangeKind::Created => self.handle_new_file(&event.path),
            ChangeKind::Modified => self.perform_incremental_build(&event.path),
            ChangeKind::Deleted => self
                .handle_deleted_files(std::slice::from_ref(&event.path))
                .unwrap_or_else(IncrementalBuildResult::failed),
        }
    }

    fn rebuild_pages(&mut self, pages: Vec<PathBuf>) -> IncrementalBuildResult {
        if pages.is_empty() {
            return IncrementalBuildResult::empty();
        }
        let sources = match self.tracked_sources() {
            Ok(sources) => sources,
            Err(err) => return IncrementalBuildResult::failed(err),
        };
        let files = FileSystemMap::load(&self.source, &sources, &self.classifier);
        let outcomes = self.compose_pages(&pages, &files, true);
        let mut recorded = self.record_outcomes(outcomes);
        let copies = self.copy_assets(recorded.referenced_assets.clone());
        recorded.failed.extend(copies.errors);

        info!(
            rebuilt = recorded.built,
            affected = pages.len(),
            failed = recorded.failed.len(),
            "incremental rebuild"
        );
        IncrementalBuildResult {
            success: recorded.failed.is_empty(),
            rebuilt_files: recorded.built,
            affected_pages: pages,
            copied_assets: copies.copied.len(),
            removed_files: 0,
            errors: recorded.failed,
            warnings: recorded.warnings,
            error: None,
        }
    }

    // =========================================================================
    // Check
    // =========================================================================

    /// Classify every source and compose every page without writing output
    /// or touching the cache.
    pub fn check(&self) -> Result<CheckReport, BuildError> {
        let sources = self.tracked_sources()?;
        let mut report = CheckReport::default();
        let mut pages = Vec::new();
        for path in self.all_sources()? {
            let class = self.classifier.classify(&path);
            if class.is_page() {
                report.pages += 1;
                pages.push(path);
            } else if class.is_fragment() {
                report.fragments += 1;
            } else if class.is_asset() {
                report.assets += 1;
            } else {
                report.ignored += 1;
            }
        }
        let files = FileSystemMap::load(&self.source, &sources, &self.classifier);
        for outcome in self.compose_pages(&pages, &files, false) {
            match outcome.result {
                Ok(composed) => report.warnings.extend(composed.errors),
                Err(err) => report.failed.push(err),
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Shared steps
    // =========================================================================

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.source.join(path))
        }
    }

    fn all_sources(&self) -> Result<Vec<PathBuf>, BuildError> {
        files::enumerate_sources(&self.source, &[&self.output, &self.cache_dir])
            .map_err(|e| BuildError::filesystem(&self.source, e))
    }

    /// Sources the builder cares about: everything not ignored.
    fn tracked_sources(&self) -> Result<Vec<PathBuf>, BuildError> {
        Ok(self
            .all_sources()?
            .into_iter()
            .filter(|path| !self.classifier.classify(path).is_ignored())
            .collect())
    }

    /// Compose `pages` in parallel against `files`.
    fn compose_pages(
        &self,
        pages: &[PathBuf],
        files: &FileSystemMap,
        write: bool,
    ) -> Vec<PageOutcome> {
        let context = CompositionContext::new();
        let composer = Composer::new(
            &self.source,
            files,
            &self.options.policy,
            &*self.renderer,
            &context,
        );
        pages
            .par_iter()
            .map(|page| self.build_page(&composer, files, page, write))
            .collect()
    }

    fn build_page(
        &self,
        composer: &Composer<'_>,
        files: &FileSystemMap,
        page: &Path,
        write: bool,
    ) -> PageOutcome {
        let content = match files.get(page) {
            Some(content) => content,
            None => match fs::read_to_string(page) {
                Ok(content) => Arc::from(content),
                Err(err) => {
                    return PageOutcome {
                        page: page.to_path_buf(),
                        content: None,
                        result: Err(BuildError::filesystem(page, err)),
                    };
                }
            },
        };

        let result = composer
            .process_file(page, &content)
            .map_err(|source| BuildError::Composition {
                file: page.to_path_buf(),
                source,
            })
            .and_then(|mut composed| {
                composed.html = self.post_process(&composed.html);
                if write {
                    let target = self.output_path_for(page);
                    files::write_atomic(&target, composed.html.as_bytes())
                        .map_err(|e| BuildError::filesystem(&target, e))?;
                    debug!(page = %page.display(), output = %target.display(), "wrote page");
                }
                Ok(composed)
            });

        PageOutcome {
            page: page.to_path_buf(),
            content: Some(content),
            result,
        }
    }

    fn post_process(&self, html: &str) -> String {
        let html = postprocess::normalize_links(html, self.options.pretty_urls);
        if self.options.minify {
            postprocess::minify_html(&html)
        } else {
            html
        }
    }

    /// Fold page outcomes into the cache and dependency graph.
    fn record_outcomes(&mut self, outcomes: Vec<PageOutcome>) -> Recorded {
        let mut recorded = Recorded::default();
        for PageOutcome {
            page,
            content,
            result,
        } in outcomes
        {
            match result {
                Ok(composed) => {
                    recorded.built += 1;
                    if let Some(content) = &content {
                        self.cache.update_hash(&page, content);
                    }
                    self.tracker
                        .record_dependencies(&page, &composed.dependencies);
                    recorded.referenced_assets.extend(
                        composed
                            .dependencies
                            .iter()
                            .filter(|dep| dep.kind == DependencyKind::Asset)
                            .map(|dep| dep.path.clone()),
                    );
                    self.cache.set_dependencies(&page, composed.dependencies);
                    recorded.warnings.extend(composed.errors);
                }
                Err(err) => {
                    error!(file = %err.file(), error = %err, "page failed");
                    self.cache.remove(&page);
                    if let Some(content) = &content {
                        let deps = self.tracker.track_page_dependencies(
                            &page,
                            content,
                            &self.source,
                            &self.options.policy,
                        );
                        self.cache.set_dependencies(&page, deps);
                    }
                    recorded.failed.push(err);
                }
            }
        }
        recorded
    }

    /// Assets the recorded graph says the pages use, closed over stylesheet
    /// references, plus explicit copies. Their outputs should exist.
    fn expected_assets(&self, sources: &[PathBuf]) -> BTreeSet<PathBuf> {
        let mut seeds = Vec::new();
        for path in sources {
            let class = self.classifier.classify(path);
            if class.explicit_copy {
                seeds.push(path.clone());
            } else if class.is_page() {
                seeds.extend(
                    self.tracker
                        .dependencies_of(path)
                        .into_iter()
                        .filter(|dep| dep.kind == DependencyKind::Asset)
                        .map(|dep| dep.path),
                );
            }
        }
        assets::collect_assets(seeds, &self.source, &self.classifier)
    }

    /// Copy `seeds` and the stylesheet references they pull in. Copied
    /// sources are hashed; failed ones lose their hash.
    fn copy_assets(&mut self, seeds: impl IntoIterator<Item = PathBuf>) -> CopiedAssets {
        let selected = assets::collect_assets(seeds, &self.source, &self.classifier);
        let results: Vec<(PathBuf, io::Result<PathBuf>)> = selected
            .into_par_iter()
            .map(|asset| {
                let copied = assets::copy_asset(&asset, &self.source, &self.output);
                (asset, copied)
            })
            .collect();

        let mut outcome = CopiedAssets::default();
        for (asset, copied) in results {
            match copied {
                Ok(_) => {
                    if let Err(err) = self.cache.store_hash(&asset) {
                        debug!(asset = %asset.display(), error = %err, "cannot hash asset");
                    }
                    outcome.copied.insert(asset);
                }
                Err(err) => {
                    error!(asset = %asset.display(), error = %err, "asset copy failed");
                    self.cache.remove(&asset);
                    outcome.errors.push(BuildError::filesystem(&asset, err));
                    outcome.failed.insert(asset);
                }
            }
        }
        outcome
    }

    fn persist_cache(&self) {
        if let Err(err) = self.cache.persist() {
            warn!(
                dir = %self.cache.cache_dir().display(),
                error = %err,
                "cannot persist build cache, next build starts cold"
            );
        }
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), BuildError> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(BuildError::filesystem(dir, err)),
    }
}
