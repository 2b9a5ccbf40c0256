//! Static asset selection and copying.
//!
//! A build copies the assets its pages reference, not every asset in the
//! tree. Stylesheets pull in what they reference through `url()` and
//! `@import`, transitively. Files matching a `copy` or `ignore_render`
//! pattern are copied whether referenced or not.

use super::files::copy_atomic;
use crate::classify::FileClassifier;
use crate::compose::references::{css_urls, local_url_target};
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Close `seeds` over stylesheet references. Only files the classifier
/// treats as assets are kept.
pub fn collect_assets(
    seeds: impl IntoIterator<Item = PathBuf>,
    source_root: &Path,
    classifier: &FileClassifier,
) -> BTreeSet<PathBuf> {
    let mut found = BTreeSet::new();
    let mut queue: VecDeque<PathBuf> = seeds.into_iter().collect();

    while let Some(path) = queue.pop_front() {
        if found.contains(&path) || !path.is_file() || !classifier.classify(&path).is_asset() {
            continue;
        }
        if is_stylesheet(&path)
            && let Ok(css) = fs::read_to_string(&path)
        {
            for url in css_urls(&css) {
                if let Some(target) = local_url_target(url, &path, source_root)
                    && !found.contains(&target)
                {
                    queue.push_back(target);
                }
            }
        }
        found.insert(path);
    }
    found
}

/// Copy one asset to its mirrored location under `output_root`.
pub fn copy_asset(source: &Path, source_root: &Path, output_root: &Path) -> io::Result<PathBuf> {
    let relative = source.strip_prefix(source_root).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is outside the source root", source.display()),
        )
    })?;
    let target = output_root.join(relative);
    copy_atomic(source, &target)?;
    debug!(asset = %relative.display(), "copied asset");
    Ok(target)
}

fn is_stylesheet(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("css"))
}
