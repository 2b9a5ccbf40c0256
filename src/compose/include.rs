//! Legacy server-side include expansion.
//!
//! `<!--#include file="…" -->` resolves relative to the including file,
//! `<!--#include virtual="…" -->` from the source root. Included content is
//! expanded recursively, and `.md` includes are rendered first.
//!
//! - A missing include is left in place and reported as recoverable.
//! - Nesting beyond [`MAX_DEPTH`] is left in place and reported as
//!   recoverable.
//! - A file including itself, directly or through other includes, is a
//!   [`CompositionError::CircularImport`].

use super::references::{INCLUDE_DIRECTIVE, IncludeDirective};
use super::{
    Composer, CompositionError, Expanded, MAX_DEPTH, ProcessingStack, RecoverableError,
    RecoverableKind, Role,
};
use crate::markdown;
use crate::types::{Dependency, DependencyKind};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

impl Composer<'_> {
    /// Rendered and include-expanded source of `path`. Fragment results are
    /// memoized for the rest of the build; pages are composed once and are
    /// not.
    pub(super) fn expand(
        &self,
        path: &Path,
        raw: &str,
        role: Role,
    ) -> Result<Arc<Expanded>, CompositionError> {
        if role != Role::Page
            && let Some(hit) = self.context.cached(path)
        {
            return Ok(hit);
        }

        let prepared = self.prepare(path, raw, role);
        let mut expanded = Expanded::default();
        let stack = ProcessingStack::new();
        expanded.content = self.expand_includes(path, &prepared, &stack, &mut expanded)?;

        let expanded = Arc::new(expanded);
        if role != Role::Page {
            self.context.remember(path, Arc::clone(&expanded));
        }
        Ok(expanded)
    }

    fn expand_includes(
        &self,
        path: &Path,
        content: &str,
        stack: &ProcessingStack<'_>,
        acc: &mut Expanded,
    ) -> Result<String, CompositionError> {
        if !INCLUDE_DIRECTIVE.is_match(content) {
            return Ok(content.to_string());
        }
        let here = stack.push(path);
        let mut out = String::with_capacity(content.len());
        let mut last = 0;

        for caps in INCLUDE_DIRECTIVE.captures_iter(content) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&content[last..whole.start()]);
            last = whole.end();

            let directive = IncludeDirective::from_captures(&caps);
            let resolved = self
                .resolver
                .resolve(&directive.target, directive.base, path)?;
            acc.dependencies
                .push(Dependency::new(&resolved.primary, DependencyKind::Include));

            let Some((include_path, source)) = resolved.found else {
                if self.context.first_report(&resolved.primary) {
                    warn!(
                        path = %resolved.primary.display(),
                        referenced_from = %path.display(),
                        "include not found, leaving directive in place"
                    );
                }
                acc.errors.push(RecoverableError {
                    kind: RecoverableKind::MissingInclude,
                    path: resolved.primary,
                    referenced_from: path.to_path_buf(),
                });
                out.push_str(whole.as_str());
                continue;
            };
            acc.dependencies
                .push(Dependency::new(&include_path, DependencyKind::Include));

            if here.contains(&include_path) {
                return Err(CompositionError::CircularImport {
                    chain: here.cycle_chain(&include_path, self.source_root()),
                });
            }
            if here.depth() > MAX_DEPTH {
                warn!(
                    path = %include_path.display(),
                    limit = MAX_DEPTH,
                    "include nesting too deep, leaving directive in place"
                );
                acc.errors.push(RecoverableError {
                    kind: RecoverableKind::IncludeDepth,
                    path: include_path,
                    referenced_from: path.to_path_buf(),
                });
                out.push_str(whole.as_str());
                continue;
            }

            let included = if markdown::is_markdown(&include_path) {
                self.renderer.render(&source).html
            } else {
                source.to_string()
            };
            let nested = self.expand_includes(&include_path, &included, &here, acc)?;
            out.push_str(&nested);
        }
        out.push_str(&content[last..]);
        Ok(out)
    }
}
