use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use unify::build::{BuildOptions, IncrementalBuilder};
use unify::types::{ChangeEvent, ChangeKind};
use unify::{config, output};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once; clap asks for the version a single time
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "unify")]
#[command(about = "Incremental static site builder with layout composition")]
#[command(long_about = "\
Incremental static site builder with layout composition

Pages are HTML or Markdown files. Files whose name (or any parent directory)
starts with '_' are fragments: layouts, components and includes that are
composed into pages but never written on their own.

Source structure:

  src/
  ├── unify.toml                   # Build config (optional)
  ├── _layouts/
  │   └── base.html                # <main class=\"unify-content\"> is an area
  ├── _includes/
  │   └── footer.html              # <!--#include virtual=\"/_includes/footer.html\" -->
  ├── index.html                   # <html data-unify=\"/_layouts/base.html\">
  ├── blog/
  │   └── first-post.md            # frontmatter 'layout:' picks the layout
  └── css/site.css                 # copied when a page references it

Only pages whose sources or fragments changed are rebuilt; hashes and the
dependency graph persist in the cache directory between runs.

Run 'unify gen-config' to generate a documented unify.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Source directory
    #[arg(long, default_value = "src", global = true)]
    source: PathBuf,

    /// Output directory
    #[arg(long, default_value = "dist", global = true)]
    output: PathBuf,

    /// Cache directory (overrides build.cache_dir)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Write name.html as name/index.html and rewrite links to match
    #[arg(long, global = true)]
    pretty_urls: bool,

    /// Minify emitted HTML
    #[arg(long, global = true)]
    minify: bool,

    /// Remove the output directory and ignore the cache before building
    #[arg(long, global = true)]
    clean: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the whole site, skipping it if nothing changed
    Build,
    /// Rebuild what depends on the given changed, new or deleted files
    Rebuild {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Compose every page in memory and report problems without writing
    Check,
    /// Print a stock unify.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let site_config = config::load_config(&cli.source)?;
    init_thread_pool(&site_config.processing);
    let options = build_options(&cli, &site_config);
    let mut builder = IncrementalBuilder::new(&cli.source, &cli.output, options)?;

    match &cli.command {
        Command::Build => {
            println!(
                "==> Building {} → {}",
                cli.source.display(),
                cli.output.display()
            );
            let result = builder.perform_initial_build();
            output::print_build_output(&result, builder.source());
            if !result.success {
                let reason = result.error.unwrap_or_else(|| "build failed".to_string());
                return Err(reason.into());
            }
        }
        Command::Rebuild { paths } => {
            let mut failures = 0;
            for path in paths {
                let path = absolute_source_path(path)?;
                let kind = if path.exists() {
                    ChangeKind::Modified
                } else {
                    ChangeKind::Deleted
                };
                let result = builder.handle_change(&ChangeEvent::new(&path, kind));
                output::print_rebuild_output(&path, &result, builder.source());
                if !result.success {
                    failures += 1;
                }
            }
            if failures > 0 {
                return Err(format!("{} rebuild(s) failed", failures).into());
            }
        }
        Command::Check => {
            println!("==> Checking {}", cli.source.display());
            let report = builder.check()?;
            output::print_check_output(&report, builder.source());
            if !report.failed.is_empty() {
                return Err(format!("{} page(s) failed", report.failed.len()).into());
            }
            println!("==> Site is valid");
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Config file values, overridden by command-line flags.
fn build_options(cli: &Cli, site_config: &config::SiteConfig) -> BuildOptions {
    let mut options = BuildOptions::from_config(site_config);
    options.pretty_urls |= cli.pretty_urls;
    options.minify |= cli.minify;
    options.clean |= cli.clean;
    if let Some(dir) = &cli.cache_dir {
        options.cache_dir = dir.clone();
    }
    options
}

/// Log to stderr so command output on stdout stays clean.
fn setup_logging(verbose: bool) {
    let default = if verbose { "unify=debug" } else { "unify=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: `max_processes` can lower it, never raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Resolve a path given on the command line the way the builder sees source
/// files: canonical when it exists, absolute when it was deleted.
fn absolute_source_path(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        return std::fs::canonicalize(path);
    }
    let absolute = std::path::absolute(path)?;
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) if parent.exists() => {
            Ok(std::fs::canonicalize(parent)?.join(name))
        }
        _ => Ok(absolute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_release_or_dev_build() {
        let version = version_string();
        if env!("ON_RELEASE_TAG") == "true" {
            assert_eq!(version, env!("CARGO_PKG_VERSION"));
        } else {
            assert!(version.starts_with("dev@"), "{version}");
            assert_eq!(version == "dev@unknown", env!("GIT_HASH").is_empty());
        }
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from(["unify", "--minify", "--cache-dir", "/tmp/c", "build"]);
        let options = build_options(&cli, &config::SiteConfig::default());
        assert!(options.minify);
        assert!(!options.pretty_urls);
        assert_eq!(options.cache_dir, PathBuf::from("/tmp/c"));
    }
}
