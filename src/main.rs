use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use regex::Regex;
use rootwatch::config::{ConfigFile, DEFAULT_FILE};
use rootwatch::{SourcePreference, SuShell, Watcher};
use tracing::{debug, info};

mod logger;

/// Watch a file or directory for inotify events, through an elevated
/// inotifywait when it is not readable
#[derive(Parser, Debug)]
#[command(name = "rootwatch", author, version, about, long_about = None)]
struct Cli {
    /// File or directory to watch (overrides `path` in the config file)
    path: Option<PathBuf>,

    /// Config file (default: ./rootwatch.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Event kind to report, repeatable (default: all)
    #[arg(short, long = "event")]
    events: Vec<String>,

    /// Watch only the path itself, not its subdirectories
    #[arg(long)]
    no_recursive: bool,

    /// Force a source instead of probing the path
    #[arg(long, value_parser = parse_source)]
    source: Option<SourcePreference>,

    /// Regex of paths not to print
    #[arg(long)]
    ignore: Option<String>,

    /// Program used to elevate (default: su)
    #[arg(long)]
    shell: Option<String>,

    /// Path to inotifywait
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_source(value: &str) -> std::result::Result<SourcePreference, String> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(SourcePreference::Auto),
        "native" => Ok(SourcePreference::Native),
        "shell" => Ok(SourcePreference::Shell),
        other => Err(format!("unknown source `{}` (auto, native, shell)", other)),
    }
}

fn load_config(cli: &Cli) -> Result<ConfigFile> {
    let mut config = match &cli.config {
        Some(file) => ConfigFile::load(file)
            .with_context(|| format!("Failed to load config file {}", file.display()))?,
        None if Path::new(DEFAULT_FILE).exists() => ConfigFile::load(Path::new(DEFAULT_FILE))
            .context("Failed to load rootwatch.toml")?,
        None => ConfigFile::default(),
    };

    if let Some(path) = &cli.path {
        config.path = Some(path.clone());
    }
    if !cli.events.is_empty() {
        config.events = cli.events.clone();
    }
    if cli.no_recursive {
        config.recursive = Some(false);
    }
    if cli.source.is_some() {
        config.source = cli.source;
    }
    if cli.ignore.is_some() {
        config.ignore_pattern = cli.ignore.clone();
    }
    if cli.shell.is_some() {
        config.shell = cli.shell.clone();
    }
    if cli.binary.is_some() {
        config.binary = cli.binary.clone();
    }
    if cli.verbose {
        config.verbose = Some(true);
    }
    Ok(config)
}

fn should_ignore_path(path: &Path, ignore: Option<&Regex>) -> bool {
    ignore
        .map(|regex| regex.is_match(&path.to_string_lossy()))
        .unwrap_or(false)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logger::init(config.verbose.unwrap_or(false));

    let path = config
        .path
        .clone()
        .context("No path to watch (pass one or set `path` in rootwatch.toml)")?;
    let ignore = config
        .ignore_pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid ignore pattern")?;
    let options = config.options().context("Invalid event list")?;

    let shell = SuShell::new(config.shell.clone().unwrap_or_else(|| "su".to_string()));
    let binary = config.binary_provider();

    let (tx, rx) = unbounded();
    let watcher = Watcher::builder(&path)
        .options(options)
        .shell(shell)
        .binary_arc(binary)
        .build_channel(tx)
        .context("Failed to create watcher")?;
    watcher
        .start_watching()
        .with_context(|| format!("Failed to watch path: {}", path.display()))?;

    info!(
        "Watching {} for {} via the {:?} source",
        watcher.path().display(),
        watcher.mask(),
        watcher.source_kind()
    );

    for event in rx {
        if should_ignore_path(&event.path, ignore.as_ref()) {
            debug!("Ignored: {}", event.path.display());
            continue;
        }
        logger::event(&event, cli.json);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config_values() {
        let cli = Cli::parse_from([
            "rootwatch",
            "/data/app",
            "-e",
            "create",
            "-e",
            "delete",
            "--no-recursive",
            "--source",
            "shell",
            "--config",
            "/nonexistent/rootwatch.toml",
        ]);
        assert_eq!(cli.events, vec!["create", "delete"]);
        assert_eq!(cli.source, Some(SourcePreference::Shell));
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn ignore_pattern_matches_full_path() {
        let regex = Regex::new(r"\.swp$").unwrap();
        assert!(should_ignore_path(Path::new("/a/.b.swp"), Some(&regex)));
        assert!(!should_ignore_path(Path::new("/a/b.txt"), Some(&regex)));
        assert!(!should_ignore_path(Path::new("/a/b.swp"), None));
    }

    #[test]
    fn source_names_are_case_insensitive() {
        assert_eq!(parse_source("Native"), Ok(SourcePreference::Native));
        assert!(parse_source("root").is_err());
    }
}
