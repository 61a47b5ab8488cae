//! `rootwatch.toml` settings.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::binary::{BinaryProvider, BundledBinary, FixedBinary, SystemBinary};
use crate::error::{Result, WatchError};
use crate::mask::EventMask;
use crate::source::SourcePreference;
use crate::watcher::WatchOptions;

pub const DEFAULT_FILE: &str = "rootwatch.toml";

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub path: Option<PathBuf>,
    /// Kind names; empty means every kind.
    pub events: Vec<String>,
    pub recursive: Option<bool>,
    pub source: Option<SourcePreference>,
    pub verbose: Option<bool>,
    pub ignore_pattern: Option<String>,
    /// Program used for elevation.
    pub shell: Option<String>,
    /// Explicit path to `inotifywait`.
    pub binary: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load(file_path: &Path) -> Result<Self> {
        let text = fs::read_to_string(file_path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| WatchError::Config(e.to_string()))
    }

    /// Union of the configured kind names. Unknown names are skipped, so a
    /// list of only unknown names is rejected rather than watching nothing.
    pub fn mask(&self) -> Result<EventMask> {
        if self.events.is_empty() {
            return Ok(EventMask::ALL);
        }
        let mask = self
            .events
            .iter()
            .fold(EventMask::empty(), |acc, name| acc | EventMask::parse(name));
        if mask.is_empty() {
            return Err(WatchError::Config(format!(
                "no known event kinds in {:?}",
                self.events
            )));
        }
        Ok(mask)
    }

    pub fn options(&self) -> Result<WatchOptions> {
        let defaults = WatchOptions::default();
        Ok(WatchOptions {
            mask: self.mask()?,
            recursive: self.recursive.unwrap_or(defaults.recursive),
            source: self.source.unwrap_or(defaults.source),
        })
    }

    /// An explicit binary wins, then a bundled build, then `PATH`.
    pub fn binary_provider(&self) -> Arc<dyn BinaryProvider> {
        match (&self.binary, &self.assets_dir, &self.install_dir) {
            (Some(binary), _, _) => Arc::new(FixedBinary(binary.clone())),
            (None, Some(assets), install) => Arc::new(BundledBinary::new(
                assets.clone(),
                install.clone().unwrap_or_else(|| assets.join("installed")),
            )),
            (None, None, _) => Arc::new(SystemBinary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_file() {
        let config = ConfigFile::parse(
            r#"
            path = "/data/app"
            events = ["create", "CLOSE_WRITE"]
            recursive = false
            source = "shell"
            verbose = true
            ignore_pattern = "\\.tmp$"
            shell = "/system/xbin/su"
            binary = "/data/local/inotifywait"
            "#,
        )
        .unwrap();

        assert_eq!(config.path, Some(PathBuf::from("/data/app")));
        let options = config.options().unwrap();
        assert_eq!(options.mask, EventMask::CREATE | EventMask::CLOSE_WRITE);
        assert!(!options.recursive);
        assert_eq!(options.source, SourcePreference::Shell);
        assert_eq!(config.shell.as_deref(), Some("/system/xbin/su"));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = ConfigFile::parse("").unwrap();
        let options = config.options().unwrap();
        assert_eq!(options.mask, EventMask::ALL);
        assert!(options.recursive);
        assert_eq!(options.source, SourcePreference::Auto);
    }

    #[test]
    fn only_unknown_kinds_is_an_error() {
        let config = ConfigFile::parse(r#"events = ["CRAETE"]"#).unwrap();
        assert!(matches!(config.mask(), Err(WatchError::Config(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ConfigFile::parse("delay = 3").is_err());
    }
}
