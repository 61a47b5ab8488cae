//! Locating a runnable `inotifywait` for the current CPU.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, WatchError};

pub const UTILITY: &str = "inotifywait";

/// Supplies an absolute, executable path to the watch utility.
pub trait BinaryProvider: Send + Sync {
    fn resolve(&self) -> Result<PathBuf>;
}

/// A utility already installed at a known path.
#[derive(Debug, Clone)]
pub struct FixedBinary(pub PathBuf);

impl BinaryProvider for FixedBinary {
    fn resolve(&self) -> Result<PathBuf> {
        if self.0.is_file() {
            Ok(self.0.clone())
        } else {
            Err(WatchError::Provision {
                arch: std::env::consts::ARCH.to_string(),
                reason: format!("{} does not exist", self.0.display()),
            })
        }
    }
}

/// The first `inotifywait` found on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBinary;

impl BinaryProvider for SystemBinary {
    fn resolve(&self) -> Result<PathBuf> {
        std::env::var_os("PATH")
            .iter()
            .flat_map(std::env::split_paths)
            .map(|dir| dir.join(UTILITY))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| WatchError::Provision {
                arch: std::env::consts::ARCH.to_string(),
                reason: format!("{} is not on PATH", UTILITY),
            })
    }
}

/// Per-architecture builds shipped under `assets/inotifywait/<abi>/`, copied
/// into `install/inotifywait/<abi>/` the first time they are needed.
#[derive(Debug, Clone)]
pub struct BundledBinary {
    assets: PathBuf,
    install: PathBuf,
    arch: String,
}

impl BundledBinary {
    pub fn new(assets: impl Into<PathBuf>, install: impl Into<PathBuf>) -> Self {
        Self {
            assets: assets.into(),
            install: install.into(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    /// Overrides the detected architecture.
    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    fn relative(&self) -> PathBuf {
        Path::new(UTILITY).join(abi_folder(&self.arch)).join(UTILITY)
    }
}

impl BinaryProvider for BundledBinary {
    fn resolve(&self) -> Result<PathBuf> {
        let relative = self.relative();
        let target = self.install.join(&relative);
        if target.is_file() {
            return Ok(target);
        }

        let source = self.assets.join(&relative);
        if !source.is_file() {
            return Err(WatchError::Provision {
                arch: self.arch.clone(),
                reason: format!("no bundled build at {}", source.display()),
            });
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, &target)?;
        make_executable(&target)?;
        info!("Installed {} to {}", UTILITY, target.display());

        Ok(target)
    }
}

/// Folder name of the build for a Rust `target_arch` value. Unknown
/// architectures fall back to the 32-bit ARM build.
pub fn abi_folder(arch: &str) -> &'static str {
    match arch {
        "aarch64" => "arm64-v8a",
        "x86" => "x86",
        "x86_64" => "x86_64",
        "mips" | "mips64" => "mips",
        _ => "armeabi-v7a",
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
