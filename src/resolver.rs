//! Engine executable lookup.
//!
//! Bundled engines live in one directory and follow the naming scheme
//! `stockfish_<NN>_x64[_<variant>][.exe]`, where `NN` is the two-digit major version.

use log::{debug, info};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::{PoolConfig, Variant};
use crate::config_error;
use crate::errors::Result;

pub const ENGINE_FILE_NAME_PREFIX: &str = "stockfish_";
pub const ENGINE_FILE_NAME_SUFFIX: &str = "_x64";

/// Maps a variant and an optional version to an executable path
pub trait BinaryResolver: Send + Sync {
    fn resolve(&self, variant: Variant, version: Option<u32>) -> Result<PathBuf>;
}

/// Always answers with one configured path
#[derive(Debug, Clone)]
pub struct FixedPathResolver {
    path: PathBuf,
}

impl FixedPathResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BinaryResolver for FixedPathResolver {
    fn resolve(&self, _variant: Variant, _version: Option<u32>) -> Result<PathBuf> {
        Ok(self.path.clone())
    }
}

/// Picks an engine out of the assets directory
#[derive(Debug, Clone)]
pub struct AssetsResolver {
    dir: PathBuf,
    supported_versions: BTreeSet<u32>,
    windows: bool,
}

impl AssetsResolver {
    /// Scan `dir` for bundled engines
    pub fn scan<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::scan_for_platform(dir, cfg!(windows))
    }

    pub fn scan_for_platform<P: AsRef<Path>>(dir: P, windows: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            config_error!("Error accessing assets location {}: {}", dir.display(), e)
        })?;

        let mut supported_versions = BTreeSet::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(version) = name.to_str().and_then(parse_version) {
                debug!("Supported engine: {}", dir.join(&name).display());
                supported_versions.insert(version);
            }
        }

        if supported_versions.is_empty() {
            return Err(config_error!("No engines found in {}", dir.display()));
        }

        Ok(Self {
            dir,
            supported_versions,
            windows,
        })
    }

    pub fn supported_versions(&self) -> &BTreeSet<u32> {
        &self.supported_versions
    }

    fn pick_version(&self, requested: Option<u32>) -> u32 {
        // Non-empty by construction
        let highest = self.supported_versions.iter().next_back().copied().unwrap_or_default();
        match requested {
            Some(version) if self.supported_versions.contains(&version) => version,
            Some(version) => {
                info!(
                    "Version {} not found. Defaulting to highest available: {}",
                    version, highest
                );
                highest
            }
            None => {
                info!("No version was specified. Defaulting to highest available: {}", highest);
                highest
            }
        }
    }

    fn variant_suffix(&self, variant: Variant) -> Result<&'static str> {
        let suffix = match (self.windows, variant) {
            (true, Variant::Default) => ".exe",
            (true, Variant::Bmi2) => "_bmi2.exe",
            (true, Variant::Popcnt) => "_popcnt.exe",
            (false, Variant::Default) => "",
            (false, Variant::Bmi2) => "_bmi2",
            (false, Variant::Modern) => "_modern",
            (_, variant) => {
                return Err(config_error!(
                    "Illegal variant provided for this platform: {:?}",
                    variant
                ))
            }
        };
        Ok(suffix)
    }
}

impl BinaryResolver for AssetsResolver {
    fn resolve(&self, variant: Variant, version: Option<u32>) -> Result<PathBuf> {
        let version = self.pick_version(version);
        let file_name = format!(
            "{}{}{}{}",
            ENGINE_FILE_NAME_PREFIX,
            version,
            ENGINE_FILE_NAME_SUFFIX,
            self.variant_suffix(variant)?
        );
        Ok(self.dir.join(file_name))
    }
}

/// Resolver for a configuration: the explicit path if one is set, otherwise the assets scan
pub fn resolver_for(config: &PoolConfig) -> Result<Box<dyn BinaryResolver>> {
    match &config.engine_path {
        Some(path) => Ok(Box::new(FixedPathResolver::new(path.clone()))),
        None => Ok(Box::new(AssetsResolver::scan(&config.assets_dir)?)),
    }
}

/// Two-digit version from names like `stockfish_16_x64_bmi2`
fn parse_version(file_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(ENGINE_FILE_NAME_PREFIX)?;
    let (digits, tail) = rest.split_at(rest.find(|c: char| !c.is_ascii_digit())?);
    if digits.len() != 2 || !tail.starts_with(ENGINE_FILE_NAME_SUFFIX) {
        return None;
    }
    digits.parse().ok().filter(|version| *version >= 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn assets_with(names: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in names {
            File::create(dir.path().join(name)).unwrap();
        }
        dir
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("stockfish_16_x64"), Some(16));
        assert_eq!(parse_version("stockfish_10_x64_bmi2"), Some(10));
        assert_eq!(parse_version("stockfish_9_x64"), None);
        assert_eq!(parse_version("stockfish_16"), None);
        assert_eq!(parse_version("README.md"), None);
    }

    #[test]
    fn test_resolves_requested_or_highest_version() {
        let dir = assets_with(&["stockfish_10_x64", "stockfish_16_x64", "stockfish_16_x64_bmi2"]);
        let resolver = AssetsResolver::scan_for_platform(dir.path(), false).unwrap();
        assert_eq!(
            resolver.supported_versions().iter().copied().collect::<Vec<_>>(),
            vec![10, 16]
        );

        assert_eq!(
            resolver.resolve(Variant::Default, Some(10)).unwrap(),
            dir.path().join("stockfish_10_x64")
        );
        assert_eq!(
            resolver.resolve(Variant::Bmi2, None).unwrap(),
            dir.path().join("stockfish_16_x64_bmi2")
        );
        // Unknown version falls back to the highest one
        assert_eq!(
            resolver.resolve(Variant::Modern, Some(12)).unwrap(),
            dir.path().join("stockfish_16_x64_modern")
        );
    }

    #[test]
    fn test_platform_variant_rules() {
        let dir = assets_with(&["stockfish_15_x64.exe"]);
        let windows = AssetsResolver::scan_for_platform(dir.path(), true).unwrap();
        assert_eq!(
            windows.resolve(Variant::Popcnt, None).unwrap(),
            dir.path().join("stockfish_15_x64_popcnt.exe")
        );
        assert!(windows.resolve(Variant::Modern, None).is_err());

        let unix = AssetsResolver::scan_for_platform(dir.path(), false).unwrap();
        assert!(unix.resolve(Variant::Popcnt, None).is_err());
    }

    #[test]
    fn test_empty_assets_directory() {
        let dir = assets_with(&["notes.txt"]);
        assert!(AssetsResolver::scan(dir.path()).is_err());
        assert!(AssetsResolver::scan(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_resolver_for_explicit_path() {
        let config = PoolConfig::with_engine_path("/usr/games/stockfish");
        let resolver = resolver_for(&config).unwrap();
        assert_eq!(
            resolver.resolve(Variant::Default, Some(10)).unwrap(),
            PathBuf::from("/usr/games/stockfish")
        );
    }
}
