use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::fuse::MountOptions;
use crate::layer::{DEFAULT_DELETION_DIRNAME, UnionOptions};
use crate::regen::{AppendRegenerator, GateOptions, Regenerator, StalenessPolicy};

/// Prefix for environment overrides, e.g. `REGENFS__REGEN__POLICY=record`.
pub const ENV_PREFIX: &str = "REGENFS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mount: MountConfig,
    pub cache: CacheConfig,
    pub union: UnionConfig,
    pub regen: RegenConfig,
    pub debug: bool,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub mount_point: Option<PathBuf>,
    pub overlay_dir: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub allow_other: bool,
    pub fsname: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_point: None,
            overlay_dir: None,
            source_dir: None,
            allow_other: false,
            fsname: "regenfs".to_string(),
        }
    }
}

/// Cache lifetimes in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub entry_ttl: f64,
    pub attr_ttl: f64,
    pub deletion_cache_ttl: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { entry_ttl: 1.0, attr_ttl: 1.0, deletion_cache_ttl: 5.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnionConfig {
    pub deletion_dirname: String,
}

impl Default for UnionConfig {
    fn default() -> Self {
        Self { deletion_dirname: DEFAULT_DELETION_DIRNAME.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenConfig {
    pub policy: StalenessPolicy,
    pub precreate_dirs: bool,
    pub atomic_writes: bool,
    pub file_mode: u32,
    /// Seconds; unset means wait for the regenerator indefinitely.
    pub timeout: Option<f64>,
    /// Files with these extensions get `append_text` appended. Empty disables
    /// regeneration.
    pub append_extensions: Vec<String>,
    pub append_text: String,
}

impl Default for RegenConfig {
    fn default() -> Self {
        Self {
            policy: StalenessPolicy::Mtime,
            precreate_dirs: false,
            atomic_writes: true,
            file_mode: 0o644,
            timeout: None,
            append_extensions: Vec::new(),
            append_text: "\nhello\n".to_string(),
        }
    }
}

fn seconds(name: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow::anyhow!("{} must be a non-negative number of seconds, got {}", name, value))
}

fn required<'a>(name: &str, value: &'a Option<PathBuf>) -> anyhow::Result<&'a Path> {
    value.as_deref().ok_or_else(|| anyhow::anyhow!("{} is not configured", name))
}

impl Config {
    /// Load `regenfs.toml` (or `path`), then apply `REGENFS__*` overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("regenfs").required(false),
        };
        Self::from_sources(file, ENV_PREFIX)
    }

    fn from_sources<S>(file: S, env_prefix: &str) -> anyhow::Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("regen.append_extensions")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check everything needed to mount, returning the three directories.
    pub fn validate(&self) -> anyhow::Result<(&Path, &Path, &Path)> {
        let mount_point = required("mount point", &self.mount.mount_point)?;
        let overlay = required("overlay directory", &self.mount.overlay_dir)?;
        let source = required("source directory", &self.mount.source_dir)?;

        if !overlay.is_dir() {
            anyhow::bail!("Overlay directory does not exist: {}", overlay.display());
        }
        if !source.is_dir() {
            anyhow::bail!("Source directory does not exist: {}", source.display());
        }

        let dirname = &self.union.deletion_dirname;
        if dirname.is_empty() || dirname.contains('/') || dirname == "." || dirname == ".." {
            anyhow::bail!("Invalid deletion directory name: {:?}", dirname);
        }

        seconds("entry_ttl", self.cache.entry_ttl)?;
        seconds("attr_ttl", self.cache.attr_ttl)?;
        seconds("deletion_cache_ttl", self.cache.deletion_cache_ttl)?;
        if let Some(timeout) = self.regen.timeout {
            seconds("timeout", timeout)?;
        }

        Ok((mount_point, overlay, source))
    }

    pub fn union_options(&self) -> anyhow::Result<UnionOptions> {
        Ok(UnionOptions {
            deletion_dirname: self.union.deletion_dirname.clone(),
            deletion_cache_ttl: seconds("deletion_cache_ttl", self.cache.deletion_cache_ttl)?,
        })
    }

    pub fn gate_options(&self) -> anyhow::Result<GateOptions> {
        let timeout = match self.regen.timeout {
            Some(secs) => Some(seconds("timeout", secs)?),
            None => None,
        };
        Ok(GateOptions {
            policy: self.regen.policy,
            precreate_dirs: self.regen.precreate_dirs,
            atomic_writes: self.regen.atomic_writes,
            file_mode: self.regen.file_mode,
            timeout,
            reserved: vec![format!("/{}", self.union.deletion_dirname)],
        })
    }

    pub fn mount_options(&self) -> anyhow::Result<MountOptions> {
        Ok(MountOptions {
            allow_other: self.mount.allow_other,
            fsname: Some(self.mount.fsname.clone()),
            entry_ttl: seconds("entry_ttl", self.cache.entry_ttl)?,
            attr_ttl: seconds("attr_ttl", self.cache.attr_ttl)?,
            ..Default::default()
        })
    }

    /// The configured regenerator, if any.
    pub fn regenerator(&self) -> Option<Arc<dyn Regenerator>> {
        if self.regen.append_extensions.is_empty() {
            return None;
        }
        Some(Arc::new(AppendRegenerator::new(
            self.regen.append_extensions.iter().cloned(),
            self.regen.append_text.clone(),
        )))
    }
}
