use clap::Parser;
use regenfs::config::Config;
use regenfs::fuse::{self, FilesystemInterface, RegenBackend};
use regenfs::layer::UnionView;
use regenfs::regen::{StalenessGate, StalenessPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mount SOURCE_DIR merged under OVERLAY_DIR at MOUNTPOINT, regenerating
/// overlay content whenever the source is newer.
#[derive(Debug, Parser)]
#[command(name = "regenfs", version, about)]
struct Cli {
    /// Where to mount the merged view
    mountpoint: PathBuf,

    /// Writable tree that receives regenerated content and user writes
    overlay_dir: PathBuf,

    /// Read-only tree holding the original content
    source_dir: PathBuf,

    /// Configuration file (defaults to ./regenfs.toml if present)
    #[arg(long, env = "REGENFS_CONFIG")]
    config: Option<PathBuf>,

    /// Log every filesystem operation
    #[arg(long)]
    debug: bool,

    /// Kernel entry cache lifetime in seconds
    #[arg(long)]
    entry_ttl: Option<f64>,

    /// Kernel attribute cache lifetime in seconds
    #[arg(long)]
    attr_ttl: Option<f64>,

    /// Deletion marker cache lifetime in seconds
    #[arg(long)]
    deletion_cache_ttl: Option<f64>,

    /// Name of the deletion marker directory inside the overlay
    #[arg(long)]
    deletion_dirname: Option<String>,

    /// How staleness is decided
    #[arg(long, value_enum)]
    policy: Option<StalenessPolicy>,

    /// Mirror source directories into the overlay on first access
    #[arg(long)]
    precreate_dirs: bool,

    /// Regenerate files with this extension (repeatable)
    #[arg(long = "append-ext", value_name = "EXT")]
    append_ext: Vec<String>,

    /// Text appended to regenerated files
    #[arg(long)]
    append_text: Option<String>,

    /// Let other users access the mount
    #[arg(long)]
    allow_other: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        config.mount.mount_point = Some(self.mountpoint);
        config.mount.overlay_dir = Some(self.overlay_dir);
        config.mount.source_dir = Some(self.source_dir);
        config.mount.allow_other |= self.allow_other;
        config.debug |= self.debug;
        config.log_json |= self.log_json;
        config.regen.precreate_dirs |= self.precreate_dirs;

        if let Some(ttl) = self.entry_ttl {
            config.cache.entry_ttl = ttl;
        }
        if let Some(ttl) = self.attr_ttl {
            config.cache.attr_ttl = ttl;
        }
        if let Some(ttl) = self.deletion_cache_ttl {
            config.cache.deletion_cache_ttl = ttl;
        }
        if let Some(dirname) = self.deletion_dirname {
            config.union.deletion_dirname = dirname;
        }
        if let Some(policy) = self.policy {
            config.regen.policy = policy;
        }
        if !self.append_ext.is_empty() {
            config.regen.append_extensions = self.append_ext;
        }
        if let Some(text) = self.append_text {
            config.regen.append_text = text;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    let default_filter = if config.debug { "regenfs=debug" } else { "regenfs=info" };
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into()),
    );
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let (mountpoint, overlay, source) = config.validate()?;

    let view = UnionView::new(source, overlay, config.union_options()?);
    view.set_debug(config.debug);

    let regenerator = config.regenerator();
    if regenerator.is_none() {
        tracing::warn!("No regenerator configured, serving the merged view as is");
    }
    let gate = Arc::new(StalenessGate::new(source, overlay, regenerator, config.gate_options()?));
    let backend: Arc<dyn FilesystemInterface> =
        Arc::new(RegenBackend::new(Arc::new(view), gate));

    tracing::info!(
        mountpoint = %mountpoint.display(),
        overlay = %overlay.display(),
        source = %source.display(),
        policy = ?config.regen.policy,
        "Starting regenfs"
    );

    fuse::serve(backend, mountpoint, config.mount_options()?)
}
