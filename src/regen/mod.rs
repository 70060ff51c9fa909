//! Content regeneration.
//!
//! A [`Regenerator`] turns a source file into fresh overlay content. The
//! [`StalenessGate`] decides when to call it and owns every write into the
//! overlay; regenerators only ever read the source tree.

mod append;
mod gate;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use append::AppendRegenerator;
pub use gate::{FreshnessRecord, GateOptions, StalenessGate, StalenessPolicy};

/// Successful outcome of a regeneration call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Regeneration {
    /// Nothing to materialize for this file.
    Unchanged,
    /// New content for the overlay copy of the file.
    Updated(Vec<u8>),
}

#[derive(Debug, thiserror::Error)]
pub enum RegenError {
    #[error("Regeneration failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regeneration timed out after {0:?}")]
    TimedOut(Duration),
}

pub type RegenResult = Result<Regeneration, RegenError>;

/// Computes overlay content from a source file.
#[async_trait::async_trait]
pub trait Regenerator: Send + Sync {
    /// `source` is the absolute path of the file in the source tree.
    async fn regenerate(&self, source: &Path) -> RegenResult;
}

/// Regenerator backed by a plain closure.
///
/// The closure runs on the blocking pool, so a slow one neither stalls a
/// runtime worker nor escapes the gate's timeout.
pub struct FnRegenerator<F> {
    f: Arc<F>,
}

#[async_trait::async_trait]
impl<F> Regenerator for FnRegenerator<F>
where
    F: Fn(&Path) -> RegenResult + Send + Sync + 'static,
{
    async fn regenerate(&self, source: &Path) -> RegenResult {
        let f = Arc::clone(&self.f);
        let source = source.to_path_buf();
        tokio::task::spawn_blocking(move || f(&source))
            .await
            .map_err(|e| RegenError::Failed(format!("regenerator task failed: {}", e)))?
    }
}

pub fn from_fn<F>(f: F) -> FnRegenerator<F>
where
    F: Fn(&Path) -> RegenResult + Send + Sync + 'static,
{
    FnRegenerator { f: Arc::new(f) }
}
