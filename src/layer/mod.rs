//! Merged view over a read-only source tree and a writable overlay tree.
//!
//! - Union view: lookup order, listing merge, copy-up on mutation
//! - Deletion markers that hide source entries without touching the source
//! - Extended attribute passthrough for overlay entries

mod deletions;
mod union_view;
mod xattr;

pub use deletions::{DEFAULT_DELETION_DIRNAME, DeletionStore};
pub use union_view::{Branch, FileState, UnionOptions, UnionView};
