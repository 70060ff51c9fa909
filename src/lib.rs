//! regenfs - a merged source/overlay filesystem that regenerates overlay
//! content lazily when the source changes.
//!
//! Request flow: [`fuse::FuseAdapter`] → [`fuse::RegenBackend`] (runs the
//! [`regen::StalenessGate`]) → [`layer::UnionView`] → host directories.

pub mod config;
pub mod fs;
pub mod fuse;
pub mod layer;
pub mod regen;
