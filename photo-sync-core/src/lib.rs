#![doc = "photo-sync-core: core pipeline for photo-sync."]

//! This crate holds every piece of business logic for publishing photo-sharing
//! posts into static-site repositories: normalization, routing, rendering, the
//! duplicate check, the atomic commit writer and credential rotation. It also
//! ships the source platform client.
//!
//! The destination platform is reached only through the traits in
//! [`contract`]; the CLI crate provides the real implementation.

pub mod commit;
pub mod config;
pub mod contract;
pub mod download;
pub mod duplicate;
pub mod error;
pub mod media;
pub mod normalize;
pub mod render;
pub mod rotate;
pub mod route;
pub mod secret;
pub mod synchronise;

pub use error::{ApiError, RotationError, SyncError};
