//! Optinstaller - OptiScaler version manager
//!
//! Library crate with the version pipeline (release feeds, downloads, archive
//! extraction, local cache) and the install engine. The CLI in `main.rs` is a
//! thin front-end over it.

#[macro_use]
pub mod paths;

pub mod compat;
pub mod config;
pub mod github;
pub mod installers;
pub mod logging;
pub mod tasks;
pub mod utils;
pub mod versions;
