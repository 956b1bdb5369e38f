//! Lighthouse issue tracker client.
//!
//! The library behind the `lh` command-line client and the `lhtogitlab`
//! migration tool: a typed REST client for Lighthouse, profile
//! configuration, an account exporter and a GitLab importer for the export
//! archives.

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod migrate;
