//! Lighthouse API client and types.
//!
//! This module provides the interface for communicating with the Lighthouse
//! REST API: transport, JSON envelopes, the generic resource service and the
//! typed resources built on it.

mod auth;
mod client;
pub mod envelope;
mod error;
pub mod pagination;
pub mod resources;
pub mod service;

pub use auth::{delete_token, get_token, store_token, Auth, TOKEN_HEADER};
pub use client::{LighthouseClient, RateLimit, DEFAULT_HOST};
pub use error::{ApiError, Result};
