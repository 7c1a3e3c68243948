//! Shared domain model, wire schemas, config and error types for the
//! media-processing backplane. See `SPEC_FULL.md` §3, §6.

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod messages;
pub mod notifier;
pub mod paths;

pub use error::{CoreError, Result};
