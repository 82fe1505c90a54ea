//! Rampart - RPKI relying-party validator cache
//!
//! The persistent local artifact cache of a relying-party validator, plus
//! the loader for the SLURM exception document. The validator drives the
//! cache through [`cache::Cache`]: `prepare` at startup, `download` per
//! URI, `cleanup` at shutdown; the actual transports plug in through
//! [`fetch::Fetcher`].

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod overlay;
pub mod path;
pub mod uri;

pub use error::{RampartError, RampartResult};
