//! bqetl core
//!
//! Shared configuration and the per-query metadata record that the
//! scheduling crate consumes. Everything here is parsed and validated at
//! the boundary so downstream code only ever sees typed fields.

pub mod config;
pub mod metadata;

pub use config::{AddressingPolicy, Config, ConfigError};
pub use metadata::{Metadata, MetadataError, Scheduling, METADATA_FILE};
