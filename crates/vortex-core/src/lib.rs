//! # Vortex Core - Shared Types and Abstractions
//!
//! This crate provides the foundational types, traits, and configuration structures used
//! throughout the Vortex Kafka-to-MongoDB bridge. It defines the inbound record model,
//! the document-rewriting `Transform`/`Registry` abstractions, and the layered
//! configuration that `vortex-io` and the `vortex` binary build on top of.
//!
//! ## Key Components
//!
//! - **Record**: the inbound broker message model, independent of any particular Kafka client
//! - **Document**: the dynamic, JSON-shaped value that transforms rewrite
//! - **Transform / Registry**: an ordered, composable chain of pure document rewrites
//! - **Configuration**: layered (defaults → file → environment) pipeline configuration
//! - **Error Handling**: the small set of named error variants the pipeline matches on,
//!   plus `anyhow::Error` for everything that only needs to be logged and propagated

pub mod config;
pub mod error;
pub mod record;
pub mod transform;

pub use config::Configuration;
pub use error::VortexError;
pub use record::Record;
pub use transform::{Registry, Transform};

/// The dynamic document shape threaded through the transform registry.
///
/// Modelled as a [`serde_json::Value`] rather than a hand-rolled recursive enum: it already
/// is the recursive tagged variant `{null, bool, number, string, array, object}` called for
/// by the design, and reusing it means transforms, JSON-decoding, and BSON conversion on the
/// way into the store all share one well-tested representation instead of three.
pub type Document = serde_json::Value;
