//! Build-and-verify engine for OpenWrt firmware rebuilds.
//!
//! Clap-free and I/O-abstracted so it can be driven by the CLI or embedded
//! in a scheduler.
//!
//! # Stages
//!
//! 1. [`resolve`](resolve::resolve) turns raw settings into an immutable [`BuildJob`].
//! 2. [`provision`](provision::provision) brings the checkout to the official commit.
//! 3. [`drive_build`](build::drive_build) runs the toolchain and classifies the result.
//! 4. [`rebuilder_artifacts`] enumerates both artifact sets.
//! 5. [`reconcile`](reconcile::reconcile) compares them by content.
//! 6. [`emit`](emit::emit) writes the report atomically.
//!
//! [`run_verify`](pipeline::run_verify) chains them; [`combine`](combine::combine)
//! folds many reports into an index.
//!
//! # Port traits
//!
//! Every external collaborator sits behind a trait in [`ports`]:
//! - [`SourceControl`](ports::SourceControl): clone, fetch, reset, patch
//! - [`OriginPort`](ports::OriginPort): official buildinfo, listing, downloads
//! - [`Toolchain`](ports::Toolchain): the native build
//! - [`DiffAnalyzer`](ports::DiffAnalyzer): deep diff of a mismatched pair
//! - [`WritePort`](ports::WritePort): atomic file writes
//!
//! [`adapters`] holds the default implementations.

pub mod adapters;
pub mod build;
pub mod buildinfo;
pub mod cancel;
pub mod combine;
pub mod emit;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod process;
pub mod provision;
pub mod reconcile;
pub mod resolve;
pub mod settings;

#[cfg(test)]
mod testing;

pub use cancel::CancelToken;
pub use error::RebuildError;
pub use pipeline::{Ports, VerifyOutcome, run_verify};
pub use resolve::resolve;
pub use settings::{RebuildSettings, VerifyOptions};

// Re-exported so embedders don't need the types crate for the common case.
pub use rebuilder_types::job::BuildJob;
pub use rebuilder_types::report::{ToolInfo, VerificationReport};
