//! Artifact enumeration.
//!
//! Both sides of a comparison are reduced to a set of [`ArtifactRef`]s keyed
//! by logical name. Names that cannot be normalized are not errors here; they
//! come back as anomalies so the reconciler can report them as `*_only`
//! entries while everything else is still compared.
//!
//! [`ArtifactRef`]: rebuilder_types::artifact::ArtifactRef

mod enumerate;
pub mod normalize;
pub mod sha256sums;

pub use enumerate::{Enumeration, enumerate_dir, enumerate_listing, relative_to};
pub use normalize::{NameNormalizationError, Normalized, RuleSet};
pub use sha256sums::{ChecksumEntry, ChecksumListing, parse_sha256sums};
