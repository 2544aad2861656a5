//! Shared types and wire formats for quarry.
//!
//! This crate owns the package descriptor ([`Specification`]), its version
//! type, and every byte format that independent readers depend on: the
//! self-describing TOML descriptor, the fixed-order compact tuple, and the
//! aggregate `(name, version, platform)` lists.

pub mod codec;
pub mod compress;
pub mod platform;
pub mod specification;
pub mod tuple;
pub mod version;

// Re-exports
pub use codec::{DecodeError, EncodeError};
pub use platform::GENERIC_PLATFORM;
pub use specification::{
    Dependency, DependencyKind, Specification, SpecificationBuilder, SpecificationError,
    SpecificationOptions,
};
pub use tuple::SpecTuple;
pub use version::{Version, VersionError};

/// Identifier of the compact tuple format. Embedded in artifact names so that
/// incompatible future encodings can live side by side.
pub const COMPACT_FORMAT: &str = "1";

/// Descriptor format-version integer written into every compact tuple.
pub const SPECIFICATION_VERSION: u32 = 4;

/// Producer-tool version recorded in descriptors that do not carry one.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension of package archives.
pub const ARCHIVE_EXTENSION: &str = "gem";
