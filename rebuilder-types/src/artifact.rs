use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the comparison an artifact was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    Local,
    Official,
}

impl fmt::Display for ArtifactOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactOrigin::Local => f.write_str("local"),
            ArtifactOrigin::Official => f.write_str("official"),
        }
    }
}

/// Coarse kind of an artifact, derived from its logical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    Image,
    Package,
    KernelModule,
    Metadata,
    Other,
}

const IMAGE_SUFFIXES: &[&str] = &[
    ".bin", ".img", ".img.gz", ".itb", ".trx", ".chk", ".ubi", ".vmdk", ".vdi", ".qcow2",
    ".iso", ".tar.gz", ".tar.zst", "-kernel.bin", "-rootfs.tar.gz",
];

const METADATA_SUFFIXES: &[&str] = &[
    ".buildinfo", ".manifest", ".json", "sha256sums", "Packages", "Packages.gz",
    "Packages.manifest", "index.json", "packages.adb",
];

impl ArtifactCategory {
    pub fn from_logical_name(name: &str) -> Self {
        let file = name.rsplit('/').next().unwrap_or(name);

        if name.starts_with("kmods/") || (file.starts_with("kmod-") && is_package(file)) {
            return ArtifactCategory::KernelModule;
        }
        if is_package(file) {
            return ArtifactCategory::Package;
        }
        if METADATA_SUFFIXES.iter().any(|s| file.ends_with(s)) {
            return ArtifactCategory::Metadata;
        }
        if IMAGE_SUFFIXES.iter().any(|s| file.ends_with(s)) {
            return ArtifactCategory::Image;
        }
        ArtifactCategory::Other
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactCategory::Image => "image",
            ArtifactCategory::Package => "package",
            ArtifactCategory::KernelModule => "kernel_module",
            ArtifactCategory::Metadata => "metadata",
            ArtifactCategory::Other => "other",
        }
    }
}

fn is_package(file: &str) -> bool {
    file.ends_with(".ipk") || file.ends_with(".apk")
}

/// One file on one side of the comparison.
///
/// `path` is where the bytes can be read when the artifact is materialized
/// on disk; official artifacts enumerated from a checksum listing carry a
/// `url` and a `declared_sha256` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Pairing key after normalization.
    pub logical_name: String,

    /// Path relative to the enumeration root, before normalization.
    pub raw_name: String,

    pub origin: ArtifactOrigin,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Utf8PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Digest published alongside the artifact, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_sha256: Option<String>,
}

impl ArtifactRef {
    pub fn category(&self) -> ArtifactCategory {
        ArtifactCategory::from_logical_name(&self.logical_name)
    }
}

/// An artifact that could not be given a usable logical name, or that lost
/// a duplicate-name tie on its side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactAnomaly {
    /// Raw name as enumerated (lossy for non-UTF-8 names).
    pub raw_name: String,
    pub origin: ArtifactOrigin,
    pub reason: String,
}
